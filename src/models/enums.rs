//! 核心枚举类型：测试状态、模块类型、点位数据类型、字节序。
//!
//! `OverallTestStatus` 的取值与状态图（见 `domain::state_manager`）一一对应，
//! 不在这里做任何归并或别名处理：每个变体都必须出现在状态图的边集合中。

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// 通道测试实例的整体状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverallTestStatus {
    NotTested,
    WiringConfirmationRequired,
    WiringConfirmed,
    HardPointTesting,
    HardPointTestCompleted,
    AlarmTesting,
    ManualTesting,
    TestCompletedPassed,
    TestCompletedFailed,
    Skipped,
    Retesting,
}

impl Default for OverallTestStatus {
    fn default() -> Self {
        Self::NotTested
    }
}

impl OverallTestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::TestCompletedPassed | Self::TestCompletedFailed | Self::Skipped
        )
    }
}

impl Display for OverallTestStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotTested => "NotTested",
            Self::WiringConfirmationRequired => "WiringConfirmationRequired",
            Self::WiringConfirmed => "WiringConfirmed",
            Self::HardPointTesting => "HardPointTesting",
            Self::HardPointTestCompleted => "HardPointTestCompleted",
            Self::AlarmTesting => "AlarmTesting",
            Self::ManualTesting => "ManualTesting",
            Self::TestCompletedPassed => "TestCompletedPassed",
            Self::TestCompletedFailed => "TestCompletedFailed",
            Self::Skipped => "Skipped",
            Self::Retesting => "Retesting",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OverallTestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NotTested" => Ok(Self::NotTested),
            "WiringConfirmationRequired" => Ok(Self::WiringConfirmationRequired),
            "WiringConfirmed" => Ok(Self::WiringConfirmed),
            "HardPointTesting" => Ok(Self::HardPointTesting),
            "HardPointTestCompleted" => Ok(Self::HardPointTestCompleted),
            "AlarmTesting" => Ok(Self::AlarmTesting),
            "ManualTesting" => Ok(Self::ManualTesting),
            "TestCompletedPassed" => Ok(Self::TestCompletedPassed),
            "TestCompletedFailed" => Ok(Self::TestCompletedFailed),
            "Skipped" => Ok(Self::Skipped),
            "Retesting" => Ok(Self::Retesting),
            other => Err(format!("无效的整体测试状态: {other}")),
        }
    }
}

/// 单个子测试项的状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubTestStatus {
    NotTested,
    Testing,
    Passed,
    Failed,
    NotApplicable,
    Skipped,
}

impl Default for SubTestStatus {
    fn default() -> Self {
        Self::NotTested
    }
}

impl Display for SubTestStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotTested => "NotTested",
            Self::Testing => "Testing",
            Self::Passed => "Passed",
            Self::Failed => "Failed",
            Self::NotApplicable => "NotApplicable",
            Self::Skipped => "Skipped",
        };
        write!(f, "{s}")
    }
}

/// 模块类型，携带电源形式（有源/无源）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleType {
    AI,
    AO,
    DI,
    DO,
    AIPassive,
    AOPassive,
    DIPassive,
    DOPassive,
    Communication,
}

impl ModuleType {
    /// 基础类型，无源变体归并到对应有源类型（用于适用性矩阵查表，§4.4）。
    pub fn base(self) -> BaseModuleType {
        match self {
            Self::AI | Self::AIPassive => BaseModuleType::AI,
            Self::AO | Self::AOPassive => BaseModuleType::AO,
            Self::DI | Self::DIPassive => BaseModuleType::DI,
            Self::DO | Self::DOPassive => BaseModuleType::DO,
            Self::Communication => BaseModuleType::Communication,
        }
    }

    pub fn is_passive(self) -> bool {
        matches!(
            self,
            Self::AIPassive | Self::AOPassive | Self::DIPassive | Self::DOPassive
        )
    }

    pub fn is_analog(self) -> bool {
        matches!(self.base(), BaseModuleType::AI | BaseModuleType::AO)
    }
}

/// 模块基础类型，忽略电源形式；用于分配配对表与适用性矩阵。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseModuleType {
    AI,
    AO,
    DI,
    DO,
    Communication,
}

impl Display for ModuleType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AI => "AI",
            Self::AO => "AO",
            Self::DI => "DI",
            Self::DO => "DO",
            Self::AIPassive => "AI_passive",
            Self::AOPassive => "AO_passive",
            Self::DIPassive => "DI_passive",
            Self::DOPassive => "DO_passive",
            Self::Communication => "Communication",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ModuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AI" => Ok(Self::AI),
            "AO" => Ok(Self::AO),
            "DI" => Ok(Self::DI),
            "DO" => Ok(Self::DO),
            "AI_passive" | "AIPassive" | "AINone" => Ok(Self::AIPassive),
            "AO_passive" | "AOPassive" | "AONone" => Ok(Self::AOPassive),
            "DI_passive" | "DIPassive" | "DINone" => Ok(Self::DIPassive),
            "DO_passive" | "DOPassive" | "DONone" => Ok(Self::DOPassive),
            "Communication" => Ok(Self::Communication),
            other => Err(format!("未知的模块类型: {other}")),
        }
    }
}

/// 点位数据类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointDataType {
    Bool,
    Int16,
    Int32,
    UInt16,
    UInt32,
    Float,
    Double,
    String,
}

impl Default for PointDataType {
    fn default() -> Self {
        Self::Float
    }
}

impl Display for PointDataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Bool => "Bool",
            Self::Int16 => "Int16",
            Self::Int32 => "Int32",
            Self::UInt16 => "UInt16",
            Self::UInt32 => "UInt32",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::String => "String",
        };
        write!(f, "{s}")
    }
}

impl FromStr for PointDataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Bool" => Ok(Self::Bool),
            "Int16" => Ok(Self::Int16),
            "Int32" => Ok(Self::Int32),
            "UInt16" => Ok(Self::UInt16),
            "UInt32" => Ok(Self::UInt32),
            "Float" | "Real" => Ok(Self::Float),
            "Double" => Ok(Self::Double),
            "String" => Ok(Self::String),
            other => Err(format!("未知的数据类型: {other}")),
        }
    }
}

/// 子测试项（开放集合）：每个执行器只声明自己产生的子集（§4.3/§4.4）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubTestItem {
    HardPoint,
    Output0Percent,
    Output25Percent,
    Output50Percent,
    Output75Percent,
    Output100Percent,
    LowLowAlarm,
    LowAlarm,
    HighAlarm,
    HighHighAlarm,
    Maintenance,
    TrendCheck,
    ReportCheck,
    StateDisplay,
    CommunicationTest,
    Custom(String),
}

impl Display for SubTestItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::HardPoint => "HardPoint",
            Self::Output0Percent => "Output0Percent",
            Self::Output25Percent => "Output25Percent",
            Self::Output50Percent => "Output50Percent",
            Self::Output75Percent => "Output75Percent",
            Self::Output100Percent => "Output100Percent",
            Self::LowLowAlarm => "LowLowAlarm",
            Self::LowAlarm => "LowAlarm",
            Self::HighAlarm => "HighAlarm",
            Self::HighHighAlarm => "HighHighAlarm",
            Self::Maintenance => "Maintenance",
            Self::TrendCheck => "TrendCheck",
            Self::ReportCheck => "ReportCheck",
            Self::StateDisplay => "StateDisplay",
            Self::CommunicationTest => "CommunicationTest",
            Self::Custom(name) => name,
        };
        write!(f, "{s}")
    }
}

/// 电源供给形式：有源（由被测PLC供电）或无源（由测试台架供电）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerSupplyType {
    Sourced,
    Passive,
}

impl Display for PowerSupplyType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Sourced => "sourced",
            Self::Passive => "passive",
        };
        write!(f, "{s}")
    }
}

impl FromStr for PowerSupplyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sourced" | "source" | "有源" => Ok(Self::Sourced),
            "passive" | "无源" => Ok(Self::Passive),
            other => Err(format!("未知的电源供给形式: {other}")),
        }
    }
}

/// 接线系统：常开/常闭，决定 DI/DO 测试的预期逻辑是否取反。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireSystem {
    /// 常开 (Normally Open)
    NO,
    /// 常闭 (Normally Closed) — 观测到的逻辑取反
    NC,
}

impl Display for WireSystem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NO => "NO",
            Self::NC => "NC",
        };
        write!(f, "{s}")
    }
}

impl FromStr for WireSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NO" => Ok(Self::NO),
            "NC" => Ok(Self::NC),
            other => Err(format!("未知的接线系统: {other}")),
        }
    }
}

/// PLC寄存器数据的字节顺序，用于多寄存器浮点数/整数解析。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    /// 大端序：高字在前，高字节在前 (AB CD)
    ABCD,
    /// 混合序：低字在前，高字节在前 (CD AB) — 最常见，默认值
    CDAB,
    /// 混合序：高字在前，低字节在前 (BA DC)
    BADC,
    /// 小端序：低字在前，低字节在前 (DC BA)
    DCBA,
}

impl Default for ByteOrder {
    fn default() -> Self {
        Self::CDAB
    }
}

impl Display for ByteOrder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ABCD => "ABCD",
            Self::CDAB => "CDAB",
            Self::BADC => "BADC",
            Self::DCBA => "DCBA",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ByteOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ABCD" => Ok(Self::ABCD),
            "CDAB" => Ok(Self::CDAB),
            "BADC" => Ok(Self::BADC),
            "DCBA" => Ok(Self::DCBA),
            other => Err(format!(
                "不支持的字节序: {other}，支持 ABCD/CDAB/BADC/DCBA"
            )),
        }
    }
}
