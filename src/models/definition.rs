//! `ChannelPointDefinition`: 导入后不可变的通道点位定义。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ModuleType, PointDataType, PowerSupplyType, WireSystem};

/// 一组报警设定：设定值、设定地址、反馈地址。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmSetpoint {
    pub value: f64,
    pub setpoint_addr: String,
    pub feedback_addr: String,
}

/// 四个报警级别的设定组（低低、低、高、高高）。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlarmSetpoints {
    pub low_low: Option<AlarmSetpoint>,
    pub low: Option<AlarmSetpoint>,
    pub high: Option<AlarmSetpoint>,
    pub high_high: Option<AlarmSetpoint>,
}

/// 维护功能相关地址。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaintenanceSetpoint {
    pub setpoint_addr: String,
    pub enable_addr: String,
}

/// 导入后不可变的通道点位定义。由 Importer 产生，仅持久化一次；
/// 批次分配与测试实例只引用其 `id`，永不修改其内容（§3）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelPointDefinition {
    pub id: Uuid,
    /// 位号，导入时要求唯一（I·DuplicateTag）
    pub tag: String,
    pub variable_name: String,
    pub description: String,
    pub station_name: String,
    pub module_name: String,
    pub module_type: ModuleType,
    pub channel_number: String,
    pub data_type: PointDataType,
    pub power_supply_type: PowerSupplyType,
    pub wire_system: Option<WireSystem>,
    pub plc_absolute_address: String,
    pub plc_communication_address: String,
    pub range_lo: Option<f64>,
    pub range_hi: Option<f64>,
    pub eng_unit: Option<String>,
    pub alarm_setpoints: AlarmSetpoints,
    pub maintenance: Option<MaintenanceSetpoint>,
    /// 自由备注文本，保留原始表格信息
    pub remarks: Option<String>,
    /// 原表格中的行序，保序导出/分配按此字段排序
    pub sequence_number: u32,
}

impl ChannelPointDefinition {
    /// 按 §4.1 校验该定义是否具备其模块类型所需的必填字段。
    /// 返回 `Err` 时附带缺失字段说明，供 `InvalidDefinition` 使用。
    pub fn validate_required_fields(&self) -> Result<(), String> {
        use super::enums::BaseModuleType::*;
        match self.module_type.base() {
            AI | AO => {
                if self.range_lo.is_none() || self.range_hi.is_none() {
                    return Err(format!(
                        "{} 类型定义缺少 range_lo/range_hi",
                        self.module_type
                    ));
                }
            }
            DI | DO => {
                if self.wire_system.is_none() {
                    return Err(format!("{} 类型定义缺少 wire_system", self.module_type));
                }
            }
            Communication => {}
        }
        Ok(())
    }
}
