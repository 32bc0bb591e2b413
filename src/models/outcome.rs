//! `RawTestOutcome`: StepExecutor产生的只追加记录。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::SubTestItem;

/// 一次原子子测试的执行结果。只追加，从不更新（§3 Lifecycles）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTestOutcome {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub sub_test_item: SubTestItem,
    pub success: bool,
    pub message: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub readings_json: Option<serde_json::Value>,
}

impl RawTestOutcome {
    pub fn new(
        instance_id: Uuid,
        sub_test_item: SubTestItem,
        success: bool,
        message: Option<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        readings_json: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            instance_id,
            sub_test_item,
            success,
            message,
            start_time,
            end_time,
            readings_json,
        }
    }
}

/// 执行器失败分类（§4.3），进入 `RawTestOutcome.message` 与错误详情事件。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FailureKind {
    ConnectError,
    WriteError,
    ReadError,
    OutOfTolerance {
        expected: f64,
        actual: f64,
        tolerance: f64,
    },
    WireSystemMismatch,
    NoTestChannel,
    Cancelled,
    Timeout,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectError => write!(f, "ConnectError"),
            Self::WriteError => write!(f, "WriteError"),
            Self::ReadError => write!(f, "ReadError"),
            Self::OutOfTolerance {
                expected,
                actual,
                tolerance,
            } => write!(
                f,
                "OutOfTolerance(expected={expected}, actual={actual}, tol={tolerance})"
            ),
            Self::WireSystemMismatch => write!(f, "WireSystemMismatch"),
            Self::NoTestChannel => write!(f, "NoTestChannel"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Timeout => write!(f, "Timeout"),
        }
    }
}
