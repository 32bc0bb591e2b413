//! `ChannelTestInstance`: 批次中测试一个定义的可变状态单元。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{OverallTestStatus, SubTestItem, SubTestStatus};

/// 单个子测试项的结果。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTestResult {
    pub status: SubTestStatus,
    pub message: Option<String>,
    pub readings: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl SubTestResult {
    pub fn not_tested(now: DateTime<Utc>) -> Self {
        Self {
            status: SubTestStatus::NotTested,
            message: None,
            readings: None,
            timestamp: now,
        }
    }
}

/// 错误分类备注：集成、PLC编程、HMI组态。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorNotes {
    pub integration: Option<String>,
    pub plc_programming: Option<String>,
    pub hmi_configuration: Option<String>,
}

/// 瞬态读数：硬点测试过程中展示给操作员的原始值/工程值。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalogReadingPoint {
    pub percent: u8,
    pub expected: f64,
    pub actual: f64,
    pub passed: bool,
}

/// 测试一个定义在一个批次中的可变状态单元。
///
/// 唯一的写入路径是 `StateManager`（I1）；其余组件只持有只读快照。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelTestInstance {
    pub instance_id: Uuid,
    pub definition_id: Uuid,
    pub batch_id: Uuid,
    pub overall_status: OverallTestStatus,
    pub sub_test_results: HashMap<SubTestItem, SubTestResult>,
    pub start_time: Option<DateTime<Utc>>,
    pub final_test_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub retries_count: u32,
    pub current_operator: Option<String>,
    pub error_message: Option<String>,
    pub error_notes: ErrorNotes,
    pub analog_readings: Vec<AnalogReadingPoint>,
}

impl ChannelTestInstance {
    pub fn new(instance_id: Uuid, definition_id: Uuid, batch_id: Uuid) -> Self {
        Self {
            instance_id,
            definition_id,
            batch_id,
            overall_status: OverallTestStatus::NotTested,
            sub_test_results: HashMap::new(),
            start_time: None,
            final_test_time: None,
            duration_ms: None,
            retries_count: 0,
            current_operator: None,
            error_message: None,
            error_notes: ErrorNotes::default(),
            analog_readings: Vec::new(),
        }
    }
}
