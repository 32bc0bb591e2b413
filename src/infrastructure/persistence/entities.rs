//! SeaORM entity mirrors of the domain structs in `crate::models`.
//!
//! The domain structs stay persistence-agnostic (no `sea_orm` attributes);
//! these entities are the only place that knows about column types. Enums
//! and nested structures are stored as JSON/text and converted at the
//! boundary via `From`/`TryFrom`, matching the teacher's own mapping style.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::AppError;
use crate::models as domain;

// ==================== channel_point_definitions ====================

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "channel_point_definitions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub tag: String,
    pub variable_name: String,
    pub description: String,
    pub station_name: String,
    pub module_name: String,
    pub module_type: String,
    pub channel_number: String,
    pub data_type: String,
    pub power_supply_type: String,
    pub wire_system: Option<String>,
    pub plc_absolute_address: String,
    pub plc_communication_address: String,
    pub range_lo: Option<f64>,
    pub range_hi: Option<f64>,
    pub eng_unit: Option<String>,
    /// JSON-encoded `AlarmSetpoints`
    pub alarm_setpoints_json: String,
    /// JSON-encoded `Option<MaintenanceSetpoint>`
    pub maintenance_json: String,
    pub remarks: Option<String>,
    pub sequence_number: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for domain::ChannelPointDefinition {
    type Error = AppError;

    fn try_from(m: Model) -> Result<Self, Self::Error> {
        Ok(domain::ChannelPointDefinition {
            id: Uuid::parse_str(&m.id).map_err(|e| AppError::internal(e.to_string()))?,
            tag: m.tag,
            variable_name: m.variable_name,
            description: m.description,
            station_name: m.station_name,
            module_name: m.module_name,
            module_type: domain::ModuleType::from_str(&m.module_type).map_err(AppError::internal)?,
            channel_number: m.channel_number,
            data_type: domain::PointDataType::from_str(&m.data_type).map_err(AppError::internal)?,
            power_supply_type: domain::PowerSupplyType::from_str(&m.power_supply_type)
                .map_err(AppError::internal)?,
            wire_system: m
                .wire_system
                .map(|s| domain::WireSystem::from_str(&s))
                .transpose()
                .map_err(AppError::internal)?,
            plc_absolute_address: m.plc_absolute_address,
            plc_communication_address: m.plc_communication_address,
            range_lo: m.range_lo,
            range_hi: m.range_hi,
            eng_unit: m.eng_unit,
            alarm_setpoints: serde_json::from_str(&m.alarm_setpoints_json)?,
            maintenance: serde_json::from_str(&m.maintenance_json)?,
            remarks: m.remarks,
            sequence_number: m.sequence_number as u32,
        })
    }
}

impl TryFrom<&domain::ChannelPointDefinition> for ActiveModel {
    type Error = AppError;

    fn try_from(d: &domain::ChannelPointDefinition) -> Result<Self, Self::Error> {
        use sea_orm::ActiveValue::Set;
        Ok(ActiveModel {
            id: Set(d.id.to_string()),
            tag: Set(d.tag.clone()),
            variable_name: Set(d.variable_name.clone()),
            description: Set(d.description.clone()),
            station_name: Set(d.station_name.clone()),
            module_name: Set(d.module_name.clone()),
            module_type: Set(d.module_type.to_string()),
            channel_number: Set(d.channel_number.clone()),
            data_type: Set(d.data_type.to_string()),
            power_supply_type: Set(d.power_supply_type.to_string()),
            wire_system: Set(d.wire_system.map(|w| w.to_string())),
            plc_absolute_address: Set(d.plc_absolute_address.clone()),
            plc_communication_address: Set(d.plc_communication_address.clone()),
            range_lo: Set(d.range_lo),
            range_hi: Set(d.range_hi),
            eng_unit: Set(d.eng_unit.clone()),
            alarm_setpoints_json: Set(serde_json::to_string(&d.alarm_setpoints)?),
            maintenance_json: Set(serde_json::to_string(&d.maintenance)?),
            remarks: Set(d.remarks.clone()),
            sequence_number: Set(d.sequence_number as i64),
        })
    }
}

pub mod test_plc_channel {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "test_plc_channels")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub channel_address: String,
        pub channel_type: String,
        pub communication_address: String,
        pub power_supply_type: String,
        pub enabled: bool,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl TryFrom<Model> for domain::TestPlcChannel {
        type Error = AppError;

        fn try_from(m: Model) -> Result<Self, Self::Error> {
            Ok(domain::TestPlcChannel {
                id: Uuid::parse_str(&m.id).map_err(|e| AppError::internal(e.to_string()))?,
                channel_address: m.channel_address,
                channel_type: domain::ModuleType::from_str(&m.channel_type)
                    .map_err(AppError::internal)?,
                communication_address: m.communication_address,
                power_supply_type: domain::PowerSupplyType::from_str(&m.power_supply_type)
                    .map_err(AppError::internal)?,
                enabled: m.enabled,
            })
        }
    }

    impl From<&domain::TestPlcChannel> for ActiveModel {
        fn from(d: &domain::TestPlcChannel) -> Self {
            use sea_orm::ActiveValue::Set;
            ActiveModel {
                id: Set(d.id.to_string()),
                channel_address: Set(d.channel_address.clone()),
                channel_type: Set(d.channel_type.to_string()),
                communication_address: Set(d.communication_address.clone()),
                power_supply_type: Set(d.power_supply_type.to_string()),
                enabled: Set(d.enabled),
            }
        }
    }
}

pub mod test_batch {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "test_batches")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub batch_id: String,
        pub batch_name: String,
        pub product_model: Option<String>,
        pub serial_number: Option<String>,
        pub station_name: Option<String>,
        pub created_at: DateTimeUtc,
        pub total: i64,
        pub tested: i64,
        pub passed: i64,
        pub failed: i64,
        pub skipped: i64,
        pub started: i64,
        pub overall_status: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl TryFrom<Model> for domain::TestBatchInfo {
        type Error = AppError;

        fn try_from(m: Model) -> Result<Self, Self::Error> {
            let overall_status = match m.overall_status.as_str() {
                "NotStarted" => domain::OverallBatchStatus::NotStarted,
                "InProgress" => domain::OverallBatchStatus::InProgress,
                "Completed" => domain::OverallBatchStatus::Completed,
                "CompletedWithFailures" => domain::OverallBatchStatus::CompletedWithFailures,
                other => return Err(AppError::internal(format!("未知的批次状态: {other}"))),
            };
            Ok(domain::TestBatchInfo {
                batch_id: Uuid::parse_str(&m.batch_id).map_err(|e| AppError::internal(e.to_string()))?,
                batch_name: m.batch_name,
                product_model: m.product_model,
                serial_number: m.serial_number,
                station_name: m.station_name,
                created_at: m.created_at,
                statistics: domain::BatchStatistics {
                    total: m.total as u32,
                    tested: m.tested as u32,
                    passed: m.passed as u32,
                    failed: m.failed as u32,
                    skipped: m.skipped as u32,
                    started: m.started as u32,
                },
                overall_status,
            })
        }
    }

    impl From<&domain::TestBatchInfo> for ActiveModel {
        fn from(d: &domain::TestBatchInfo) -> Self {
            use sea_orm::ActiveValue::Set;
            let overall_status = match d.overall_status {
                domain::OverallBatchStatus::NotStarted => "NotStarted",
                domain::OverallBatchStatus::InProgress => "InProgress",
                domain::OverallBatchStatus::Completed => "Completed",
                domain::OverallBatchStatus::CompletedWithFailures => "CompletedWithFailures",
            };
            ActiveModel {
                batch_id: Set(d.batch_id.to_string()),
                batch_name: Set(d.batch_name.clone()),
                product_model: Set(d.product_model.clone()),
                serial_number: Set(d.serial_number.clone()),
                station_name: Set(d.station_name.clone()),
                created_at: Set(d.created_at),
                total: Set(d.statistics.total as i64),
                tested: Set(d.statistics.tested as i64),
                passed: Set(d.statistics.passed as i64),
                failed: Set(d.statistics.failed as i64),
                skipped: Set(d.statistics.skipped as i64),
                started: Set(d.statistics.started as i64),
                overall_status: Set(overall_status.to_string()),
            }
        }
    }
}

pub mod channel_allocation {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "channel_allocations")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = true)]
        pub row_id: i64,
        pub definition_id: String,
        pub batch_id: String,
        pub batch_name: String,
        pub test_channel_id: Option<String>,
        pub test_comm_address: Option<String>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl TryFrom<Model> for domain::ChannelAllocation {
        type Error = AppError;

        fn try_from(m: Model) -> Result<Self, Self::Error> {
            Ok(domain::ChannelAllocation {
                definition_id: Uuid::parse_str(&m.definition_id)
                    .map_err(|e| AppError::internal(e.to_string()))?,
                batch_id: Uuid::parse_str(&m.batch_id).map_err(|e| AppError::internal(e.to_string()))?,
                batch_name: m.batch_name,
                test_channel_id: m
                    .test_channel_id
                    .map(|s| Uuid::parse_str(&s))
                    .transpose()
                    .map_err(|e| AppError::internal(e.to_string()))?,
                test_comm_address: m.test_comm_address,
            })
        }
    }

    impl From<&domain::ChannelAllocation> for ActiveModel {
        fn from(d: &domain::ChannelAllocation) -> Self {
            use sea_orm::ActiveValue::{NotSet, Set};
            ActiveModel {
                row_id: NotSet,
                definition_id: Set(d.definition_id.to_string()),
                batch_id: Set(d.batch_id.to_string()),
                batch_name: Set(d.batch_name.clone()),
                test_channel_id: Set(d.test_channel_id.map(|id| id.to_string())),
                test_comm_address: Set(d.test_comm_address.clone()),
            }
        }
    }
}

pub mod channel_test_instance {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "channel_test_instances")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub instance_id: String,
        pub definition_id: String,
        pub batch_id: String,
        pub overall_status: String,
        /// JSON-encoded `HashMap<SubTestItem, SubTestResult>`
        pub sub_test_results_json: String,
        pub start_time: Option<DateTimeUtc>,
        pub final_test_time: Option<DateTimeUtc>,
        pub duration_ms: Option<i64>,
        pub retries_count: i64,
        pub current_operator: Option<String>,
        pub error_message: Option<String>,
        /// JSON-encoded `ErrorNotes`
        pub error_notes_json: String,
        /// JSON-encoded `Vec<AnalogReadingPoint>`
        pub analog_readings_json: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl TryFrom<Model> for domain::ChannelTestInstance {
        type Error = AppError;

        fn try_from(m: Model) -> Result<Self, Self::Error> {
            use std::str::FromStr;
            Ok(domain::ChannelTestInstance {
                instance_id: Uuid::parse_str(&m.instance_id).map_err(|e| AppError::internal(e.to_string()))?,
                definition_id: Uuid::parse_str(&m.definition_id)
                    .map_err(|e| AppError::internal(e.to_string()))?,
                batch_id: Uuid::parse_str(&m.batch_id).map_err(|e| AppError::internal(e.to_string()))?,
                overall_status: domain::OverallTestStatus::from_str(&m.overall_status)
                    .map_err(AppError::internal)?,
                sub_test_results: serde_json::from_str(&m.sub_test_results_json)?,
                start_time: m.start_time,
                final_test_time: m.final_test_time,
                duration_ms: m.duration_ms,
                retries_count: m.retries_count as u32,
                current_operator: m.current_operator,
                error_message: m.error_message,
                error_notes: serde_json::from_str(&m.error_notes_json)?,
                analog_readings: serde_json::from_str(&m.analog_readings_json)?,
            })
        }
    }

    impl TryFrom<&domain::ChannelTestInstance> for ActiveModel {
        type Error = AppError;

        fn try_from(d: &domain::ChannelTestInstance) -> Result<Self, Self::Error> {
            use sea_orm::ActiveValue::Set;
            Ok(ActiveModel {
                instance_id: Set(d.instance_id.to_string()),
                definition_id: Set(d.definition_id.to_string()),
                batch_id: Set(d.batch_id.to_string()),
                overall_status: Set(d.overall_status.to_string()),
                sub_test_results_json: Set(serde_json::to_string(&d.sub_test_results)?),
                start_time: Set(d.start_time),
                final_test_time: Set(d.final_test_time),
                duration_ms: Set(d.duration_ms),
                retries_count: Set(d.retries_count as i64),
                current_operator: Set(d.current_operator.clone()),
                error_message: Set(d.error_message.clone()),
                error_notes_json: Set(serde_json::to_string(&d.error_notes)?),
                analog_readings_json: Set(serde_json::to_string(&d.analog_readings)?),
            })
        }
    }
}

pub mod raw_test_outcome {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "raw_test_outcomes")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub instance_id: String,
        pub sub_test_item: String,
        pub success: bool,
        pub message: Option<String>,
        pub start_time: DateTimeUtc,
        pub end_time: DateTimeUtc,
        pub readings_json: Option<String>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl TryFrom<Model> for domain::RawTestOutcome {
        type Error = AppError;

        fn try_from(m: Model) -> Result<Self, Self::Error> {
            Ok(domain::RawTestOutcome {
                id: Uuid::parse_str(&m.id).map_err(|e| AppError::internal(e.to_string()))?,
                instance_id: Uuid::parse_str(&m.instance_id)
                    .map_err(|e| AppError::internal(e.to_string()))?,
                sub_test_item: sub_test_item_from_str(&m.sub_test_item),
                success: m.success,
                message: m.message,
                start_time: m.start_time,
                end_time: m.end_time,
                readings_json: m
                    .readings_json
                    .map(|s| serde_json::from_str(&s))
                    .transpose()?,
            })
        }
    }

    impl TryFrom<&domain::RawTestOutcome> for ActiveModel {
        type Error = AppError;

        fn try_from(d: &domain::RawTestOutcome) -> Result<Self, Self::Error> {
            use sea_orm::ActiveValue::Set;
            Ok(ActiveModel {
                id: Set(d.id.to_string()),
                instance_id: Set(d.instance_id.to_string()),
                sub_test_item: Set(d.sub_test_item.to_string()),
                success: Set(d.success),
                message: Set(d.message.clone()),
                start_time: Set(d.start_time),
                end_time: Set(d.end_time),
                readings_json: Set(d
                    .readings_json
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?),
            })
        }
    }

    /// `SubTestItem` has no generated `FromStr` (its `Custom` variant carries
    /// free text); known names map back to their variant, anything else
    /// round-trips through `Custom`.
    fn sub_test_item_from_str(s: &str) -> domain::SubTestItem {
        use domain::SubTestItem::*;
        match s {
            "HardPoint" => HardPoint,
            "Output0Percent" => Output0Percent,
            "Output25Percent" => Output25Percent,
            "Output50Percent" => Output50Percent,
            "Output75Percent" => Output75Percent,
            "Output100Percent" => Output100Percent,
            "LowLowAlarm" => LowLowAlarm,
            "LowAlarm" => LowAlarm,
            "HighAlarm" => HighAlarm,
            "HighHighAlarm" => HighHighAlarm,
            "Maintenance" => Maintenance,
            "TrendCheck" => TrendCheck,
            "ReportCheck" => ReportCheck,
            "StateDisplay" => StateDisplay,
            "CommunicationTest" => CommunicationTest,
            other => Custom(other.to_string()),
        }
    }
}
