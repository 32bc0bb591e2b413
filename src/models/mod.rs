//! 领域数据模型：与持久化、PLC协议无关的纯结构体与枚举（§3）。

pub mod batch;
pub mod definition;
pub mod enums;
pub mod instance;
pub mod outcome;
pub mod rig;

pub use batch::{BatchStatistics, OverallBatchStatus, TestBatchInfo};
pub use definition::{AlarmSetpoint, AlarmSetpoints, ChannelPointDefinition, MaintenanceSetpoint};
pub use enums::{
    BaseModuleType, ByteOrder, ModuleType, OverallTestStatus, PointDataType, PowerSupplyType,
    SubTestItem, SubTestStatus, WireSystem,
};
pub use instance::{AnalogReadingPoint, ChannelTestInstance, ErrorNotes, SubTestResult};
pub use outcome::{FailureKind, RawTestOutcome};
pub use rig::{ChannelAllocation, TestPlcChannel};
