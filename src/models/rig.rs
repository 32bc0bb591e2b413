//! 测试台架固定资产清单与分配结果：`TestPlcChannel`、`ChannelAllocation`。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ModuleType, PowerSupplyType};

/// 测试台架上的一个固定通道（不随导入变化，属于设备清单）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestPlcChannel {
    pub id: Uuid,
    /// 例如 "AO1_1"
    pub channel_address: String,
    pub channel_type: ModuleType,
    pub communication_address: String,
    pub power_supply_type: PowerSupplyType,
    pub enabled: bool,
}

/// 一条定义到测试台架通道的分配结果。
///
/// 不变量：同一批次内，两条分配不得共享 `test_channel_id`（I·`ChannelAllocation`，P4）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelAllocation {
    pub definition_id: Uuid,
    pub batch_id: Uuid,
    pub batch_name: String,
    /// 清单耗尽时为 `None`；下游测试以 `NoTestChannel` 失败
    pub test_channel_id: Option<Uuid>,
    pub test_comm_address: Option<String>,
}
