//! Domain-owned ports: the trait boundaries the core depends on but never
//! implements itself (§1 "named collaborators"). Concrete adapters live
//! under `crate::infrastructure`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    ChannelAllocation, ChannelPointDefinition, ChannelTestInstance, RawTestOutcome, TestBatchInfo,
    TestPlcChannel,
};

/// Bit width for integer PLC reads/writes (§6 `read_int(address, width)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    Bits16,
    Bits32,
    Bits64,
}

/// Connection parameters a `PlcDriver` needs to establish a session. Kept
/// opaque to the core beyond what the scheduler/facade must pass through.
#[derive(Debug, Clone)]
pub struct PlcConnectParams {
    pub host: String,
    pub port: u16,
    pub byte_order: crate::models::ByteOrder,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

/// C1 — wire-level driver contract (§6). Address format is opaque to the
/// core; implementations interpret it however their protocol requires.
#[async_trait]
pub trait PlcDriver: Send + Sync {
    async fn connect(&self, params: &PlcConnectParams) -> AppResult<()>;
    async fn read_bool(&self, address: &str) -> AppResult<bool>;
    async fn read_float(&self, address: &str) -> AppResult<f32>;
    async fn read_int(&self, address: &str, width: IntWidth) -> AppResult<i64>;
    async fn write_bool(&self, address: &str, value: bool) -> AppResult<()>;
    async fn write_float(&self, address: &str, value: f32) -> AppResult<()>;
    async fn write_int(&self, address: &str, value: i64, width: IntWidth) -> AppResult<()>;
    async fn disconnect(&self) -> AppResult<()>;
    async fn is_connected(&self) -> bool;
}

/// C2 — persistence contract (§6, abbreviated). Implementations must make
/// `persist_outcome_and_transition` atomic: the induced state is never
/// visible before the outcome row is durable (I5).
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn save_definitions(&self, definitions: &[ChannelPointDefinition]) -> AppResult<()>;
    async fn load_definitions(&self) -> AppResult<Vec<ChannelPointDefinition>>;

    async fn save_test_channels(&self, channels: &[TestPlcChannel]) -> AppResult<()>;
    async fn load_test_channels(&self) -> AppResult<Vec<TestPlcChannel>>;

    async fn save_batch(&self, batch: &TestBatchInfo) -> AppResult<()>;
    async fn load_batch(&self, batch_id: Uuid) -> AppResult<Option<TestBatchInfo>>;
    async fn load_all_batches(&self) -> AppResult<Vec<TestBatchInfo>>;
    async fn delete_batch(&self, batch_id: Uuid) -> AppResult<()>;

    async fn save_allocations(&self, allocations: &[ChannelAllocation]) -> AppResult<()>;
    async fn load_allocations_by_batch(&self, batch_id: Uuid) -> AppResult<Vec<ChannelAllocation>>;
    async fn clear_allocations_by_batch(&self, batch_id: Uuid) -> AppResult<()>;

    async fn save_instance(&self, instance: &ChannelTestInstance) -> AppResult<()>;
    async fn load_instance(&self, instance_id: Uuid) -> AppResult<Option<ChannelTestInstance>>;
    async fn load_instances_by_batch(&self, batch_id: Uuid) -> AppResult<Vec<ChannelTestInstance>>;
    async fn delete_instances_by_batch(&self, batch_id: Uuid) -> AppResult<()>;

    /// Appends `outcome` and persists `instance` in one transaction; this is
    /// the "persist outcome then apply state transition" operation named in
    /// §6. Must be a no-op (but still `Ok`) when `outcome.id` was already
    /// recorded, to support idempotent replay (P7).
    async fn persist_outcome_and_transition(
        &self,
        outcome: &RawTestOutcome,
        instance: &ChannelTestInstance,
    ) -> AppResult<()>;

    async fn has_outcome(&self, outcome_id: Uuid) -> AppResult<bool>;
    async fn load_outcomes_by_instance(&self, instance_id: Uuid) -> AppResult<Vec<RawTestOutcome>>;
}
