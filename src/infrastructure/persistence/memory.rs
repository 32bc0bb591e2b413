//! Plain in-memory `PersistenceStore` used by unit tests across the domain
//! layer. Not behind a mocking framework: a small, readable double is
//! easier to reason about than a generated one.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::ports::PersistenceStore;
use crate::error::AppResult;
use crate::models::{
    ChannelAllocation, ChannelPointDefinition, ChannelTestInstance, RawTestOutcome, TestBatchInfo,
    TestPlcChannel,
};

#[derive(Default)]
struct State {
    definitions: HashMap<Uuid, ChannelPointDefinition>,
    test_channels: HashMap<Uuid, TestPlcChannel>,
    batches: HashMap<Uuid, TestBatchInfo>,
    allocations: HashMap<Uuid, Vec<ChannelAllocation>>,
    instances: HashMap<Uuid, ChannelTestInstance>,
    outcomes: HashMap<Uuid, RawTestOutcome>,
}

pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceStore for InMemoryStore {
    async fn save_definitions(&self, definitions: &[ChannelPointDefinition]) -> AppResult<()> {
        let mut state = self.state.lock().expect("内存存储锁中毒");
        for def in definitions {
            state.definitions.insert(def.id, def.clone());
        }
        Ok(())
    }

    async fn load_definitions(&self) -> AppResult<Vec<ChannelPointDefinition>> {
        Ok(self
            .state
            .lock()
            .expect("内存存储锁中毒")
            .definitions
            .values()
            .cloned()
            .collect())
    }

    async fn save_test_channels(&self, channels: &[TestPlcChannel]) -> AppResult<()> {
        let mut state = self.state.lock().expect("内存存储锁中毒");
        for ch in channels {
            state.test_channels.insert(ch.id, ch.clone());
        }
        Ok(())
    }

    async fn load_test_channels(&self) -> AppResult<Vec<TestPlcChannel>> {
        Ok(self
            .state
            .lock()
            .expect("内存存储锁中毒")
            .test_channels
            .values()
            .cloned()
            .collect())
    }

    async fn save_batch(&self, batch: &TestBatchInfo) -> AppResult<()> {
        self.state
            .lock()
            .expect("内存存储锁中毒")
            .batches
            .insert(batch.batch_id, batch.clone());
        Ok(())
    }

    async fn load_batch(&self, batch_id: Uuid) -> AppResult<Option<TestBatchInfo>> {
        Ok(self
            .state
            .lock()
            .expect("内存存储锁中毒")
            .batches
            .get(&batch_id)
            .cloned())
    }

    async fn load_all_batches(&self) -> AppResult<Vec<TestBatchInfo>> {
        Ok(self
            .state
            .lock()
            .expect("内存存储锁中毒")
            .batches
            .values()
            .cloned()
            .collect())
    }

    async fn delete_batch(&self, batch_id: Uuid) -> AppResult<()> {
        let mut state = self.state.lock().expect("内存存储锁中毒");
        state.batches.remove(&batch_id);
        state.allocations.remove(&batch_id);
        Ok(())
    }

    async fn save_allocations(&self, allocations: &[ChannelAllocation]) -> AppResult<()> {
        let mut state = self.state.lock().expect("内存存储锁中毒");
        for alloc in allocations {
            state
                .allocations
                .entry(alloc.batch_id)
                .or_default()
                .push(alloc.clone());
        }
        Ok(())
    }

    async fn load_allocations_by_batch(&self, batch_id: Uuid) -> AppResult<Vec<ChannelAllocation>> {
        Ok(self
            .state
            .lock()
            .expect("内存存储锁中毒")
            .allocations
            .get(&batch_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn clear_allocations_by_batch(&self, batch_id: Uuid) -> AppResult<()> {
        self.state
            .lock()
            .expect("内存存储锁中毒")
            .allocations
            .remove(&batch_id);
        Ok(())
    }

    async fn save_instance(&self, instance: &ChannelTestInstance) -> AppResult<()> {
        self.state
            .lock()
            .expect("内存存储锁中毒")
            .instances
            .insert(instance.instance_id, instance.clone());
        Ok(())
    }

    async fn load_instance(&self, instance_id: Uuid) -> AppResult<Option<ChannelTestInstance>> {
        Ok(self
            .state
            .lock()
            .expect("内存存储锁中毒")
            .instances
            .get(&instance_id)
            .cloned())
    }

    async fn load_instances_by_batch(&self, batch_id: Uuid) -> AppResult<Vec<ChannelTestInstance>> {
        Ok(self
            .state
            .lock()
            .expect("内存存储锁中毒")
            .instances
            .values()
            .filter(|i| i.batch_id == batch_id)
            .cloned()
            .collect())
    }

    async fn delete_instances_by_batch(&self, batch_id: Uuid) -> AppResult<()> {
        self.state
            .lock()
            .expect("内存存储锁中毒")
            .instances
            .retain(|_, i| i.batch_id != batch_id);
        Ok(())
    }

    async fn persist_outcome_and_transition(
        &self,
        outcome: &RawTestOutcome,
        instance: &ChannelTestInstance,
    ) -> AppResult<()> {
        let mut state = self.state.lock().expect("内存存储锁中毒");
        if state.outcomes.contains_key(&outcome.id) {
            return Ok(());
        }
        state.outcomes.insert(outcome.id, outcome.clone());
        state.instances.insert(instance.instance_id, instance.clone());
        Ok(())
    }

    async fn has_outcome(&self, outcome_id: Uuid) -> AppResult<bool> {
        Ok(self
            .state
            .lock()
            .expect("内存存储锁中毒")
            .outcomes
            .contains_key(&outcome_id))
    }

    async fn load_outcomes_by_instance(&self, instance_id: Uuid) -> AppResult<Vec<RawTestOutcome>> {
        Ok(self
            .state
            .lock()
            .expect("内存存储锁中毒")
            .outcomes
            .values()
            .filter(|o| o.instance_id == instance_id)
            .cloned()
            .collect())
    }
}
