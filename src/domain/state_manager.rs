//! C5 — `StateManager`: the sole writer of `ChannelTestInstance.overall_status`
//! and its sub-test map (§4.2, I1–I5).
//!
//! Replaces the source's multiple writers to `ChannelMapping` (§9 Design
//! Notes): every mutation goes through one of the methods here, each of
//! which takes the per-instance lock, computes the new state, persists it
//! transactionally with its triggering `RawTestOutcome` (I5), and only then
//! publishes events. Reads never take the per-instance lock; they are
//! lock-free snapshots out of a separate read-side cache.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::domain::applicability;
use crate::domain::event_bus::{Event, EventBus};
use crate::domain::ports::PersistenceStore;
use crate::error::{AppError, AppResult};
use crate::models::{
    ChannelPointDefinition, ChannelTestInstance, ModuleType, OverallTestStatus, RawTestOutcome,
    SubTestItem, SubTestResult, SubTestStatus,
};

/// Returns whether `from -> to` is an edge of the state graph in §4.2.
/// Everything not listed here is rejected with `InvalidTransition` (I2).
fn is_valid_transition(from: OverallTestStatus, to: OverallTestStatus) -> bool {
    use OverallTestStatus::*;
    if to == Skipped {
        return !from.is_terminal();
    }
    matches!(
        (from, to),
        (NotTested, WiringConfirmationRequired)
            | (WiringConfirmationRequired, WiringConfirmed)
            | (WiringConfirmed, HardPointTesting)
            | (HardPointTesting, HardPointTestCompleted)
            | (HardPointTesting, TestCompletedFailed)
            | (HardPointTestCompleted, ManualTesting)
            | (HardPointTestCompleted, AlarmTesting)
            | (HardPointTestCompleted, TestCompletedPassed)
            | (ManualTesting, TestCompletedPassed)
            | (ManualTesting, TestCompletedFailed)
            | (ManualTesting, AlarmTesting)
            | (AlarmTesting, TestCompletedPassed)
            | (AlarmTesting, TestCompletedFailed)
            | (TestCompletedFailed, Retesting)
            | (Retesting, HardPointTesting)
    )
}

/// Deterministic recomputation of `overall_status` from the current status,
/// module type, and sub-test map (§4.2 "Overall status recomputation").
fn recompute_overall_status(
    current: OverallTestStatus,
    module_type: ModuleType,
    sub_tests: &HashMap<SubTestItem, SubTestResult>,
) -> OverallTestStatus {
    let status_of = |item: &SubTestItem| -> SubTestStatus {
        sub_tests
            .get(item)
            .map(|r| r.status)
            .unwrap_or(SubTestStatus::NotTested)
    };

    let hardpoint_items = applicability::hardpoint_items(module_type);
    let manual_items = applicability::manual_items(module_type);
    let all_items: Vec<&SubTestItem> = hardpoint_items.iter().chain(manual_items.iter()).collect();

    let any_failed = all_items.iter().any(|i| status_of(i) == SubTestStatus::Failed);
    if any_failed {
        return OverallTestStatus::TestCompletedFailed;
    }

    let all_resolved_with_pass = !all_items.is_empty()
        && all_items.iter().all(|i| {
            matches!(
                status_of(i),
                SubTestStatus::Passed | SubTestStatus::Skipped
            )
        })
        && all_items.iter().any(|i| status_of(i) == SubTestStatus::Passed);
    if all_resolved_with_pass {
        return OverallTestStatus::TestCompletedPassed;
    }

    let all_hardpoint_passed = !hardpoint_items.is_empty()
        && hardpoint_items.iter().all(|i| status_of(i) == SubTestStatus::Passed);
    let some_manual_unresolved = manual_items.iter().any(|i| {
        !matches!(
            status_of(i),
            SubTestStatus::Passed | SubTestStatus::Failed | SubTestStatus::Skipped
        )
    });
    if all_hardpoint_passed && some_manual_unresolved {
        return OverallTestStatus::HardPointTestCompleted;
    }

    current
}

/// Per-instance write lock plus the read-side snapshot cache.
struct InstanceSlot {
    lock: AsyncMutex<()>,
}

pub struct StateManager {
    persistence: Arc<dyn PersistenceStore>,
    event_bus: EventBus,
    definitions: std::sync::RwLock<HashMap<Uuid, ChannelPointDefinition>>,
    slots: tokio::sync::RwLock<HashMap<Uuid, Arc<InstanceSlot>>>,
    snapshots: std::sync::RwLock<HashMap<Uuid, ChannelTestInstance>>,
}

impl StateManager {
    pub fn new(persistence: Arc<dyn PersistenceStore>, event_bus: EventBus) -> Self {
        Self {
            persistence,
            event_bus,
            definitions: std::sync::RwLock::new(HashMap::new()),
            slots: tokio::sync::RwLock::new(HashMap::new()),
            snapshots: std::sync::RwLock::new(HashMap::new()),
        }
    }

    /// Registers definitions in the read-only cache used to resolve a
    /// `module_type` for applicability checks. Definitions are immutable
    /// after import (§3), so this is additive, never a mutation.
    pub fn register_definitions(&self, definitions: &[ChannelPointDefinition]) {
        let mut guard = self.definitions.write().expect("definitions锁中毒");
        for def in definitions {
            guard.insert(def.id, def.clone());
        }
    }

    /// Hydrates the in-memory snapshot cache from persisted instances (used
    /// at startup and after loading a batch). Does not take instance locks:
    /// callers must do this before concurrent access starts.
    pub async fn hydrate(&self, instances: Vec<ChannelTestInstance>) -> AppResult<()> {
        let mut slots = self.slots.write().await;
        let mut snapshots = self.snapshots.write().expect("snapshots锁中毒");
        for instance in instances {
            slots
                .entry(instance.instance_id)
                .or_insert_with(|| Arc::new(InstanceSlot {
                    lock: AsyncMutex::new(()),
                }));
            snapshots.insert(instance.instance_id, instance);
        }
        Ok(())
    }

    async fn slot_for(&self, instance_id: Uuid) -> Arc<InstanceSlot> {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(&instance_id) {
                return slot.clone();
            }
        }
        let mut slots = self.slots.write().await;
        slots
            .entry(instance_id)
            .or_insert_with(|| Arc::new(InstanceSlot {
                lock: AsyncMutex::new(()),
            }))
            .clone()
    }

    fn snapshot(&self, instance_id: Uuid) -> AppResult<ChannelTestInstance> {
        self.snapshots
            .read()
            .expect("snapshots锁中毒")
            .get(&instance_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("ChannelTestInstance", instance_id.to_string()))
    }

    fn module_type_of(&self, definition_id: Uuid) -> AppResult<ModuleType> {
        self.definitions
            .read()
            .expect("definitions锁中毒")
            .get(&definition_id)
            .map(|d| d.module_type)
            .ok_or_else(|| AppError::not_found("ChannelPointDefinition", definition_id.to_string()))
    }

    /// Lock-free read of one instance's current snapshot (§4.2 supplement).
    pub fn get_instance(&self, instance_id: Uuid) -> AppResult<ChannelTestInstance> {
        self.snapshot(instance_id)
    }

    /// Lock-free read of every instance belonging to `batch_id` (§4.2 supplement).
    pub fn get_batch_instances(&self, batch_id: Uuid) -> Vec<ChannelTestInstance> {
        self.snapshots
            .read()
            .expect("snapshots锁中毒")
            .values()
            .filter(|i| i.batch_id == batch_id)
            .cloned()
            .collect()
    }

    /// Read-only access to a registered definition, needed by the scheduler
    /// and manual-test coordinator to resolve applicability/addresses
    /// without duplicating the definitions cache (§4.2 supplement).
    pub fn get_definition(&self, definition_id: Uuid) -> AppResult<ChannelPointDefinition> {
        self.definitions
            .read()
            .expect("definitions锁中毒")
            .get(&definition_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("ChannelPointDefinition", definition_id.to_string()))
    }

    pub async fn create_instance(&self, definition_id: Uuid, batch_id: Uuid) -> AppResult<Uuid> {
        let instance = ChannelTestInstance::new(Uuid::new_v4(), definition_id, batch_id);
        let instance_id = instance.instance_id;
        self.persistence.save_instance(&instance).await?;
        {
            let mut slots = self.slots.write().await;
            slots.insert(
                instance_id,
                Arc::new(InstanceSlot {
                    lock: AsyncMutex::new(()),
                }),
            );
        }
        self.snapshots
            .write()
            .expect("snapshots锁中毒")
            .insert(instance_id, instance);
        Ok(instance_id)
    }

    /// Generic guarded transition: loads the instance under its per-instance
    /// lock, validates `from -> to` against the state graph, persists, then
    /// publishes `StateChanged` and updates the read-side snapshot.
    async fn transition(&self, instance_id: Uuid, to: OverallTestStatus) -> AppResult<()> {
        let slot = self.slot_for(instance_id).await;
        let _guard = slot.lock.lock().await;

        let mut instance = self.snapshot(instance_id)?;
        let from = instance.overall_status;
        if from == to {
            return Ok(());
        }
        if !is_valid_transition(from, to) {
            return Err(AppError::invalid_transition(
                from.to_string(),
                to.to_string(),
                "不在状态图的边集合内",
            ));
        }
        instance.overall_status = to;
        if to == OverallTestStatus::HardPointTesting && instance.start_time.is_none() {
            instance.start_time = Some(Utc::now());
        }
        if to.is_terminal() {
            instance.final_test_time = Some(Utc::now());
            if let Some(start) = instance.start_time {
                instance.duration_ms = Some((Utc::now() - start).num_milliseconds());
            }
        }
        if to == OverallTestStatus::Retesting {
            instance.retries_count += 1;
        }

        self.persistence.save_instance(&instance).await?;
        self.snapshots
            .write()
            .expect("snapshots锁中毒")
            .insert(instance_id, instance);

        self.event_bus
            .publish(Event::StateChanged {
                instance_id,
                old_status: from,
                new_status: to,
            })
            .await;
        Ok(())
    }

    /// Every instance in `batch_id` at `NotTested` moves through
    /// `WiringConfirmationRequired -> WiringConfirmed`; instances already
    /// beyond `NotTested` are left untouched (§4.2 `confirm_wiring`).
    pub async fn confirm_wiring(&self, batch_id: Uuid) -> AppResult<()> {
        let candidates: Vec<Uuid> = self
            .get_batch_instances(batch_id)
            .into_iter()
            .filter(|i| i.overall_status == OverallTestStatus::NotTested)
            .map(|i| i.instance_id)
            .collect();
        for instance_id in candidates {
            self.transition(instance_id, OverallTestStatus::WiringConfirmationRequired)
                .await?;
            self.transition(instance_id, OverallTestStatus::WiringConfirmed)
                .await?;
        }
        Ok(())
    }

    /// Administrative reset for re-allocation (§4.1, P3): overwrites each
    /// listed instance with a fresh `NotTested` record, independent of the
    /// state graph's edges — this is a re-allocation reset, not a test-flow
    /// transition, so it bypasses `is_valid_transition` by design.
    pub async fn reset_instances_to_not_tested(&self, instance_ids: &[Uuid]) -> AppResult<()> {
        for &instance_id in instance_ids {
            let slot = self.slot_for(instance_id).await;
            let _guard = slot.lock.lock().await;

            let existing = self.snapshot(instance_id)?;
            let from = existing.overall_status;
            let fresh = ChannelTestInstance::new(instance_id, existing.definition_id, existing.batch_id);
            self.persistence.save_instance(&fresh).await?;
            self.snapshots
                .write()
                .expect("snapshots锁中毒")
                .insert(instance_id, fresh);

            self.event_bus
                .publish(Event::StateChanged {
                    instance_id,
                    old_status: from,
                    new_status: OverallTestStatus::NotTested,
                })
                .await;
        }
        Ok(())
    }

    pub async fn begin_hardpoint(&self, instance_id: Uuid) -> AppResult<()> {
        self.transition(instance_id, OverallTestStatus::HardPointTesting)
            .await
    }

    pub async fn begin_manual(&self, instance_id: Uuid) -> AppResult<()> {
        self.transition(instance_id, OverallTestStatus::ManualTesting)
            .await
    }

    pub async fn begin_alarm(&self, instance_id: Uuid) -> AppResult<()> {
        self.transition(instance_id, OverallTestStatus::AlarmTesting)
            .await
    }

    /// `TestCompletedFailed -> Retesting`, the first edge of §4.5's failed-
    /// hardpoint retest sequence (S4). The scheduler follows this with
    /// `begin_hardpoint` once the retry is dispatched.
    pub async fn begin_retest(&self, instance_id: Uuid) -> AppResult<()> {
        self.transition(instance_id, OverallTestStatus::Retesting)
            .await
    }

    pub async fn mark_skipped(&self, instance_id: Uuid, reason: impl Into<String>) -> AppResult<()> {
        let slot = self.slot_for(instance_id).await;
        let _guard = slot.lock.lock().await;
        let mut instance = self.snapshot(instance_id)?;
        instance.error_message = Some(reason.into());
        self.snapshots
            .write()
            .expect("snapshots锁中毒")
            .insert(instance_id, instance);
        drop(_guard);
        self.transition(instance_id, OverallTestStatus::Skipped).await
    }

    pub async fn save_error_notes(
        &self,
        instance_id: Uuid,
        integration: Option<String>,
        plc_programming: Option<String>,
        hmi_configuration: Option<String>,
    ) -> AppResult<()> {
        let slot = self.slot_for(instance_id).await;
        let _guard = slot.lock.lock().await;
        let mut instance = self.snapshot(instance_id)?;
        if integration.is_some() {
            instance.error_notes.integration = integration;
        }
        if plc_programming.is_some() {
            instance.error_notes.plc_programming = plc_programming;
        }
        if hmi_configuration.is_some() {
            instance.error_notes.hmi_configuration = hmi_configuration;
        }
        self.persistence.save_instance(&instance).await?;
        self.snapshots
            .write()
            .expect("snapshots锁中毒")
            .insert(instance_id, instance);
        Ok(())
    }

    /// The only path mutating `sub_test_results` and `overall_status` from a
    /// `StepExecutor`'s output (§4.2 `apply_raw_outcome`). Idempotent by
    /// `outcome.id` (P7): replaying the same outcome is a no-op.
    pub async fn apply_raw_outcome(&self, instance_id: Uuid, outcome: RawTestOutcome) -> AppResult<()> {
        let slot = self.slot_for(instance_id).await;
        let _guard = slot.lock.lock().await;

        if self.persistence.has_outcome(outcome.id).await? {
            return Ok(());
        }

        let mut instance = self.snapshot(instance_id)?;
        let module_type = self.module_type_of(instance.definition_id)?;

        if !applicability::is_applicable(module_type, &outcome.sub_test_item) {
            return Err(AppError::not_applicable(
                outcome.sub_test_item.to_string(),
                module_type.to_string(),
            ));
        }

        let from = instance.overall_status;
        let new_sub_status = if outcome.success {
            SubTestStatus::Passed
        } else {
            SubTestStatus::Failed
        };
        instance.sub_test_results.insert(
            outcome.sub_test_item.clone(),
            SubTestResult {
                status: new_sub_status,
                message: outcome.message.clone(),
                readings: outcome.readings_json.clone(),
                timestamp: outcome.end_time,
            },
        );

        let to = recompute_overall_status(from, module_type, &instance.sub_test_results);
        if to != from && !is_valid_transition(from, to) {
            warn!(
                "实例 {instance_id} 推导出的状态 {to} 相对 {from} 不是合法迁移，保持原状态"
            );
        } else {
            instance.overall_status = to;
            if to.is_terminal() {
                instance.final_test_time = Some(outcome.end_time);
                if let Some(start) = instance.start_time {
                    instance.duration_ms = Some((outcome.end_time - start).num_milliseconds());
                }
            }
        }

        // Step 3+4+5: persist the outcome and the resulting instance state in
        // one transaction before anything becomes visible to observers (I5).
        self.persistence
            .persist_outcome_and_transition(&outcome, &instance)
            .await?;

        self.snapshots
            .write()
            .expect("snapshots锁中毒")
            .insert(instance_id, instance.clone());

        // Step 6: emit events in order: StateChanged, SubTestChanged, ErrorDetail.
        if instance.overall_status != from {
            self.event_bus
                .publish(Event::StateChanged {
                    instance_id,
                    old_status: from,
                    new_status: instance.overall_status,
                })
                .await;
        }
        self.event_bus
            .publish(Event::SubTestChanged {
                instance_id,
                sub_test_item: outcome.sub_test_item.clone(),
                status: new_sub_status,
            })
            .await;
        if let Some(message) = outcome.message.filter(|_| !outcome.success) {
            self.event_bus
                .publish(Event::ErrorDetail { instance_id, message })
                .await;
        }

        info!(
            "实例 {instance_id} 子测试项 {} 完成: success={}",
            outcome.sub_test_item, outcome.success
        );
        Ok(())
    }

    /// Called exclusively by `ManualTestCoordinator` (§4.2 `set_manual_sub_item`).
    pub async fn set_manual_sub_item(
        &self,
        instance_id: Uuid,
        sub_item: SubTestItem,
        status: SubTestStatus,
        notes: Option<String>,
    ) -> AppResult<()> {
        if !matches!(
            status,
            SubTestStatus::Passed | SubTestStatus::Failed | SubTestStatus::Skipped
        ) {
            return Err(AppError::validation(
                "人工子测试结果只能是 Passed/Failed/Skipped",
            ));
        }

        let slot = self.slot_for(instance_id).await;
        let _guard = slot.lock.lock().await;

        let mut instance = self.snapshot(instance_id)?;
        let module_type = self.module_type_of(instance.definition_id)?;
        if !applicability::is_applicable(module_type, &sub_item) {
            return Err(AppError::not_applicable(sub_item.to_string(), module_type.to_string()));
        }

        let from = instance.overall_status;
        let now = Utc::now();
        instance.sub_test_results.insert(
            sub_item.clone(),
            SubTestResult {
                status,
                message: notes,
                readings: None,
                timestamp: now,
            },
        );

        let to = recompute_overall_status(from, module_type, &instance.sub_test_results);
        if to != from && is_valid_transition(from, to) {
            instance.overall_status = to;
            if to.is_terminal() {
                instance.final_test_time = Some(now);
                if let Some(start) = instance.start_time {
                    instance.duration_ms = Some((now - start).num_milliseconds());
                }
            }
        }

        self.persistence.save_instance(&instance).await?;
        self.snapshots
            .write()
            .expect("snapshots锁中毒")
            .insert(instance_id, instance.clone());

        if instance.overall_status != from {
            self.event_bus
                .publish(Event::StateChanged {
                    instance_id,
                    old_status: from,
                    new_status: instance.overall_status,
                })
                .await;
        }
        self.event_bus
            .publish(Event::ManualTestStatusChanged {
                instance_id,
                sub_test_item: sub_item,
                status,
            })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::memory::InMemoryStore;
    use crate::models::{AlarmSetpoints, PointDataType, PowerSupplyType};

    fn ai_definition(id: Uuid) -> ChannelPointDefinition {
        ChannelPointDefinition {
            id,
            tag: "TI-101".to_string(),
            variable_name: "TI101".to_string(),
            description: String::new(),
            station_name: "s1".to_string(),
            module_name: "m1".to_string(),
            module_type: ModuleType::AI,
            channel_number: "1".to_string(),
            data_type: PointDataType::Float,
            power_supply_type: PowerSupplyType::Sourced,
            wire_system: None,
            plc_absolute_address: "%MD0".to_string(),
            plc_communication_address: "40001".to_string(),
            range_lo: Some(0.0),
            range_hi: Some(100.0),
            eng_unit: Some("C".to_string()),
            alarm_setpoints: AlarmSetpoints::default(),
            maintenance: None,
            remarks: None,
            sequence_number: 1,
        }
    }

    async fn setup() -> (StateManager, Uuid, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let bus = EventBus::new();
        let mgr = StateManager::new(store, bus);
        let def_id = Uuid::new_v4();
        mgr.register_definitions(&[ai_definition(def_id)]);
        let batch_id = Uuid::new_v4();
        let instance_id = mgr.create_instance(def_id, batch_id).await.unwrap();
        (mgr, instance_id, batch_id)
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected() {
        let (mgr, instance_id, _) = setup().await;
        let err = mgr.begin_manual(instance_id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        let instance = mgr.get_instance(instance_id).unwrap();
        assert_eq!(instance.overall_status, OverallTestStatus::NotTested);
    }

    #[tokio::test]
    async fn hardpoint_pass_moves_to_hardpoint_test_completed() {
        let (mgr, instance_id, batch_id) = setup().await;
        mgr.confirm_wiring(batch_id).await.unwrap();
        mgr.begin_hardpoint(instance_id).await.unwrap();

        let outcome = RawTestOutcome::new(
            instance_id,
            SubTestItem::HardPoint,
            true,
            None,
            Utc::now(),
            Utc::now(),
            None,
        );
        mgr.apply_raw_outcome(instance_id, outcome).await.unwrap();
        let instance = mgr.get_instance(instance_id).unwrap();
        assert_eq!(instance.overall_status, OverallTestStatus::HardPointTestCompleted);
    }

    #[tokio::test]
    async fn hardpoint_failure_moves_to_test_completed_failed() {
        let (mgr, instance_id, batch_id) = setup().await;
        mgr.confirm_wiring(batch_id).await.unwrap();
        mgr.begin_hardpoint(instance_id).await.unwrap();

        let outcome = RawTestOutcome::new(
            instance_id,
            SubTestItem::HardPoint,
            false,
            Some("超差".to_string()),
            Utc::now(),
            Utc::now(),
            None,
        );
        mgr.apply_raw_outcome(instance_id, outcome).await.unwrap();
        let instance = mgr.get_instance(instance_id).unwrap();
        assert_eq!(instance.overall_status, OverallTestStatus::TestCompletedFailed);
    }

    #[tokio::test]
    async fn reset_to_not_tested_clears_a_terminal_instance_for_reallocation() {
        let (mgr, instance_id, batch_id) = setup().await;
        mgr.confirm_wiring(batch_id).await.unwrap();
        mgr.begin_hardpoint(instance_id).await.unwrap();
        let outcome = RawTestOutcome::new(
            instance_id,
            SubTestItem::HardPoint,
            false,
            Some("超差".to_string()),
            Utc::now(),
            Utc::now(),
            None,
        );
        mgr.apply_raw_outcome(instance_id, outcome).await.unwrap();
        assert_eq!(
            mgr.get_instance(instance_id).unwrap().overall_status,
            OverallTestStatus::TestCompletedFailed
        );

        mgr.reset_instances_to_not_tested(&[instance_id]).await.unwrap();
        let instance = mgr.get_instance(instance_id).unwrap();
        assert_eq!(instance.overall_status, OverallTestStatus::NotTested);
        assert!(instance.sub_test_results.is_empty());

        // the graph still rejects a direct jump once reset — the only path
        // back into testing is through confirm_wiring again.
        let err = mgr.begin_hardpoint(instance_id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn replaying_same_outcome_is_idempotent() {
        let (mgr, instance_id, batch_id) = setup().await;
        mgr.confirm_wiring(batch_id).await.unwrap();
        mgr.begin_hardpoint(instance_id).await.unwrap();

        let outcome = RawTestOutcome::new(
            instance_id,
            SubTestItem::HardPoint,
            true,
            None,
            Utc::now(),
            Utc::now(),
            None,
        );
        mgr.apply_raw_outcome(instance_id, outcome.clone()).await.unwrap();
        let before = mgr.get_instance(instance_id).unwrap();
        mgr.apply_raw_outcome(instance_id, outcome).await.unwrap();
        let after = mgr.get_instance(instance_id).unwrap();
        assert_eq!(before.overall_status, after.overall_status);
    }

    #[tokio::test]
    async fn not_applicable_sub_test_is_rejected_and_not_recorded() {
        let (mgr, instance_id, batch_id) = setup().await;
        mgr.confirm_wiring(batch_id).await.unwrap();
        mgr.begin_hardpoint(instance_id).await.unwrap();

        let outcome = RawTestOutcome::new(
            instance_id,
            SubTestItem::StateDisplay,
            true,
            None,
            Utc::now(),
            Utc::now(),
            None,
        );
        let err = mgr.apply_raw_outcome(instance_id, outcome).await.unwrap_err();
        assert!(matches!(err, AppError::NotApplicable { .. }));
        let instance = mgr.get_instance(instance_id).unwrap();
        assert!(!instance.sub_test_results.contains_key(&SubTestItem::StateDisplay));
    }
}
