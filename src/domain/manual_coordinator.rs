//! C8 — `ManualTestCoordinator`: the operator-confirmed family (§4.3, §4.6):
//! alarm levels, maintenance toggle, state display, trend/report checks.
//!
//! Unlike `TestScheduler`, this component never decides pass/fail itself —
//! it applies a PLC stimulus (when one applies) and records whatever verdict
//! the operator gives through `update_sub_item`. `StateManager` alone still
//! owns the status transition and event emission (§9 single-writer rule);
//! the coordinator only ever calls into it, never mutates an instance
//! directly.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::TestConfig;
use crate::domain::applicability;
use crate::domain::event_bus::{Event, EventBus};
use crate::domain::ports::{PersistenceStore, PlcDriver};
use crate::domain::state_manager::StateManager;
use crate::domain::step_executor::{
    AlarmLevel, AlarmStimulusExecutor, ExecutionCtx, MaintenanceStimulusExecutor, StimulusExecutor,
};
use crate::error::{AppError, AppResult};
use crate::models::{SubTestItem, SubTestStatus};

/// One instance's manual-test bookkeeping: which sub-items apply to it, so
/// `update_sub_item` can reject items the module type doesn't produce
/// before ever reaching `StateManager` (I3).
struct ManualSession {
    applicable: Vec<SubTestItem>,
}

pub struct ManualTestCoordinator {
    state_manager: Arc<StateManager>,
    persistence: Arc<dyn PersistenceStore>,
    event_bus: EventBus,
    target: Arc<dyn PlcDriver>,
    test_rig: Arc<dyn PlcDriver>,
    config: TestConfig,
    sessions: RwLock<HashMap<Uuid, ManualSession>>,
    monitors: RwLock<HashMap<Uuid, CancellationToken>>,
}

impl ManualTestCoordinator {
    pub fn new(
        state_manager: Arc<StateManager>,
        persistence: Arc<dyn PersistenceStore>,
        event_bus: EventBus,
        target: Arc<dyn PlcDriver>,
        test_rig: Arc<dyn PlcDriver>,
        config: TestConfig,
    ) -> Self {
        Self {
            state_manager,
            persistence,
            event_bus,
            target,
            test_rig,
            config,
            sessions: RwLock::new(HashMap::new()),
            monitors: RwLock::new(HashMap::new()),
        }
    }

    /// Opens a manual session for `instance_id` (§4.2 `begin_manual`):
    /// records its applicable sub-items and transitions the instance to
    /// `ManualTesting`. A no-op on the applicability list if called again
    /// for an instance already in the family.
    pub async fn start_manual_test(&self, instance_id: Uuid) -> AppResult<Vec<SubTestItem>> {
        let instance = self.state_manager.get_instance(instance_id)?;
        let definition = self.state_manager.get_definition(instance.definition_id)?;
        let applicable = applicability::manual_items(definition.module_type);

        self.state_manager.begin_manual(instance_id).await?;
        self.sessions.write().await.insert(
            instance_id,
            ManualSession {
                applicable: applicable.clone(),
            },
        );
        Ok(applicable)
    }

    fn stimulus_for(item: &SubTestItem) -> Option<Box<dyn StimulusExecutor>> {
        match item {
            SubTestItem::LowLowAlarm => Some(Box::new(AlarmStimulusExecutor { level: AlarmLevel::LowLow })),
            SubTestItem::LowAlarm => Some(Box::new(AlarmStimulusExecutor { level: AlarmLevel::Low })),
            SubTestItem::HighAlarm => Some(Box::new(AlarmStimulusExecutor { level: AlarmLevel::High })),
            SubTestItem::HighHighAlarm => Some(Box::new(AlarmStimulusExecutor { level: AlarmLevel::HighHigh })),
            SubTestItem::Maintenance => Some(Box::new(MaintenanceStimulusExecutor)),
            // StateDisplay/TrendCheck/ReportCheck have no PLC-level stimulus
            // of their own (§4.3): the operator observes the channel as
            // already driven by the hardpoint/alarm phase.
            _ => None,
        }
    }

    /// Applies a stimulus (when `sub_item` has one) and records the
    /// operator's verdict (§4.3, §4.6). `StateManager::set_manual_sub_item`
    /// emits `ManualTestStatusChanged` itself — this method never publishes
    /// it a second time.
    pub async fn update_sub_item(
        &self,
        instance_id: Uuid,
        sub_item: SubTestItem,
        status: SubTestStatus,
        notes: Option<String>,
    ) -> AppResult<()> {
        {
            let sessions = self.sessions.read().await;
            let session = sessions
                .get(&instance_id)
                .ok_or_else(|| AppError::not_found("ManualSession", instance_id.to_string()))?;
            if !session.applicable.contains(&sub_item) {
                let instance = self.state_manager.get_instance(instance_id)?;
                let definition = self.state_manager.get_definition(instance.definition_id)?;
                return Err(AppError::not_applicable(
                    sub_item.to_string(),
                    definition.module_type.to_string(),
                ));
            }
        }

        if matches!(status, SubTestStatus::Passed) {
            if let Some(stimulus) = Self::stimulus_for(&sub_item) {
                let instance = self.state_manager.get_instance(instance_id)?;
                let definition = self.state_manager.get_definition(instance.definition_id)?;
                let allocations = self.persistence.load_allocations_by_batch(instance.batch_id).await?;
                let test_channel_address = allocations
                    .iter()
                    .find(|a| a.definition_id == definition.id)
                    .and_then(|a| a.test_comm_address.clone());
                let cancel = CancellationToken::new();
                let ctx = ExecutionCtx {
                    instance_id,
                    definition: &definition,
                    test_channel_address: test_channel_address.as_deref(),
                    target: self.target.as_ref(),
                    test_rig: self.test_rig.as_ref(),
                    config: &self.config,
                    cancel: &cancel,
                };
                stimulus.stimulate(&ctx).await?;
            }
        }

        self.state_manager
            .set_manual_sub_item(instance_id, sub_item, status, notes)
            .await
    }

    /// Starts polling `address` on the target PLC at
    /// `config.monitoring_poll_ms`, publishing each reading as
    /// `Event::MonitoringData` (§4.6 "live monitoring feed"). At most one
    /// monitor runs per instance; starting a new one replaces the old.
    pub async fn start_monitoring(&self, instance_id: Uuid, address: String) {
        let cancel = CancellationToken::new();
        {
            let mut monitors = self.monitors.write().await;
            if let Some(old) = monitors.insert(instance_id, cancel.clone()) {
                old.cancel();
            }
        }

        let target = self.target.clone();
        let event_bus = self.event_bus.clone();
        let poll_ms = self.config.monitoring_poll_ms;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(std::time::Duration::from_millis(poll_ms)) => {}
                }
                match target.read_float(&address).await {
                    Ok(value) => {
                        event_bus
                            .publish(Event::MonitoringData {
                                instance_id,
                                readings: serde_json::json!({"address": address, "value": value}),
                            })
                            .await;
                    }
                    Err(_) if cancel.is_cancelled() => break,
                    Err(_) => continue,
                }
            }
        });
    }

    pub async fn stop_monitoring(&self, instance_id: Uuid) {
        if let Some(cancel) = self.monitors.write().await.remove(&instance_id) {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{IntWidth, PlcConnectParams};
    use crate::infrastructure::persistence::memory::InMemoryStore;
    use crate::models::{AlarmSetpoint, AlarmSetpoints, ChannelPointDefinition, ModuleType, PointDataType, PowerSupplyType};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakePlc {
        floats: Mutex<HashMap<String, f32>>,
    }

    #[async_trait]
    impl PlcDriver for FakePlc {
        async fn connect(&self, _: &PlcConnectParams) -> AppResult<()> {
            Ok(())
        }
        async fn read_bool(&self, _: &str) -> AppResult<bool> {
            Ok(true)
        }
        async fn read_float(&self, address: &str) -> AppResult<f32> {
            Ok(*self.floats.lock().unwrap().get(address).unwrap_or(&0.0))
        }
        async fn read_int(&self, _: &str, _: IntWidth) -> AppResult<i64> {
            Ok(0)
        }
        async fn write_bool(&self, _: &str, _: bool) -> AppResult<()> {
            Ok(())
        }
        async fn write_float(&self, address: &str, value: f32) -> AppResult<()> {
            self.floats.lock().unwrap().insert(address.to_string(), value);
            Ok(())
        }
        async fn write_int(&self, _: &str, _: i64, _: IntWidth) -> AppResult<()> {
            Ok(())
        }
        async fn disconnect(&self) -> AppResult<()> {
            Ok(())
        }
        async fn is_connected(&self) -> bool {
            true
        }
    }

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
            alarm_setpoints: AlarmSetpoints {
                high: Some(AlarmSetpoint {
                    value: 80.0,
                    setpoint_addr: "40010".to_string(),
                    feedback_addr: "40011".to_string(),
                }),
                ..AlarmSetpoints::default()
            },
            maintenance: None,
            remarks: None,
            sequence_number: 1,
        }
    }

    async fn setup() -> (ManualTestCoordinator, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let bus = EventBus::new();
        let state_manager = Arc::new(StateManager::new(store.clone(), bus.clone()));
        let def_id = Uuid::new_v4();
        state_manager.register_definitions(&[ai_definition(def_id)]);
        let batch_id = Uuid::new_v4();
        let instance_id = state_manager.create_instance(def_id, batch_id).await.unwrap();
        state_manager.confirm_wiring(batch_id).await.unwrap();
        state_manager.begin_hardpoint(instance_id).await.unwrap();
        let outcome = crate::models::RawTestOutcome::new(
            instance_id,
            SubTestItem::HardPoint,
            true,
            None,
            chrono::Utc::now(),
            chrono::Utc::now(),
            None,
        );
        state_manager.apply_raw_outcome(instance_id, outcome).await.unwrap();

        store
            .save_allocations(&[crate::models::ChannelAllocation {
                definition_id: def_id,
                batch_id,
                batch_name: "b1".to_string(),
                test_channel_id: Some(Uuid::new_v4()),
                test_comm_address: Some("40010".to_string()),
            }])
            .await
            .unwrap();

        let coordinator = ManualTestCoordinator::new(
            state_manager,
            store,
            bus,
            Arc::new(FakePlc::default()),
            Arc::new(FakePlc::default()),
            TestConfig {
                stabilization_ms: 1,
                ..TestConfig::default()
            },
        );
        (coordinator, instance_id)
    }

    #[tokio::test]
    async fn rejects_sub_item_not_applicable_to_module_type() {
        let (coordinator, instance_id) = setup().await;
        coordinator.start_manual_test(instance_id).await.unwrap();
        let err = coordinator
            .update_sub_item(instance_id, SubTestItem::StateDisplay, SubTestStatus::Passed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotApplicable { .. }));
    }

    #[tokio::test]
    async fn passing_high_alarm_stimulates_before_recording() {
        let (coordinator, instance_id) = setup().await;
        coordinator.start_manual_test(instance_id).await.unwrap();
        coordinator
            .update_sub_item(instance_id, SubTestItem::HighAlarm, SubTestStatus::Passed, None)
            .await
            .unwrap();
        let instance = coordinator.state_manager.get_instance(instance_id).unwrap();
        assert_eq!(
            instance.sub_test_results.get(&SubTestItem::HighAlarm).unwrap().status,
            SubTestStatus::Passed
        );
    }
}
