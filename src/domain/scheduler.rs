//! C7 — `TestScheduler`: drives a batch's automatic hardpoint workflow
//! (§4.5). Concurrency is bounded by a counting semaphore sized `Cmax`;
//! pause/resume/stop are a shared flag plus a per-run `CancellationToken`
//! (§9 Design Notes: "a single cancellation signal per task, threaded
//! explicitly" rather than flags scattered across methods).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::TestConfig;
use crate::domain::event_bus::{Event, EventBus};
use crate::domain::ports::{PersistenceStore, PlcDriver};
use crate::domain::state_manager::StateManager;
use crate::domain::step_executor::{hardpoint_executor_for, ExecutionCtx};
use crate::error::{AppError, AppResult};
use crate::models::{BatchStatistics, OverallBatchStatus, OverallTestStatus};

/// Which instances a `run_batch` call should drive through the hardpoint
/// loop (§4.5 "Single-channel retest and failed-hardpoint retest share this
/// loop with a filtered instance list").
#[derive(Debug, Clone)]
pub enum RunMode {
    /// All instances not yet hardpoint-tested or mid-retest.
    AutoTest,
    /// A single instance, regardless of current status (besides terminal
    /// states not reachable from its current one).
    SingleChannel(Uuid),
    /// Every instance currently `TestCompletedFailed` in the batch.
    RetestFailedHardpoints,
}

/// Pause flag plus cancellation token for one in-flight `run_batch` call.
/// Stop additionally cancels in-flight executors (§4.5, §5).
struct BatchRunControl {
    paused: AtomicBool,
    cancel: CancellationToken,
}

impl BatchRunControl {
    fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }
}

const PAUSE_POLL_MS: u64 = 100;

pub struct TestScheduler {
    state_manager: Arc<StateManager>,
    persistence: Arc<dyn PersistenceStore>,
    event_bus: EventBus,
    target: Arc<dyn PlcDriver>,
    test_rig: Arc<dyn PlcDriver>,
    config: TestConfig,
    controls: RwLock<HashMap<Uuid, Arc<BatchRunControl>>>,
}

impl TestScheduler {
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
            controls: RwLock::new(HashMap::new()),
        }
    }

    async fn control_for(&self, batch_id: Uuid) -> Arc<BatchRunControl> {
        let fresh = Arc::new(BatchRunControl::new());
        self.controls.write().await.insert(batch_id, fresh.clone());
        fresh
    }

    async fn existing_control(&self, batch_id: Uuid) -> Option<Arc<BatchRunControl>> {
        self.controls.read().await.get(&batch_id).cloned()
    }

    pub async fn pause(&self, batch_id: Uuid) -> AppResult<()> {
        let control = self
            .existing_control(batch_id)
            .await
            .ok_or_else(|| AppError::not_found("BatchRun", batch_id.to_string()))?;
        control.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn resume(&self, batch_id: Uuid) -> AppResult<()> {
        let control = self
            .existing_control(batch_id)
            .await
            .ok_or_else(|| AppError::not_found("BatchRun", batch_id.to_string()))?;
        control.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub async fn stop(&self, batch_id: Uuid) -> AppResult<()> {
        let control = self
            .existing_control(batch_id)
            .await
            .ok_or_else(|| AppError::not_found("BatchRun", batch_id.to_string()))?;
        control.paused.store(false, Ordering::SeqCst);
        control.cancel.cancel();
        Ok(())
    }

    /// Waits out a pause, returns `true` if the run should stop instead
    /// (cancelled while paused or otherwise).
    async fn wait_unless_cancelled(control: &BatchRunControl) -> bool {
        while control.paused.load(Ordering::SeqCst) {
            if control.cancel.is_cancelled() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(PAUSE_POLL_MS)).await;
        }
        control.cancel.is_cancelled()
    }

    /// Range-setting precondition (§4.5, SPEC_FULL §4.5 supplement): writes
    /// each instance's configured low-range engineering value to its
    /// primary communication address before the hardpoint phase begins, so
    /// every channel starts the run from a known baseline. Shares the same
    /// `Cmax` semaphore and pause/cancel plumbing as the test phase — pause
    /// is checked here too (Open Question resolved: yes).
    pub async fn set_ranges(&self, batch_id: Uuid) -> AppResult<()> {
        let control = self.control_for(batch_id).await;
        let instances = self.state_manager.get_batch_instances(batch_id);
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency_limit));

        let mut handles = Vec::new();
        for instance in instances {
            if Self::wait_unless_cancelled(&control).await {
                break;
            }
            let definition = match self.state_manager.get_definition(instance.definition_id) {
                Ok(d) => d,
                Err(_) => continue,
            };
            let (Some(lo), Some(_hi)) = (definition.range_lo, definition.range_hi) else {
                continue;
            };
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore未关闭");
            let target = self.target.clone();
            let addr = definition.plc_communication_address.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = target.write_float(&addr, lo as f32).await {
                    warn!("量程初始化写入失败 {addr}: {e}");
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }

    fn select_candidates(&self, batch_id: Uuid, mode: &RunMode) -> Vec<Uuid> {
        let instances = self.state_manager.get_batch_instances(batch_id);
        match mode {
            RunMode::AutoTest => instances
                .into_iter()
                .filter(|i| {
                    matches!(
                        i.overall_status,
                        OverallTestStatus::NotTested
                            | OverallTestStatus::WiringConfirmationRequired
                            | OverallTestStatus::WiringConfirmed
                            | OverallTestStatus::Retesting
                    )
                })
                .map(|i| i.instance_id)
                .collect(),
            RunMode::SingleChannel(id) => vec![*id],
            RunMode::RetestFailedHardpoints => instances
                .into_iter()
                .filter(|i| i.overall_status == OverallTestStatus::TestCompletedFailed)
                .map(|i| i.instance_id)
                .collect(),
        }
    }

    /// One instance's hardpoint pass, run with an explicit set of
    /// collaborators rather than `&self` so it can be driven from inside a
    /// spawned task without cloning the whole scheduler.
    async fn run_one(
        state_manager: &StateManager,
        persistence: &dyn PersistenceStore,
        target: &dyn PlcDriver,
        test_rig: &dyn PlcDriver,
        config: &TestConfig,
        instance_id: Uuid,
        cancel: &CancellationToken,
    ) -> AppResult<()> {
        let instance = state_manager.get_instance(instance_id)?;
        if instance.overall_status == OverallTestStatus::TestCompletedFailed {
            state_manager.begin_retest(instance_id).await?;
        }
        state_manager.begin_hardpoint(instance_id).await?;

        let instance = state_manager.get_instance(instance_id)?;
        let definition = state_manager.get_definition(instance.definition_id)?;
        let allocations = persistence.load_allocations_by_batch(instance.batch_id).await?;
        let test_channel_address = allocations
            .iter()
            .find(|a| a.definition_id == definition.id)
            .and_then(|a| a.test_comm_address.clone());

        let executor = hardpoint_executor_for(definition.module_type.base());
        let ctx = ExecutionCtx {
            instance_id,
            definition: &definition,
            test_channel_address: test_channel_address.as_deref(),
            target,
            test_rig,
            config,
            cancel,
        };
        let outcome = executor.execute(&ctx).await;
        state_manager.apply_raw_outcome(instance_id, outcome).await?;
        Ok(())
    }

    /// Drives `mode`'s candidate instances through the hardpoint loop for
    /// `batch_id` (§4.5). Emits `TestProgressChanged` after each completion
    /// and, once every instance in the batch has reached a terminal status,
    /// `BatchSummaryChanged` (SPEC_FULL §4.7 supplement).
    pub async fn run_batch(&self, batch_id: Uuid, mode: RunMode) -> AppResult<()> {
        self.state_manager.confirm_wiring(batch_id).await?;
        let control = self.control_for(batch_id).await;
        let candidates = self.select_candidates(batch_id, &mode);
        let total_in_batch = self.state_manager.get_batch_instances(batch_id).len() as u32;
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency_limit));

        let mut handles = Vec::new();
        for instance_id in candidates {
            if Self::wait_unless_cancelled(&control).await {
                break;
            }
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore未关闭");
            let child_cancel = control.cancel.child_token();
            let this_state_manager = self.state_manager.clone();
            let this_persistence = self.persistence.clone();
            let this_target = self.target.clone();
            let this_test_rig = self.test_rig.clone();
            let this_config = self.config.clone();
            let this_event_bus = self.event_bus.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = Self::run_one(
                    &this_state_manager,
                    this_persistence.as_ref(),
                    this_target.as_ref(),
                    this_test_rig.as_ref(),
                    &this_config,
                    instance_id,
                    &child_cancel,
                )
                .await
                {
                    warn!("实例 {instance_id} 硬点测试调度失败: {e}");
                }
                let completed = this_state_manager
                    .get_batch_instances(batch_id)
                    .iter()
                    .filter(|i| i.overall_status.is_terminal())
                    .count() as u32;
                this_event_bus
                    .publish(Event::TestProgressChanged {
                        batch_id,
                        completed,
                        total: total_in_batch,
                    })
                    .await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        self.maybe_emit_batch_summary(batch_id).await?;
        Ok(())
    }

    async fn maybe_emit_batch_summary(&self, batch_id: Uuid) -> AppResult<()> {
        let instances = self.state_manager.get_batch_instances(batch_id);
        let stats = BatchStatistics::from_instances(&instances);
        if let Some(mut batch) = self.persistence.load_batch(batch_id).await? {
            batch.statistics = stats;
            batch.overall_status = OverallBatchStatus::from_statistics(&stats);
            self.persistence.save_batch(&batch).await?;
        }
        if stats.all_terminal() {
            self.event_bus
                .publish(Event::BatchSummaryChanged {
                    batch_id,
                    statistics: stats,
                })
                .await;
            info!("批次 {batch_id} 全部实例已到达终态: {stats:?}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{IntWidth, PlcConnectParams};
    use crate::infrastructure::persistence::memory::InMemoryStore;
    use crate::models::{
        AlarmSetpoints, ChannelAllocation, ChannelPointDefinition, ModuleType, PointDataType,
        PowerSupplyType,
    };
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    /// Tracks how many hardpoint writes are in flight at once, so the test
    /// can assert the scheduler never exceeds `Cmax` (S5) without depending
    /// on wall-clock polling of instance status.
    struct CountingPlc {
        active: AtomicUsize,
        max_seen: AtomicUsize,
        hold_ms: u64,
        floats: StdMutex<HashMap<String, f32>>,
    }

    impl CountingPlc {
        fn new(hold_ms: u64) -> Self {
            Self {
                active: AtomicUsize::new(0),
                max_seen: AtomicUsize::new(0),
                hold_ms,
                floats: StdMutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl PlcDriver for CountingPlc {
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
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            self.floats.lock().unwrap().insert(address.to_string(), value);
            tokio::time::sleep(Duration::from_millis(self.hold_ms)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
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

    fn ai_def(seq: u32, tag: &str) -> ChannelPointDefinition {
        ChannelPointDefinition {
            id: Uuid::new_v4(),
            tag: tag.to_string(),
            variable_name: tag.to_string(),
            description: String::new(),
            station_name: "s1".to_string(),
            module_name: "m1".to_string(),
            module_type: ModuleType::AI,
            channel_number: seq.to_string(),
            data_type: PointDataType::Float,
            power_supply_type: PowerSupplyType::Sourced,
            wire_system: None,
            plc_absolute_address: format!("%MD{seq}"),
            plc_communication_address: format!("target-{seq}"),
            range_lo: Some(0.0),
            range_hi: Some(100.0),
            eng_unit: Some("C".to_string()),
            alarm_setpoints: AlarmSetpoints::default(),
            maintenance: None,
            remarks: None,
            sequence_number: seq,
        }
    }

    /// Builds a batch of `n` AI instances, each allocated a distinct rig
    /// channel address, ready for `run_batch`.
    async fn setup_batch(
        n: u32,
        concurrency_limit: usize,
        hold_ms: u64,
    ) -> (Arc<TestScheduler>, Arc<StateManager>, Uuid, Arc<CountingPlc>) {
        let persistence: Arc<dyn PersistenceStore> = Arc::new(InMemoryStore::new());
        let event_bus = EventBus::new();
        let state_manager = Arc::new(StateManager::new(persistence.clone(), event_bus.clone()));
        let target = Arc::new(CountingPlc::new(hold_ms));
        let test_rig = Arc::new(CountingPlc::new(0));
        let config = TestConfig {
            concurrency_limit,
            stabilization_ms: 1,
            tolerance_abs: 1_000.0,
            ..TestConfig::default()
        };

        let batch_id = Uuid::new_v4();
        let mut allocations = Vec::new();
        for i in 0..n {
            let def = ai_def(i, &format!("TI-{i}"));
            state_manager.register_definitions(&[def.clone()]);
            state_manager
                .create_instance(def.id, batch_id)
                .await
                .unwrap();
            allocations.push(ChannelAllocation {
                definition_id: def.id,
                batch_id,
                batch_name: "批次1".to_string(),
                test_channel_id: Some(Uuid::new_v4()),
                test_comm_address: Some(format!("rig-{i}")),
            });
        }
        persistence.save_allocations(&allocations).await.unwrap();

        let scheduler = Arc::new(TestScheduler::new(
            state_manager.clone(),
            persistence.clone(),
            event_bus,
            target.clone() as Arc<dyn PlcDriver>,
            test_rig as Arc<dyn PlcDriver>,
            config,
        ));
        (scheduler, state_manager, batch_id, target)
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_cmax() {
        let (scheduler, state_manager, batch_id, target) = setup_batch(12, 3, 20).await;
        scheduler
            .run_batch(batch_id, RunMode::AutoTest)
            .await
            .unwrap();

        assert!(
            target.max_seen.load(Ordering::SeqCst) <= 3,
            "observed concurrency {} exceeds Cmax=3",
            target.max_seen.load(Ordering::SeqCst)
        );
        let instances = state_manager.get_batch_instances(batch_id);
        assert_eq!(instances.len(), 12);
        assert!(instances
            .iter()
            .all(|i| i.overall_status == OverallTestStatus::HardPointTestCompleted));
    }

    #[tokio::test]
    async fn pause_blocks_new_instances_until_resumed() {
        let (scheduler, state_manager, batch_id, _target) = setup_batch(6, 1, 30).await;

        let scheduler_clone = scheduler.clone();
        let handle = tokio::spawn(async move {
            scheduler_clone
                .run_batch(batch_id, RunMode::AutoTest)
                .await
                .unwrap();
        });

        // Wait for the first instance to actually enter the hardpoint phase
        // (confirm_wiring + the loop's first iteration), then pause — this
        // avoids a race against `run_batch`'s own `control_for` call, which
        // would otherwise silently replace a control paused too early.
        for _ in 0..100 {
            let started = state_manager
                .get_batch_instances(batch_id)
                .iter()
                .any(|i| i.overall_status == OverallTestStatus::HardPointTesting);
            if started {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        scheduler.pause(batch_id).await.unwrap();

        // Long enough for the in-flight instance to finish (hold_ms=30) but
        // nowhere near enough for all 6 to finish serially (Cmax=1).
        tokio::time::sleep(Duration::from_millis(80)).await;
        let terminal_while_paused = state_manager
            .get_batch_instances(batch_id)
            .iter()
            .filter(|i| i.overall_status.is_terminal())
            .count();
        assert!(
            terminal_while_paused <= 1,
            "expected at most the in-flight instance to finish while paused, got {terminal_while_paused}"
        );

        scheduler.resume(batch_id).await.unwrap();
        handle.await.unwrap();

        let instances = state_manager.get_batch_instances(batch_id);
        assert!(instances
            .iter()
            .all(|i| i.overall_status == OverallTestStatus::HardPointTestCompleted));
    }
}
