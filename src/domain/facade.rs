//! C10 — `OrchestrationFacade`: the composition root and the single entry
//! point every outer surface (Tauri commands, the CLI) calls through (§4.8).
//! Owns both PLC driver handles, the persistence store, the event bus, and
//! the three collaborators built on top of them; no outer layer reaches
//! `StateManager`/`TestScheduler`/`ManualTestCoordinator` directly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::config::AppConfig;
use crate::domain::allocator::ChannelAllocator;
use crate::domain::event_bus::{EventBus, EventEnvelope};
use crate::domain::manual_coordinator::ManualTestCoordinator;
use crate::domain::ports::{PersistenceStore, PlcDriver};
use crate::domain::scheduler::{RunMode, TestScheduler};
use crate::domain::state_manager::StateManager;
use crate::error::{AppError, AppResult};
use crate::infrastructure::excel::{ExcelExporter, ExcelImporter};
use crate::models::{
    ChannelPointDefinition, ChannelTestInstance, SubTestItem, SubTestStatus, TestBatchInfo,
    TestPlcChannel,
};

pub struct OrchestrationFacade {
    config: AppConfig,
    persistence: Arc<dyn PersistenceStore>,
    event_bus: EventBus,
    state_manager: Arc<StateManager>,
    scheduler: Arc<TestScheduler>,
    manual_coordinator: Arc<ManualTestCoordinator>,
    target: Arc<dyn PlcDriver>,
    test_rig: Arc<dyn PlcDriver>,
}

impl OrchestrationFacade {
    pub fn new(
        config: AppConfig,
        persistence: Arc<dyn PersistenceStore>,
        target: Arc<dyn PlcDriver>,
        test_rig: Arc<dyn PlcDriver>,
    ) -> Self {
        let event_bus = EventBus::new();
        let state_manager = Arc::new(StateManager::new(persistence.clone(), event_bus.clone()));
        let scheduler = Arc::new(TestScheduler::new(
            state_manager.clone(),
            persistence.clone(),
            event_bus.clone(),
            target.clone(),
            test_rig.clone(),
            config.test.clone(),
        ));
        let manual_coordinator = Arc::new(ManualTestCoordinator::new(
            state_manager.clone(),
            persistence.clone(),
            event_bus.clone(),
            target.clone(),
            test_rig.clone(),
            config.test.clone(),
        ));
        Self {
            config,
            persistence,
            event_bus,
            state_manager,
            scheduler,
            manual_coordinator,
            target,
            test_rig,
        }
    }

    /// Rehydrates in-memory state from persistence at startup — definitions
    /// and every instance belonging to a not-yet-archived batch — so
    /// `StateManager`'s read-side snapshot cache is warm before any command
    /// runs (§4.2 "hydrate").
    pub async fn restore_state(&self) -> AppResult<()> {
        let definitions = self.persistence.load_definitions().await?;
        self.state_manager.register_definitions(&definitions);
        for batch in self.persistence.load_all_batches().await? {
            let instances = self.persistence.load_instances_by_batch(batch.batch_id).await?;
            self.state_manager.hydrate(instances).await?;
        }
        Ok(())
    }

    pub async fn subscribe_events(&self) -> (Uuid, tokio::sync::mpsc::Receiver<EventEnvelope>) {
        self.event_bus.subscribe().await
    }

    pub async fn unsubscribe_events(&self, id: Uuid) {
        self.event_bus.unsubscribe(id).await
    }

    // ---- §4.8 use cases ----------------------------------------------

    /// Imports a point table, allocates it against the currently persisted
    /// rig inventory, and creates one `ChannelTestInstance` per definition
    /// (§4.1, §4.8 `import_and_prepare_batch`).
    pub async fn import_and_prepare_batch(&self, workbook_path: &Path) -> AppResult<Vec<TestBatchInfo>> {
        let definitions = ExcelImporter::import(workbook_path)?;
        let inventory = self.persistence.load_test_channels().await?;
        let result = ChannelAllocator::allocate(&definitions, &inventory)?;

        self.persistence.save_definitions(&definitions).await?;
        self.state_manager.register_definitions(&definitions);
        self.persistence.save_allocations(&result.allocations).await?;
        for batch in &result.batches {
            self.persistence.save_batch(batch).await?;
        }

        for allocation in &result.allocations {
            self.state_manager
                .create_instance(allocation.definition_id, allocation.batch_id)
                .await?;
        }

        Ok(result.batches)
    }

    /// Re-allocation (§4.1, P3 "counters never decrease except on explicit
    /// re-allocation"): clears `batch_id`'s prior allocations, re-pairs its
    /// definitions against the current rig inventory, and resets every
    /// member instance back to `NotTested` through `StateManager`.
    pub async fn reallocate_batch(&self, batch_id: Uuid) -> AppResult<()> {
        let batch = self
            .persistence
            .load_batch(batch_id)
            .await?
            .ok_or_else(|| AppError::not_found("TestBatch", batch_id.to_string()))?;
        let instances = self.state_manager.get_batch_instances(batch_id);
        let definitions = instances
            .iter()
            .map(|i| self.state_manager.get_definition(i.definition_id))
            .collect::<AppResult<Vec<_>>>()?;

        self.persistence.clear_allocations_by_batch(batch_id).await?;
        let inventory = self.persistence.load_test_channels().await?;
        let allocations =
            ChannelAllocator::reallocate(batch_id, &batch.batch_name, &definitions, &inventory)?;
        self.persistence.save_allocations(&allocations).await?;

        let instance_ids: Vec<Uuid> = instances.iter().map(|i| i.instance_id).collect();
        self.state_manager
            .reset_instances_to_not_tested(&instance_ids)
            .await
    }

    pub async fn get_batch_list(&self) -> AppResult<Vec<TestBatchInfo>> {
        self.persistence.load_all_batches().await
    }

    pub async fn get_batch_details(
        &self,
        batch_id: Uuid,
    ) -> AppResult<(TestBatchInfo, Vec<ChannelTestInstance>)> {
        let batch = self
            .persistence
            .load_batch(batch_id)
            .await?
            .ok_or_else(|| AppError::not_found("TestBatch", batch_id.to_string()))?;
        let instances = self.state_manager.get_batch_instances(batch_id);
        Ok((batch, instances))
    }

    pub fn get_definition(&self, definition_id: Uuid) -> AppResult<ChannelPointDefinition> {
        self.state_manager.get_definition(definition_id)
    }

    pub async fn register_test_channels(&self, channels: &[TestPlcChannel]) -> AppResult<()> {
        self.persistence.save_test_channels(channels).await
    }

    /// Connects both PLC endpoints using the config sections for `target`
    /// and `test_rig` (§4.8 `connect_plc`).
    pub async fn connect_plc(&self) -> AppResult<()> {
        let target_params: crate::domain::ports::PlcConnectParams = (&self.config.plc.target).into();
        let test_rig_params: crate::domain::ports::PlcConnectParams = (&self.config.plc.test_rig).into();
        self.target.connect(&target_params).await?;
        self.test_rig.connect(&test_rig_params).await?;
        Ok(())
    }

    pub async fn disconnect_plc(&self) -> AppResult<()> {
        self.target.disconnect().await?;
        self.test_rig.disconnect().await?;
        Ok(())
    }

    /// Drives the range-setting phase then the full auto-test hardpoint loop
    /// for `batch_id`, running to completion in the background (§4.5,
    /// §4.8 `start_batch_auto_test`). Returns immediately; progress/summary
    /// surface through the event bus.
    pub fn start_batch_auto_test(&self, batch_id: Uuid) {
        let scheduler = self.scheduler.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler.set_ranges(batch_id).await {
                log::warn!("批次 {batch_id} 量程初始化失败: {e}");
                return;
            }
            if let Err(e) = scheduler.run_batch(batch_id, RunMode::AutoTest).await {
                log::warn!("批次 {batch_id} 自动测试失败: {e}");
            }
        });
    }

    /// Runs the hardpoint loop for exactly one instance (§4.8
    /// `start_single_channel_test`).
    pub fn start_single_channel_test(&self, batch_id: Uuid, instance_id: Uuid) {
        let scheduler = self.scheduler.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler
                .run_batch(batch_id, RunMode::SingleChannel(instance_id))
                .await
            {
                log::warn!("实例 {instance_id} 单通道测试失败: {e}");
            }
        });
    }

    /// Re-runs every `TestCompletedFailed` instance in `batch_id` through
    /// `Retesting -> HardPointTesting` (§4.5 S4, §4.8 `retest_failed_hardpoints`).
    pub fn retest_failed_hardpoints(&self, batch_id: Uuid) {
        let scheduler = self.scheduler.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler
                .run_batch(batch_id, RunMode::RetestFailedHardpoints)
                .await
            {
                log::warn!("批次 {batch_id} 失败硬点重测失败: {e}");
            }
        });
    }

    pub async fn pause_batch(&self, batch_id: Uuid) -> AppResult<()> {
        self.scheduler.pause(batch_id).await
    }

    pub async fn resume_batch(&self, batch_id: Uuid) -> AppResult<()> {
        self.scheduler.resume(batch_id).await
    }

    pub async fn stop_batch(&self, batch_id: Uuid) -> AppResult<()> {
        self.scheduler.stop(batch_id).await
    }

    /// Opens the manual/alarm test phase for one instance (§4.8
    /// `start_manual_test`), returning the sub-items the operator must
    /// resolve.
    pub async fn start_manual_test(&self, instance_id: Uuid) -> AppResult<Vec<SubTestItem>> {
        self.manual_coordinator.start_manual_test(instance_id).await
    }

    pub async fn update_manual_sub_item(
        &self,
        instance_id: Uuid,
        sub_item: SubTestItem,
        status: SubTestStatus,
        notes: Option<String>,
    ) -> AppResult<()> {
        self.manual_coordinator
            .update_sub_item(instance_id, sub_item, status, notes)
            .await
    }

    pub async fn start_monitoring(&self, instance_id: Uuid, address: String) {
        self.manual_coordinator.start_monitoring(instance_id, address).await
    }

    pub async fn stop_monitoring(&self, instance_id: Uuid) {
        self.manual_coordinator.stop_monitoring(instance_id).await
    }

    pub async fn save_error_notes(
        &self,
        instance_id: Uuid,
        integration: Option<String>,
        plc_programming: Option<String>,
        hmi_configuration: Option<String>,
    ) -> AppResult<()> {
        self.state_manager
            .save_error_notes(instance_id, integration, plc_programming, hmi_configuration)
            .await
    }

    pub async fn export_channel_allocation(&self, batch_id: Option<Uuid>) -> AppResult<PathBuf> {
        let definitions = self.persistence.load_definitions().await?;
        let allocations = match batch_id {
            Some(id) => self.persistence.load_allocations_by_batch(id).await?,
            None => {
                let mut all = Vec::new();
                for batch in self.persistence.load_all_batches().await? {
                    all.extend(self.persistence.load_allocations_by_batch(batch.batch_id).await?);
                }
                all
            }
        };
        ExcelExporter::export_channel_allocation(
            &definitions,
            &allocations,
            &self.config.export.default_directory,
        )
    }

    pub async fn export_test_results(&self, batch_id: Uuid) -> AppResult<PathBuf> {
        let definitions = self.persistence.load_definitions().await?;
        let instances = self.state_manager.get_batch_instances(batch_id);
        ExcelExporter::export_test_results(&definitions, &instances, &self.config.export.default_directory)
    }
}
