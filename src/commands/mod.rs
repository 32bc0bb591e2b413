//! Tauri command layer: thin wrappers over `OrchestrationFacade` (§4.8, §6).
//! No business logic lives here — every command is a direct call-through,
//! the same shape as `fat_cli`'s subcommands.

use std::path::PathBuf;
use std::sync::Arc;

use fat_core::domain::{EventEnvelope, OrchestrationFacade};
use fat_core::error::AppError;
use fat_core::models::{
    ChannelPointDefinition, ChannelTestInstance, SubTestItem, SubTestStatus, TestBatchInfo, TestPlcChannel,
};
use tauri::State;
use uuid::Uuid;

type CmdResult<T> = Result<T, AppError>;

#[tauri::command]
pub async fn import_and_prepare_batch_cmd(
    facade: State<'_, Arc<OrchestrationFacade>>,
    workbook_path: PathBuf,
) -> CmdResult<Vec<TestBatchInfo>> {
    facade.import_and_prepare_batch(&workbook_path).await
}

#[tauri::command]
pub async fn get_batch_list_cmd(facade: State<'_, Arc<OrchestrationFacade>>) -> CmdResult<Vec<TestBatchInfo>> {
    facade.get_batch_list().await
}

#[tauri::command]
pub async fn get_batch_details_cmd(
    facade: State<'_, Arc<OrchestrationFacade>>,
    batch_id: Uuid,
) -> CmdResult<(TestBatchInfo, Vec<ChannelTestInstance>)> {
    facade.get_batch_details(batch_id).await
}

#[tauri::command]
pub fn get_definition_cmd(
    facade: State<'_, Arc<OrchestrationFacade>>,
    definition_id: Uuid,
) -> CmdResult<ChannelPointDefinition> {
    facade.get_definition(definition_id)
}

#[tauri::command]
pub async fn register_test_channels_cmd(
    facade: State<'_, Arc<OrchestrationFacade>>,
    channels: Vec<TestPlcChannel>,
) -> CmdResult<()> {
    facade.register_test_channels(&channels).await
}

#[tauri::command]
pub async fn connect_plc_cmd(facade: State<'_, Arc<OrchestrationFacade>>) -> CmdResult<()> {
    facade.connect_plc().await
}

#[tauri::command]
pub async fn disconnect_plc_cmd(facade: State<'_, Arc<OrchestrationFacade>>) -> CmdResult<()> {
    facade.disconnect_plc().await
}

#[tauri::command]
pub fn start_batch_auto_test_cmd(facade: State<'_, Arc<OrchestrationFacade>>, batch_id: Uuid) {
    facade.start_batch_auto_test(batch_id);
}

#[tauri::command]
pub fn start_single_channel_test_cmd(
    facade: State<'_, Arc<OrchestrationFacade>>,
    batch_id: Uuid,
    instance_id: Uuid,
) {
    facade.start_single_channel_test(batch_id, instance_id);
}

#[tauri::command]
pub fn retest_failed_hardpoints_cmd(facade: State<'_, Arc<OrchestrationFacade>>, batch_id: Uuid) {
    facade.retest_failed_hardpoints(batch_id);
}

#[tauri::command]
pub async fn reallocate_batch_cmd(facade: State<'_, Arc<OrchestrationFacade>>, batch_id: Uuid) -> CmdResult<()> {
    facade.reallocate_batch(batch_id).await
}

#[tauri::command]
pub async fn pause_batch_cmd(facade: State<'_, Arc<OrchestrationFacade>>, batch_id: Uuid) -> CmdResult<()> {
    facade.pause_batch(batch_id).await
}

#[tauri::command]
pub async fn resume_batch_cmd(facade: State<'_, Arc<OrchestrationFacade>>, batch_id: Uuid) -> CmdResult<()> {
    facade.resume_batch(batch_id).await
}

#[tauri::command]
pub async fn stop_batch_cmd(facade: State<'_, Arc<OrchestrationFacade>>, batch_id: Uuid) -> CmdResult<()> {
    facade.stop_batch(batch_id).await
}

#[tauri::command]
pub async fn start_manual_test_cmd(
    facade: State<'_, Arc<OrchestrationFacade>>,
    instance_id: Uuid,
) -> CmdResult<Vec<SubTestItem>> {
    facade.start_manual_test(instance_id).await
}

#[tauri::command]
pub async fn update_manual_sub_item_cmd(
    facade: State<'_, Arc<OrchestrationFacade>>,
    instance_id: Uuid,
    sub_item: SubTestItem,
    status: SubTestStatus,
    notes: Option<String>,
) -> CmdResult<()> {
    facade.update_manual_sub_item(instance_id, sub_item, status, notes).await
}

#[tauri::command]
pub async fn start_plc_monitoring_cmd(
    facade: State<'_, Arc<OrchestrationFacade>>,
    instance_id: Uuid,
    address: String,
) -> CmdResult<()> {
    facade.start_monitoring(instance_id, address).await;
    Ok(())
}

#[tauri::command]
pub async fn stop_plc_monitoring_cmd(facade: State<'_, Arc<OrchestrationFacade>>, instance_id: Uuid) -> CmdResult<()> {
    facade.stop_monitoring(instance_id).await;
    Ok(())
}

#[tauri::command]
pub async fn save_error_notes_cmd(
    facade: State<'_, Arc<OrchestrationFacade>>,
    instance_id: Uuid,
    integration: Option<String>,
    plc_programming: Option<String>,
    hmi_configuration: Option<String>,
) -> CmdResult<()> {
    facade
        .save_error_notes(instance_id, integration, plc_programming, hmi_configuration)
        .await
}

#[tauri::command]
pub async fn export_channel_allocation_cmd(
    facade: State<'_, Arc<OrchestrationFacade>>,
    batch_id: Option<Uuid>,
) -> CmdResult<PathBuf> {
    facade.export_channel_allocation(batch_id).await
}

#[tauri::command]
pub async fn export_test_results_cmd(
    facade: State<'_, Arc<OrchestrationFacade>>,
    batch_id: Uuid,
) -> CmdResult<PathBuf> {
    facade.export_test_results(batch_id).await
}

/// Drains currently queued events for the frontend's polling bridge. A
/// one-shot subscribe-then-collect rather than a held-open subscription,
/// since Tauri commands are request/response (§4.7 "subscribers register a
/// bounded inbox"; the frontend owns its own subscription lifetime through
/// repeated polling here).
#[tauri::command]
pub async fn poll_events_cmd(facade: State<'_, Arc<OrchestrationFacade>>) -> CmdResult<Vec<EventEnvelope>> {
    let (id, mut rx) = facade.subscribe_events().await;
    let mut events = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        events.push(envelope);
    }
    facade.unsubscribe_events(id).await;
    Ok(events)
}
