// 非调试构建下隐藏控制台窗口。
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

//! Desktop shell entry point: wires `fat_core::build_facade` into Tauri's
//! managed state and registers the `commands` module as the invoke handler.
//! Carries no business logic of its own (§6).

mod commands;

use std::sync::Arc;

use fat_core::config::AppConfig;
use fat_core::domain::OrchestrationFacade;

#[tokio::main]
async fn main() {
    let config = AppConfig::load(None).expect("配置加载失败");
    fat_core::logging::init(&config.logging).expect("日志初始化失败");

    let facade: Arc<OrchestrationFacade> = Arc::new(
        fat_core::build_facade(config)
            .await
            .expect("核心初始化失败"),
    );

    tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .manage(facade)
        .invoke_handler(tauri::generate_handler![
            commands::import_and_prepare_batch_cmd,
            commands::get_batch_list_cmd,
            commands::get_batch_details_cmd,
            commands::get_definition_cmd,
            commands::register_test_channels_cmd,
            commands::connect_plc_cmd,
            commands::disconnect_plc_cmd,
            commands::start_batch_auto_test_cmd,
            commands::start_single_channel_test_cmd,
            commands::retest_failed_hardpoints_cmd,
            commands::reallocate_batch_cmd,
            commands::pause_batch_cmd,
            commands::resume_batch_cmd,
            commands::stop_batch_cmd,
            commands::start_manual_test_cmd,
            commands::update_manual_sub_item_cmd,
            commands::start_plc_monitoring_cmd,
            commands::stop_plc_monitoring_cmd,
            commands::save_error_notes_cmd,
            commands::export_channel_allocation_cmd,
            commands::export_test_results_cmd,
            commands::poll_events_cmd,
        ])
        .run(tauri::generate_context!())
        .expect("Tauri应用启动失败");
}
