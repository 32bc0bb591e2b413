//! `fat_core`: the orchestrator's core library. Everything in here is free of
//! Tauri/CLI concerns; `src/main.rs` and `src/bin/fat_cli.rs` are thin
//! surfaces over `domain::OrchestrationFacade`.

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod logging;
pub mod models;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::domain::ports::{PersistenceStore, PlcDriver};
use crate::domain::OrchestrationFacade;
use crate::error::AppResult;
use crate::infrastructure::persistence::SqlitePersistenceStore;
use crate::infrastructure::plc::ModbusPlcDriver;

/// Builds the composition root from a loaded `AppConfig`: opens the SQLite
/// store and constructs the two `ModbusPlcDriver` handles (§4.9). Shared by
/// both outer surfaces so neither duplicates wiring logic.
pub async fn build_facade(config: AppConfig) -> AppResult<OrchestrationFacade> {
    let persistence: Arc<dyn PersistenceStore> =
        Arc::new(SqlitePersistenceStore::new(Some(&config.persistence.sqlite_path)).await?);
    let target: Arc<dyn PlcDriver> = Arc::new(ModbusPlcDriver::new(1));
    let test_rig: Arc<dyn PlcDriver> = Arc::new(ModbusPlcDriver::new(1));

    let facade = OrchestrationFacade::new(config, persistence, target, test_rig);
    facade.restore_state().await?;
    Ok(facade)
}
