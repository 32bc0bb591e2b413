//! End-to-end facade tests: import → allocate → register channels → run the
//! auto-test loop, driven entirely through `OrchestrationFacade` the way the
//! CLI/Tauri surfaces do, with an in-memory store and a loopback `PlcDriver`
//! standing in for real hardware.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fat_core::config::AppConfig;
use fat_core::domain::ports::{IntWidth, PlcConnectParams, PlcDriver};
use fat_core::domain::{Event, OrchestrationFacade};
use fat_core::error::AppResult;
use fat_core::infrastructure::persistence::InMemoryStore;
use fat_core::models::{ModuleType, OverallBatchStatus, OverallTestStatus, PowerSupplyType, TestPlcChannel};
use rust_xlsxwriter::Workbook;
use tempfile::tempdir;
use uuid::Uuid;

/// Echoes back whatever was last written, regardless of address — enough to
/// drive the AI hardpoint executor's write-then-read-back loop to a pass
/// without modelling per-channel wiring.
struct LoopbackPlc {
    last_float: StdMutex<f32>,
    last_bool: AtomicBool,
}

impl LoopbackPlc {
    fn new() -> Self {
        Self {
            last_float: StdMutex::new(0.0),
            last_bool: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PlcDriver for LoopbackPlc {
    async fn connect(&self, _params: &PlcConnectParams) -> AppResult<()> {
        Ok(())
    }
    async fn read_bool(&self, _address: &str) -> AppResult<bool> {
        Ok(self.last_bool.load(Ordering::SeqCst))
    }
    async fn read_float(&self, _address: &str) -> AppResult<f32> {
        Ok(*self.last_float.lock().unwrap())
    }
    async fn read_int(&self, _address: &str, _width: IntWidth) -> AppResult<i64> {
        Ok(0)
    }
    async fn write_bool(&self, _address: &str, value: bool) -> AppResult<()> {
        self.last_bool.store(value, Ordering::SeqCst);
        Ok(())
    }
    async fn write_float(&self, _address: &str, value: f32) -> AppResult<()> {
        *self.last_float.lock().unwrap() = value;
        Ok(())
    }
    async fn write_int(&self, _address: &str, _value: i64, _width: IntWidth) -> AppResult<()> {
        Ok(())
    }
    async fn disconnect(&self) -> AppResult<()> {
        Ok(())
    }
    async fn is_connected(&self) -> bool {
        true
    }
}

/// Writes a single-row point-table workbook in the layout
/// `ExcelImporter::import` expects (sequence, module name, module type,
/// power type, wire system, channel number, tag, station, variable name,
/// description, data type, PLC absolute address, PLC communication address,
/// range_lo, range_hi, eng unit).
fn write_point_table(path: &std::path::Path, tags: &[&str]) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let headers = [
        "序号", "模块名称", "模块类型", "供电类型", "接线系统", "通道位号", "位号", "场站名",
        "变量名称", "变量描述", "数据类型", "PLC绝对地址", "上位机通讯地址", "量程低限", "量程高限", "单位",
    ];
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string(0, col as u16, *header).unwrap();
    }
    for (i, tag) in tags.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write_number(row, 0, (i + 1) as f64).unwrap();
        sheet.write_string(row, 1, "AI_Module_1").unwrap();
        sheet.write_string(row, 2, "AI").unwrap();
        sheet.write_string(row, 3, "sourced").unwrap();
        sheet.write_string(row, 5, format!("CH{i}")).unwrap();
        sheet.write_string(row, 6, *tag).unwrap();
        sheet.write_string(row, 7, "站场1").unwrap();
        sheet.write_string(row, 8, format!("变量{i}")).unwrap();
        sheet.write_string(row, 9, "描述").unwrap();
        sheet.write_string(row, 10, "Float").unwrap();
        sheet.write_string(row, 11, format!("%MD{i}")).unwrap();
        sheet.write_string(row, 12, format!("4000{i}")).unwrap();
        sheet.write_number(row, 13, 0.0).unwrap();
        sheet.write_number(row, 14, 100.0).unwrap();
        sheet.write_string(row, 15, "C").unwrap();
    }
    workbook.save(path).unwrap();
}

fn rig_channel(addr: &str) -> TestPlcChannel {
    TestPlcChannel {
        id: Uuid::new_v4(),
        channel_address: addr.to_string(),
        channel_type: ModuleType::AOPassive,
        communication_address: format!("{addr}-comm"),
        power_supply_type: PowerSupplyType::Passive,
        enabled: true,
    }
}

async fn build_facade() -> OrchestrationFacade {
    let mut config = AppConfig::default();
    config.test.stabilization_ms = 1;
    config.test.tolerance_abs = 0.01;
    let persistence = Arc::new(InMemoryStore::new());
    let target = Arc::new(LoopbackPlc::new());
    let test_rig = Arc::new(LoopbackPlc::new());
    OrchestrationFacade::new(config, persistence, target, test_rig)
}

#[tokio::test]
async fn import_allocate_and_single_channel_test_passes_end_to_end() {
    let facade = build_facade().await;
    facade.register_test_channels(&[rig_channel("AO1_1")]).await.unwrap();

    let dir = tempdir().unwrap();
    let workbook_path = dir.path().join("point_table.xlsx");
    write_point_table(&workbook_path, &["TAG001"]);

    let batches = facade.import_and_prepare_batch(&workbook_path).await.unwrap();
    assert_eq!(batches.len(), 1);
    let batch_id = batches[0].batch_id;

    facade.connect_plc().await.unwrap();

    let (_sub_id, mut events) = facade.subscribe_events().await;

    let (_, instances) = facade.get_batch_details(batch_id).await.unwrap();
    assert_eq!(instances.len(), 1);
    let instance_id = instances[0].instance_id;
    assert_eq!(instances[0].overall_status, OverallTestStatus::NotTested);

    facade.start_single_channel_test(batch_id, instance_id);

    let mut final_status = OverallTestStatus::NotTested;
    for _ in 0..100 {
        let (batch_info, instances) = facade.get_batch_details(batch_id).await.unwrap();
        final_status = instances[0].overall_status;
        if final_status.is_terminal() {
            assert_eq!(batch_info.overall_status, OverallBatchStatus::Completed);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(final_status, OverallTestStatus::TestCompletedPassed);

    let mut saw_batch_summary = false;
    while let Ok(envelope) = events.try_recv() {
        if matches!(envelope.event, Event::BatchSummaryChanged { .. }) {
            saw_batch_summary = true;
        }
    }
    assert!(saw_batch_summary, "批次完成后应发出 BatchSummaryChanged 事件");
}

#[tokio::test]
async fn pausing_a_batch_prevents_progress_until_resumed() {
    let mut config = AppConfig::default();
    config.test.stabilization_ms = 20;
    config.test.tolerance_abs = 0.01;
    config.test.concurrency_limit = 1;
    let persistence = Arc::new(InMemoryStore::new());
    let target = Arc::new(LoopbackPlc::new());
    let test_rig = Arc::new(LoopbackPlc::new());
    let facade = OrchestrationFacade::new(config, persistence, target, test_rig);

    facade
        .register_test_channels(&[rig_channel("AO1_1"), rig_channel("AO1_2"), rig_channel("AO1_3")])
        .await
        .unwrap();

    let dir = tempdir().unwrap();
    let workbook_path = dir.path().join("point_table.xlsx");
    write_point_table(&workbook_path, &["TAG010", "TAG011", "TAG012"]);

    let batches = facade.import_and_prepare_batch(&workbook_path).await.unwrap();
    let batch_id = batches[0].batch_id;
    facade.connect_plc().await.unwrap();

    facade.start_batch_auto_test(batch_id);

    // Wait until run_batch's own control is in place and the first instance
    // has entered the hardpoint phase before pausing — pausing any earlier
    // would race `run_batch`'s `control_for` call, which replaces whatever
    // control `set_ranges`/an earlier pause installed.
    for _ in 0..200 {
        let (_, instances) = facade.get_batch_details(batch_id).await.unwrap();
        if instances.iter().any(|i| i.overall_status == OverallTestStatus::HardPointTesting) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    facade.pause_batch(batch_id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(80)).await;
    let (_, instances) = facade.get_batch_details(batch_id).await.unwrap();
    let terminal_while_paused = instances.iter().filter(|i| i.overall_status.is_terminal()).count();
    assert!(
        terminal_while_paused < instances.len(),
        "expected at least one instance still in flight while paused"
    );

    facade.resume_batch(batch_id).await.unwrap();

    let mut all_terminal = false;
    for _ in 0..200 {
        let (_, instances) = facade.get_batch_details(batch_id).await.unwrap();
        if instances.iter().all(|i| i.overall_status.is_terminal()) {
            all_terminal = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(all_terminal, "批次应在恢复后最终全部完成");
    let (_, instances) = facade.get_batch_details(batch_id).await.unwrap();
    assert!(instances
        .iter()
        .all(|i| i.overall_status == OverallTestStatus::TestCompletedPassed));
}

#[tokio::test]
async fn reallocating_a_batch_resets_its_instances_to_not_tested() {
    let facade = build_facade().await;
    facade.register_test_channels(&[rig_channel("AO1_1")]).await.unwrap();

    let dir = tempdir().unwrap();
    let workbook_path = dir.path().join("point_table.xlsx");
    write_point_table(&workbook_path, &["TAG020"]);

    let batches = facade.import_and_prepare_batch(&workbook_path).await.unwrap();
    let batch_id = batches[0].batch_id;
    facade.connect_plc().await.unwrap();

    let (_, instances) = facade.get_batch_details(batch_id).await.unwrap();
    let instance_id = instances[0].instance_id;
    facade.start_single_channel_test(batch_id, instance_id);

    let mut final_status = OverallTestStatus::NotTested;
    for _ in 0..100 {
        let (_, instances) = facade.get_batch_details(batch_id).await.unwrap();
        final_status = instances[0].overall_status;
        if final_status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(final_status, OverallTestStatus::TestCompletedPassed);

    // A rig channel becomes available after the run; re-allocating should
    // pick it up and reset the instance back to NotTested.
    facade.register_test_channels(&[rig_channel("AO1_2")]).await.unwrap();
    facade.reallocate_batch(batch_id).await.unwrap();

    let (_, instances) = facade.get_batch_details(batch_id).await.unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].overall_status, OverallTestStatus::NotTested);
    assert!(instances[0].sub_test_results.is_empty());
}
