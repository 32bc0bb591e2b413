//! Command-line control surface (§6): `import`, `connect`, `start`, `pause`,
//! `resume`, `stop`, `retest-failed`, `export-allocation`, `export-results`,
//! each a thin call into `OrchestrationFacade`. Exits 0 on success and a
//! non-zero code on any precondition failure, per §6/§7.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use fat_core::config::AppConfig;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "fat-cli", about = "Factory acceptance test orchestrator CLI")]
struct Cli {
    /// Optional TOML config file layered over the built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Imports a point-table workbook and allocates it into test batches.
    Import {
        #[arg(long)]
        workbook: PathBuf,
    },
    /// Connects both PLC endpoints (target and test rig).
    Connect,
    /// Starts the automatic hardpoint loop for a batch.
    Start {
        #[arg(long)]
        batch_id: Uuid,
    },
    /// Pauses an in-progress batch run.
    Pause {
        #[arg(long)]
        batch_id: Uuid,
    },
    /// Resumes a paused batch run.
    Resume {
        #[arg(long)]
        batch_id: Uuid,
    },
    /// Cancels an in-progress batch run.
    Stop {
        #[arg(long)]
        batch_id: Uuid,
    },
    /// Re-runs every `TestCompletedFailed` instance's hardpoint test.
    RetestFailed {
        #[arg(long)]
        batch_id: Uuid,
    },
    /// Re-allocates a batch against the current rig inventory and resets
    /// its instances to `NotTested`.
    Reallocate {
        #[arg(long)]
        batch_id: Uuid,
    },
    /// Exports the channel allocation table to an Excel workbook.
    ExportAllocation {
        #[arg(long)]
        batch_id: Option<Uuid>,
    },
    /// Exports a batch's test results to an Excel workbook.
    ExportResults {
        #[arg(long)]
        batch_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("配置加载失败: {e}");
            return ExitCode::FAILURE;
        }
    };
    fat_core::logging::init_stderr(&config.logging.level);

    let facade = match fat_core::build_facade(config).await {
        Ok(f) => f,
        Err(e) => {
            eprintln!("初始化失败: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Import { workbook } => facade
            .import_and_prepare_batch(&workbook)
            .await
            .map(|batches| println!("已导入并分配 {} 个批次", batches.len())),
        Command::Connect => facade
            .connect_plc()
            .await
            .map(|_| println!("PLC连接成功")),
        Command::Start { batch_id } => {
            facade.start_batch_auto_test(batch_id);
            println!("批次 {batch_id} 自动测试已启动");
            Ok(())
        }
        Command::Pause { batch_id } => facade
            .pause_batch(batch_id)
            .await
            .map(|_| println!("批次 {batch_id} 已暂停")),
        Command::Resume { batch_id } => facade
            .resume_batch(batch_id)
            .await
            .map(|_| println!("批次 {batch_id} 已恢复")),
        Command::Stop { batch_id } => facade
            .stop_batch(batch_id)
            .await
            .map(|_| println!("批次 {batch_id} 已停止")),
        Command::RetestFailed { batch_id } => {
            facade.retest_failed_hardpoints(batch_id);
            println!("批次 {batch_id} 失败硬点重测已启动");
            Ok(())
        }
        Command::Reallocate { batch_id } => facade
            .reallocate_batch(batch_id)
            .await
            .map(|_| println!("批次 {batch_id} 已重新分配")),
        Command::ExportAllocation { batch_id } => facade
            .export_channel_allocation(batch_id)
            .await
            .map(|path| println!("通道分配表已导出: {}", path.display())),
        Command::ExportResults { batch_id } => facade
            .export_test_results(batch_id)
            .await
            .map(|path| println!("测试结果已导出: {}", path.display())),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("操作失败 [{}]: {e}", e.error_code());
            ExitCode::FAILURE
        }
    }
}
