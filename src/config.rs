//! 分层应用配置：默认值 → 可选TOML文件 → 环境变量（`FAT__` 前缀）。
//!
//! 启动时加载失败是 §7 分类5 中唯一的 `Fatal` 错误（`ConfigurationInvalid`）。

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::ports::PlcConnectParams;
use crate::error::{AppError, AppResult};
use crate::models::ByteOrder;

/// 单个PLC连接的参数（测试台架或被测目标）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlcEndpointConfig {
    pub host: String,
    pub port: u16,
    pub byte_order: ByteOrder,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for PlcEndpointConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 502,
            byte_order: ByteOrder::CDAB,
            connect_timeout_ms: 5_000,
            read_timeout_ms: 3_000,
            write_timeout_ms: 3_000,
        }
    }
}

impl From<&PlcEndpointConfig> for PlcConnectParams {
    fn from(cfg: &PlcEndpointConfig) -> Self {
        Self {
            host: cfg.host.clone(),
            port: cfg.port,
            byte_order: cfg.byte_order,
            connect_timeout_ms: cfg.connect_timeout_ms,
            read_timeout_ms: cfg.read_timeout_ms,
            write_timeout_ms: cfg.write_timeout_ms,
        }
    }
}

/// PLC连接配置：被测目标与测试台架各一份端点配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlcConfig {
    pub target: PlcEndpointConfig,
    pub test_rig: PlcEndpointConfig,
}

impl Default for PlcConfig {
    fn default() -> Self {
        Self {
            target: PlcEndpointConfig::default(),
            test_rig: PlcEndpointConfig {
                port: 503,
                ..PlcEndpointConfig::default()
            },
        }
    }
}

/// 测试执行参数：并发上限、稳定等待、容差、重试、超时（§4.5, §9 Open Questions）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    /// 调度器并发上限 Cmax（默认3-8）
    pub concurrency_limit: usize,
    /// 写入后到读取前的稳定等待（毫秒，默认2000-3000）
    pub stabilization_ms: u64,
    /// 容差：绝对部分
    pub tolerance_abs: f64,
    /// 容差：相对部分（乘以 |expected|）
    pub tolerance_rel: f64,
    /// 硬点测试重试预算（默认0）
    pub hardpoint_retry_budget: u32,
    /// DI/DO 电平切换之间的等待（毫秒，默认3000，§4.3）
    pub digital_settle_ms: u64,
    /// 单个子测试的总超时（毫秒，默认30000）
    pub step_timeout_ms: u64,
    /// 单个批次的总超时（毫秒；None 表示不设上限）
    pub batch_timeout_ms: Option<u64>,
    /// 人工监控轮询周期（毫秒，默认250-500，§4.6）
    pub monitoring_poll_ms: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
            stabilization_ms: 2_500,
            tolerance_abs: 0.5,
            tolerance_rel: 0.01,
            hardpoint_retry_budget: 0,
            digital_settle_ms: 3_000,
            step_timeout_ms: 30_000,
            batch_timeout_ms: None,
            monitoring_poll_ms: 400,
        }
    }
}

/// 持久化配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub sqlite_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("fat_core.sqlite3"),
        }
    }
}

/// 日志配置：级别与轮转参数（由 `crate::logging` 使用）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: PathBuf,
    pub rotation_size_bytes: u64,
    pub retention_count: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: PathBuf::from("logs"),
            rotation_size_bytes: 10 * 1024 * 1024,
            retention_count: 10,
        }
    }
}

/// 导出配置：默认导出目录。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    pub default_directory: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_directory: PathBuf::from("exports"),
        }
    }
}

/// 应用程序主配置，从默认值、可选配置文件、环境变量分层合并而来。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub plc: PlcConfig,
    pub test: TestConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
    pub export: ExportConfig,
}

impl AppConfig {
    /// 加载顺序：内置默认值 → `path`（若存在）→ `FAT__` 前缀的环境变量覆盖。
    ///
    /// `path` 为 `None` 或文件不存在时静默跳过文件层，不是错误。
    pub fn load(path: Option<&std::path::Path>) -> AppResult<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?);

        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(config::File::from(path));
            }
        }

        let builder = builder.add_source(
            config::Environment::with_prefix("FAT")
                .separator("__")
                .try_parsing(true),
        );

        let raw = builder
            .build()
            .map_err(|e| AppError::configuration_invalid(format!("加载配置失败: {e}")))?;

        let cfg: AppConfig = raw
            .try_deserialize()
            .map_err(|e| AppError::configuration_invalid(format!("解析配置失败: {e}")))?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> AppResult<()> {
        if self.test.concurrency_limit == 0 {
            return Err(AppError::configuration_invalid(
                "test.concurrency_limit 必须大于0",
            ));
        }
        if self.plc.target.port == 0 || self.plc.test_rig.port == 0 {
            return Err(AppError::configuration_invalid("PLC端口不能为0"));
        }
        Ok(())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::configuration_invalid(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_with_no_file_falls_back_to_defaults() {
        let cfg = AppConfig::load(None).unwrap();
        assert_eq!(cfg.test.concurrency_limit, 4);
        assert_eq!(cfg.plc.target.port, 502);
        assert_eq!(cfg.plc.test_rig.port, 503);
    }

    #[test]
    fn missing_config_file_is_silently_skipped() {
        let cfg = AppConfig::load(Some(std::path::Path::new("/no/such/fat_core.toml"))).unwrap();
        assert_eq!(cfg.test.concurrency_limit, 4);
    }

    #[test]
    fn validate_rejects_zero_concurrency_limit() {
        let mut cfg = AppConfig::default();
        cfg.test.concurrency_limit = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_plc_port() {
        let mut cfg = AppConfig::default();
        cfg.plc.target.port = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(AppConfig::default().validate().is_ok());
    }
}
