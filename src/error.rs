//! 应用程序统一错误类型
//!
//! 系统中所有可失败操作共用同一个错误类型，按照 §7 错误分类设计：
//! 前置条件错误、瞬时 I/O 错误、测试失败、持久化错误、致命错误。
//! 调用方可以用 `error_code()` 得到一个稳定的机器可读标识，用于日志与上报。

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum AppError {
    /// 资源未找到：实例、定义、批次等
    #[error("未找到{resource_type}: {message}")]
    NotFound {
        resource_type: String,
        message: String,
    },

    /// 状态转换非法（不在 §4.2 状态图的边集合内）
    #[error("非法状态转换: {from_state} -> {to_state} ({message})")]
    InvalidTransition {
        from_state: String,
        to_state: String,
        message: String,
    },

    /// 子测试项对该模块类型不适用（I3）
    #[error("子测试项不适用: {sub_test_item} 不属于模块类型 {module_type}")]
    NotApplicable {
        sub_test_item: String,
        module_type: String,
    },

    /// 操作已在进行中
    #[error("操作已在进行中: {message}")]
    AlreadyInProgress { message: String },

    /// PLC 未连接
    #[error("PLC未连接: {plc}")]
    PlcDisconnected { plc: String },

    /// 分配时没有可用的测试台架通道
    #[error("无可用测试通道: {definition_id}")]
    NoTestChannel { definition_id: String },

    /// 连接失败
    #[error("PLC连接失败: {message}")]
    ConnectError { message: String },

    /// 读取失败
    #[error("PLC读取失败: {address} - {message}")]
    ReadError { address: String, message: String },

    /// 写入失败
    #[error("PLC写入失败: {address} - {message}")]
    WriteError { address: String, message: String },

    /// 超时
    #[error("操作超时: {operation} ({message})")]
    Timeout { operation: String, message: String },

    /// 持久化不可用
    #[error("持久化服务不可用: {message}")]
    PersistenceUnavailable { message: String },

    /// 数据完整性损坏（例如唯一约束冲突）
    #[error("数据完整性错误: {message}")]
    IntegrityViolation { message: String },

    /// 导入时出现重复位号
    #[error("重复位号: {tag}")]
    DuplicateTag { tag: String },

    /// 通道点位定义缺少该模块类型所需的字段
    #[error("通道定义无效: {tag} - {message}")]
    InvalidDefinition { tag: String, message: String },

    /// 一般性校验错误
    #[error("校验错误: {message}")]
    Validation { message: String },

    /// 序列化/反序列化错误
    #[error("序列化错误: {message}")]
    Serialization { message: String },

    /// 配置错误（启动时致命）
    #[error("配置无效: {message}")]
    ConfigurationInvalid { message: String },

    /// 通用 I/O 错误
    #[error("IO错误: {message}")]
    Io { message: String },

    /// 兜底错误
    #[error("内部错误: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn not_found(resource_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            message: message.into(),
        }
    }

    pub fn invalid_transition(
        from_state: impl Into<String>,
        to_state: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            from_state: from_state.into(),
            to_state: to_state.into(),
            message: message.into(),
        }
    }

    pub fn not_applicable(sub_test_item: impl Into<String>, module_type: impl Into<String>) -> Self {
        Self::NotApplicable {
            sub_test_item: sub_test_item.into(),
            module_type: module_type.into(),
        }
    }

    pub fn already_in_progress(message: impl Into<String>) -> Self {
        Self::AlreadyInProgress {
            message: message.into(),
        }
    }

    pub fn plc_disconnected(plc: impl Into<String>) -> Self {
        Self::PlcDisconnected { plc: plc.into() }
    }

    pub fn no_test_channel(definition_id: impl Into<String>) -> Self {
        Self::NoTestChannel {
            definition_id: definition_id.into(),
        }
    }

    pub fn connect_error(message: impl Into<String>) -> Self {
        Self::ConnectError {
            message: message.into(),
        }
    }

    pub fn read_error(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ReadError {
            address: address.into(),
            message: message.into(),
        }
    }

    pub fn write_error(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WriteError {
            address: address.into(),
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn persistence_unavailable(message: impl Into<String>) -> Self {
        Self::PersistenceUnavailable {
            message: message.into(),
        }
    }

    pub fn integrity_violation(message: impl Into<String>) -> Self {
        Self::IntegrityViolation {
            message: message.into(),
        }
    }

    pub fn duplicate_tag(tag: impl Into<String>) -> Self {
        Self::DuplicateTag { tag: tag.into() }
    }

    pub fn invalid_definition(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            tag: tag.into(),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn configuration_invalid(message: impl Into<String>) -> Self {
        Self::ConfigurationInvalid {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// 机器可读的错误码，供前端/日志使用
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AppError::NotApplicable { .. } => "NOT_APPLICABLE",
            AppError::AlreadyInProgress { .. } => "ALREADY_IN_PROGRESS",
            AppError::PlcDisconnected { .. } => "PLC_DISCONNECTED",
            AppError::NoTestChannel { .. } => "NO_TEST_CHANNEL",
            AppError::ConnectError { .. } => "CONNECT_ERROR",
            AppError::ReadError { .. } => "READ_ERROR",
            AppError::WriteError { .. } => "WRITE_ERROR",
            AppError::Timeout { .. } => "TIMEOUT",
            AppError::PersistenceUnavailable { .. } => "PERSISTENCE_UNAVAILABLE",
            AppError::IntegrityViolation { .. } => "INTEGRITY_VIOLATION",
            AppError::DuplicateTag { .. } => "DUPLICATE_TAG",
            AppError::InvalidDefinition { .. } => "INVALID_DEFINITION",
            AppError::Validation { .. } => "VALIDATION",
            AppError::Serialization { .. } => "SERIALIZATION",
            AppError::ConfigurationInvalid { .. } => "CONFIGURATION_INVALID",
            AppError::Io { .. } => "IO",
            AppError::Internal { .. } => "INTERNAL",
        }
    }

    /// 瞬时 I/O 错误，在执行器里可以按重试预算重试（§7 分类2）
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Timeout { .. } | AppError::ReadError { .. } | AppError::WriteError { .. } | AppError::ConnectError { .. }
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::PersistenceUnavailable {
            message: err.to_string(),
        }
    }
}

impl From<tokio_modbus::Error> for AppError {
    fn from(err: tokio_modbus::Error) -> Self {
        AppError::ConnectError {
            message: format!("modbus error: {err}"),
        }
    }
}

impl From<calamine::Error> for AppError {
    fn from(err: calamine::Error) -> Self {
        AppError::Validation {
            message: format!("spreadsheet error: {err}"),
        }
    }
}

impl From<rust_xlsxwriter::XlsxError> for AppError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        AppError::Internal {
            message: format!("spreadsheet write error: {err}"),
        }
    }
}

/// 应用程序结果类型别名
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_is_stable_per_variant() {
        assert_eq!(AppError::not_found("Batch", "x").error_code(), "NOT_FOUND");
        assert_eq!(
            AppError::invalid_transition("a", "b", "x").error_code(),
            "INVALID_TRANSITION"
        );
        assert_eq!(AppError::duplicate_tag("TAG1").error_code(), "DUPLICATE_TAG");
        assert_eq!(
            AppError::configuration_invalid("x").error_code(),
            "CONFIGURATION_INVALID"
        );
    }

    #[test]
    fn only_transient_io_classes_are_retryable() {
        assert!(AppError::timeout("read", "x").is_retryable());
        assert!(AppError::read_error("a", "x").is_retryable());
        assert!(AppError::write_error("a", "x").is_retryable());
        assert!(AppError::connect_error("x").is_retryable());

        assert!(!AppError::not_found("Batch", "x").is_retryable());
        assert!(!AppError::invalid_transition("a", "b", "x").is_retryable());
        assert!(!AppError::duplicate_tag("TAG1").is_retryable());
    }

    #[test]
    fn io_error_converts_to_io_variant() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: AppError = io_err.into();
        assert_eq!(err.error_code(), "IO");
    }

    #[test]
    fn serde_json_error_converts_to_serialization_variant() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: AppError = json_err.into();
        assert_eq!(err.error_code(), "SERIALIZATION");
    }
}
