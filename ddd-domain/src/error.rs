//! 领域层统一错误定义
//!
//! 聚焦序列化、事件发布、失败转存与领域规则校验等最小必要集合，
//! 便于在各实现层统一转换为 `DomainError`。
//!
use thiserror::Error;

/// 统一错误类型（基础库最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("parse error: {reason}")]
    Parse { reason: String },
    #[error("unsupported event format: version={version}")]
    UnsupportedFormat { version: String },

    // --- 事件系统 ---
    /// 订阅者处理失败；`source` 保留订阅者返回的原始错误
    #[error(
        "event publication failed: subscriber={subscriber}, event_type={event_type}, event_id={event_id}"
    )]
    EventPublication {
        subscriber: String,
        event_type: &'static str,
        event_id: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("event bus error: {reason}")]
    EventBus { reason: String },

    // --- 失败转存 ---
    #[error("failover store error: key={key}, reason={reason}")]
    FailoverStore { key: String, reason: String },
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    // --- 领域规则 ---
    #[error("invalid value: {reason}")]
    InvalidValue { reason: String },
    #[error("not found: {reason}")]
    NotFound { reason: String },
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    pub fn event_bus(reason: impl Into<String>) -> Self {
        DomainError::EventBus {
            reason: reason.into(),
        }
    }

    pub fn failover_store(key: impl Into<String>, reason: impl Into<String>) -> Self {
        DomainError::FailoverStore {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// 若为订阅者失败，返回其原始错误
    pub fn publication_source(&self) -> Option<&anyhow::Error> {
        match self {
            DomainError::EventPublication { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<chrono::ParseError> for DomainError {
    fn from(err: chrono::ParseError) -> Self {
        DomainError::Parse {
            reason: err.to_string(),
        }
    }
}
