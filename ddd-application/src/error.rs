use ddd_domain::error::DomainError;
use std::fmt;

/// 事务边界中出错的阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionStage {
    Begin,
    Commit,
    Rollback,
    Cleanup,
}

impl fmt::Display for TransactionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStage::Begin => "begin",
            TransactionStage::Commit => "commit",
            TransactionStage::Rollback => "rollback",
            TransactionStage::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("domain: {0}")]
    Domain(#[from] DomainError),

    #[error("validation: {0}")]
    Validation(String),

    #[error("authorization: {0}")]
    Authorization(String),

    #[error("infra: {0}")]
    Infra(String),

    #[error("handler not found: {0}")]
    HandlerNotFound(&'static str),

    #[error("aggregate not found: {0}")]
    AggregateNotFound(String),

    #[error("handler already registered: command={command}")]
    AlreadyRegisteredCommand { command: &'static str },

    #[error("handler already registered: query={query}")]
    AlreadyRegisteredQuery { query: &'static str },

    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("transaction {stage} failed: {source}")]
    Transaction {
        stage: TransactionStage,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    pub(crate) fn transaction(stage: TransactionStage, source: anyhow::Error) -> Self {
        AppError::Transaction { stage, source }
    }

    /// 是否为组装/配置缺陷（未注册、重复注册），此类错误不应重试
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AppError::HandlerNotFound(_)
                | AppError::AlreadyRegisteredCommand { .. }
                | AppError::AlreadyRegisteredQuery { .. }
        )
    }

    /// 若为事件发布失败，返回订阅者的原始错误
    pub fn publication_source(&self) -> Option<&anyhow::Error> {
        match self {
            AppError::Domain(err) => err.publication_source(),
            _ => None,
        }
    }
}
