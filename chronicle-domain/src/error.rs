//! 领域层统一错误定义
//!
//! 聚焦并发冲突、未找到、观察者失败与存储故障几类，调用方据此决定是否重新加载后重试。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 并发/事务 ---
    #[error(
        "concurrency conflict: aggregate_type={aggregate_type}, aggregate_id={aggregate_id}, sequence={sequence}"
    )]
    ConcurrencyConflict {
        aggregate_type: String,
        aggregate_id: String,
        sequence: usize,
    },
    #[error("transaction aborted: {reason}")]
    TransactionAborted { reason: String },

    // --- 观察者 ---
    #[error("observer failed: observer={observer}, reason={source}")]
    ObserverFailed {
        observer: String,
        #[source]
        source: Box<DomainError>,
    },

    // --- 存储 ---
    #[error("event log error: {reason}")]
    EventLog { reason: String },
    #[error("snapshot store error: {reason}")]
    SnapshotStore { reason: String },
    #[error("notification error: {reason}")]
    Notification { reason: String },

    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch { expected: String, found: String },
    #[error("parse error: {reason}")]
    Parse { reason: String },

    // --- 领域状态 ---
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },
    #[error("not found: {reason}")]
    NotFound { reason: String },
}

impl DomainError {
    /// 是否为乐观并发冲突（包括观察者内部嵌套保存时产生的冲突）
    pub fn is_concurrency_conflict(&self) -> bool {
        match self {
            DomainError::ConcurrencyConflict { .. } => true,
            DomainError::ObserverFailed { source, .. } => source.is_concurrency_conflict(),
            _ => false,
        }
    }

    pub(crate) fn not_found(reason: impl Into<String>) -> Self {
        DomainError::NotFound {
            reason: reason.into(),
        }
    }

    pub(crate) fn event_log(reason: impl Into<String>) -> Self {
        DomainError::EventLog {
            reason: reason.into(),
        }
    }
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

impl From<uuid::Error> for DomainError {
    fn from(err: uuid::Error) -> Self {
        DomainError::Parse {
            reason: err.to_string(),
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
