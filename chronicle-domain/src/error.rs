//! 领域层统一错误定义
//!
//! 按来源分组：
//! - 注册期错误（重复注册、缺失元数据），属于致命的启动错误；
//! - 不变量错误（序号不连续、聚合 ID 不一致、越界截断等），仅中止当前操作；
//! - 配置错误（生产者/映射器只配置了一半）；
//! - 运行期错误（仓储、事务、消息中间件、查询服务），由上层决定降级或传播。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 注册 ---
    #[error("already registered: kind={kind}, key={key}")]
    AlreadyRegistered { kind: &'static str, key: String },
    #[error("missing aggregate metadata: aggregate={aggregate}")]
    MissingAggregateMetadata { aggregate: String },

    // --- 不变量 ---
    #[error(
        "sequence number mismatch: aggregate_id={aggregate_id}, expected={expected}, actual={actual}"
    )]
    SequenceNumberMismatch {
        aggregate_id: String,
        expected: u64,
        actual: u64,
    },
    #[error("aggregate id mismatch: expected={expected}, actual={actual}")]
    AggregateIdMismatch { expected: String, actual: String },
    #[error("aggregate id can only be assigned while creating: aggregate_type={aggregate_type}")]
    IdSetOutsideCreationContext { aggregate_type: String },
    #[error("aggregate has no id: aggregate_type={aggregate_type}")]
    MissingAggregateId { aggregate_type: String },
    #[error("sequence number out of range: requested={requested}, max={max}")]
    SequenceNumberOutOfRange { requested: u64, max: u64 },
    #[error("invalid payload: type={event_type}, reason={reason}")]
    InvalidPayload { event_type: String, reason: String },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch { expected: String, found: String },

    // --- 配置 ---
    #[error("message producer and message mapper must be configured together")]
    MissingProducerOrMapper,

    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    // --- 仓储/事务/消息 ---
    #[error("event repository error: {reason}")]
    EventRepository { reason: String },
    #[error("snapshot repository error: {reason}")]
    SnapshotRepository { reason: String },
    #[error("consumed message repository error: {reason}")]
    ConsumedMessageRepository { reason: String },
    #[error("transaction error: {reason}")]
    Transaction { reason: String },
    #[error("conflict: {reason}")]
    Conflict { reason: String },
    #[error("message broker error: {reason}")]
    MessageBroker { reason: String },
    #[error("aggregate query service error: {reason}")]
    QueryService { reason: String },
    #[error("event handler error: handler={handler}, reason={reason}")]
    EventHandler { handler: String, reason: String },
    #[error("not found: {reason}")]
    NotFound { reason: String },
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    pub fn event_repository(reason: impl Into<String>) -> Self {
        DomainError::EventRepository {
            reason: reason.into(),
        }
    }

    pub fn snapshot_repository(reason: impl Into<String>) -> Self {
        DomainError::SnapshotRepository {
            reason: reason.into(),
        }
    }

    pub fn transaction(reason: impl Into<String>) -> Self {
        DomainError::Transaction {
            reason: reason.into(),
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        DomainError::Conflict {
            reason: reason.into(),
        }
    }

    pub fn message_broker(reason: impl Into<String>) -> Self {
        DomainError::MessageBroker {
            reason: reason.into(),
        }
    }

    pub fn query_service(reason: impl Into<String>) -> Self {
        DomainError::QueryService {
            reason: reason.into(),
        }
    }
}

// ---- Cross-crate conversions for infrastructure convenience ----
// 允许 SQL 适配器直接使用 `?`，唯一约束冲突映射为 Conflict

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DomainError::NotFound {
                reason: "row not found".to_string(),
            },
            sqlx::Error::Database(db) if db.is_unique_violation() => DomainError::Conflict {
                reason: db.message().to_string(),
            },
            other => DomainError::EventRepository {
                reason: other.to_string(),
            },
        }
    }
}
