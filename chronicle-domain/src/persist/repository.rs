use crate::domain_event::SerializedDomainEvent;
use crate::error::DomainResult;
use crate::persist::{AggregateKey, Snapshot, TransactionContext};
use async_trait::async_trait;

/// 事件日志仓储
///
/// 实现需保证事件 ID 唯一，且 (origin, aggregate_type, aggregate_id, tenant_id, sequence_number)
/// 组合唯一；冲突时返回 `DomainError::Conflict`。
#[async_trait]
pub trait DomainEventRepository: Send + Sync {
    /// 按序号升序返回；`from_sequence_number` 为包含下界
    async fn get_aggregate_domain_events(
        &self,
        tx: Option<&TransactionContext>,
        key: &AggregateKey,
        from_sequence_number: Option<u64>,
    ) -> DomainResult<Vec<SerializedDomainEvent>>;

    async fn save_domain_events(
        &self,
        tx: Option<&TransactionContext>,
        events: &[SerializedDomainEvent],
    ) -> DomainResult<()>;
}

/// 快照仓储
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// 序号最大的快照
    async fn get_latest_snapshot(
        &self,
        tx: Option<&TransactionContext>,
        key: &AggregateKey,
    ) -> DomainResult<Option<Snapshot>>;

    async fn save_snapshot(
        &self,
        tx: Option<&TransactionContext>,
        snapshot: &Snapshot,
    ) -> DomainResult<()>;
}

/// 消费幂等见证：(domain_event_id, consumer_id)
#[async_trait]
pub trait ConsumedMessageRepository: Send + Sync {
    async fn check_if_message_is_consumed(
        &self,
        tx: Option<&TransactionContext>,
        domain_event_id: &str,
        consumer_id: &str,
    ) -> DomainResult<bool>;

    async fn mark_message_as_consumed(
        &self,
        tx: Option<&TransactionContext>,
        domain_event_id: &str,
        consumer_id: &str,
    ) -> DomainResult<()>;
}
