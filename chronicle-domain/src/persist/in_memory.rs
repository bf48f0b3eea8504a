//! 内存存储（InMemoryStorage）
//!
//! 同时实现事件、快照、消费见证三个仓储与事务管理：
//! - 事务开始时复制一份状态视图，事务内读取可见自身写入；
//! - 提交时在最新状态上重放写入并重新校验唯一约束，失败则整体放弃；
//! - 回滚直接丢弃写入。
//!
//! 仅用于测试与本地开发。
//!
use crate::domain_event::SerializedDomainEvent;
use crate::error::{DomainError, DomainResult};
use crate::persist::{
    AggregateKey, ConsumedMessageRepository, DomainEventRepository, Snapshot, SnapshotRepository,
    TransactionContext, TransactionManager, lock,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

type SequenceKey = (String, String, String, Option<String>, u64);

fn sequence_key(event: &SerializedDomainEvent) -> SequenceKey {
    (
        event.origin().to_string(),
        event.aggregate_type().to_string(),
        event.aggregate_id().to_string(),
        event.tenant_id().map(str::to_string),
        event.sequence_number(),
    )
}

#[derive(Debug, Clone)]
enum Write {
    Events(Vec<SerializedDomainEvent>),
    Snapshot(Snapshot),
    Consumed(String, String),
}

#[derive(Debug, Clone, Default)]
struct StorageState {
    events: Vec<SerializedDomainEvent>,
    event_ids: HashSet<String>,
    sequence_keys: HashSet<SequenceKey>,
    snapshots: Vec<Snapshot>,
    consumed: HashSet<(String, String)>,
}

impl StorageState {
    fn apply(&mut self, write: &Write) -> DomainResult<()> {
        match write {
            Write::Events(events) => self.append(events),
            Write::Snapshot(snapshot) => {
                self.snapshots.retain(|s| {
                    s.key() != snapshot.key()
                        || s.domain_event_sequence_number()
                            != snapshot.domain_event_sequence_number()
                });
                self.snapshots.push(snapshot.clone());
                Ok(())
            }
            Write::Consumed(event_id, consumer_id) => {
                // 每个 (事件, 消费者) 只能有一条消费记录
                if !self
                    .consumed
                    .insert((event_id.clone(), consumer_id.clone()))
                {
                    return Err(DomainError::conflict(format!(
                        "message {event_id} already consumed by {consumer_id}"
                    )));
                }
                Ok(())
            }
        }
    }

    // 整批校验后再写入
    fn append(&mut self, events: &[SerializedDomainEvent]) -> DomainResult<()> {
        let mut batch_ids = HashSet::new();
        let mut batch_keys = HashSet::new();
        for event in events {
            if self.event_ids.contains(event.id()) || !batch_ids.insert(event.id()) {
                return Err(DomainError::conflict(format!(
                    "duplicate domain event id {}",
                    event.id()
                )));
            }
            let key = sequence_key(event);
            if self.sequence_keys.contains(&key) || !batch_keys.insert(key) {
                return Err(DomainError::conflict(format!(
                    "sequence number {} already exists for {}",
                    event.sequence_number(),
                    AggregateKey::of_event(event)
                )));
            }
        }

        for event in events {
            self.event_ids.insert(event.id().to_string());
            self.sequence_keys.insert(sequence_key(event));
            self.events.push(event.clone());
        }
        Ok(())
    }

    fn events_for(&self, key: &AggregateKey, from: Option<u64>) -> Vec<SerializedDomainEvent> {
        let from = from.unwrap_or(0);
        let mut events: Vec<_> = self
            .events
            .iter()
            .filter(|e| key.matches(e) && e.sequence_number() >= from)
            .cloned()
            .collect();
        events.sort_by_key(SerializedDomainEvent::sequence_number);
        events
    }

    fn latest_snapshot(&self, key: &AggregateKey) -> Option<Snapshot> {
        self.snapshots
            .iter()
            .filter(|s| &s.key() == key)
            .max_by_key(|s| s.domain_event_sequence_number())
            .cloned()
    }
}

#[derive(Debug)]
struct TransactionState {
    view: StorageState,
    writes: Vec<Write>,
    finished: bool,
}

#[derive(Debug)]
struct InMemoryTransaction {
    storage: usize,
    state: Mutex<TransactionState>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    live: Arc<Mutex<StorageState>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已提交的全部事件（按写入顺序）
    pub fn committed_events(&self) -> Vec<SerializedDomainEvent> {
        lock(&self.live).events.clone()
    }

    pub fn committed_snapshots(&self) -> Vec<Snapshot> {
        lock(&self.live).snapshots.clone()
    }

    fn storage_id(&self) -> usize {
        Arc::as_ptr(&self.live) as usize
    }

    fn transaction<'a>(&self, tx: &'a TransactionContext) -> DomainResult<&'a InMemoryTransaction> {
        let transaction = tx
            .downcast_ref::<InMemoryTransaction>()
            .ok_or_else(|| DomainError::transaction("transaction context is not an in-memory transaction"))?;
        if transaction.storage != self.storage_id() {
            return Err(DomainError::transaction(
                "transaction context belongs to another storage",
            ));
        }
        Ok(transaction)
    }

    fn read<R>(
        &self,
        tx: Option<&TransactionContext>,
        f: impl FnOnce(&StorageState) -> R,
    ) -> DomainResult<R> {
        match tx {
            None => Ok(f(&lock(&self.live))),
            Some(tx) => {
                let state = lock(&self.transaction(tx)?.state);
                if state.finished {
                    return Err(DomainError::transaction("transaction already finished"));
                }
                Ok(f(&state.view))
            }
        }
    }

    fn write(&self, tx: Option<&TransactionContext>, write: Write) -> DomainResult<()> {
        match tx {
            None => lock(&self.live).apply(&write),
            Some(tx) => {
                let mut state = lock(&self.transaction(tx)?.state);
                if state.finished {
                    return Err(DomainError::transaction("transaction already finished"));
                }
                state.view.apply(&write)?;
                state.writes.push(write);
                Ok(())
            }
        }
    }

    fn finish(&self, tx: &TransactionContext, commit: bool) -> DomainResult<()> {
        let mut state = lock(&self.transaction(tx)?.state);
        if state.finished {
            return Err(DomainError::transaction("transaction already finished"));
        }
        state.finished = true;
        let writes = std::mem::take(&mut state.writes);
        if !commit {
            return Ok(());
        }

        let mut live = lock(&self.live);
        let mut next = live.clone();
        for write in &writes {
            next.apply(write)?;
        }
        *live = next;
        Ok(())
    }
}

#[async_trait]
impl TransactionManager for InMemoryStorage {
    async fn begin(&self) -> DomainResult<TransactionContext> {
        let view = lock(&self.live).clone();
        Ok(TransactionContext::new(InMemoryTransaction {
            storage: self.storage_id(),
            state: Mutex::new(TransactionState {
                view,
                writes: Vec::new(),
                finished: false,
            }),
        }))
    }

    async fn commit(&self, tx: TransactionContext) -> DomainResult<()> {
        self.finish(&tx, true)
    }

    async fn rollback(&self, tx: TransactionContext) -> DomainResult<()> {
        self.finish(&tx, false)
    }
}

#[async_trait]
impl DomainEventRepository for InMemoryStorage {
    async fn get_aggregate_domain_events(
        &self,
        tx: Option<&TransactionContext>,
        key: &AggregateKey,
        from_sequence_number: Option<u64>,
    ) -> DomainResult<Vec<SerializedDomainEvent>> {
        self.read(tx, |state| state.events_for(key, from_sequence_number))
    }

    async fn save_domain_events(
        &self,
        tx: Option<&TransactionContext>,
        events: &[SerializedDomainEvent],
    ) -> DomainResult<()> {
        self.write(tx, Write::Events(events.to_vec()))
    }
}

#[async_trait]
impl SnapshotRepository for InMemoryStorage {
    async fn get_latest_snapshot(
        &self,
        tx: Option<&TransactionContext>,
        key: &AggregateKey,
    ) -> DomainResult<Option<Snapshot>> {
        self.read(tx, |state| state.latest_snapshot(key))
    }

    async fn save_snapshot(
        &self,
        tx: Option<&TransactionContext>,
        snapshot: &Snapshot,
    ) -> DomainResult<()> {
        self.write(tx, Write::Snapshot(snapshot.clone()))
    }
}

#[async_trait]
impl ConsumedMessageRepository for InMemoryStorage {
    async fn check_if_message_is_consumed(
        &self,
        tx: Option<&TransactionContext>,
        domain_event_id: &str,
        consumer_id: &str,
    ) -> DomainResult<bool> {
        self.read(tx, |state| {
            state
                .consumed
                .contains(&(domain_event_id.to_string(), consumer_id.to_string()))
        })
    }

    async fn mark_message_as_consumed(
        &self,
        tx: Option<&TransactionContext>,
        domain_event_id: &str,
        consumer_id: &str,
    ) -> DomainResult<()> {
        self.write(
            tx,
            Write::Consumed(domain_event_id.to_string(), consumer_id.to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(id: &str, aggregate_id: &str, seq: u64) -> SerializedDomainEvent {
        SerializedDomainEvent::builder()
            .origin("shop".into())
            .aggregate_type("order".into())
            .event_type("OrderPlaced".into())
            .version(1)
            .id(id.into())
            .aggregate_id(aggregate_id.into())
            .payload(serde_json::Value::Null)
            .sequence_number(seq)
            .timestamp(Utc::now())
            .build()
    }

    fn key(aggregate_id: &str) -> AggregateKey {
        AggregateKey::new("shop", "order", aggregate_id, None)
    }

    #[tokio::test]
    async fn reads_are_filtered_and_ordered() -> anyhow::Result<()> {
        let storage = InMemoryStorage::new();
        storage
            .save_domain_events(None, &[event("e2", "o-1", 2), event("e1", "o-1", 1)])
            .await?;
        storage
            .save_domain_events(None, &[event("e3", "o-2", 1)])
            .await?;

        let all = storage
            .get_aggregate_domain_events(None, &key("o-1"), None)
            .await?;
        assert_eq!(
            all.iter().map(|e| e.id()).collect::<Vec<_>>(),
            vec!["e1", "e2"]
        );
        let tail = storage
            .get_aggregate_domain_events(None, &key("o-1"), Some(2))
            .await?;
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].id(), "e2");
        Ok(())
    }

    #[tokio::test]
    async fn uniqueness_violations_are_conflicts() -> anyhow::Result<()> {
        let storage = InMemoryStorage::new();
        storage.save_domain_events(None, &[event("e1", "o-1", 1)]).await?;

        match storage.save_domain_events(None, &[event("e1", "o-1", 2)]).await {
            Err(DomainError::Conflict { .. }) => {}
            other => panic!("unexpected {other:?}"),
        }
        match storage.save_domain_events(None, &[event("e9", "o-1", 1)]).await {
            Err(DomainError::Conflict { .. }) => {}
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(storage.committed_events().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn rollback_discards_and_commit_publishes() -> anyhow::Result<()> {
        let storage = InMemoryStorage::new();

        let tx = storage.begin().await?;
        storage.save_domain_events(Some(&tx), &[event("e1", "o-1", 1)]).await?;
        storage.mark_message_as_consumed(Some(&tx), "e1", "c").await?;
        // 事务内可见自身写入，事务外不可见
        assert_eq!(
            storage
                .get_aggregate_domain_events(Some(&tx), &key("o-1"), None)
                .await?
                .len(),
            1
        );
        assert!(storage.committed_events().is_empty());
        storage.rollback(tx).await?;
        assert!(storage.committed_events().is_empty());
        assert!(!storage.check_if_message_is_consumed(None, "e1", "c").await?);

        let tx = storage.begin().await?;
        storage.save_domain_events(Some(&tx), &[event("e1", "o-1", 1)]).await?;
        storage.commit(tx).await?;
        assert_eq!(storage.committed_events().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn commit_revalidates_against_concurrent_writes() -> anyhow::Result<()> {
        let storage = InMemoryStorage::new();
        let tx = storage.begin().await?;
        storage.save_domain_events(Some(&tx), &[event("e1", "o-1", 1)]).await?;
        storage.save_domain_events(None, &[event("e2", "o-1", 1)]).await?;

        match storage.commit(tx).await {
            Err(DomainError::Conflict { .. }) => {}
            other => panic!("unexpected {other:?}"),
        }
        let events = storage.committed_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id(), "e2");
        Ok(())
    }

    #[tokio::test]
    async fn consumed_marker_is_unique_per_consumer() -> anyhow::Result<()> {
        let storage = InMemoryStorage::new();
        let first = storage.begin().await?;
        let second = storage.begin().await?;
        storage.mark_message_as_consumed(Some(&first), "e1", "c").await?;
        storage.mark_message_as_consumed(Some(&second), "e1", "c").await?;
        storage.commit(first).await?;

        match storage.commit(second).await {
            Err(DomainError::Conflict { .. }) => {}
            other => panic!("unexpected {other:?}"),
        }
        match storage.mark_message_as_consumed(None, "e1", "c").await {
            Err(DomainError::Conflict { .. }) => {}
            other => panic!("unexpected {other:?}"),
        }
        storage.mark_message_as_consumed(None, "e1", "other").await?;
        assert!(storage.check_if_message_is_consumed(None, "e1", "c").await?);
        Ok(())
    }

    #[tokio::test]
    async fn foreign_transactions_are_rejected() -> anyhow::Result<()> {
        let storage = InMemoryStorage::new();
        let other = InMemoryStorage::new();
        let tx = other.begin().await?;
        match storage.save_domain_events(Some(&tx), &[event("e1", "o-1", 1)]).await {
            Err(DomainError::Transaction { .. }) => {}
            other => panic!("unexpected {other:?}"),
        }
        match storage
            .save_domain_events(Some(&TransactionContext::new(42u8)), &[])
            .await
        {
            Err(DomainError::Transaction { .. }) => {}
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn latest_snapshot_wins() -> anyhow::Result<()> {
        let storage = InMemoryStorage::new();
        for seq in [10, 30, 20] {
            let snapshot = Snapshot::builder()
                .origin("shop".into())
                .aggregate_type("order".into())
                .aggregate_id("o-1".into())
                .domain_event_sequence_number(seq)
                .snapshot_data(serde_json::json!({ "seq": seq }))
                .build();
            storage.save_snapshot(None, &snapshot).await?;
        }
        let latest = storage.get_latest_snapshot(None, &key("o-1")).await?.unwrap();
        assert_eq!(latest.domain_event_sequence_number(), 30);
        assert!(storage.get_latest_snapshot(None, &key("o-2")).await?.is_none());
        Ok(())
    }
}
