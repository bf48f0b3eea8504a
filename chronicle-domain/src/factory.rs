//! 聚合工厂（AggregateFactory）
//!
//! 从快照 + 事件尾部或完整事件日志重建聚合：
//! - 可快照聚合优先走快照路径，失败时记录告警并回退到事件日志；
//! - 外部聚合的本地缓存为空或不完整时，向所属服务拉取完整日志并补齐本地缺失事件；
//! - 完整重建后按间隔检查是否需要补写快照（失败只记录日志）。
//!
use crate::aggregate::Aggregate;
use crate::applier::DomainEventApplier;
use crate::domain_event::SerializedDomainEvent;
use crate::error::{DomainError, DomainResult};
use crate::event_store::EventStore;
use crate::persist::{AggregateKey, AggregateQueryService, TransactionContext};
use crate::registry::AggregateDescriptor;
use crate::snapshot_transformer::SnapshotTransformer;
use std::collections::HashSet;
use std::sync::Arc;

/// 构建选项
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// 返回已删除的聚合（默认视为不存在）
    pub return_deleted: bool,
    /// 跳过快照路径，直接重放事件日志
    pub skip_snapshot: bool,
}

pub struct AggregateFactory<A: Aggregate> {
    store: EventStore,
    descriptor: Arc<AggregateDescriptor<A>>,
    applier: DomainEventApplier<A>,
    query_service: Option<Arc<dyn AggregateQueryService>>,
}

impl<A: Aggregate> AggregateFactory<A> {
    pub fn new(store: EventStore) -> DomainResult<Self> {
        let descriptor = store.registry().aggregate::<A>()?;
        Ok(Self {
            applier: DomainEventApplier::from_descriptor(descriptor.clone()),
            descriptor,
            store,
            query_service: None,
        })
    }

    /// 外部聚合的事件来源
    pub fn with_query_service(mut self, query_service: Arc<dyn AggregateQueryService>) -> Self {
        self.query_service = Some(query_service);
        self
    }

    pub async fn build(
        &self,
        tx: Option<&TransactionContext>,
        aggregate_id: &str,
        options: BuildOptions,
    ) -> DomainResult<Option<A>> {
        let mut aggregate = None;

        if self.descriptor.snapshot_metadata().is_some() && !options.skip_snapshot {
            match self.build_from_latest_snapshot(tx, aggregate_id).await {
                Ok(found) => aggregate = found,
                Err(err) => tracing::warn!(
                    aggregate_type = A::TYPE,
                    aggregate_id,
                    error = %err,
                    "failed to build from snapshot; falling back to event log"
                ),
            }
        }

        if aggregate.is_none() {
            aggregate = self.build_from_event_log(tx, aggregate_id, None).await?;
        }

        Ok(aggregate.filter(|a| options.return_deleted || !a.is_deleted()))
    }

    /// 重放事件日志；`to_sequence_number` 截断到指定序号（含）
    pub async fn build_from_event_log(
        &self,
        tx: Option<&TransactionContext>,
        aggregate_id: &str,
        to_sequence_number: Option<u64>,
    ) -> DomainResult<Option<A>> {
        // 序号从 1 开始，截断到 0 即没有可重放的事件
        if to_sequence_number == Some(0) {
            return Ok(None);
        }

        let key = self.store.key_for(&self.descriptor, aggregate_id);
        let mut events = self
            .store
            .events()
            .get_aggregate_domain_events(tx, &key, None)
            .await?;

        if !self.descriptor.metadata().is_internal && is_incomplete(&events) {
            events = self.fetch_external_events(tx, &key, &events).await;
        }

        if events.is_empty() {
            return Ok(None);
        }
        events.sort_by_key(SerializedDomainEvent::sequence_number);

        if let Some(to) = to_sequence_number {
            let max = events
                .last()
                .map(SerializedDomainEvent::sequence_number)
                .unwrap_or(0);
            if to > max {
                return Err(DomainError::SequenceNumberOutOfRange { requested: to, max });
            }
            events.retain(|e| e.sequence_number() <= to);
        }

        let mut aggregate = A::default();
        aggregate.root_mut().set_id(aggregate_id);
        self.apply_all(&mut aggregate, &events)?;

        if to_sequence_number.is_none() {
            self.snapshot_if_due(tx, &key, &aggregate, None).await;
        }
        Ok(Some(aggregate))
    }

    /// 从最新快照还原并只应用其后的事件
    pub async fn build_from_latest_snapshot(
        &self,
        tx: Option<&TransactionContext>,
        aggregate_id: &str,
    ) -> DomainResult<Option<A>> {
        let Some(repository) = self.store.snapshots() else {
            return Ok(None);
        };
        let key = self.store.key_for(&self.descriptor, aggregate_id);
        let Some(snapshot) = repository.get_latest_snapshot(tx, &key).await? else {
            return Ok(None);
        };

        let mut aggregate = SnapshotTransformer::restore_from_snapshot::<A>(&snapshot)?;
        let tail = self
            .store
            .events()
            .get_aggregate_domain_events(
                tx,
                &key,
                Some(snapshot.domain_event_sequence_number() + 1),
            )
            .await?;
        self.apply_all(&mut aggregate, &tail)?;

        self.snapshot_if_due(
            tx,
            &key,
            &aggregate,
            Some(snapshot.domain_event_sequence_number()),
        )
        .await;
        Ok(Some(aggregate))
    }

    fn apply_all(&self, aggregate: &mut A, events: &[SerializedDomainEvent]) -> DomainResult<()> {
        for serialized in events {
            // 未注册的事件以原始负载应用，保证序号连续
            let event = self.store.registry().deserialize_or_raw(serialized)?;
            self.applier.apply(aggregate, &event)?;
        }
        Ok(())
    }

    async fn fetch_external_events(
        &self,
        tx: Option<&TransactionContext>,
        key: &AggregateKey,
        cached: &[SerializedDomainEvent],
    ) -> Vec<SerializedDomainEvent> {
        let Some(query_service) = &self.query_service else {
            tracing::debug!(
                aggregate = %key,
                "no query service configured for external aggregate; using local cache"
            );
            return cached.to_vec();
        };

        let remote = match query_service
            .get_domain_events_for_aggregate(
                &key.origin,
                &key.aggregate_type,
                &key.aggregate_id,
                key.tenant_id.as_deref(),
            )
            .await
        {
            Ok(remote) => remote,
            Err(err) => {
                tracing::warn!(aggregate = %key, error = %err, "failed to fetch external domain events");
                return Vec::new();
            }
        };

        let known: HashSet<u64> = cached.iter().map(|e| e.sequence_number()).collect();
        let missing: Vec<SerializedDomainEvent> = remote
            .iter()
            .filter(|e| !known.contains(&e.sequence_number()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            if let Err(err) = self.store.events().save_domain_events(tx, &missing).await {
                tracing::warn!(
                    aggregate = %key,
                    count = missing.len(),
                    error = %err,
                    "failed to cache external domain events"
                );
            }
        }
        remote
    }

    async fn snapshot_if_due(
        &self,
        tx: Option<&TransactionContext>,
        key: &AggregateKey,
        aggregate: &A,
        last_snapshot: Option<u64>,
    ) {
        let Some(snapshot_metadata) = self.descriptor.snapshot_metadata() else {
            return;
        };

        let last = match last_snapshot {
            Some(last) => last,
            None => match self.store.latest_snapshot_sequence_number(tx, key).await {
                Ok(last) => last,
                Err(err) => {
                    tracing::warn!(aggregate = %key, error = %err, "failed to read latest snapshot");
                    return;
                }
            },
        };

        if snapshot_metadata.is_due(aggregate.current_sequence_number(), last) {
            self.store
                .save_verified_snapshot(tx, &self.descriptor, aggregate)
                .await;
        }
    }
}

// 本地缓存为空，或最后一个序号与事件数不符（存在缺口）
fn is_incomplete(events: &[SerializedDomainEvent]) -> bool {
    events
        .iter()
        .map(SerializedDomainEvent::sequence_number)
        .max()
        .is_none_or(|last| last != events.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(seq: u64) -> SerializedDomainEvent {
        SerializedDomainEvent::builder()
            .origin("crm".into())
            .aggregate_type("customer".into())
            .event_type("Touched".into())
            .version(1)
            .id(format!("e{seq}"))
            .aggregate_id("c-1".into())
            .payload(serde_json::Value::Null)
            .sequence_number(seq)
            .timestamp(chrono::Utc::now())
            .build()
    }

    #[test]
    fn cache_completeness() {
        assert!(is_incomplete(&[]));
        assert!(!is_incomplete(&[event(1), event(2)]));
        assert!(is_incomplete(&[event(1), event(3)]));
        assert!(is_incomplete(&[event(2)]));
    }
}
