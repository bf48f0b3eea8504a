//! 聚合管理器（AggregateManager）
//!
//! 提交聚合的暂存事件：
//! 1. 写入提交上下文（租户、关联 ID、触发者、元数据）并序列化；
//! 2. 在同一事务内批量持久化；生产者支持事务时同时发布（outbox）；
//! 3. 事务提交后再做非事务发布；
//! 4. 触发 `on_commit`、清空暂存区，并按间隔落快照。
//!
use crate::aggregate::Aggregate;
use crate::domain_event::{CommitStamp, DomainEvent, SerializedDomainEvent};
use crate::error::{DomainError, DomainResult};
use crate::event_store::EventStore;
use crate::messaging::{MessageProducer, OutboundMessageMapper};
use crate::persist::{TransactionContext, TransactionManager};
use crate::registry::AggregateDescriptor;
use crate::transaction::TransactionCoordinator;
use bon::Builder;
use serde_json::Value;
use std::sync::Arc;

/// 提交选项
#[derive(Debug, Clone, Default, Builder)]
pub struct CommitOptions {
    pub correlation_id: Option<String>,
    pub triggered_by_user_id: Option<String>,
    pub triggered_by_event_id: Option<String>,
    pub metadata: Option<Value>,
}

struct Publisher<M: Send + 'static> {
    producer: Arc<dyn MessageProducer<M>>,
    mapper: Arc<dyn OutboundMessageMapper<M>>,
}

pub struct AggregateManager<A: Aggregate, M = SerializedDomainEvent>
where
    M: Send + 'static,
{
    store: EventStore,
    descriptor: Arc<AggregateDescriptor<A>>,
    transactions: TransactionCoordinator,
    publisher: Option<Publisher<M>>,
}

impl<A, M> AggregateManager<A, M>
where
    A: Aggregate,
    M: Clone + Send + Sync + 'static,
{
    /// 生产者与映射器必须同时提供或同时省略
    pub fn new(
        store: EventStore,
        transactions: Arc<dyn TransactionManager>,
        producer: Option<Arc<dyn MessageProducer<M>>>,
        mapper: Option<Arc<dyn OutboundMessageMapper<M>>>,
    ) -> DomainResult<Self> {
        let publisher = match (producer, mapper) {
            (Some(producer), Some(mapper)) => Some(Publisher { producer, mapper }),
            (None, None) => None,
            _ => return Err(DomainError::MissingProducerOrMapper),
        };

        Ok(Self {
            descriptor: store.registry().aggregate::<A>()?,
            store,
            transactions: TransactionCoordinator::new(transactions),
            publisher,
        })
    }

    pub async fn commit_staged_domain_events(
        &self,
        tx: Option<&TransactionContext>,
        aggregate: &mut A,
        options: CommitOptions,
    ) -> DomainResult<Vec<SerializedDomainEvent>> {
        let staged: Vec<DomainEvent> = aggregate.root().staged_domain_events().cloned().collect();
        if staged.is_empty() {
            tracing::debug!(aggregate_type = A::TYPE, "no staged domain events to commit");
            return Ok(Vec::new());
        }

        let stamp = CommitStamp {
            tenant_id: self.store.tenant_id().map(str::to_string),
            correlation_id: options.correlation_id,
            triggered_by_event_id: options.triggered_by_event_id,
            triggered_by_user_id: options.triggered_by_user_id,
            metadata: options.metadata,
        };
        let events: Vec<DomainEvent> = staged
            .into_iter()
            .map(|mut event| {
                event.stamp(&stamp);
                event
            })
            .collect();
        let serialized = events
            .iter()
            .map(DomainEvent::to_serialized)
            .collect::<DomainResult<Vec<_>>>()?;

        let metadata = self.descriptor.metadata();
        let outgoing = match &self.publisher {
            Some(publisher) => Some((
                publisher,
                publisher
                    .producer
                    .channel_id(&metadata.origin, &metadata.aggregate_type),
                publisher.mapper.to_messages(&serialized)?,
            )),
            None => None,
        };

        let events_repository = self.store.events();
        let serialized_ref = &serialized;
        let outgoing_ref = &outgoing;
        self.transactions
            .run(tx, |tx| async move {
                events_repository
                    .save_domain_events(Some(&tx), serialized_ref)
                    .await?;
                if let Some((publisher, channel_id, messages)) = outgoing_ref {
                    if publisher.producer.supports_transactions() {
                        publisher
                            .producer
                            .publish_messages(Some(&tx), channel_id, messages.clone())
                            .await?;
                    }
                }
                Ok(())
            })
            .await?;

        if let Some((publisher, channel_id, messages)) = outgoing {
            if !publisher.producer.supports_transactions() {
                publisher
                    .producer
                    .publish_messages(None, &channel_id, messages)
                    .await?;
            }
        }

        for event in &events {
            event.notify_commit();
        }
        aggregate.root_mut().clear_staged();

        tracing::debug!(
            aggregate_type = A::TYPE,
            aggregate_id = aggregate.id().unwrap_or_default(),
            count = serialized.len(),
            "committed staged domain events"
        );

        let snapshot_due = self
            .descriptor
            .snapshot_metadata()
            .is_some_and(|m| m.should_snapshot_at(aggregate.current_sequence_number()));
        if snapshot_due {
            self.store
                .save_verified_snapshot(tx, &self.descriptor, aggregate)
                .await;
        }

        Ok(serialized)
    }
}
