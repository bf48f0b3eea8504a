//! 消费管线（DomainEventConsumer）
//!
//! 每条入站消息：映射 → 反序列化（未知 schema 记录告警并丢弃）→ 事务内：
//! 已消费检查（默认跳过）→ 外部聚合事件写入本地缓存 → 标记已消费 → 调用处理器。
//! 处理器失败回滚事务，按固定间隔有限次重试，最终记录错误并丢弃。
//!
use crate::config::ConsumerConfig;
use crate::domain_event::{DomainEvent, SerializedDomainEvent};
use crate::error::{DomainError, DomainResult};
use crate::eventing::DomainEventHandler;
use crate::messaging::{InboundMessageMapper, MessageCallback, MessageConsumer, MessageFuture};
use crate::persist::{
    AggregateKey, ConsumedMessageRepository, DomainEventRepository, TransactionContext,
    TransactionManager,
};
use crate::registry::Registry;
use crate::transaction::TransactionCoordinator;
use bon::Builder;
use std::sync::Arc;
use std::time::Duration;

/// 单个消费者的处理选项
#[derive(Debug, Clone, Default)]
pub struct ConsumeOptions {
    /// 已消费的消息仍交给处理器（不会重复标记）
    pub process_consumed_messages: bool,
    /// 不把外部聚合事件写入本地缓存
    pub skip_persistence: bool,
    /// 复用调用方的事务；此时不再重试
    pub transaction: Option<TransactionContext>,
    /// 覆盖管线默认的重试配置
    pub retry: Option<ConsumerConfig>,
}

/// 单条消息的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Processed,
    /// 已被该消费者处理过
    Skipped,
    /// schema 未注册
    Unknown,
    /// 映射或解码失败
    Dropped,
    /// 重试耗尽
    Failed { attempts: u32 },
}

#[derive(Builder)]
pub struct DomainEventConsumer<M: Send + 'static> {
    registry: Arc<Registry>,
    events: Arc<dyn DomainEventRepository>,
    consumed: Arc<dyn ConsumedMessageRepository>,
    transactions: Arc<dyn TransactionManager>,
    mapper: Arc<dyn InboundMessageMapper<M>>,
    consumer: Arc<dyn MessageConsumer<M>>,
    #[builder(default)]
    config: ConsumerConfig,
}

impl<M: Send + 'static> Clone for DomainEventConsumer<M> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            events: self.events.clone(),
            consumed: self.consumed.clone(),
            transactions: self.transactions.clone(),
            mapper: self.mapper.clone(),
            consumer: self.consumer.clone(),
            config: self.config,
        }
    }
}

impl<M: Send + Sync + 'static> DomainEventConsumer<M> {
    /// 订阅 `origin.aggregate_type` 通道；返回消费者 ID
    pub async fn register(
        &self,
        origin: &str,
        aggregate_type: &str,
        consumer_name: &str,
        handler: Arc<dyn DomainEventHandler>,
        options: ConsumeOptions,
    ) -> DomainResult<String> {
        let channel_id = self.consumer.channel_id(origin, aggregate_type);
        let consumer_id = self
            .consumer
            .consumer_id(origin, aggregate_type, consumer_name);

        let pipeline = self.clone();
        let callback_consumer_id = consumer_id.clone();
        let options = Arc::new(options);
        let callback: MessageCallback<M> = Arc::new(move |message: M| -> MessageFuture {
            let pipeline = pipeline.clone();
            let handler = handler.clone();
            let consumer_id = callback_consumer_id.clone();
            let options = options.clone();
            Box::pin(async move {
                pipeline
                    .consume(&consumer_id, message, handler.as_ref(), &options)
                    .await;
            })
        });

        self.consumer
            .register_consumer(&channel_id, &consumer_id, callback)
            .await?;
        tracing::debug!(channel_id, consumer_id, "domain event consumer registered");
        Ok(consumer_id)
    }

    pub async fn consume(
        &self,
        consumer_id: &str,
        message: M,
        handler: &dyn DomainEventHandler,
        options: &ConsumeOptions,
    ) -> ConsumeOutcome {
        let serialized = match self.mapper.to_serialized_event(&message) {
            Ok(serialized) => serialized,
            Err(err) => {
                tracing::warn!(consumer_id, error = %err, "failed to map inbound message; dropping");
                return ConsumeOutcome::Dropped;
            }
        };

        let event = match self.registry.deserialize(&serialized) {
            Ok(Some(event)) => event,
            Ok(None) => {
                tracing::warn!(
                    consumer_id,
                    event_id = serialized.id(),
                    schema = %serialized.schema(),
                    "unknown domain event; dropping"
                );
                return ConsumeOutcome::Unknown;
            }
            Err(err) => {
                tracing::warn!(
                    consumer_id,
                    event_id = serialized.id(),
                    error = %err,
                    "failed to decode domain event; dropping"
                );
                return ConsumeOutcome::Dropped;
            }
        };

        let retry = options.retry.unwrap_or(self.config);
        let max_attempts = if options.transaction.is_some() {
            1
        } else {
            retry.retry_attempts.max(1)
        };
        let coordinator = TransactionCoordinator::new(self.transactions.clone());

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = coordinator
                .run(options.transaction.as_ref(), |tx| {
                    self.process(tx, consumer_id, &serialized, &event, handler, options)
                })
                .await;

            match result {
                Ok(true) => return ConsumeOutcome::Processed,
                Ok(false) => return ConsumeOutcome::Skipped,
                Err(err) if attempt < max_attempts => {
                    tracing::warn!(
                        consumer_id,
                        event_id = event.id(),
                        attempt,
                        error = %err,
                        "failed to consume domain event; retrying"
                    );
                    tokio::time::sleep(retry.retry_delay()).await;
                }
                Err(err) => {
                    tracing::error!(
                        consumer_id,
                        event_id = event.id(),
                        attempts = attempt,
                        error = %err,
                        "failed to consume domain event; dropping"
                    );
                    return ConsumeOutcome::Failed { attempts: attempt };
                }
            }
        }
    }

    // 返回 false 表示已消费而跳过
    async fn process(
        &self,
        tx: TransactionContext,
        consumer_id: &str,
        serialized: &SerializedDomainEvent,
        event: &DomainEvent,
        handler: &dyn DomainEventHandler,
        options: &ConsumeOptions,
    ) -> DomainResult<bool> {
        let consumed = self
            .consumed
            .check_if_message_is_consumed(Some(&tx), event.id(), consumer_id)
            .await?;
        if consumed && !options.process_consumed_messages {
            tracing::debug!(consumer_id, event_id = event.id(), "message already consumed; skipping");
            return Ok(false);
        }

        if !options.skip_persistence
            && !self.registry.is_internal(event.origin(), event.aggregate_type())
        {
            let key = AggregateKey::of_event(serialized);
            let cached = self
                .events
                .get_aggregate_domain_events(Some(&tx), &key, Some(event.sequence_number()))
                .await?;
            if !cached.iter().any(|e| e.id() == event.id()) {
                self.events
                    .save_domain_events(Some(&tx), std::slice::from_ref(serialized))
                    .await?;
            }
        }

        if !consumed {
            self.consumed
                .mark_message_as_consumed(Some(&tx), event.id(), consumer_id)
                .await?;
        }

        handler
            .handle(&tx, event)
            .await
            .map_err(|err| DomainError::EventHandler {
                handler: handler.handler_name().to_string(),
                reason: format!("{err:#}"),
            })?;
        Ok(true)
    }
}

/// 轮询直到消息被指定消费者处理（无超时，测试用）
pub async fn wait_until_consumed(
    repository: &dyn ConsumedMessageRepository,
    domain_event_id: &str,
    consumer_id: &str,
    interval: Duration,
) -> DomainResult<()> {
    while !repository
        .check_if_message_is_consumed(None, domain_event_id, consumer_id)
        .await?
    {
        tokio::time::sleep(interval).await;
    }
    Ok(())
}
