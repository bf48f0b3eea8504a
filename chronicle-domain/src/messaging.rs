//! 消息端口（messaging）
//!
//! - `MessageProducer`：向通道发布消息，可声明支持事务内发布（outbox）；
//! - `MessageConsumer`：为通道注册消费者回调；
//! - `InboundMessageMapper`/`OutboundMessageMapper`：消息与 `SerializedDomainEvent` 互转。
//!
//! 通道与消费者 ID 默认分别为 `origin.aggregate_type` 与 `origin.aggregate_type.consumer_name`。
//!
use crate::domain_event::SerializedDomainEvent;
use crate::error::DomainResult;
use crate::persist::TransactionContext;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type MessageFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// 消费者回调：逐条处理消息，完成后才会投递下一条
pub type MessageCallback<M> = Arc<dyn Fn(M) -> MessageFuture + Send + Sync>;

pub fn default_channel_id(origin: &str, aggregate_type: &str) -> String {
    format!("{origin}.{aggregate_type}")
}

#[async_trait]
pub trait MessageProducer<M>: Send + Sync
where
    M: Send + 'static,
{
    fn channel_id(&self, origin: &str, aggregate_type: &str) -> String {
        default_channel_id(origin, aggregate_type)
    }

    /// 是否支持在存储事务内发布
    fn supports_transactions(&self) -> bool {
        false
    }

    async fn publish_messages(
        &self,
        tx: Option<&TransactionContext>,
        channel_id: &str,
        messages: Vec<M>,
    ) -> DomainResult<()>;
}

#[async_trait]
pub trait MessageConsumer<M>: Send + Sync
where
    M: Send + 'static,
{
    fn channel_id(&self, origin: &str, aggregate_type: &str) -> String {
        default_channel_id(origin, aggregate_type)
    }

    fn consumer_id(&self, origin: &str, aggregate_type: &str, consumer_name: &str) -> String {
        format!("{origin}.{aggregate_type}.{consumer_name}")
    }

    async fn register_consumer(
        &self,
        channel_id: &str,
        consumer_id: &str,
        on_message: MessageCallback<M>,
    ) -> DomainResult<()>;
}

pub trait InboundMessageMapper<M>: Send + Sync {
    fn to_serialized_event(&self, message: &M) -> DomainResult<SerializedDomainEvent>;
}

pub trait OutboundMessageMapper<M>: Send + Sync {
    fn to_message(&self, event: &SerializedDomainEvent) -> DomainResult<M>;

    fn to_messages(&self, events: &[SerializedDomainEvent]) -> DomainResult<Vec<M>> {
        events.iter().map(|e| self.to_message(e)).collect()
    }
}

/// 直接以 `SerializedDomainEvent` 作为消息
#[derive(Debug, Clone, Copy, Default)]
pub struct SerializedEventMapper;

impl InboundMessageMapper<SerializedDomainEvent> for SerializedEventMapper {
    fn to_serialized_event(&self, message: &SerializedDomainEvent) -> DomainResult<SerializedDomainEvent> {
        Ok(message.clone())
    }
}

impl OutboundMessageMapper<SerializedDomainEvent> for SerializedEventMapper {
    fn to_message(&self, event: &SerializedDomainEvent) -> DomainResult<SerializedDomainEvent> {
        Ok(event.clone())
    }
}

/// JSON 字节消息
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMessageMapper;

impl InboundMessageMapper<Vec<u8>> for JsonMessageMapper {
    fn to_serialized_event(&self, message: &Vec<u8>) -> DomainResult<SerializedDomainEvent> {
        Ok(serde_json::from_slice(message)?)
    }
}

impl OutboundMessageMapper<Vec<u8>> for JsonMessageMapper {
    fn to_message(&self, event: &SerializedDomainEvent) -> DomainResult<Vec<u8>> {
        Ok(serde_json::to_vec(event)?)
    }
}
