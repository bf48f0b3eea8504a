//! 内存版消息总线（InMemoryMessageBus）
//!
//! 基于 `tokio::sync::broadcast` 的按通道广播，同时实现 `MessageProducer` 与 `MessageConsumer`：
//! - 每个通道一个广播发送端，首次发布或订阅时创建；
//! - 每个消费者在独立任务中按序调用回调，回调完成后才处理下一条；
//! - 同一消费者 ID 只能注册一次；
//! - `shutdown` 取消所有消费任务。
//!
//! 注意：发布时通道无订阅者则消息被丢弃；消费者落后超过缓冲区容量时会丢失消息并记录告警。
//!
use crate::domain_event::SerializedDomainEvent;
use crate::error::{DomainError, DomainResult};
use crate::messaging::{MessageCallback, MessageConsumer, MessageProducer};
use crate::persist::TransactionContext;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::CancellationToken;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct InMemoryMessageBus<M = SerializedDomainEvent> {
    channels: Arc<DashMap<String, broadcast::Sender<M>>>,
    consumers: Arc<DashMap<String, String>>,
    token: CancellationToken,
    capacity: usize,
}

impl<M: Clone + Send + 'static> Default for InMemoryMessageBus<M> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<M: Clone + Send + 'static> InMemoryMessageBus<M> {
    /// `capacity` 为每个通道的广播缓冲区容量
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            consumers: Arc::new(DashMap::new()),
            token: CancellationToken::new(),
            capacity: capacity.max(1),
        }
    }

    /// 停止所有消费任务
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    fn sender(&self, channel_id: &str) -> broadcast::Sender<M> {
        self.channels
            .entry(channel_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

#[async_trait]
impl<M: Clone + Send + Sync + 'static> MessageProducer<M> for InMemoryMessageBus<M> {
    async fn publish_messages(
        &self,
        _tx: Option<&TransactionContext>,
        channel_id: &str,
        messages: Vec<M>,
    ) -> DomainResult<()> {
        if self.is_shutdown() {
            return Err(DomainError::message_broker("message bus is shut down"));
        }

        let sender = self.sender(channel_id);
        let count = messages.len();
        for message in messages {
            // 无订阅者时 send 返回错误，视为非致命
            let _ = sender.send(message);
        }
        tracing::trace!(channel_id, count, "published messages");
        Ok(())
    }
}

#[async_trait]
impl<M: Clone + Send + Sync + 'static> MessageConsumer<M> for InMemoryMessageBus<M> {
    async fn register_consumer(
        &self,
        channel_id: &str,
        consumer_id: &str,
        on_message: MessageCallback<M>,
    ) -> DomainResult<()> {
        match self.consumers.entry(consumer_id.to_string()) {
            Entry::Occupied(_) => {
                return Err(DomainError::AlreadyRegistered {
                    kind: "consumer",
                    key: consumer_id.to_string(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(channel_id.to_string());
            }
        }

        // 先订阅再启动任务，注册返回后发布的消息不会丢失
        let stream = BroadcastStream::new(self.sender(channel_id).subscribe());
        let token = self.token.clone();
        let channel_id = channel_id.to_string();
        let consumer_id = consumer_id.to_string();

        tokio::spawn(async move {
            tokio::pin!(stream);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    next = stream.next() => match next {
                        Some(Ok(message)) => on_message(message).await,
                        Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                            tracing::warn!(channel_id, consumer_id, skipped, "consumer lagged behind; messages lost");
                        }
                        None => break,
                    },
                }
            }
            tracing::debug!(channel_id, consumer_id, "consumer stopped");
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::MessageFuture;
    use std::sync::Mutex;
    use std::time::Duration;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, MessageCallback<u32>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: MessageCallback<u32> = Arc::new(move |message| -> MessageFuture {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().unwrap().push(message);
            })
        });
        (seen, callback)
    }

    async fn wait_for(seen: &Mutex<Vec<u32>>, len: usize) {
        for _ in 0..200 {
            if seen.lock().unwrap().len() >= len {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn delivers_in_order_per_channel() -> anyhow::Result<()> {
        let bus = InMemoryMessageBus::<u32>::new(16);
        let (seen, callback) = recorder();
        let (other, other_callback) = recorder();
        bus.register_consumer("shop.order", "shop.order.audit", callback)
            .await?;
        bus.register_consumer("shop.cart", "shop.cart.audit", other_callback)
            .await?;

        bus.publish_messages(None, "shop.order", vec![1, 2, 3]).await?;
        wait_for(&seen, 3).await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
        assert!(other.lock().unwrap().is_empty());
        bus.shutdown();
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_consumer_id_is_rejected() -> anyhow::Result<()> {
        let bus = InMemoryMessageBus::<u32>::new(4);
        let (_, callback) = recorder();
        bus.register_consumer("a.b", "a.b.c", callback.clone()).await?;

        match bus.register_consumer("a.b", "a.b.c", callback).await {
            Err(DomainError::AlreadyRegistered { kind: "consumer", .. }) => {}
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn publish_after_shutdown_fails() {
        let bus = InMemoryMessageBus::<u32>::default();
        bus.shutdown();
        assert!(bus.publish_messages(None, "a.b", vec![1]).await.is_err());
    }
}
