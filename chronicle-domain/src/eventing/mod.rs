//! 事件消费子系统（eventing）
//!
//! - `DomainEventHandler`：在事务内处理一条领域事件；
//! - `DomainEventConsumer`：映射、去重、缓存外部事件、调用处理器并按配置重试；
//! - `InMemoryMessageBus`：基于广播通道的进程内生产者/消费者实现。
//!
pub mod bus_inmemory;
pub mod consumer;
pub mod handler;

pub use bus_inmemory::InMemoryMessageBus;
pub use consumer::{ConsumeOptions, ConsumeOutcome, DomainEventConsumer, wait_until_consumed};
pub use handler::DomainEventHandler;
