//! 事件处理器（DomainEventHandler）
//!
//! 在消费管线开启的事务内被调用；返回错误会回滚该事务并触发重试。
//!
use crate::domain_event::DomainEvent;
use crate::persist::TransactionContext;
use async_trait::async_trait;

#[async_trait]
pub trait DomainEventHandler: Send + Sync {
    /// 处理器名称（用于日志与错误标记）
    fn handler_name(&self) -> &str;

    async fn handle(&self, tx: &TransactionContext, event: &DomainEvent) -> anyhow::Result<()>;
}
