//! 持久化端口（persist）
//!
//! 引擎只依赖以下端口，具体存储/查询实现由上层注入：
//! - `DomainEventRepository`：按聚合读写事件日志；
//! - `SnapshotRepository`：读写最新快照；
//! - `ConsumedMessageRepository`：消费幂等见证；
//! - `TransactionManager`：开启/提交/回滚事务，`TransactionContext` 为不透明句柄；
//! - `AggregateQueryService`：向聚合所属服务拉取外部聚合的事件。
//!
//! `InMemoryStorage` 实现了前四个端口，供测试与本地开发使用。
//!
mod in_memory;
mod query;
mod repository;
mod snapshot;
mod transaction;

pub use in_memory::InMemoryStorage;
pub use query::AggregateQueryService;
pub use repository::{ConsumedMessageRepository, DomainEventRepository, SnapshotRepository};
pub use snapshot::Snapshot;
pub use transaction::{TransactionContext, TransactionManager};

use crate::domain_event::SerializedDomainEvent;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// 聚合事件流的地址
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateKey {
    pub origin: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl AggregateKey {
    pub fn new(
        origin: impl Into<String>,
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        tenant_id: Option<String>,
    ) -> Self {
        Self {
            origin: origin.into(),
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            tenant_id,
        }
    }

    pub fn of_event(event: &SerializedDomainEvent) -> Self {
        Self::new(
            event.origin(),
            event.aggregate_type(),
            event.aggregate_id(),
            event.tenant_id().map(str::to_string),
        )
    }

    pub fn matches(&self, event: &SerializedDomainEvent) -> bool {
        self.origin == event.origin()
            && self.aggregate_type == event.aggregate_type()
            && self.aggregate_id == event.aggregate_id()
            && self.tenant_id.as_deref() == event.tenant_id()
    }
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}/{}",
            self.origin, self.aggregate_type, self.aggregate_id
        )?;
        if let Some(tenant) = &self.tenant_id {
            write!(f, "@{tenant}")?;
        }
        Ok(())
    }
}

// 锁中毒时继续使用内部数据：持有者只做内存拷贝，不会留下半写状态
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
