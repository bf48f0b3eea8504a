use crate::domain_event::DomainEvent;
use crate::error::DomainResult;
use serde::{Serialize, de::DeserializeOwned};
use std::fmt;

/// 事件种类的身份：(origin, aggregate_type, type, version)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, serde::Deserialize)]
pub struct EventSchema {
    pub origin: String,
    pub aggregate_type: String,
    pub event_type: String,
    pub version: u32,
}

impl EventSchema {
    pub fn new(
        origin: impl Into<String>,
        aggregate_type: impl Into<String>,
        event_type: impl Into<String>,
        version: u32,
    ) -> Self {
        Self {
            origin: origin.into(),
            aggregate_type: aggregate_type.into(),
            event_type: event_type.into(),
            version,
        }
    }
}

impl fmt::Display for EventSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}@v{}",
            self.origin, self.aggregate_type, self.event_type, self.version
        )
    }
}

/// 事件类型常量（通常由 `#[domain_event(...)]` 生成）
pub trait EventType {
    const ORIGIN: &'static str;
    const AGGREGATE_TYPE: &'static str;
    const EVENT_TYPE: &'static str;
    const VERSION: u32;

    fn schema() -> EventSchema {
        EventSchema::new(
            Self::ORIGIN,
            Self::AGGREGATE_TYPE,
            Self::EVENT_TYPE,
            Self::VERSION,
        )
    }
}

/// 事件负载
///
/// 生命周期钩子在对应迁移时各调用一次：
/// - `on_create`：事件创建后立即调用，可拒绝非法负载（返回 `InvalidPayload` 等）；
/// - `on_stage`：进入聚合暂存区，此时已分配序号；
/// - `on_commit`：持久化（及发布）完成后；
/// - `on_apply`：应用到聚合状态之后。
pub trait EventPayload:
    EventType + Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static
{
    fn on_create(&self, _event: &DomainEvent) -> DomainResult<()> {
        Ok(())
    }

    fn on_stage(&self, _event: &DomainEvent) {}

    fn on_commit(&self, _event: &DomainEvent) {}

    fn on_apply(&self, _event: &DomainEvent) {}
}
