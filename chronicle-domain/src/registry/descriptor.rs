use crate::aggregate::Aggregate;
use crate::config::DEFAULT_SNAPSHOT_INTERVAL;
use crate::domain_event::{DomainEvent, EventPayload, EventSchema};
use crate::error::DomainResult;
use crate::registry::EventRegistration;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// 聚合元数据：类型、是否为本服务内部聚合、解析后的来源
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateMetadata {
    pub aggregate_type: String,
    pub is_internal: bool,
    pub origin: String,
}

/// 快照元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SnapshotMetadata {
    pub snapshot_interval: u64,
}

impl SnapshotMetadata {
    pub fn new(snapshot_interval: u64) -> Self {
        Self {
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// 提交后是否落快照：序号为间隔的整数倍
    pub fn should_snapshot_at(&self, sequence_number: u64) -> bool {
        sequence_number > 0 && sequence_number.is_multiple_of(self.snapshot_interval)
    }

    /// 重建后是否落快照：距上次快照已达到间隔（无快照视为 0）
    pub fn is_due(&self, current_sequence_number: u64, last_snapshot_sequence_number: u64) -> bool {
        current_sequence_number.saturating_sub(last_snapshot_sequence_number)
            >= self.snapshot_interval
    }
}

impl Default for SnapshotMetadata {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_INTERVAL)
    }
}

type Applier<A> = Arc<dyn Fn(&mut A, &DomainEvent) -> DomainResult<()> + Send + Sync>;

pub(crate) struct SnapshotSetting<A> {
    pub(crate) interval: Option<u64>,
    pub(crate) equals: fn(&A, &A) -> bool,
}

/// 聚合描述：在 `Aggregate::describe` 中声明，注册后只读共享
///
/// ```ignore
/// fn describe(d: &mut AggregateDescriptor<Self>) {
///     d.snapshotable()
///         .include(describe_soft_delete)
///         .on::<UserCreated>(|user, _, p| user.username = p.username.clone());
/// }
/// ```
pub struct AggregateDescriptor<A: Aggregate> {
    external_origin: Option<String>,
    pub(crate) snapshot: Option<SnapshotSetting<A>>,
    appliers: HashMap<EventSchema, Vec<Applier<A>>>,
    pub(crate) events: Vec<EventRegistration>,
    metadata: AggregateMetadata,
    snapshot_metadata: Option<SnapshotMetadata>,
}

impl<A: Aggregate> AggregateDescriptor<A> {
    pub(crate) fn new() -> Self {
        Self {
            external_origin: None,
            snapshot: None,
            appliers: HashMap::new(),
            events: Vec::new(),
            metadata: AggregateMetadata {
                aggregate_type: A::TYPE.to_string(),
                is_internal: true,
                origin: String::new(),
            },
            snapshot_metadata: None,
        }
    }

    /// 声明为外部聚合：事件由 `origin` 所属服务产生，本地仅缓存
    pub fn external(&mut self, origin: impl Into<String>) -> &mut Self {
        self.external_origin = Some(origin.into());
        self
    }

    /// 注册事件应用器；同一事件可注册多个，按注册顺序执行
    pub fn on<P>(&mut self, applier: impl Fn(&mut A, &DomainEvent, &P) + Send + Sync + 'static) -> &mut Self
    where
        P: EventPayload,
    {
        let wrapped: Applier<A> = Arc::new(move |aggregate, event| {
            let payload = event.payload_as::<P>()?;
            applier(aggregate, event, payload);
            Ok(())
        });
        self.appliers.entry(P::schema()).or_default().push(wrapped);
        if !self.events.iter().any(|e| e.schema == P::schema()) {
            self.events.push(EventRegistration::of::<P>());
        }
        self
    }

    /// 合并共享的描述函数（其应用器并入同一张表）
    pub fn include(&mut self, describe: impl FnOnce(&mut Self)) -> &mut Self {
        describe(self);
        self
    }

    // 注册时由 Registry 调用：解析 origin 与快照间隔
    pub(crate) fn finalize(&mut self, service_origin: &str, default_interval: u64) {
        self.metadata.is_internal = self.external_origin.is_none();
        self.metadata.origin = self
            .external_origin
            .clone()
            .unwrap_or_else(|| service_origin.to_string());
        self.snapshot_metadata = self
            .snapshot
            .as_ref()
            .map(|s| SnapshotMetadata::new(s.interval.unwrap_or(default_interval)));
    }

    pub fn metadata(&self) -> &AggregateMetadata {
        &self.metadata
    }

    pub fn snapshot_metadata(&self) -> Option<&SnapshotMetadata> {
        self.snapshot_metadata.as_ref()
    }

    pub(crate) fn snapshot_equals(&self) -> Option<fn(&A, &A) -> bool> {
        self.snapshot.as_ref().map(|s| s.equals)
    }

    pub(crate) fn appliers_for(&self, schema: &EventSchema) -> &[Applier<A>] {
        self.appliers.get(schema).map(Vec::as_slice).unwrap_or_default()
    }
}

impl<A: Aggregate + PartialEq> AggregateDescriptor<A> {
    /// 可快照，使用默认间隔；要求状态可比较以便做往返校验
    pub fn snapshotable(&mut self) -> &mut Self {
        self.snapshot = Some(SnapshotSetting {
            interval: None,
            equals: <A as PartialEq>::eq,
        });
        self
    }

    pub fn snapshot_every(&mut self, interval: u64) -> &mut Self {
        self.snapshot = Some(SnapshotSetting {
            interval: Some(interval),
            equals: <A as PartialEq>::eq,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_due_after_interval_since_last() {
        let meta = SnapshotMetadata::new(10);
        assert!(!meta.is_due(5, 0));
        assert!(meta.is_due(25, 10));
        assert!(!meta.is_due(10, 10));
        assert!(meta.is_due(10, 0));
    }

    #[test]
    fn commit_snapshot_on_multiples() {
        let meta = SnapshotMetadata::new(3);
        for seq in 0..=9 {
            assert_eq!(meta.should_snapshot_at(seq), seq > 0 && seq % 3 == 0);
        }
        assert_eq!(SnapshotMetadata::new(0).snapshot_interval, 1);
    }
}
