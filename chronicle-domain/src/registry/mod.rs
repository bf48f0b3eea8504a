//! 注册表（registry）
//!
//! 启动时一次性填充，之后以 `Arc<Registry>` 只读共享：
//! - 事件 schema → 负载解码器（重复注册报 `AlreadyRegistered`）；
//! - 聚合类型 → 元数据、快照策略与扁平化后的应用器表；
//! - (origin, aggregate_type) → 聚合元数据，供消费端判断事件是否属于内部聚合。
//!
//! 在 `describe` 中通过 `on::<P>()` 引用的事件会随聚合一并注册。
//!
mod descriptor;

pub use descriptor::{AggregateDescriptor, AggregateMetadata, SnapshotMetadata};

use crate::aggregate::Aggregate;
use crate::config::{DEFAULT_SNAPSHOT_INTERVAL, EngineConfig};
use crate::domain_event::{
    DomainEvent, ErasedPayload, EventPayload, EventSchema, SerializedDomainEvent, Typed,
};
use crate::error::{DomainError, DomainResult};
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

type PayloadDecoder = fn(Value) -> DomainResult<Arc<dyn ErasedPayload>>;

pub(crate) struct EventRegistration {
    pub(crate) schema: EventSchema,
    type_id: TypeId,
    type_name: &'static str,
    decode: PayloadDecoder,
}

impl EventRegistration {
    pub(crate) fn of<P: EventPayload>() -> Self {
        Self {
            schema: P::schema(),
            type_id: TypeId::of::<P>(),
            type_name: std::any::type_name::<P>(),
            decode: decode_payload::<P>,
        }
    }
}

fn decode_payload<P: EventPayload>(value: Value) -> DomainResult<Arc<dyn ErasedPayload>> {
    let payload: P = serde_json::from_value(value)?;
    Ok(Arc::new(Typed(payload)))
}

pub struct Registry {
    origin: String,
    default_snapshot_interval: u64,
    events: HashMap<EventSchema, EventRegistration>,
    event_types: HashMap<TypeId, EventSchema>,
    aggregates: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    aggregate_metadata: HashMap<(String, String), AggregateMetadata>,
}

impl Registry {
    /// `origin` 为本服务的来源标识
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            default_snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            events: HashMap::new(),
            event_types: HashMap::new(),
            aggregates: HashMap::new(),
            aggregate_metadata: HashMap::new(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let mut registry = Self::new(config.origin.clone());
        registry.default_snapshot_interval = config.default_snapshot_interval;
        registry
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn register_event<P: EventPayload>(&mut self) -> DomainResult<&mut Self> {
        let registration = EventRegistration::of::<P>();
        if self.event_types.contains_key(&registration.type_id) {
            return Err(DomainError::AlreadyRegistered {
                kind: "event",
                key: registration.type_name.to_string(),
            });
        }
        self.insert_event(registration)?;
        Ok(self)
    }

    pub fn register_aggregate<A: Aggregate>(&mut self) -> DomainResult<&mut Self> {
        let type_id = TypeId::of::<A>();
        if self.aggregates.contains_key(&type_id) {
            return Err(DomainError::AlreadyRegistered {
                kind: "aggregate",
                key: A::TYPE.to_string(),
            });
        }

        let mut descriptor = AggregateDescriptor::<A>::new();
        A::describe(&mut descriptor);
        descriptor.finalize(&self.origin, self.default_snapshot_interval);

        let metadata = descriptor.metadata().clone();
        let key = (metadata.origin.clone(), metadata.aggregate_type.clone());
        if self.aggregate_metadata.contains_key(&key) {
            return Err(DomainError::AlreadyRegistered {
                kind: "aggregate type",
                key: format!("{}.{}", key.0, key.1),
            });
        }

        // 应用器引用的事件随聚合注册；同一 Rust 类型已注册则跳过
        for registration in std::mem::take(&mut descriptor.events) {
            if !self.event_types.contains_key(&registration.type_id) {
                self.insert_event(registration)?;
            }
        }

        self.aggregate_metadata.insert(key, metadata);
        self.aggregates.insert(type_id, Arc::new(descriptor));
        Ok(self)
    }

    fn insert_event(&mut self, registration: EventRegistration) -> DomainResult<()> {
        if self.events.contains_key(&registration.schema) {
            return Err(DomainError::AlreadyRegistered {
                kind: "event schema",
                key: registration.schema.to_string(),
            });
        }
        self.event_types
            .insert(registration.type_id, registration.schema.clone());
        self.events
            .insert(registration.schema.clone(), registration);
        Ok(())
    }

    pub fn aggregate<A: Aggregate>(&self) -> DomainResult<Arc<AggregateDescriptor<A>>> {
        self.aggregates
            .get(&TypeId::of::<A>())
            .cloned()
            .and_then(|any| any.downcast::<AggregateDescriptor<A>>().ok())
            .ok_or_else(|| DomainError::MissingAggregateMetadata {
                aggregate: A::TYPE.to_string(),
            })
    }

    pub fn metadata_by_type(&self, origin: &str, aggregate_type: &str) -> Option<&AggregateMetadata> {
        self.aggregate_metadata
            .get(&(origin.to_string(), aggregate_type.to_string()))
    }

    /// 事件是否属于本服务的内部聚合（本地日志即权威，无需再缓存）
    pub fn is_internal(&self, origin: &str, aggregate_type: &str) -> bool {
        match self.metadata_by_type(origin, aggregate_type) {
            Some(metadata) => metadata.is_internal,
            None => origin == self.origin,
        }
    }

    pub fn is_registered(&self, schema: &EventSchema) -> bool {
        self.events.contains_key(schema)
    }

    /// 按 schema 还原事件；未注册的 schema 返回 `None`
    pub fn deserialize(&self, serialized: &SerializedDomainEvent) -> DomainResult<Option<DomainEvent>> {
        let Some(registration) = self.events.get(&serialized.schema()) else {
            return Ok(None);
        };
        let payload = (registration.decode)(serialized.payload().clone())?;
        Ok(Some(DomainEvent::from_serialized(serialized, payload)))
    }

    /// 同 `deserialize`，但未注册的 schema 以原始 JSON 负载保留
    pub fn deserialize_or_raw(&self, serialized: &SerializedDomainEvent) -> DomainResult<DomainEvent> {
        Ok(self
            .deserialize(serialized)?
            .unwrap_or_else(|| DomainEvent::raw(serialized)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_event::EventType;
    use chronicle_macros::{aggregate_root, domain_event};

    #[domain_event(origin = "billing", aggregate_type = "invoice")]
    struct InvoiceIssued {
        amount: u64,
    }

    #[domain_event(origin = "billing", aggregate_type = "invoice")]
    struct InvoicePaid;

    #[aggregate_root]
    struct Invoice {
        amount: u64,
        paid: bool,
    }

    impl Aggregate for Invoice {
        const TYPE: &'static str = "invoice";

        fn describe(d: &mut AggregateDescriptor<Self>) {
            d.on::<InvoiceIssued>(|i, _, p| i.amount = p.amount)
                .on::<InvoicePaid>(|i, _, _| i.paid = true);
        }
    }

    #[aggregate_root]
    #[derive(PartialEq)]
    struct Customer {
        name: String,
    }

    impl Aggregate for Customer {
        const TYPE: &'static str = "customer";

        fn describe(d: &mut AggregateDescriptor<Self>) {
            d.external("crm").snapshot_every(5);
        }
    }

    #[test]
    fn aggregate_registration_resolves_metadata() {
        let mut registry = Registry::new("billing");
        registry
            .register_aggregate::<Invoice>()
            .unwrap()
            .register_aggregate::<Customer>()
            .unwrap();

        let invoice = registry.aggregate::<Invoice>().unwrap();
        assert_eq!(
            invoice.metadata(),
            &AggregateMetadata {
                aggregate_type: "invoice".into(),
                is_internal: true,
                origin: "billing".into(),
            }
        );
        assert!(invoice.snapshot_metadata().is_none());

        let customer = registry.aggregate::<Customer>().unwrap();
        assert!(!customer.metadata().is_internal);
        assert_eq!(customer.metadata().origin, "crm");
        assert_eq!(customer.snapshot_metadata().unwrap().snapshot_interval, 5);

        assert!(registry.is_internal("billing", "invoice"));
        assert!(!registry.is_internal("crm", "customer"));
        assert!(!registry.is_internal("shipping", "parcel"));
        // 应用器引用的事件已随聚合注册
        assert!(registry.is_registered(&InvoicePaid::schema()));
    }

    #[test]
    fn duplicate_registrations_are_rejected() {
        let mut registry = Registry::new("billing");
        registry.register_event::<InvoiceIssued>().unwrap();
        match registry.register_event::<InvoiceIssued>() {
            Err(DomainError::AlreadyRegistered { kind, .. }) => assert_eq!(kind, "event"),
            other => panic!("unexpected {:?}", other.err()),
        }

        // 已显式注册的事件不影响聚合注册
        registry.register_aggregate::<Invoice>().unwrap();
        match registry.register_aggregate::<Invoice>() {
            Err(DomainError::AlreadyRegistered { kind, key }) => {
                assert_eq!(kind, "aggregate");
                assert_eq!(key, "invoice");
            }
            other => panic!("unexpected {:?}", other.err()),
        }
    }

    #[test]
    fn unknown_aggregate_is_missing_metadata() {
        let registry = Registry::new("billing");
        match registry.aggregate::<Invoice>() {
            Err(DomainError::MissingAggregateMetadata { aggregate }) => {
                assert_eq!(aggregate, "invoice")
            }
            other => panic!("unexpected {:?}", other.err()),
        }
    }

    #[test]
    fn deserialize_unknown_schema_yields_none_or_raw() {
        let mut registry = Registry::new("billing");
        registry.register_aggregate::<Invoice>().unwrap();

        let known = DomainEvent::new("i-1", 1, InvoiceIssued { amount: 42 })
            .to_serialized()
            .unwrap();
        let event = registry.deserialize(&known).unwrap().unwrap();
        assert_eq!(event.payload::<InvoiceIssued>().unwrap().amount, 42);

        let unknown = SerializedDomainEvent::builder()
            .origin("billing".into())
            .aggregate_type("invoice".into())
            .event_type("InvoiceVoided".into())
            .version(1)
            .id("e-9".into())
            .aggregate_id("i-1".into())
            .payload(serde_json::json!({"reason": "dup"}))
            .sequence_number(2)
            .timestamp(chrono::Utc::now())
            .build();
        assert!(registry.deserialize(&unknown).unwrap().is_none());
        assert!(registry.deserialize_or_raw(&unknown).unwrap().is_raw());
    }

    #[test]
    fn payload_shape_errors_surface_as_serde() {
        let mut registry = Registry::new("billing");
        registry.register_event::<InvoiceIssued>().unwrap();
        let broken = SerializedDomainEvent::builder()
            .origin("billing".into())
            .aggregate_type("invoice".into())
            .event_type("InvoiceIssued".into())
            .version(1)
            .id("e-1".into())
            .aggregate_id("i-1".into())
            .payload(serde_json::json!({"amount": "lots"}))
            .sequence_number(1)
            .timestamp(chrono::Utc::now())
            .build();
        match registry.deserialize(&broken) {
            Err(DomainError::Serde { .. }) => {}
            other => panic!("unexpected {other:?}"),
        }
    }
}
