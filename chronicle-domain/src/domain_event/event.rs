use crate::domain_event::{EventPayload, EventSchema, SerializedDomainEvent};
use crate::error::{DomainError, DomainResult};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

// 类型擦除后的负载：具体类型（已注册）或原始 JSON（未注册的外部事件）
pub(crate) trait ErasedPayload: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
    fn to_value(&self) -> DomainResult<Value>;
    fn on_create(&self, event: &DomainEvent) -> DomainResult<()>;
    fn on_stage(&self, event: &DomainEvent);
    fn on_commit(&self, event: &DomainEvent);
    fn on_apply(&self, event: &DomainEvent);
}

#[derive(Debug)]
pub(crate) struct Typed<P>(pub(crate) P);

impl<P: EventPayload> ErasedPayload for Typed<P> {
    fn as_any(&self) -> &dyn Any {
        &self.0
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<P>()
    }

    fn to_value(&self) -> DomainResult<Value> {
        Ok(serde_json::to_value(&self.0)?)
    }

    fn on_create(&self, event: &DomainEvent) -> DomainResult<()> {
        self.0.on_create(event)
    }

    fn on_stage(&self, event: &DomainEvent) {
        self.0.on_stage(event)
    }

    fn on_commit(&self, event: &DomainEvent) {
        self.0.on_commit(event)
    }

    fn on_apply(&self, event: &DomainEvent) {
        self.0.on_apply(event)
    }
}

#[derive(Debug)]
pub(crate) struct Raw(pub(crate) Value);

impl ErasedPayload for Raw {
    fn as_any(&self) -> &dyn Any {
        &self.0
    }

    fn type_name(&self) -> &'static str {
        "serde_json::Value"
    }

    fn to_value(&self) -> DomainResult<Value> {
        Ok(self.0.clone())
    }

    fn on_create(&self, _event: &DomainEvent) -> DomainResult<()> {
        Ok(())
    }

    fn on_stage(&self, _event: &DomainEvent) {}

    fn on_commit(&self, _event: &DomainEvent) {}

    fn on_apply(&self, _event: &DomainEvent) {}
}

/// 领域事件
///
/// 对外只读；序号与提交时的上下文（租户、关联 ID、触发者、元数据）只由引擎写入。
#[derive(Debug, Clone)]
pub struct DomainEvent {
    schema: EventSchema,
    id: String,
    aggregate_id: String,
    sequence_number: u64,
    timestamp: DateTime<Utc>,
    payload: Arc<dyn ErasedPayload>,
    tenant_id: Option<String>,
    correlation_id: Option<String>,
    triggered_by_event_id: Option<String>,
    triggered_by_user_id: Option<String>,
    metadata: Option<Value>,
}

impl DomainEvent {
    /// 以新的事件 ID 与当前时间构造事件
    pub fn new<P: EventPayload>(
        aggregate_id: impl Into<String>,
        sequence_number: u64,
        payload: P,
    ) -> Self {
        Self::from_parts(
            P::schema(),
            uuid::Uuid::new_v4().to_string(),
            aggregate_id.into(),
            sequence_number,
            Utc::now(),
            Arc::new(Typed(payload)),
        )
    }

    pub(crate) fn from_parts(
        schema: EventSchema,
        id: String,
        aggregate_id: String,
        sequence_number: u64,
        timestamp: DateTime<Utc>,
        payload: Arc<dyn ErasedPayload>,
    ) -> Self {
        Self {
            schema,
            id,
            aggregate_id,
            sequence_number,
            timestamp,
            payload,
            tenant_id: None,
            correlation_id: None,
            triggered_by_event_id: None,
            triggered_by_user_id: None,
            metadata: None,
        }
    }

    /// 由持久化形态还原；`payload` 为已解码的负载
    pub(crate) fn from_serialized(
        serialized: &SerializedDomainEvent,
        payload: Arc<dyn ErasedPayload>,
    ) -> Self {
        Self {
            schema: serialized.schema(),
            id: serialized.id().to_string(),
            aggregate_id: serialized.aggregate_id().to_string(),
            sequence_number: serialized.sequence_number(),
            timestamp: serialized.timestamp(),
            payload,
            tenant_id: serialized.tenant_id().map(str::to_string),
            correlation_id: serialized.correlation_id().map(str::to_string),
            triggered_by_event_id: serialized.triggered_by_event_id().map(str::to_string),
            triggered_by_user_id: serialized.triggered_by_user_id().map(str::to_string),
            metadata: serialized.metadata().cloned(),
        }
    }

    /// 未注册 schema 的事件，负载保留为原始 JSON
    pub(crate) fn raw(serialized: &SerializedDomainEvent) -> Self {
        Self::from_serialized(serialized, Arc::new(Raw(serialized.payload().clone())))
    }

    pub fn schema(&self) -> &EventSchema {
        &self.schema
    }

    pub fn origin(&self) -> &str {
        &self.schema.origin
    }

    pub fn aggregate_type(&self) -> &str {
        &self.schema.aggregate_type
    }

    pub fn event_type(&self) -> &str {
        &self.schema.event_type
    }

    pub fn version(&self) -> u32 {
        self.schema.version
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn triggered_by_event_id(&self) -> Option<&str> {
        self.triggered_by_event_id.as_deref()
    }

    pub fn triggered_by_user_id(&self) -> Option<&str> {
        self.triggered_by_user_id.as_deref()
    }

    pub fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    /// 按具体类型读取负载；类型不符或为原始事件时返回 `None`
    pub fn payload<P: EventPayload>(&self) -> Option<&P> {
        self.payload.as_any().downcast_ref::<P>()
    }

    pub(crate) fn payload_as<P: EventPayload>(&self) -> DomainResult<&P> {
        self.payload::<P>().ok_or_else(|| DomainError::TypeMismatch {
            expected: std::any::type_name::<P>().to_string(),
            found: self.payload.type_name().to_string(),
        })
    }

    pub fn payload_value(&self) -> DomainResult<Value> {
        self.payload.to_value()
    }

    /// 是否为未注册 schema 的原始事件
    pub fn is_raw(&self) -> bool {
        self.payload.as_any().is::<Value>()
    }

    pub fn to_serialized(&self) -> DomainResult<SerializedDomainEvent> {
        Ok(SerializedDomainEvent::builder()
            .origin(self.schema.origin.clone())
            .aggregate_type(self.schema.aggregate_type.clone())
            .event_type(self.schema.event_type.clone())
            .version(self.schema.version)
            .id(self.id.clone())
            .aggregate_id(self.aggregate_id.clone())
            .payload(self.payload.to_value()?)
            .sequence_number(self.sequence_number)
            .timestamp(self.timestamp)
            .maybe_tenant_id(self.tenant_id.clone())
            .maybe_correlation_id(self.correlation_id.clone())
            .maybe_triggered_by_event_id(self.triggered_by_event_id.clone())
            .maybe_triggered_by_user_id(self.triggered_by_user_id.clone())
            .maybe_metadata(self.metadata.clone())
            .build())
    }

    // ---- 引擎内部写入 ----

    pub(crate) fn set_sequence_number(&mut self, sequence_number: u64) {
        self.sequence_number = sequence_number;
    }

    pub(crate) fn stamp(&mut self, stamp: &CommitStamp) {
        self.tenant_id = stamp.tenant_id.clone();
        self.correlation_id = stamp.correlation_id.clone();
        self.triggered_by_event_id = stamp.triggered_by_event_id.clone();
        self.triggered_by_user_id = stamp.triggered_by_user_id.clone();
        self.metadata = stamp.metadata.clone();
    }

    pub(crate) fn notify_create(&self) -> DomainResult<()> {
        self.payload.on_create(self)
    }

    pub(crate) fn notify_stage(&self) {
        self.payload.on_stage(self)
    }

    pub(crate) fn notify_commit(&self) {
        self.payload.on_commit(self)
    }

    pub(crate) fn notify_apply(&self) {
        self.payload.on_apply(self)
    }
}

/// 提交时写入事件的上下文
#[derive(Debug, Clone, Default)]
pub(crate) struct CommitStamp {
    pub(crate) tenant_id: Option<String>,
    pub(crate) correlation_id: Option<String>,
    pub(crate) triggered_by_event_id: Option<String>,
    pub(crate) triggered_by_user_id: Option<String>,
    pub(crate) metadata: Option<Value>,
}
