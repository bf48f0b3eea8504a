use crate::domain_event::EventSchema;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 事件的扁平持久化/传输形态（camelCase JSON）
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedDomainEvent {
    origin: String,
    aggregate_type: String,
    #[serde(rename = "type")]
    event_type: String,
    version: u32,
    /// 事件唯一标识
    id: String,
    aggregate_id: String,
    /// 负载；单元负载为 null
    #[serde(default)]
    payload: Value,
    /// 聚合内从 1 开始的连续序号
    sequence_number: u64,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    triggered_by_event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    triggered_by_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Value>,
}

impl SerializedDomainEvent {
    pub fn schema(&self) -> EventSchema {
        EventSchema::new(
            self.origin.clone(),
            self.aggregate_type.clone(),
            self.event_type.clone(),
            self.version,
        )
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn payload(&self) -> &Value {
        &self.payload
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
}
