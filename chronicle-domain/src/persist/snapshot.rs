use crate::persist::AggregateKey;
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 聚合快照：某一事件序号时刻的完整聚合状态
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    origin: String,
    aggregate_type: String,
    aggregate_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tenant_id: Option<String>,
    /// 快照所对应的事件序号
    domain_event_sequence_number: u64,
    snapshot_data: Value,
}

impl Snapshot {
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    pub fn domain_event_sequence_number(&self) -> u64 {
        self.domain_event_sequence_number
    }

    pub fn snapshot_data(&self) -> &Value {
        &self.snapshot_data
    }

    pub fn key(&self) -> AggregateKey {
        AggregateKey::new(
            self.origin.clone(),
            self.aggregate_type.clone(),
            self.aggregate_id.clone(),
            self.tenant_id.clone(),
        )
    }
}
