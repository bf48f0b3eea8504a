use crate::domain_event::SerializedDomainEvent;
use crate::error::DomainResult;
use async_trait::async_trait;
use serde_json::Value;

/// 聚合查询服务：由聚合所属服务提供，用于拉取外部聚合的完整事件日志
#[async_trait]
pub trait AggregateQueryService: Send + Sync {
    async fn get_aggregate_types(&self) -> DomainResult<Vec<String>>;

    async fn get_aggregate_ids(
        &self,
        aggregate_type: &str,
        tenant_id: Option<&str>,
    ) -> DomainResult<Vec<String>>;

    async fn get_aggregate(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        tenant_id: Option<&str>,
    ) -> DomainResult<Option<Value>>;

    async fn get_domain_events_for_aggregate(
        &self,
        origin: &str,
        aggregate_type: &str,
        aggregate_id: &str,
        tenant_id: Option<&str>,
    ) -> DomainResult<Vec<SerializedDomainEvent>>;
}
