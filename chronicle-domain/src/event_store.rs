//! 事件存储装配（EventStore）
//!
//! 将注册表、事件/快照仓储与租户组合在一起，供工厂与管理器共享；
//! 并提供“先做往返校验再落盘”的快照写入。
//!
use crate::aggregate::Aggregate;
use crate::error::DomainResult;
use crate::persist::{
    AggregateKey, DomainEventRepository, SnapshotRepository, TransactionContext,
};
use crate::registry::{AggregateDescriptor, Registry};
use crate::snapshot_transformer::SnapshotTransformer;
use bon::Builder;
use std::sync::Arc;

#[derive(Clone, Builder)]
pub struct EventStore {
    registry: Arc<Registry>,
    events: Arc<dyn DomainEventRepository>,
    snapshots: Option<Arc<dyn SnapshotRepository>>,
    tenant_id: Option<String>,
}

impl EventStore {
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn events(&self) -> &Arc<dyn DomainEventRepository> {
        &self.events
    }

    pub fn snapshots(&self) -> Option<&Arc<dyn SnapshotRepository>> {
        self.snapshots.as_ref()
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    pub fn key_for<A: Aggregate>(
        &self,
        descriptor: &AggregateDescriptor<A>,
        aggregate_id: &str,
    ) -> AggregateKey {
        let metadata = descriptor.metadata();
        AggregateKey::new(
            metadata.origin.clone(),
            metadata.aggregate_type.clone(),
            aggregate_id,
            self.tenant_id.clone(),
        )
    }

    /// 往返一致时写入快照；不一致或写入失败只记录日志
    pub(crate) async fn save_verified_snapshot<A: Aggregate>(
        &self,
        tx: Option<&TransactionContext>,
        descriptor: &AggregateDescriptor<A>,
        aggregate: &A,
    ) {
        let (Some(repository), Some(equals)) = (&self.snapshots, descriptor.snapshot_equals())
        else {
            return;
        };

        let check = match SnapshotTransformer::check_round_trip(
            &descriptor.metadata().origin,
            aggregate,
            self.tenant_id.clone(),
            equals,
        ) {
            Ok(check) => check,
            Err(err) => {
                tracing::warn!(
                    aggregate_type = A::TYPE,
                    aggregate_id = aggregate.id().unwrap_or_default(),
                    error = %err,
                    "failed to take snapshot"
                );
                return;
            }
        };

        if !check.is_equal {
            tracing::error!(
                aggregate_type = A::TYPE,
                aggregate_id = check.snapshot.aggregate_id(),
                sequence_number = check.snapshot.domain_event_sequence_number(),
                "snapshot does not restore to an equal aggregate; skipping snapshot"
            );
            return;
        }

        if let Err(err) = repository.save_snapshot(tx, &check.snapshot).await {
            tracing::warn!(
                aggregate_type = A::TYPE,
                aggregate_id = check.snapshot.aggregate_id(),
                error = %err,
                "failed to save snapshot"
            );
        } else {
            tracing::debug!(
                aggregate_type = A::TYPE,
                aggregate_id = check.snapshot.aggregate_id(),
                sequence_number = check.snapshot.domain_event_sequence_number(),
                "snapshot saved"
            );
        }
    }

    pub(crate) async fn latest_snapshot_sequence_number(
        &self,
        tx: Option<&TransactionContext>,
        key: &AggregateKey,
    ) -> DomainResult<u64> {
        let Some(repository) = &self.snapshots else {
            return Ok(0);
        };
        Ok(repository
            .get_latest_snapshot(tx, key)
            .await?
            .map(|s| s.domain_event_sequence_number())
            .unwrap_or(0))
    }
}
