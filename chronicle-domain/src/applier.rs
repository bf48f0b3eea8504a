//! 事件应用器（DomainEventApplier）
//!
//! 严格按序号 +1 应用事件；任何校验失败都不会改动聚合状态。
//!
use crate::aggregate::Aggregate;
use crate::domain_event::DomainEvent;
use crate::error::{DomainError, DomainResult};
use crate::registry::{AggregateDescriptor, Registry};
use std::sync::Arc;

pub struct DomainEventApplier<A: Aggregate> {
    descriptor: Arc<AggregateDescriptor<A>>,
}

impl<A: Aggregate> Clone for DomainEventApplier<A> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
        }
    }
}

impl<A: Aggregate> DomainEventApplier<A> {
    pub fn new(registry: &Registry) -> DomainResult<Self> {
        Ok(Self::from_descriptor(registry.aggregate::<A>()?))
    }

    pub fn from_descriptor(descriptor: Arc<AggregateDescriptor<A>>) -> Self {
        Self { descriptor }
    }

    pub fn apply(&self, aggregate: &mut A, event: &DomainEvent) -> DomainResult<()> {
        let expected = aggregate.current_sequence_number() + 1;
        if event.sequence_number() != expected {
            return Err(DomainError::SequenceNumberMismatch {
                aggregate_id: event.aggregate_id().to_string(),
                expected,
                actual: event.sequence_number(),
            });
        }

        match aggregate.id() {
            Some(id) if id != event.aggregate_id() => {
                return Err(DomainError::AggregateIdMismatch {
                    expected: id.to_string(),
                    actual: event.aggregate_id().to_string(),
                });
            }
            Some(_) => {}
            None => aggregate.root_mut().set_id(event.aggregate_id()),
        }

        aggregate.root_mut().set_sequence_number(expected);
        for applier in self.descriptor.appliers_for(event.schema()) {
            applier(&mut *aggregate, event)?;
        }
        event.notify_apply();
        Ok(())
    }

    /// 乐观地应用自身已暂存但尚未应用的事件
    pub fn apply_staged(&self, aggregate: &mut A) -> DomainResult<usize> {
        let pending = aggregate.root().staged_domain_events_not_applied();
        for event in &pending {
            self.apply(aggregate, event)?;
        }
        Ok(pending.len())
    }
}
