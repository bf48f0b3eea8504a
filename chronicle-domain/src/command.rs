//! 命令上下文（CommandScope）
//!
//! 命令体只能通过 `Aggregate::process`/`process_creation` 拿到 `CommandScope`，
//! 因而“在命令之外暂存事件”在类型层面不可表达。
//!
use crate::aggregate::Aggregate;
use crate::domain_event::{DomainEvent, EventPayload};
use crate::error::{DomainError, DomainResult};
use std::ops::Deref;

pub struct CommandScope<'a, A: Aggregate> {
    aggregate: &'a mut A,
    creation: bool,
}

impl<'a, A: Aggregate> CommandScope<'a, A> {
    pub(crate) fn new(aggregate: &'a mut A, creation: bool) -> Self {
        Self {
            aggregate,
            creation,
        }
    }

    pub fn is_creation(&self) -> bool {
        self.creation
    }

    /// 创建（尚未暂存的）事件
    ///
    /// 聚合尚无 ID 时：仅在创建上下文中为其分配新的 UUID，否则返回
    /// `IdSetOutsideCreationContext`。返回前调用负载的 `on_create`。
    pub fn create_domain_event<P: EventPayload>(&mut self, payload: P) -> DomainResult<DomainEvent> {
        let (aggregate_id, assigned) = match self.aggregate.id() {
            Some(id) => (id.to_string(), false),
            None if self.creation => (uuid::Uuid::new_v4().to_string(), true),
            None => {
                return Err(DomainError::IdSetOutsideCreationContext {
                    aggregate_type: A::TYPE.to_string(),
                });
            }
        };

        let event = DomainEvent::new(aggregate_id, 0, payload);
        event.notify_create()?;
        // 负载被拒绝时聚合保持无 ID
        if assigned {
            self.aggregate.root_mut().set_id(event.aggregate_id());
        }
        Ok(event)
    }

    /// 暂存事件，从 max(当前序号, 暂存区最大序号) 起依次分配序号
    ///
    /// 整批先校验聚合 ID，任一不符则一个也不暂存。
    pub fn stage_domain_events<I>(&mut self, events: I) -> DomainResult<Vec<DomainEvent>>
    where
        I: IntoIterator<Item = DomainEvent>,
    {
        let events: Vec<DomainEvent> = events.into_iter().collect();
        for event in &events {
            self.check_aggregate_id(event)?;
        }
        events
            .into_iter()
            .map(|event| self.stage_one(event))
            .collect()
    }

    /// 创建并暂存单个事件
    pub fn record<P: EventPayload>(&mut self, payload: P) -> DomainResult<DomainEvent> {
        let event = self.create_domain_event(payload)?;
        self.stage_one(event)
    }

    fn check_aggregate_id(&self, event: &DomainEvent) -> DomainResult<()> {
        if self.aggregate.id() != Some(event.aggregate_id()) {
            return Err(DomainError::AggregateIdMismatch {
                expected: self.aggregate.id().unwrap_or_default().to_string(),
                actual: event.aggregate_id().to_string(),
            });
        }
        Ok(())
    }

    fn stage_one(&mut self, mut event: DomainEvent) -> DomainResult<DomainEvent> {
        self.check_aggregate_id(&event)?;
        let root = self.aggregate.root_mut();
        let next = root
            .highest_staged_sequence_number()
            .unwrap_or(0)
            .max(root.current_sequence_number())
            + 1;
        event.set_sequence_number(next);
        event.notify_stage();
        root.stage(event.clone());
        Ok(event)
    }
}

impl<A: Aggregate> Deref for CommandScope<'_, A> {
    type Target = A;

    fn deref(&self) -> &A {
        self.aggregate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregateRoot;
    use crate::domain_event::EventType;
    use crate::registry::AggregateDescriptor;
    use chronicle_macros::{aggregate_root, domain_event};

    #[domain_event(origin = "test", aggregate_type = "ticket")]
    struct TicketOpened {
        title: String,
    }

    #[domain_event(origin = "test", aggregate_type = "ticket", hooks = true)]
    struct TicketRenamed {
        title: String,
    }

    impl EventPayload for TicketRenamed {
        fn on_create(&self, _event: &DomainEvent) -> DomainResult<()> {
            if self.title.trim().is_empty() {
                return Err(DomainError::InvalidPayload {
                    event_type: Self::EVENT_TYPE.to_string(),
                    reason: "title must not be blank".to_string(),
                });
            }
            Ok(())
        }
    }

    #[aggregate_root]
    struct Ticket {
        title: String,
    }

    impl Aggregate for Ticket {
        const TYPE: &'static str = "ticket";

        fn describe(d: &mut AggregateDescriptor<Self>) {
            d.on::<TicketOpened>(|t, _, p| t.title = p.title.clone());
        }
    }

    #[test]
    fn fresh_aggregate_gets_consecutive_sequence_numbers() {
        let mut ticket = Ticket::default();
        ticket
            .process_creation(|scope| {
                for n in 0..4 {
                    scope.record(TicketOpened {
                        title: format!("t{n}"),
                    })?;
                }
                Ok(())
            })
            .unwrap();

        let seqs: Vec<u64> = ticket
            .root()
            .staged_domain_events()
            .map(DomainEvent::sequence_number)
            .collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
        assert!(ticket.id().is_some());
        assert!(
            ticket
                .root()
                .staged_domain_events()
                .all(|e| Some(e.aggregate_id()) == ticket.id())
        );
    }

    #[test]
    fn id_assignment_requires_creation_context() {
        let mut ticket = Ticket::default();
        let err = ticket
            .process(|scope| scope.record(TicketOpened { title: "x".into() }))
            .unwrap_err();
        match err {
            DomainError::IdSetOutsideCreationContext { aggregate_type } => {
                assert_eq!(aggregate_type, "ticket")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(ticket.id().is_none());
    }

    #[test]
    fn staging_continues_after_applied_events() {
        let mut ticket = Ticket::default();
        ticket.root_mut().set_id("t-1");
        ticket.root_mut().set_sequence_number(5);

        let event = ticket
            .process(|scope| scope.record(TicketOpened { title: "x".into() }))
            .unwrap();
        assert_eq!(event.sequence_number(), 6);
        assert_eq!(ticket.root().staged_domain_events_not_applied().len(), 1);
    }

    #[test]
    fn on_create_can_reject_payload() {
        let mut ticket = Ticket::default();
        ticket.root_mut().set_id("t-1");
        let err = ticket
            .process(|scope| scope.record(TicketRenamed { title: "  ".into() }))
            .unwrap_err();
        match err {
            DomainError::InvalidPayload { .. } => {}
            other => panic!("unexpected {other:?}"),
        }
        assert!(!ticket.root().has_staged_domain_events());
    }

    #[test]
    fn foreign_events_cannot_be_staged() {
        let mut ticket = Ticket::default();
        ticket.root_mut().set_id("t-1");
        let foreign = DomainEvent::new("t-2", 0, TicketOpened { title: "x".into() });
        let err = ticket
            .process(|scope| scope.stage_domain_events([foreign]))
            .unwrap_err();
        match err {
            DomainError::AggregateIdMismatch { expected, actual } => {
                assert_eq!(expected, "t-1");
                assert_eq!(actual, "t-2");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!ticket.root().has_staged_domain_events());
    }

    #[test]
    fn rejected_creation_leaves_aggregate_without_id() {
        let mut ticket = Ticket::default();
        let err = ticket
            .process_creation(|scope| scope.record(TicketRenamed { title: "".into() }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidPayload { .. }));
        assert!(ticket.id().is_none());

        ticket
            .process_creation(|scope| scope.record(TicketOpened { title: "ok".into() }))
            .unwrap();
        assert!(ticket.id().is_some());
    }

    #[test]
    fn mixed_batch_is_staged_all_or_nothing() {
        let mut ticket = Ticket::default();
        ticket.root_mut().set_id("t-1");
        let own = DomainEvent::new("t-1", 0, TicketOpened { title: "a".into() });
        let foreign = DomainEvent::new("t-2", 0, TicketOpened { title: "b".into() });

        let err = ticket
            .process(|scope| scope.stage_domain_events([own, foreign]))
            .unwrap_err();
        assert!(matches!(err, DomainError::AggregateIdMismatch { .. }));
        assert!(!ticket.root().has_staged_domain_events());
    }
}
