//! 快照转换（SnapshotTransformer）
//!
//! 以 serde 为每个聚合类型提供快照编解码，并保留往返一致性校验：
//! 快照还原后的状态与原状态不相等时，不应落盘该快照。
//!
use crate::aggregate::Aggregate;
use crate::error::{DomainError, DomainResult};
use crate::persist::Snapshot;

/// 往返校验结果
#[derive(Debug)]
pub struct RestoreCheck<A> {
    pub is_equal: bool,
    pub snapshot: Snapshot,
    pub restored: A,
}

pub struct SnapshotTransformer;

impl SnapshotTransformer {
    pub fn take_snapshot<A: Aggregate>(
        origin: &str,
        aggregate_type: &str,
        aggregate: &A,
        tenant_id: Option<String>,
    ) -> DomainResult<Snapshot> {
        let aggregate_id = aggregate
            .id()
            .ok_or_else(|| DomainError::MissingAggregateId {
                aggregate_type: aggregate_type.to_string(),
            })?;

        Ok(Snapshot::builder()
            .origin(origin.to_string())
            .aggregate_type(aggregate_type.to_string())
            .aggregate_id(aggregate_id.to_string())
            .maybe_tenant_id(tenant_id)
            .domain_event_sequence_number(aggregate.current_sequence_number())
            .snapshot_data(serde_json::to_value(aggregate)?)
            .build())
    }

    pub fn restore_from_snapshot<A: Aggregate>(snapshot: &Snapshot) -> DomainResult<A> {
        if snapshot.aggregate_type() != A::TYPE {
            return Err(DomainError::TypeMismatch {
                expected: A::TYPE.to_string(),
                found: snapshot.aggregate_type().to_string(),
            });
        }

        let mut aggregate: A = serde_json::from_value(snapshot.snapshot_data().clone())?;
        let root = aggregate.root_mut();
        if root.id().is_none() {
            root.set_id(snapshot.aggregate_id());
        }
        root.set_sequence_number(snapshot.domain_event_sequence_number());
        Ok(aggregate)
    }

    /// 快照后立即还原并深度比较
    pub fn can_be_restored_from_snapshot<A: Aggregate + PartialEq>(
        origin: &str,
        aggregate: &A,
        tenant_id: Option<String>,
    ) -> DomainResult<RestoreCheck<A>> {
        Self::check_round_trip(origin, aggregate, tenant_id, <A as PartialEq>::eq)
    }

    pub(crate) fn check_round_trip<A: Aggregate>(
        origin: &str,
        aggregate: &A,
        tenant_id: Option<String>,
        equals: fn(&A, &A) -> bool,
    ) -> DomainResult<RestoreCheck<A>> {
        let snapshot = Self::take_snapshot(origin, A::TYPE, aggregate, tenant_id)?;
        let restored = Self::restore_from_snapshot::<A>(&snapshot)?;
        Ok(RestoreCheck {
            is_equal: equals(aggregate, &restored),
            snapshot,
            restored,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregateRoot;
    use crate::registry::AggregateDescriptor;
    use chronicle_macros::aggregate_root;
    use std::collections::BTreeMap;

    #[aggregate_root]
    #[derive(PartialEq)]
    struct Library {
        name: String,
        shelves: BTreeMap<String, Vec<String>>,
    }

    impl Aggregate for Library {
        const TYPE: &'static str = "library";

        fn describe(d: &mut AggregateDescriptor<Self>) {
            d.snapshotable();
        }
    }

    // 含不参与序列化的字段：还原后必然丢失
    #[aggregate_root]
    #[derive(PartialEq)]
    struct Lossy {
        kept: u32,
        #[serde(skip)]
        cache: Vec<u32>,
    }

    impl Aggregate for Lossy {
        const TYPE: &'static str = "lossy";

        fn describe(d: &mut AggregateDescriptor<Self>) {
            d.snapshotable();
        }
    }

    fn library() -> Library {
        let mut library = Library {
            name: "central".into(),
            ..Default::default()
        };
        library
            .shelves
            .insert("a".into(), vec!["dune".into(), "emma".into()]);
        library.root_mut().set_id("l-1");
        library.root_mut().set_sequence_number(7);
        library.root_mut().mark_deleted();
        library
    }

    #[test]
    fn round_trip_preserves_nested_state() {
        let library = library();
        let check =
            SnapshotTransformer::can_be_restored_from_snapshot("town", &library, None).unwrap();
        assert!(check.is_equal);
        assert_eq!(check.restored, library);
        assert_eq!(check.snapshot.domain_event_sequence_number(), 7);
        assert_eq!(check.snapshot.aggregate_id(), "l-1");
        assert!(check.restored.is_deleted());
    }

    #[test]
    fn lossy_state_is_reported_unequal() {
        let mut lossy = Lossy {
            kept: 1,
            cache: vec![1, 2, 3],
            ..Default::default()
        };
        lossy.root_mut().set_id("x-1");
        let check = SnapshotTransformer::can_be_restored_from_snapshot("town", &lossy, None).unwrap();
        assert!(!check.is_equal);
        assert!(check.restored.cache.is_empty());
    }

    #[test]
    fn restore_checks_type_and_stamps_sequence() {
        let snapshot =
            SnapshotTransformer::take_snapshot("town", Library::TYPE, &library(), None).unwrap();
        match SnapshotTransformer::restore_from_snapshot::<Lossy>(&snapshot) {
            Err(DomainError::TypeMismatch { expected, found }) => {
                assert_eq!(expected, "lossy");
                assert_eq!(found, "library");
            }
            other => panic!("unexpected {other:?}"),
        }

        let restored = SnapshotTransformer::restore_from_snapshot::<Library>(&snapshot).unwrap();
        assert_eq!(restored.current_sequence_number(), 7);
    }

    #[test]
    fn snapshot_requires_id() {
        match SnapshotTransformer::take_snapshot("town", Library::TYPE, &Library::default(), None)
        {
            Err(DomainError::MissingAggregateId { .. }) => {}
            other => panic!("unexpected {other:?}"),
        }
    }
}
