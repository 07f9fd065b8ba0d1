use pimsim_core::core::conflict::{DataConflictPayload, RegisterRef};
use pimsim_core::core::payload::ExecuteUnitType;
use proptest::collection::btree_set;
use proptest::prelude::*;

fn unit_type() -> impl Strategy<Value = ExecuteUnitType> {
    prop::sample::select(vec![
        ExecuteUnitType::Scalar,
        ExecuteUnitType::Simd,
        ExecuteUnitType::Transfer,
        ExecuteUnitType::PimCompute,
        ExecuteUnitType::PimLoad,
        ExecuteUnitType::PimOutput,
        ExecuteUnitType::PimSet,
        ExecuteUnitType::PimTransfer,
    ])
}

fn register() -> impl Strategy<Value = RegisterRef> {
    prop_oneof![
        (0usize..4).prop_map(RegisterRef::General),
        (0usize..4).prop_map(RegisterRef::Special),
    ]
}

fn footprint() -> impl Strategy<Value = DataConflictPayload> {
    (
        proptest::option::of(0u64..16),
        proptest::option::of(unit_type()),
        any::<bool>(),
        btree_set(0usize..6, 0..3),
        btree_set(0usize..6, 0..3),
        btree_set(0usize..6, 0..2),
        btree_set(register(), 0..3),
        btree_set(register(), 0..2),
    )
        .prop_map(
            |(ins_id, unit_type, uses_pim_unit, reads, writes, read_writes, read_regs, write_regs)| {
                DataConflictPayload {
                    ins_id,
                    unit_type,
                    uses_pim_unit,
                    read_memory_ids: reads,
                    write_memory_ids: writes,
                    read_write_memory_ids: read_writes,
                    read_register_ids: read_regs,
                    write_register_ids: write_regs,
                }
            },
        )
}

fn merged(a: &DataConflictPayload, b: &DataConflictPayload) -> DataConflictPayload {
    let mut out = a.clone();
    out += b;
    out
}

proptest! {
    #[test]
    fn combine_is_commutative(a in footprint(), b in footprint()) {
        prop_assert_eq!(merged(&a, &b), merged(&b, &a));
    }

    #[test]
    fn combine_is_associative(a in footprint(), b in footprint(), c in footprint()) {
        prop_assert_eq!(merged(&merged(&a, &b), &c), merged(&a, &merged(&b, &c)));
    }

    #[test]
    fn empty_record_is_identity(a in footprint()) {
        prop_assert_eq!(merged(&a, &DataConflictPayload::default()), a.clone());
        prop_assert_eq!(merged(&DataConflictPayload::default(), &a), a);
    }

    #[test]
    fn combine_is_idempotent(a in footprint()) {
        prop_assert_eq!(merged(&a, &a), a);
    }

    #[test]
    fn merged_footprint_blocks_what_a_part_blocks(
        candidate in footprint(),
        a in footprint(),
        b in footprint(),
    ) {
        let union = merged(&a, &b);
        prop_assert_eq!(
            candidate.memory_conflicts_with(&union),
            candidate.memory_conflicts_with(&a) || candidate.memory_conflicts_with(&b)
        );
        prop_assert_eq!(
            candidate.register_conflicts_with(&union),
            candidate.register_conflicts_with(&a) || candidate.register_conflicts_with(&b)
        );
    }

    #[test]
    fn conflict_test_is_symmetric(a in footprint(), b in footprint()) {
        prop_assert_eq!(a.conflicts_with(&b), b.conflicts_with(&a));
    }

    #[test]
    fn reads_alone_never_conflict(
        a_reads in btree_set(0usize..4, 0..4),
        b_reads in btree_set(0usize..4, 0..4),
    ) {
        let a = DataConflictPayload { read_memory_ids: a_reads, ..DataConflictPayload::default() };
        let b = DataConflictPayload { read_memory_ids: b_reads, ..DataConflictPayload::default() };
        prop_assert!(!a.conflicts_with(&b));
    }
}
