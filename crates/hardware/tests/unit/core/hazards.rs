use pimsim_core::core::payload::ExecuteUnitType;
use pimsim_core::isa::Instruction;
use rstest::rstest;

use crate::common::{TestContext, core0, li, load, sample_edges, store, transfer};

/// A 64-byte transfer from bank `a` (address 0) to bank `b` (address 256),
/// followed by `next`. Registers: r1 = 0, r2 = 64, r4 = 256, r6 = 512.
fn after_transfer(next: Instruction) -> Vec<Instruction> {
    vec![li(1, 0), li(2, 64), li(4, 256), li(6, 512), transfer(4, 1, 2), next]
}

/// Transfer records still in flight when `next` left the issue stage, and
/// the stall count of the run.
fn in_flight_at_dispatch(next: Instruction) -> (usize, u64) {
    let program = after_transfer(next);
    let total = program.len() as u64;
    let simulator = TestContext::new()
        .with_banks(&["a", "b", "c"])
        .with_program(0, program)
        .build();

    let samples = sample_edges(&simulator, 500, |sim| {
        let core = core0(sim);
        let transfer = core.unit_ports(ExecuteUnitType::Transfer).unwrap();
        (core.stats().dispatched_instructions, transfer.in_flight_count())
    });
    let core = core0(&simulator);
    assert!(core.is_finished());

    let (_, in_flight) = samples.iter().find(|&&(dispatched, _)| dispatched == total).copied().unwrap();
    (in_flight, core.stats().stall_cycles)
}

#[rstest]
#[case::read_after_write(load(5, 4, 0))]
#[case::write_after_read(store(1, 7, 0))]
#[case::write_after_write(store(4, 7, 16))]
fn test_overlapping_bank_waits_for_transfer(#[case] next: Instruction) {
    let (in_flight, stall_cycles) = in_flight_at_dispatch(next);
    assert_eq!(in_flight, 0);
    assert!(stall_cycles > 0);
}

#[rstest]
#[case::disjoint_bank(load(5, 6, 0))]
#[case::shared_read(load(5, 1, 0))]
#[case::store_elsewhere(store(6, 7, 0))]
fn test_independent_access_overlaps_transfer(#[case] next: Instruction) {
    let (in_flight, stall_cycles) = in_flight_at_dispatch(next);
    assert_eq!(in_flight, 1);
    assert_eq!(stall_cycles, 0);
}

#[test]
fn test_second_transfer_waits_for_busy_unit() {
    let program = vec![li(1, 0), li(2, 64), li(4, 256), li(6, 512), transfer(4, 1, 2), transfer(6, 6, 2)];
    let (_, reporter) = TestContext::new()
        .with_banks(&["a", "b", "c"])
        .with_program(0, program)
        .run();

    let stats = reporter.core_stats[0];
    assert_eq!(stats.dispatched_instructions, 6);
    assert!(stats.stall_cycles > 0);
}
