use pimsim_core::config::DataMode;
use pimsim_core::core::payload::ExecuteUnitType;
use pimsim_core::isa::opcodes::{SPECIAL_ACTIVATION_GROUP_NUM, SPECIAL_PIM_INPUT_BIT_WIDTH};

use crate::common::{
    TestContext, addi, bne, core0, li, li_special, load, pim_compute, sample_edges, store, transfer,
};

#[test]
fn test_at_most_one_instruction_leaves_issue_per_edge() {
    let program = vec![
        li_special(SPECIAL_PIM_INPUT_BIT_WIDTH, 4),
        li_special(SPECIAL_ACTIVATION_GROUP_NUM, 1),
        li(1, 0),
        li(2, 32),
        li(4, 256),
        transfer(4, 1, 2),
        load(5, 4, 0),
        pim_compute(1, 2, 0),
        pim_compute(4, 2, 0),
        store(1, 5, 8),
        addi(6, 6, 1),
        bne(6, 2, -1),
    ];
    let simulator = TestContext::new()
        .with_banks(&["a", "b", "c"])
        .with_data_mode(DataMode::NotRealData)
        .with_program(0, program)
        .build();

    let samples = sample_edges(&simulator, 2000, |sim| {
        let stats = core0(sim).stats();
        (
            stats.dispatched_instructions + stats.control_instructions,
            stats.issue_cycles + stats.stall_cycles,
        )
    });

    assert!(core0(&simulator).is_finished());
    for pair in samples.windows(2) {
        let (left_issue, edges) = pair[0];
        let (next_left_issue, next_edges) = pair[1];
        assert!(next_left_issue - left_issue <= 1);
        assert!(next_edges - edges <= 1);
    }
}

#[test]
fn test_pending_record_never_overtakes_in_flight_ones() {
    let program = vec![
        li_special(SPECIAL_PIM_INPUT_BIT_WIDTH, 4),
        li_special(SPECIAL_ACTIVATION_GROUP_NUM, 1),
        li(1, 0),
        li(2, 32),
        li(4, 256),
        transfer(4, 1, 2),
        load(5, 4, 0),
        pim_compute(1, 2, 0),
        pim_compute(4, 2, 0),
        store(1, 5, 8),
        addi(6, 6, 1),
        bne(6, 2, -1),
    ];
    let simulator = TestContext::new()
        .with_banks(&["a", "b", "c"])
        .with_data_mode(DataMode::NotRealData)
        .with_program(0, program)
        .build();

    let samples = sample_edges(&simulator, 2000, |sim| {
        let core = core0(sim);
        let in_flight: Vec<u64> = ExecuteUnitType::UNITS
            .iter()
            .flat_map(|&unit| core.unit_ports(unit).unwrap().in_flight_ins_ids())
            .collect();
        (core.pending_ins_id(), in_flight)
    });

    assert!(core0(&simulator).is_finished());
    let mut stalled_samples = 0;
    for (pending, in_flight) in &samples {
        let mut unique = in_flight.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), in_flight.len());
        if let Some(pending) = pending {
            assert!(!in_flight.contains(pending));
            assert!(in_flight.iter().all(|id| id < pending));
            stalled_samples += usize::from(!in_flight.is_empty());
        }
    }
    assert!(stalled_samples > 0);
}
