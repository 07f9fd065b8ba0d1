use pimsim_core::config::DataMode;
use pimsim_core::core::payload::ExecuteUnitType;
use pimsim_core::isa::Instruction;
use pimsim_core::isa::opcodes::{SPECIAL_ACTIVATION_GROUP_NUM, SPECIAL_PIM_INPUT_BIT_WIDTH};
use pretty_assertions::assert_eq;

use crate::common::{
    TestContext, core0, latency_cycles, li, li_special, load, pim_compute, sample_edges, store,
};

/// Registers shared by the PIM programs: inputs at 0 and 256, 16 inputs of
/// 8 bits on one macro group.
fn pim_prelude() -> Vec<Instruction> {
    vec![
        li_special(SPECIAL_PIM_INPUT_BIT_WIDTH, 8),
        li_special(SPECIAL_ACTIVATION_GROUP_NUM, 1),
        li(1, 0),
        li(2, 16),
        li(3, 256),
    ]
}

#[test]
fn test_load_then_store_on_disjoint_banks() {
    let program = vec![load(1, 0, 0), store(0, 2, 512)];
    let (simulator, reporter) = TestContext::new()
        .with_banks(&["a", "b", "c"])
        .with_program(0, program)
        .run();

    let stats = reporter.core_stats[0];
    assert_eq!(stats.issue_cycles, 2);
    assert_eq!(stats.stall_cycles, 0);
    assert_eq!(stats.dispatched_instructions, 2);
    assert!((latency_cycles(&simulator, &reporter) - 2.0).abs() < 1e-9);
}

#[test]
fn test_pim_computes_serialize_without_shared_banks() {
    let mut program = pim_prelude();
    program.push(pim_compute(1, 2, 0));
    program.push(pim_compute(3, 2, 0));
    let simulator = TestContext::new()
        .with_banks(&["a", "b", "c"])
        .with_data_mode(DataMode::NotRealData)
        .with_program(0, program)
        .build();

    let samples = sample_edges(&simulator, 500, |sim| {
        let core = core0(sim);
        let compute = core.unit_ports(ExecuteUnitType::PimCompute).unwrap();
        (core.stats().dispatched_instructions, compute.in_flight_ins_ids())
    });

    assert!(samples.iter().all(|(_, in_flight)| in_flight.len() <= 1));
    let first_seen = samples.iter().position(|(_, in_flight)| !in_flight.is_empty()).unwrap();
    let first_id = samples[first_seen].1[0];
    let first_finish = first_seen
        + samples[first_seen..]
            .iter()
            .position(|(_, in_flight)| !in_flight.contains(&first_id))
            .unwrap();
    let second_dispatch = samples.iter().position(|&(dispatched, _)| dispatched == 7).unwrap();
    assert!(first_finish <= second_dispatch);
    assert_eq!(samples[first_finish - 1].0, 6);
    let (_, in_flight_at_second) = &samples[second_dispatch];
    assert_eq!(in_flight_at_second.len(), 1);
    assert_ne!(in_flight_at_second[0], first_id);
    let core = core0(&simulator);
    assert!(core.is_finished());
    assert!(core.stats().stall_cycles > 0);
}

#[test]
fn test_scalar_overlaps_pim_compute() {
    let mut program = pim_prelude();
    program.push(pim_compute(1, 2, 0));
    program.push(li(5, 1));
    let simulator = TestContext::new()
        .with_banks(&["a", "b", "c"])
        .with_data_mode(DataMode::NotRealData)
        .with_program(0, program)
        .build();

    let samples = sample_edges(&simulator, 500, |sim| {
        let core = core0(sim);
        let compute = core.unit_ports(ExecuteUnitType::PimCompute).unwrap();
        (core.stats().dispatched_instructions, compute.in_flight_count())
    });

    let (_, compute_in_flight) = samples.iter().find(|&&(dispatched, _)| dispatched == 7).copied().unwrap();
    assert_eq!(compute_in_flight, 1);
    assert_eq!(core0(&simulator).stats().stall_cycles, 0);
}
