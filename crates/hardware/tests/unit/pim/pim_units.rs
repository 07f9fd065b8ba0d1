use pimsim_core::config::DataMode;
use pimsim_core::core::payload::ExecuteUnitType;
use pimsim_core::isa::opcodes::{
    SPECIAL_ACTIVATION_GROUP_NUM, SPECIAL_PIM_INPUT_BIT_WIDTH, SPECIAL_PIM_OUTPUT_BIT_WIDTH,
};
use pimsim_core::isa::Instruction;
use pimsim_core::stats::EnergyReporter;
use rstest::rstest;

use crate::common::{
    TestContext, core0, latency_cycles, li, li_special, load, pim_compute, pim_compute_to, pim_output,
    sample_edges, transfer,
};

/// Start of the default PIM address space.
const PIM_BASE: i32 = 1 << 20;

#[test]
fn test_compute_then_output_charges_pim_unit() {
    let program = vec![
        li_special(SPECIAL_PIM_INPUT_BIT_WIDTH, 8),
        li_special(SPECIAL_PIM_OUTPUT_BIT_WIDTH, 32),
        li_special(SPECIAL_ACTIVATION_GROUP_NUM, 1),
        li(1, 0),
        li(2, 16),
        li(7, 512),
        li(8, 4),
        pim_compute(1, 2, 0),
        pim_output(7, 8),
    ];
    let (simulator, reporter) = TestContext::new()
        .with_banks(&["a", "b", "c"])
        .with_data_mode(DataMode::NotRealData)
        .with_program(0, program)
        .run();

    assert!(simulator.chip().is_finished());
    assert_eq!(reporter.core_stats[0].dispatched_instructions, 9);
    let pim = &reporter.energy_reporter.sub_modules["Core_0"].sub_modules["PimUnit"];
    assert!(pim.dynamic_energy_pj > 0.0);
    assert!(pim.static_energy_pj > 0.0);
}

/// One group of 16 inputs of 8 bits at 0 with 32-bit results.
fn compute_prelude() -> Vec<Instruction> {
    vec![
        li_special(SPECIAL_PIM_INPUT_BIT_WIDTH, 8),
        li_special(SPECIAL_PIM_OUTPUT_BIT_WIDTH, 32),
        li_special(SPECIAL_ACTIVATION_GROUP_NUM, 1),
        li(1, 0),
        li(2, 16),
        li(7, 512),
    ]
}

fn bank_c_write_energy(reporter: &EnergyReporter) -> f64 {
    reporter.sub_modules["LocalMemoryUnit"].sub_modules["c"].sub_modules["write"].dynamic_energy_pj
}

#[test]
fn test_compute_with_output_register_writes_results() {
    let mut with_output = compute_prelude();
    with_output.push(pim_compute_to(1, 2, 0, 7));
    let mut without_output = compute_prelude();
    without_output.push(pim_compute(1, 2, 0));

    let run = |program: Vec<Instruction>| {
        TestContext::new()
            .with_banks(&["a", "b", "c"])
            .with_data_mode(DataMode::NotRealData)
            .with_program(0, program)
            .run()
    };
    let (written_sim, written) = run(with_output);
    let (plain_sim, plain) = run(without_output);

    assert!(written_sim.chip().is_finished());
    assert!(bank_c_write_energy(&written.energy_reporter.sub_modules["Core_0"]) > 0.0);
    assert!(bank_c_write_energy(&plain.energy_reporter.sub_modules["Core_0"]).abs() < 1e-9);
    assert!(latency_cycles(&written_sim, &written) > latency_cycles(&plain_sim, &plain));
}

#[test]
fn test_reader_of_output_bank_waits_for_result_write() {
    let mut program = compute_prelude();
    program.push(pim_compute_to(1, 2, 0, 7));
    program.push(load(9, 7, 0));
    let simulator = TestContext::new()
        .with_banks(&["a", "b", "c"])
        .with_data_mode(DataMode::NotRealData)
        .with_program(0, program)
        .build();

    let samples = sample_edges(&simulator, 500, |sim| {
        let core = core0(sim);
        let compute = core.unit_ports(ExecuteUnitType::PimCompute).unwrap();
        (
            core.stats().dispatched_instructions,
            compute.in_flight_count(),
            bank_c_write_energy(&core.energy_reporter(0.0)),
        )
    });

    assert!(core0(&simulator).is_finished());
    let (_, in_flight, written) = samples.iter().find(|&&(dispatched, _, _)| dispatched == 8).copied().unwrap();
    assert_eq!(in_flight, 0);
    assert!(written > 0.0);
    assert!(core0(&simulator).stats().stall_cycles > 0);
}

#[rstest]
#[case::fast_path(true, ExecuteUnitType::PimLoad, ExecuteUnitType::Transfer)]
#[case::local_transfer(false, ExecuteUnitType::Transfer, ExecuteUnitType::PimLoad)]
fn test_weight_load_routing(#[case] fast_path: bool, #[case] used: ExecuteUnitType, #[case] unused: ExecuteUnitType) {
    let program = vec![li(1, 0), li(2, 64), li(4, PIM_BASE), transfer(4, 1, 2)];
    let simulator = TestContext::new()
        .with_pim_load_fast_path(fast_path)
        .with_program(0, program)
        .build();

    let samples = sample_edges(&simulator, 500, |sim| {
        let core = core0(sim);
        (
            core.unit_ports(used).unwrap().is_idle(),
            core.unit_ports(unused).unwrap().is_idle(),
        )
    });

    assert!(core0(&simulator).is_finished());
    assert!(samples.iter().any(|&(used_idle, _)| !used_idle));
    assert!(samples.iter().all(|&(_, unused_idle)| unused_idle));
}
