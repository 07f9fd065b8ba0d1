use pimsim_core::common::SimError;
use pimsim_core::config::DataMode;
use pimsim_core::config::defaults::GLOBAL_MEMORY_OFFSET_BYTE;
use pimsim_core::isa::opcodes::{SPECIAL_ACTIVATION_GROUP_NUM, SPECIAL_PIM_INPUT_BIT_WIDTH};
use pimsim_core::{Config, Simulator};
use pretty_assertions::assert_eq;

use crate::common::{
    TestContext, addi, core0, latency_cycles, li, li_special, load_global, pim_compute, store,
    store_global, transfer,
};

#[test]
fn test_chip_stops_with_slowest_core() {
    let (simulator, reporter) = TestContext::new()
        .with_cores(3)
        .with_program(0, vec![li(1, 1)])
        .with_program(1, vec![li(1, 1), li(2, 2), li(3, 3), li(4, 4)])
        .run();

    assert!(simulator.chip().is_finished());
    assert!((latency_cycles(&simulator, &reporter) - 4.0).abs() < 1e-9);
    let dispatched: Vec<u64> = reporter.core_stats.iter().map(|s| s.dispatched_instructions).collect();
    assert_eq!(dispatched, vec![1, 4, 0]);
}

#[test]
fn test_run_until_time_reports_budget() {
    let (simulator, reporter) = TestContext::new()
        .with_run_until_time(0.0005)
        .with_program(0, vec![li(1, 1), addi(1, 1, 1)])
        .run();

    assert!((reporter.latency_ms - 0.0005).abs() < 1e-12);
    assert!(simulator.chip().is_finished());
    assert_eq!(core0(&simulator).reg().general_registers()[1], 2);
}

#[test]
fn test_global_store_then_load_through_network() {
    let base = i32::try_from(GLOBAL_MEMORY_OFFSET_BYTE).unwrap();
    let program = vec![li(1, base), li(2, 77), store_global(1, 2, 8), load_global(3, 1, 8)];
    let (simulator, reporter) = TestContext::new().with_program(0, program).run();

    assert_eq!(core0(&simulator).reg().general_registers()[3], 77);
    let stats = reporter.core_stats[0];
    assert_eq!(stats.dispatched_instructions, 4);
    assert!(stats.stall_cycles > 0);
    assert!(reporter.energy_reporter.sub_modules["Network"].dynamic_energy_pj > 0.0);
    assert!(reporter.energy_reporter.sub_modules["GlobalMemory"].dynamic_energy_pj > 0.0);
}

#[test]
fn test_report_energy_tree_and_totals() {
    let (_, reporter) = TestContext::new()
        .with_cores(2)
        .with_program(0, vec![li(1, 1), li(2, 2)])
        .with_program(1, vec![li(1, 1)])
        .run();

    let tree = &reporter.energy_reporter;
    let modules: Vec<&str> = tree.sub_modules.keys().map(String::as_str).collect();
    assert_eq!(modules, vec!["Core_0", "Core_1", "GlobalMemory", "Network"]);
    let core = &tree.sub_modules["Core_0"];
    for unit in ["ScalarUnit", "PimUnit", "LocalMemoryUnit", "RegUnit", "ControlUnit"] {
        assert!(core.sub_modules.contains_key(unit), "missing {unit}");
    }

    let sum: f64 = tree.sub_modules.values().map(|m| m.total_energy_pj).sum();
    assert!((reporter.total_energy_pj - sum).abs() < 1e-6);
    assert!((reporter.total_energy_pj - reporter.static_energy_pj - reporter.dynamic_energy_pj).abs() < 1e-6);
    assert!(reporter.average_power_mw > 0.0);
}

#[test]
fn test_report_renders_and_serializes() {
    let (_, reporter) = TestContext::new().with_program(0, vec![li(1, 1)]).run();

    let summary = reporter.render_sections(&["summary".to_owned()]);
    assert!(summary.contains("latency"));
    assert!(!summary.contains("ENERGY BREAKDOWN"));
    let full = reporter.render_sections(&[]);
    assert!(full.contains("CORE ISSUE"));
    assert!(full.contains("Core_0"));

    let json = serde_json::to_value(&reporter).unwrap();
    assert!(json["energy_reporter"]["sub_modules"]["Core_0"].is_object());
    assert_eq!(json["core_stats"][0]["dispatched_instructions"], 1);
}

#[test]
fn test_program_count_must_match_core_count() {
    let mut config = Config::default();
    config.chip_config.core_cnt = 2;
    let err = Simulator::new(&config, vec![vec![li(1, 1)]]).unwrap_err();
    assert!(matches!(err, SimError::ProgramCount { cores: 2, programs: 1 }));
}

#[test]
fn test_invalid_config_rejected_before_build() {
    let mut config = Config::default();
    config.sim_config.period_ns = -1.0;
    let err = Simulator::new(&config, vec![Vec::new()]).unwrap_err();
    assert!(matches!(err, SimError::Config(_)));
}

/// Transfer, PIM and scalar traffic on three banks.
fn mixed_workload() -> TestContext {
    let program = vec![
        li_special(SPECIAL_PIM_INPUT_BIT_WIDTH, 8),
        li_special(SPECIAL_ACTIVATION_GROUP_NUM, 1),
        li(1, 0),
        li(2, 64),
        li(4, 256),
        transfer(4, 1, 2),
        li(2, 16),
        pim_compute(1, 2, 0),
        addi(5, 2, 3),
        store(0, 5, 512),
    ];
    TestContext::new()
        .with_banks(&["a", "b", "c"])
        .with_data_mode(DataMode::NotRealData)
        .with_program(0, program)
}

#[test]
fn test_repeat_runs_match_bit_for_bit() {
    let (_, reference) = mixed_workload().run();
    let (_, replay) = mixed_workload().run();

    assert_eq!(reference.latency_ms.to_bits(), replay.latency_ms.to_bits());
    assert_eq!(reference.dynamic_energy_pj.to_bits(), replay.dynamic_energy_pj.to_bits());
    assert_eq!(reference.static_energy_pj.to_bits(), replay.static_energy_pj.to_bits());
    assert_eq!(reference, replay);
    assert_eq!(reference.core_stats[0].dispatched_instructions, 10);
}
