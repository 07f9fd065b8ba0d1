use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::common::{TestContext, addi, bne, core0, jmp, li, latency_cycles};

#[test]
fn test_counted_loop() {
    let program = vec![li(1, 0), li(2, 3), addi(1, 1, 1), bne(1, 2, -1)];
    let (simulator, reporter) = TestContext::new().with_program(0, program).run();

    assert_eq!(core0(&simulator).reg().general_registers()[1], 3);
    let stats = reporter.core_stats[0];
    assert_eq!(stats.control_instructions, 3);
    assert_eq!(stats.dispatched_instructions, 5);
    assert_eq!(stats.issue_cycles, 8);
}

#[rstest]
#[case::past_the_end(jmp(10))]
#[case::before_the_start(jmp(-5))]
fn test_jump_out_of_program_finishes(#[case] jump: pimsim_core::isa::Instruction) {
    let program = vec![jump, li(1, 1)];
    let (simulator, reporter) = TestContext::new().with_program(0, program).run();

    assert!(simulator.chip().is_finished());
    assert_eq!(reporter.core_stats[0].dispatched_instructions, 0);
    assert_eq!(core0(&simulator).reg().general_registers()[1], 0);
    assert!((latency_cycles(&simulator, &reporter) - 1.0).abs() < 1e-9);
}

#[test]
fn test_empty_program_finishes_immediately() {
    let (simulator, reporter) = TestContext::new().run();
    assert!(simulator.chip().is_finished());
    assert_eq!(reporter.latency_ms, 0.0);
    assert_eq!(reporter.core_stats[0].issue_cycles, 0);
}
