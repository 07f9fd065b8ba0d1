use pimsim_core::isa::opcodes::{ASSIGN_GENERAL_TO_SPECIAL, ASSIGN_SPECIAL_TO_GENERAL, CLASS_SCALAR, SCALAR_ASSIGN};
use pretty_assertions::assert_eq;

use crate::common::{InstructionBuilder, TestContext, add, addi, core0, li, li_special};

#[test]
fn test_dependent_chain_reads_fresh_values() {
    let program = vec![li(1, 5), addi(2, 1, 1), add(3, 2, 1)];
    let (simulator, reporter) = TestContext::new().with_program(0, program).run();

    let regs = core0(&simulator).reg().general_registers();
    assert_eq!(&regs[1..4], &[5, 6, 11]);
    assert_eq!(reporter.core_stats[0].stall_cycles, 0);
}

#[test]
fn test_latest_write_wins() {
    let program = vec![li(1, 5), li(1, 7), addi(2, 1, 0)];
    let (simulator, _) = TestContext::new().with_program(0, program).run();

    let regs = core0(&simulator).reg().general_registers();
    assert_eq!(regs[1], 7);
    assert_eq!(regs[2], 7);
}

#[test]
fn test_special_register_round_trip() {
    let general_to_special = InstructionBuilder::new(CLASS_SCALAR, SCALAR_ASSIGN, ASSIGN_GENERAL_TO_SPECIAL)
        .rs1(1)
        .rs2(9)
        .build();
    let special_to_general = InstructionBuilder::new(CLASS_SCALAR, SCALAR_ASSIGN, ASSIGN_SPECIAL_TO_GENERAL)
        .rs1(3)
        .rs2(10)
        .build();
    let program = vec![
        li(1, 42),
        general_to_special,
        li_special(10, 9),
        special_to_general,
    ];
    let (simulator, _) = TestContext::new().with_program(0, program).run();

    let reg = core0(&simulator).reg();
    assert_eq!(reg.read_register(9, true), 42);
    assert_eq!(reg.general_registers()[3], 9);
}
