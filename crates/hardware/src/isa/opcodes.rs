//! Instruction field encodings.
//!
//! Numeric values of the `class`, `type` and `opcode` fields of an
//! [`Instruction`](super::Instruction).

/// PIM instructions.
pub const CLASS_PIM: u32 = 0b00;
/// SIMD instructions.
pub const CLASS_SIMD: u32 = 0b01;
/// Scalar instructions.
pub const CLASS_SCALAR: u32 = 0b10;
/// Memory transfer instructions.
pub const CLASS_TRANSFER: u32 = 0b110;
/// Control-flow instructions.
pub const CLASS_CONTROL: u32 = 0b111;

/// PIM compute.
pub const PIM_COMPUTE: u32 = 0;
/// PIM set activation columns.
pub const PIM_SET: u32 = 1;
/// PIM output.
pub const PIM_OUTPUT: u32 = 2;
/// PIM transfer of valid outputs.
pub const PIM_TRANSFER: u32 = 3;

/// Scalar register-register arithmetic.
pub const SCALAR_RR: u32 = 0;
/// Scalar register-immediate arithmetic.
pub const SCALAR_RI: u32 = 1;
/// Scalar load and store.
pub const SCALAR_SL: u32 = 2;
/// Scalar register assignment.
pub const SCALAR_ASSIGN: u32 = 3;

/// Load from local memory.
pub const SL_LOAD_LOCAL: u32 = 0;
/// Store to local memory.
pub const SL_STORE_LOCAL: u32 = 1;
/// Load from global memory.
pub const SL_LOAD_GLOBAL: u32 = 2;
/// Store to global memory.
pub const SL_STORE_GLOBAL: u32 = 3;

/// Load an immediate into a general register.
pub const ASSIGN_LI_GENERAL: u32 = 0;
/// Load an immediate into a special register.
pub const ASSIGN_LI_SPECIAL: u32 = 1;
/// Copy a general register into a special register.
pub const ASSIGN_GENERAL_TO_SPECIAL: u32 = 2;
/// Copy a special register into a general register.
pub const ASSIGN_SPECIAL_TO_GENERAL: u32 = 3;

/// Branch if equal.
pub const CONTROL_BEQ: u32 = 0;
/// Branch if not equal.
pub const CONTROL_BNE: u32 = 1;
/// Branch if greater than.
pub const CONTROL_BGT: u32 = 2;
/// Branch if less than.
pub const CONTROL_BLT: u32 = 3;
/// Unconditional relative jump.
pub const CONTROL_JMP: u32 = 4;

/// Special register holding the PIM input bit width.
pub const SPECIAL_PIM_INPUT_BIT_WIDTH: usize = 0;
/// Special register holding the PIM output bit width.
pub const SPECIAL_PIM_OUTPUT_BIT_WIDTH: usize = 1;
/// Special register holding the number of activated macro groups.
pub const SPECIAL_ACTIVATION_GROUP_NUM: usize = 4;
/// Special register holding the number of activated element columns.
pub const SPECIAL_ACTIVATION_ELEMENT_COL_NUM: usize = 5;
/// Special register holding the input address step between groups.
pub const SPECIAL_GROUP_INPUT_STEP: usize = 6;
/// Special register holding the value-sparse mask address.
pub const SPECIAL_VALUE_SPARSE_MASK_ADDR: usize = 7;
/// Special register holding the bit-sparse metadata address.
pub const SPECIAL_BIT_SPARSE_META_ADDR: usize = 8;
/// First of four special registers holding SIMD input bit widths.
pub const SPECIAL_SIMD_INPUT_1_BIT_WIDTH: usize = 16;
/// Special register holding the SIMD output bit width.
pub const SPECIAL_SIMD_OUTPUT_BIT_WIDTH: usize = 20;
