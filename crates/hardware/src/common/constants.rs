//! Global Architecture Constants.
//!
//! This module defines constants shared by the decoder, the register unit and the
//! execution units. It includes:
//! 1. **Register File:** General and special register counts.
//! 2. **Data Words:** Word size and byte/bit conversion.
//! 3. **SIMD:** Operand count limit and opcode key layout.

/// Number of general-purpose registers.
pub const GENERAL_REG_NUM: usize = 32;

/// Number of special registers.
pub const SPECIAL_REG_NUM: usize = 32;

/// Size of a register word in bytes.
pub const WORD_BYTE_SIZE: usize = 4;

/// Bits per byte.
pub const BYTE_TO_BIT: usize = 8;

/// Maximum number of SIMD input operands.
pub const SIMD_MAX_INPUT_NUM: usize = 4;

/// Number of opcode bits in a SIMD instruction key; the input count sits above them.
pub const SIMD_INSTRUCTION_OPCODE_BIT_LENGTH: u32 = 8;

/// Largest SIMD opcode.
pub const SIMD_MAX_OPCODE: u32 = 255;

/// Bit widths a SIMD operand may have.
pub const SIMD_DATA_WIDTHS: [u32; 7] = [1, 2, 4, 8, 16, 32, 64];

/// Picoseconds per nanosecond, the resolution of simulated time.
pub const PS_PER_NS: f64 = 1000.0;

/// Nanoseconds per millisecond.
pub const NS_PER_MS: f64 = 1_000_000.0;
