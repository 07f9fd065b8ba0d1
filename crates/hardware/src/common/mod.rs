//! Common utilities and types used throughout the PIM accelerator simulator.
//!
//! This module provides fundamental building blocks shared across all components
//! of the simulator. It includes:
//! 1. **Constants:** Word, register-file and SIMD dimensions of the architecture.
//! 2. **Error Handling:** Fatal simulation errors and configuration rejections.
//! 3. **Bit Utilities:** Ceiling division, mask-bit tests and little-endian word packing.

/// Architecture-wide constants.
pub mod constants;

/// Error types for fatal simulation failures.
pub mod error;

/// Integer, byte and bit-mask helpers.
pub mod bits;

pub use constants::{BYTE_TO_BIT, GENERAL_REG_NUM, SPECIAL_REG_NUM, WORD_BYTE_SIZE};
pub use error::{ConfigError, SimError, SimResult};
