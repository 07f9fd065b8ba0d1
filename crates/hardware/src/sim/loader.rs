//! Configuration and program loading.
//!
//! This module reads the JSON inputs of a run. It performs:
//! 1. **Config loading:** Parses a [`Config`] and validates it before any
//!    hardware is built.
//! 2. **Program loading:** Parses a JSON array of instruction records and
//!    rejects any instruction whose encoding is unknown.

use std::fs;
use std::path::Path;

use crate::common::{SimError, SimResult};
use crate::config::Config;
use crate::isa::Instruction;

/// Parses and validates a configuration from JSON text.
///
/// # Errors
///
/// Returns [`SimError::Parse`] for malformed JSON and [`SimError::Config`] if
/// validation fails.
pub fn parse_config(text: &str) -> SimResult<Config> {
    let config: Config = serde_json::from_str(text).map_err(|e| SimError::parse("config", e))?;
    config.validate()?;
    Ok(config)
}

/// Reads, parses and validates the configuration file at `path`.
///
/// # Errors
///
/// Returns [`SimError::Io`] if the file cannot be read, otherwise the errors
/// of [`parse_config`].
pub fn load_config(path: impl AsRef<Path>) -> SimResult<Config> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| SimError::io(path, e))?;
    let config = parse_config(&text)?;
    tracing::info!(path = %path.display(), cores = config.chip_config.core_cnt, "config loaded");
    Ok(config)
}

/// Parses a program from JSON text and checks every encoding.
///
/// # Errors
///
/// Returns [`SimError::Parse`] for malformed JSON and
/// [`SimError::InvalidInstruction`] for the first unknown encoding.
pub fn parse_program(text: &str) -> SimResult<Vec<Instruction>> {
    let program: Vec<Instruction> = serde_json::from_str(text).map_err(|e| SimError::parse("program", e))?;
    for (index, ins) in program.iter().enumerate() {
        if ins.operation().is_none() {
            return Err(SimError::InvalidInstruction {
                pc: index + 1,
                reason: format!(
                    "unknown encoding class={:#b} type={} opcode={}",
                    ins.class, ins.inst_type, ins.opcode
                ),
            });
        }
    }
    Ok(program)
}

/// Reads and parses the program file at `path`.
///
/// # Errors
///
/// Returns [`SimError::Io`] if the file cannot be read, otherwise the errors
/// of [`parse_program`].
pub fn load_program(path: impl AsRef<Path>) -> SimResult<Vec<Instruction>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| SimError::io(path, e))?;
    let program = parse_program(&text)?;
    tracing::info!(path = %path.display(), instructions = program.len(), "program loaded");
    Ok(program)
}
