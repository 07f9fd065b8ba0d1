//! Error definitions.
//!
//! Two tiers exist in the simulator. Recoverable faults (out-of-range addresses,
//! unbound memory sockets, bad register bindings) are logged through `tracing`
//! and degrade to a no-op. Everything in this module is the fatal tier: it stops
//! the run and surfaces to the caller of [`crate::sim::Simulator`].

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for fallible simulator operations.
pub type SimResult<T> = Result<T, SimError>;

/// A configuration value rejected before the hardware is built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid config `{field}`: {reason}")]
pub struct ConfigError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Human readable explanation.
    pub reason: String,
}

impl ConfigError {
    /// Creates a new configuration error for `field`.
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Prefixes the field path with the name of the enclosing structure.
    #[must_use]
    pub fn within(mut self, parent: &str) -> Self {
        self.field = format!("{parent}.{}", self.field);
        self
    }
}

/// Fatal simulation errors.
#[derive(Debug, Error)]
pub enum SimError {
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A configuration, program or report file could not be parsed.
    #[error("failed to parse {what}: {source}")]
    Parse {
        /// What was being parsed.
        what: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A file could not be read or written.
    #[error("i/o error on {path}: {source}")]
    Io {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The number of programs does not match the number of cores.
    #[error("chip has {cores} cores but {programs} programs were supplied")]
    ProgramCount {
        /// Configured core count.
        cores: usize,
        /// Supplied program count.
        programs: usize,
    },

    /// A program contains an instruction with an unknown encoding.
    #[error("invalid instruction at pc {pc}: {reason}")]
    InvalidInstruction {
        /// One-based position in the program.
        pc: usize,
        /// What is wrong with the encoding.
        reason: String,
    },

    /// No SIMD instruction is configured for an opcode and operand count.
    #[error("no SIMD instruction with opcode {opcode:#x} and {input_cnt} inputs")]
    UnknownSimdInstruction {
        /// Instruction opcode.
        opcode: u32,
        /// Number of inputs.
        input_cnt: u32,
    },

    /// No functor binding of a SIMD instruction matches the operand bit widths.
    #[error("no functor of SIMD instruction `{instruction}` accepts input widths {widths:?}")]
    NoSimdFunctorBinding {
        /// Instruction name.
        instruction: String,
        /// Decoded input bit widths.
        widths: Vec<u32>,
    },
}

impl SimError {
    /// Wraps a JSON error raised while parsing `what`.
    pub fn parse(what: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Parse {
            what: what.into(),
            source,
        }
    }

    /// Wraps an I/O error raised while accessing `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
