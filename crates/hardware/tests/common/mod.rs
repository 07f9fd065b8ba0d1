/// Instruction record builders.
pub mod builder;

/// `TestContext` and run probes.
pub mod harness;

pub use builder::*;
pub use harness::*;
