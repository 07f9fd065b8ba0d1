//! Simulation infrastructure.
//!
//! Provides the discrete-event kernel that runs every hardware process, the
//! chip clock, the shared simulation context, program loading and the
//! top-level [`Simulator`] driver.

pub mod clock;
pub mod context;
pub mod event;
pub mod kernel;
pub mod loader;
pub mod simulator;

pub use clock::Clock;
pub use context::SimContext;
pub use event::{Event, EventWait};
pub use kernel::{Kernel, RunOutcome, SimTime, ns_to_time, time_to_ns};
pub use simulator::Simulator;
