//! Simulation context shared by every hardware component.
//!
//! The context bundles the kernel, the chip clock and the run-wide settings a
//! component needs. The measured running time is written once, when the run
//! ends, and read by energy reporting afterwards.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::clock::Clock;
use super::kernel::{Kernel, SimTime, ns_to_time};
use crate::common::SimError;
use crate::config::{DataMode, SimConfig, SimMode};

struct RunRecord {
    running_time_ns: Cell<Option<f64>>,
    fatal: RefCell<Option<SimError>>,
}

/// Handle to the kernel, clock and run settings.
#[derive(Clone)]
pub struct SimContext {
    kernel: Kernel,
    clock: Rc<Clock>,
    period_ns: f64,
    sim_mode: SimMode,
    data_mode: DataMode,
    record: Rc<RunRecord>,
}

impl fmt::Debug for SimContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimContext")
            .field("period_ns", &self.period_ns)
            .field("sim_mode", &self.sim_mode)
            .field("data_mode", &self.data_mode)
            .field("running_time_ns", &self.record.running_time_ns.get())
            .finish_non_exhaustive()
    }
}

impl SimContext {
    /// Creates a kernel and clock for `config`.
    pub fn new(config: &SimConfig) -> Self {
        let kernel = Kernel::new();
        let clock = Clock::new(&kernel, config.period_ns);
        Self {
            kernel,
            clock,
            period_ns: config.period_ns,
            sim_mode: config.sim_mode,
            data_mode: config.data_mode,
            record: Rc::new(RunRecord {
                running_time_ns: Cell::new(None),
                fatal: RefCell::new(None),
            }),
        }
    }

    /// The kernel driving this simulation.
    #[inline]
    pub const fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// The chip clock.
    #[inline]
    pub fn clock(&self) -> &Rc<Clock> {
        &self.clock
    }

    /// Clock period in nanoseconds.
    #[inline]
    pub const fn period_ns(&self) -> f64 {
        self.period_ns
    }

    /// Configured termination mode.
    #[inline]
    pub const fn sim_mode(&self) -> SimMode {
        self.sim_mode
    }

    /// Whether memories carry real bytes.
    #[inline]
    pub fn real_data(&self) -> bool {
        self.data_mode == DataMode::RealData
    }

    /// Duration of `cycles` clock periods in nanoseconds.
    #[inline]
    pub fn cycles_ns(&self, cycles: u32) -> f64 {
        f64::from(cycles) * self.period_ns
    }

    /// Duration of `cycles` clock periods as kernel time.
    #[inline]
    pub fn cycles(&self, cycles: u32) -> SimTime {
        ns_to_time(self.cycles_ns(cycles))
    }

    /// Current simulated time in nanoseconds.
    #[inline]
    pub fn now_ns(&self) -> f64 {
        self.kernel.now_ns()
    }

    /// Records the running time of the finished run. Later calls are ignored.
    pub fn record_running_time(&self, ns: f64) {
        if self.record.running_time_ns.get().is_none() {
            self.record.running_time_ns.set(Some(ns));
        }
    }

    /// Running time of the run, or the current time while it is still going.
    pub fn running_time_ns(&self) -> f64 {
        self.record.running_time_ns.get().unwrap_or_else(|| self.now_ns())
    }

    /// Records a fatal error and stops the kernel. The first error wins.
    pub fn fail(&self, error: SimError) {
        tracing::error!(%error, "fatal simulation error");
        let mut fatal = self.record.fatal.borrow_mut();
        if fatal.is_none() {
            *fatal = Some(error);
        }
        self.kernel.stop();
    }

    /// Takes the fatal error recorded during the run, if any.
    pub fn take_fatal(&self) -> Option<SimError> {
        self.record.fatal.borrow_mut().take()
    }
}
