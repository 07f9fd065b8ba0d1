//! Energy accounting.
//!
//! Units are picojoules for energy, milliwatts for power and nanoseconds for
//! time, so `mW × ns = pJ`. Static energy is not accumulated here: it is the
//! static power times the running time of the whole run, which is only known
//! once the run ends and is read from the [`crate::sim::SimContext`].

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::sim::SimTime;

/// Static power, dynamic energy and activity time of one hardware block.
///
/// Interior mutability lets a block shared through `Rc` record energy from any
/// of its processes.
#[derive(Debug, Clone, Default)]
pub struct EnergyCounter {
    static_power_mw: Cell<f64>,
    dynamic_energy_pj: Cell<f64>,
    activity_time_ns: Cell<f64>,
    last_tag_time: RefCell<HashMap<usize, SimTime>>,
}

impl EnergyCounter {
    /// Creates a counter with the given leakage power.
    pub fn with_static_power(power_mw: f64) -> Self {
        let counter = Self::default();
        counter.set_static_power_mw(power_mw);
        counter
    }

    /// Sets the leakage power.
    pub fn set_static_power_mw(&self, power_mw: f64) {
        self.static_power_mw.set(power_mw);
    }

    /// Records `latency_ns` of activity at `power_mw`.
    pub fn add_dynamic_energy(&self, latency_ns: f64, power_mw: f64) {
        self.activity_time_ns.set(self.activity_time_ns.get() + latency_ns);
        self.dynamic_energy_pj
            .set(self.dynamic_energy_pj.get() + latency_ns * power_mw);
    }

    /// Records activity unless `tag` was already recorded at `time`.
    ///
    /// Several processes driving the same physical block in one instant share a
    /// tag, so the block is charged once per instant.
    pub fn add_tagged_dynamic_energy(&self, tag: usize, time: SimTime, latency_ns: f64, power_mw: f64) {
        let fresh = self.last_tag_time.borrow_mut().insert(tag, time) != Some(time);
        if fresh {
            self.add_dynamic_energy(latency_ns, power_mw);
        }
    }

    /// Leakage power.
    pub fn static_power_mw(&self) -> f64 {
        self.static_power_mw.get()
    }

    /// Dynamic energy recorded so far.
    pub fn dynamic_energy_pj(&self) -> f64 {
        self.dynamic_energy_pj.get()
    }

    /// Activity time recorded so far.
    pub fn activity_time_ns(&self) -> f64 {
        self.activity_time_ns.get()
    }

    /// Static energy over a run of `running_time_ns`.
    pub fn static_energy_pj(&self, running_time_ns: f64) -> f64 {
        self.static_power_mw.get() * running_time_ns
    }

    /// Static plus dynamic energy over a run of `running_time_ns`.
    pub fn total_energy_pj(&self, running_time_ns: f64) -> f64 {
        self.static_energy_pj(running_time_ns) + self.dynamic_energy_pj()
    }
}
