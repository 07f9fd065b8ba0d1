//! Chip construction and top-level [`Chip`] type.
//!
//! This module builds the complete chip from configuration. It performs:
//! 1. **Network:** One network shared by every core and the global memory.
//! 2. **Global memory:** One RAM reached through the network, attached as the
//!    node after the last core.
//! 3. **Cores:** `core_cnt` identical cores named `Core_<id>`, each running
//!    its own program.
//! 4. **Completion:** In run-one-round mode, stops the kernel once every core
//!    has finished and records the running time.

use std::fmt;
use std::rc::Rc;

use super::global_memory::GlobalMemory;
use super::memory::GlobalMemoryPort;
use super::network::{Network, SimpleNetwork};
use crate::common::{SimError, SimResult};
use crate::config::{ChipConfig, SimMode};
use crate::core::Core;
use crate::isa::Instruction;
use crate::sim::{Event, SimContext};
use crate::stats::{CoreStats, EnergyReporter};

/// The simulated chip.
pub struct Chip {
    ctx: SimContext,
    cores: Vec<Rc<Core>>,
    network: Rc<SimpleNetwork>,
    global_memory: Rc<GlobalMemory>,
}

impl fmt::Debug for Chip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chip")
            .field("cores", &self.cores)
            .field("global_memory", &self.global_memory)
            .finish_non_exhaustive()
    }
}

impl Chip {
    /// Builds the chip with one program per core.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::ProgramCount`] if `programs` does not hold exactly
    /// one program per core, or the error of a memory that cannot be built.
    pub fn new(ctx: &SimContext, config: &ChipConfig, programs: Vec<Vec<Instruction>>) -> SimResult<Self> {
        if programs.len() != config.core_cnt {
            return Err(SimError::ProgramCount {
                cores: config.core_cnt,
                programs: programs.len(),
            });
        }

        let network = Rc::new(SimpleNetwork::new(ctx, &config.network_config));
        let global_memory = Rc::new(GlobalMemory::new(
            ctx,
            &config.global_memory_config,
            config.global_memory_addressing,
            config.core_cnt,
        )?);
        let finish = ctx.kernel().event("chip.finish");

        let cores = programs
            .into_iter()
            .enumerate()
            .map(|(core_id, program)| {
                let global = GlobalMemoryPort {
                    node_id: core_id,
                    network: Rc::clone(&network) as Rc<dyn Network>,
                    memory: Rc::clone(&global_memory),
                };
                Core::new(ctx, core_id, &config.core_config, program, Some(global), finish.clone())
            })
            .collect::<SimResult<Vec<_>>>()?;
        tracing::info!(cores = cores.len(), "chip built");

        let chip = Self {
            ctx: ctx.clone(),
            cores,
            network,
            global_memory,
        };
        if ctx.sim_mode() == SimMode::RunOneRound {
            chip.spawn_finish_watch(finish);
        }
        Ok(chip)
    }

    fn spawn_finish_watch(&self, finish: Event) {
        let cores = self.cores.clone();
        let ctx = self.ctx.clone();
        self.ctx.kernel().spawn("chip.finish_watch", async move {
            while !cores.iter().all(|core| core.is_finished()) {
                finish.wait().await;
            }
            let running_time_ns = ctx.now_ns();
            tracing::info!(running_time_ns, "all cores finished");
            ctx.record_running_time(running_time_ns);
            ctx.kernel().stop();
        });
    }

    /// Cores in id order.
    pub fn cores(&self) -> &[Rc<Core>] {
        &self.cores
    }

    /// Whether every core has finished its program.
    pub fn is_finished(&self) -> bool {
        self.cores.iter().all(|core| core.is_finished())
    }

    /// Issue statistics of every core, in id order.
    pub fn core_stats(&self) -> Vec<CoreStats> {
        self.cores.iter().map(|core| core.stats()).collect()
    }

    /// Global memory.
    pub const fn global_memory(&self) -> &Rc<GlobalMemory> {
        &self.global_memory
    }

    /// Energy tree of the chip over a run of `running_time_ns`.
    pub fn energy_reporter(&self, running_time_ns: f64) -> EnergyReporter {
        let mut reporter = EnergyReporter::default();
        for core in &self.cores {
            reporter.add_sub_module(core.name(), core.energy_reporter(running_time_ns));
        }
        reporter.add_sub_module("GlobalMemory", self.global_memory.energy_reporter(running_time_ns));
        reporter.add_sub_module("Network", self.network.energy_reporter(running_time_ns));
        reporter
    }
}
