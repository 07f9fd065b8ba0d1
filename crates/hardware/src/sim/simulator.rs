//! Simulator: owns the simulation context and the chip side by side.
//!
//! The driver validates the configuration, builds the chip, runs the kernel in
//! the configured mode and turns the outcome into a [`Reporter`].

use std::path::Path;

use super::context::SimContext;
use super::kernel::{RunOutcome, ns_to_time};
use super::loader;
use crate::common::SimResult;
use crate::common::constants::NS_PER_MS;
use crate::config::{Config, SimMode};
use crate::isa::Instruction;
use crate::soc::Chip;
use crate::stats::Reporter;

/// Top-level simulator: simulation context and chip.
#[derive(Debug)]
pub struct Simulator {
    ctx: SimContext,
    chip: Chip,
    sim_time_ms: f64,
}

impl Simulator {
    /// Builds a simulator for `config` with one program per core.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, the program count does not
    /// match the core count or a memory cannot be built.
    pub fn new(config: &Config, programs: Vec<Vec<Instruction>>) -> SimResult<Self> {
        config.validate()?;
        let ctx = SimContext::new(&config.sim_config);
        let chip = Chip::new(&ctx, &config.chip_config, programs)?;
        Ok(Self {
            ctx,
            chip,
            sim_time_ms: config.sim_config.sim_time_ms,
        })
    }

    /// Loads the configuration and programs from JSON files and builds the simulator.
    ///
    /// # Errors
    ///
    /// Returns the first loading error, or the errors of [`Simulator::new`].
    pub fn from_files(config_path: impl AsRef<Path>, program_paths: &[impl AsRef<Path>]) -> SimResult<Self> {
        let config = loader::load_config(config_path)?;
        let programs = program_paths
            .iter()
            .map(loader::load_program)
            .collect::<SimResult<Vec<_>>>()?;
        Self::new(&config, programs)
    }

    /// The simulated chip.
    pub const fn chip(&self) -> &Chip {
        &self.chip
    }

    /// The simulation context.
    pub const fn context(&self) -> &SimContext {
        &self.ctx
    }

    /// Runs the simulation to completion and reports latency and energy.
    ///
    /// In run-one-round mode the run ends once every core has finished. In
    /// run-until-time mode it ends after the configured simulated time.
    ///
    /// # Errors
    ///
    /// Returns the fatal error raised during the run, if any.
    pub fn run(&self) -> SimResult<Reporter> {
        let outcome = match self.ctx.sim_mode() {
            SimMode::RunUntilTime => {
                let limit = ns_to_time(self.sim_time_ms * NS_PER_MS);
                let outcome = self.ctx.kernel().run(Some(limit));
                if outcome == RunOutcome::TimeLimit {
                    self.ctx.record_running_time(self.sim_time_ms * NS_PER_MS);
                }
                outcome
            }
            SimMode::RunOneRound => self.ctx.kernel().run(None),
        };
        if let Some(error) = self.ctx.take_fatal() {
            return Err(error);
        }
        if !self.chip.is_finished() && self.ctx.sim_mode() == SimMode::RunOneRound {
            tracing::warn!(?outcome, "run ended before every core finished");
        }

        let running_time_ns = self.ctx.running_time_ns();
        tracing::info!(?outcome, running_time_ns, "simulation finished");
        Ok(Reporter::new(
            "Chip",
            running_time_ns / NS_PER_MS,
            self.chip.energy_reporter(running_time_ns),
            self.chip.core_stats(),
        ))
    }
}
