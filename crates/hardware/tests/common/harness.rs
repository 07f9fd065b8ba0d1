use pimsim_core::config::{
    AddressSpaceConfig, DataMode, LocalMemoryConfig, LocalMemoryHardwareConfig, RamConfig, SimMode,
};
use pimsim_core::isa::Instruction;
use pimsim_core::sim::RunOutcome;
use pimsim_core::{Config, Core, Reporter, Simulator};
use tracing_subscriber::EnvFilter;

/// Size of every bank built by [`TestContext::with_banks`].
pub const BANK_SIZE: usize = 256;

/// Builds a chip configuration and per-core programs, then the simulator.
#[derive(Debug, Clone)]
pub struct TestContext {
    pub config: Config,
    pub programs: Vec<Vec<Instruction>>,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    /// Default configuration with one core and an empty program.
    pub fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        Self {
            config: Config::default(),
            programs: vec![Vec::new()],
        }
    }

    pub fn with_cores(mut self, core_cnt: usize) -> Self {
        self.config.chip_config.core_cnt = core_cnt;
        self.programs.resize(core_cnt, Vec::new());
        self
    }

    /// Replaces the local memory with one RAM bank of [`BANK_SIZE`] bytes per
    /// name, laid out back to back from address 0.
    pub fn with_banks(mut self, names: &[&str]) -> Self {
        self.config.chip_config.core_config.local_memory_unit_config.local_memory_list = names
            .iter()
            .enumerate()
            .map(|(i, name)| LocalMemoryConfig {
                name: (*name).to_owned(),
                addressing: AddressSpaceConfig {
                    offset_byte: (i * BANK_SIZE) as i64,
                    size_byte: BANK_SIZE as i64,
                },
                hardware: LocalMemoryHardwareConfig::Ram(RamConfig {
                    size_byte: BANK_SIZE,
                    ..RamConfig::default()
                }),
            })
            .collect();
        self
    }

    pub fn with_data_mode(mut self, data_mode: DataMode) -> Self {
        self.config.sim_config.data_mode = data_mode;
        self
    }

    pub fn with_run_until_time(mut self, sim_time_ms: f64) -> Self {
        self.config.sim_config.sim_mode = SimMode::RunUntilTime;
        self.config.sim_config.sim_time_ms = sim_time_ms;
        self
    }

    pub fn with_pim_load_fast_path(mut self, enabled: bool) -> Self {
        self.config.chip_config.core_config.transfer_unit_config.pim_load_fast_path = enabled;
        self
    }

    pub fn with_program(mut self, core_id: usize, program: Vec<Instruction>) -> Self {
        self.programs[core_id] = program;
        self
    }

    pub fn build(self) -> Simulator {
        Simulator::new(&self.config, self.programs).unwrap()
    }

    /// Builds and runs the simulator to completion.
    pub fn run(self) -> (Simulator, Reporter) {
        let simulator = self.build();
        let reporter = simulator.run().unwrap();
        (simulator, reporter)
    }
}

/// Clock period of `simulator` in kernel time units.
pub fn period(simulator: &Simulator) -> u64 {
    simulator.context().clock().period()
}

/// First core of the chip.
pub fn core0(simulator: &Simulator) -> &Core {
    &simulator.chip().cores()[0]
}

/// Advances the kernel half a period past each clock edge and probes the
/// chip there, until the run stops or `max_cycles` edges have passed.
pub fn sample_edges<T>(simulator: &Simulator, max_cycles: u64, mut probe: impl FnMut(&Simulator) -> T) -> Vec<T> {
    let period = period(simulator);
    let mut samples = Vec::new();
    for cycle in 1..=max_cycles {
        let outcome = simulator.context().kernel().run(Some(cycle * period + period / 2));
        samples.push(probe(simulator));
        if outcome != RunOutcome::TimeLimit {
            break;
        }
    }
    samples
}

/// Latency of the run in clock periods.
pub fn latency_cycles(simulator: &Simulator, reporter: &Reporter) -> f64 {
    reporter.latency_ns() / simulator.context().period_ns()
}
