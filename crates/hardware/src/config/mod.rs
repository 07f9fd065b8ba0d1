//! Configuration system for the PIM accelerator simulator.
//!
//! This module defines the structures used to configure the chip before a run.
//! It performs:
//! 1. **Deserialization:** JSON hardware descriptions map onto the structs below,
//!    every missing field taking its documented default.
//! 2. **Validation:** [`Config::validate`] rejects malformed descriptions before
//!    any hardware is built.
//! 3. **Defaults:** The [`defaults`] module centralizes every default value.

mod core;
mod memory;
mod pim;

use serde::Deserialize;

use crate::common::ConfigError;

pub use self::core::{
    ControlUnitConfig, CoreConfig, RegisterUnitConfig, ScalarFunctorConfig, ScalarUnitConfig,
    SimdDataWidthConfig, SimdFunctorBindingConfig, SimdFunctorConfig, SimdInputType,
    SimdInstructionConfig, SimdUnitConfig, SpecialRegisterBindingConfig, TransferUnitConfig,
};
pub use self::memory::{
    AddressSpaceConfig, LocalMemoryConfig, LocalMemoryHardwareConfig, LocalMemoryUnitConfig,
    NetworkConfig, RamConfig, RegBufferConfig,
};
pub use self::pim::{
    PimBitSparseConfig, PimMacroSizeConfig, PimModuleConfig, PimSramConfig, PimUnitConfig,
    PimValueSparseConfig, SramAddressSpaceMode,
};

/// Default values for configuration fields.
pub mod defaults {
    /// Default clock period (1 ns, 1 GHz).
    pub const PERIOD_NS: f64 = 1.0;

    /// Default simulated time budget for `run_until_time` (1 ms).
    pub const SIM_TIME_MS: f64 = 1.0;

    /// Default number of cores.
    pub const CORE_CNT: usize = 1;

    /// Default RAM size in bytes.
    pub const RAM_SIZE_BYTE: usize = 1024;

    /// Default RAM access width in bytes.
    pub const RAM_WIDTH_BYTE: usize = 16;

    /// Default register-buffer size in bytes.
    pub const REG_BUFFER_SIZE_BYTE: usize = 1024;

    /// Default register-buffer maximum access width in bytes.
    pub const REG_BUFFER_MAX_WIDTH_BYTE: usize = 16;

    /// Default register-buffer access unit in bytes.
    pub const REG_BUFFER_UNIT_BYTE: usize = 4;

    /// Default latency of a single hardware stage in cycles.
    pub const LATENCY_CYCLE: u32 = 1;

    /// Default power of a hardware block in mW.
    pub const POWER_MW: f64 = 1.0;

    /// Default number of SIMD functor lanes.
    pub const SIMD_FUNCTOR_CNT: usize = 32;

    /// Default SIMD operand count.
    pub const SIMD_INPUT_CNT: u32 = 2;

    /// Default value-sparsity mask width in bits.
    pub const VALUE_SPARSE_MASK_BIT_WIDTH: usize = 1;

    /// Default bit-sparsity metadata width in bits.
    pub const BIT_SPARSE_MASK_BIT_WIDTH: usize = 3;

    /// Default global memory base address (past every local address space).
    pub const GLOBAL_MEMORY_OFFSET_BYTE: i64 = 1 << 30;

    /// Default global memory address-space size.
    pub const GLOBAL_MEMORY_SIZE_BYTE: i64 = 1 << 20;

    /// Default network hop latency in cycles.
    pub const NETWORK_LATENCY_CYCLE: u32 = 1;

    /// Default network bus width in bytes.
    pub const NETWORK_BUS_WIDTH_BYTE: usize = 16;
}

/// How the run terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimMode {
    /// Run for a fixed simulated time budget.
    RunUntilTime,
    /// Run until every core has executed its whole program once.
    #[default]
    RunOneRound,
}

/// Whether memories hold actual bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataMode {
    /// Memories store and return the bytes written to them.
    #[default]
    RealData,
    /// Only timing and energy are modeled; reads return zeros.
    NotRealData,
}

/// Root configuration structure containing all simulator settings.
///
/// # Examples
///
/// ```
/// use pimsim_core::config::{Config, SimMode};
///
/// let json = r#"{
///     "sim_config": { "period_ns": 2.0, "sim_mode": "run_until_time", "sim_time_ms": 0.5 },
///     "chip_config": { "core_cnt": 2 }
/// }"#;
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.sim_config.sim_mode, SimMode::RunUntilTime);
/// assert_eq!(config.chip_config.core_cnt, 2);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Hardware description of the chip.
    #[serde(default)]
    pub chip_config: ChipConfig,
    /// Run-wide settings.
    #[serde(default)]
    pub sim_config: SimConfig,
}

impl Config {
    /// Checks every section of the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sim_config.validate().map_err(|e| e.within("sim_config"))?;
        self.chip_config.validate().map_err(|e| e.within("chip_config"))
    }
}

/// Run-wide simulation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SimConfig {
    /// Clock period in nanoseconds.
    #[serde(default = "SimConfig::default_period_ns")]
    pub period_ns: f64,
    /// Termination mode.
    #[serde(default)]
    pub sim_mode: SimMode,
    /// Whether memories carry real bytes.
    #[serde(default)]
    pub data_mode: DataMode,
    /// Simulated time budget in milliseconds, used by `run_until_time`.
    #[serde(default = "SimConfig::default_sim_time_ms")]
    pub sim_time_ms: f64,
}

impl SimConfig {
    fn default_period_ns() -> f64 {
        defaults::PERIOD_NS
    }

    fn default_sim_time_ms() -> f64 {
        defaults::SIM_TIME_MS
    }

    /// Checks that the period and time budget are positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive_f64("period_ns", self.period_ns)?;
        check_positive_f64("sim_time_ms", self.sim_time_ms)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            period_ns: defaults::PERIOD_NS,
            sim_mode: SimMode::default(),
            data_mode: DataMode::default(),
            sim_time_ms: defaults::SIM_TIME_MS,
        }
    }
}

/// Chip-level hardware description.
#[derive(Debug, Clone, Deserialize)]
pub struct ChipConfig {
    /// Number of identical cores.
    #[serde(default = "ChipConfig::default_core_cnt")]
    pub core_cnt: usize,
    /// Description shared by every core.
    #[serde(default)]
    pub core_config: CoreConfig,
    /// Global memory RAM.
    #[serde(default)]
    pub global_memory_config: RamConfig,
    /// Address range of the global memory.
    #[serde(default = "ChipConfig::default_global_memory_addressing")]
    pub global_memory_addressing: AddressSpaceConfig,
    /// Core-to-global-memory network.
    #[serde(default)]
    pub network_config: NetworkConfig,
}

impl ChipConfig {
    fn default_core_cnt() -> usize {
        defaults::CORE_CNT
    }

    fn default_global_memory_addressing() -> AddressSpaceConfig {
        AddressSpaceConfig {
            offset_byte: defaults::GLOBAL_MEMORY_OFFSET_BYTE,
            size_byte: defaults::GLOBAL_MEMORY_SIZE_BYTE,
        }
    }

    /// Checks the core description, the global memory and the address map.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.core_cnt == 0 {
            return Err(ConfigError::new("core_cnt", "must be positive"));
        }
        self.core_config.validate().map_err(|e| e.within("core_config"))?;
        self.global_memory_config
            .validate()
            .map_err(|e| e.within("global_memory_config"))?;
        self.global_memory_addressing
            .validate()
            .map_err(|e| e.within("global_memory_addressing"))?;
        if (self.global_memory_config.size_byte as i64) > self.global_memory_addressing.size_byte {
            return Err(ConfigError::new(
                "global_memory_config.size_byte",
                "greater than the global address space",
            ));
        }
        let global = &self.global_memory_addressing;
        let pim = &self.core_config.pim_unit_config.address_space;
        if global.overlaps(pim) {
            return Err(ConfigError::new(
                "global_memory_addressing",
                "overlaps the PIM address space",
            ));
        }
        if let Some(bank) = self
            .core_config
            .local_memory_unit_config
            .local_memory_list
            .iter()
            .find(|bank| bank.addressing.overlaps(global))
        {
            return Err(ConfigError::new(
                "global_memory_addressing",
                format!("overlaps local memory `{}`", bank.name),
            ));
        }
        self.network_config.validate().map_err(|e| e.within("network_config"))
    }
}

impl Default for ChipConfig {
    fn default() -> Self {
        Self {
            core_cnt: defaults::CORE_CNT,
            core_config: CoreConfig::default(),
            global_memory_config: RamConfig::default(),
            global_memory_addressing: Self::default_global_memory_addressing(),
            network_config: NetworkConfig::default(),
        }
    }
}

pub(crate) fn check_positive_f64(field: &str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::new(field, format!("must be positive, got {value}")))
    }
}

pub(crate) fn check_non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::new(field, format!("must be non-negative, got {value}")))
    }
}

pub(crate) fn check_positive(field: &str, value: usize) -> Result<(), ConfigError> {
    if value > 0 {
        Ok(())
    } else {
        Err(ConfigError::new(field, "must be positive"))
    }
}
