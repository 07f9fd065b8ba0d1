//! PIM unit configuration.
//!
//! A PIM unit holds `macro_total_cnt` macros split into groups of
//! `macro_group_size`. Each macro is a `(H, W, m, n)` array: `H` compartments
//! (element rows), `W` elements per compartment (element columns), `m` rows per
//! element and `n` bits per row.

use serde::Deserialize;

use super::memory::AddressSpaceConfig;
use super::{check_non_negative, check_positive, defaults};
use crate::common::{BYTE_TO_BIT, ConfigError};

/// Four-dimensional size of one macro.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PimMacroSizeConfig {
    /// `H`: compartments, one input element each.
    pub compartment_cnt_per_macro: usize,
    /// `W`: element columns per compartment.
    pub element_cnt_per_compartment: usize,
    /// `m`: rows per element.
    pub row_cnt_per_element: usize,
    /// `n`: bits per row.
    pub bit_width_per_row: usize,
}

impl Default for PimMacroSizeConfig {
    fn default() -> Self {
        Self {
            compartment_cnt_per_macro: 16,
            element_cnt_per_compartment: 8,
            row_cnt_per_element: 8,
            bit_width_per_row: 8,
        }
    }
}

impl PimMacroSizeConfig {
    /// Bits of one macro written in a single SRAM write.
    pub const fn macro_bit_width(&self) -> usize {
        self.element_cnt_per_compartment * self.bit_width_per_row
    }

    /// Storage of one macro in bytes.
    pub const fn macro_byte_size(&self) -> usize {
        self.compartment_cnt_per_macro
            * self.element_cnt_per_compartment
            * self.row_cnt_per_element
            * self.bit_width_per_row
            / BYTE_TO_BIT
    }
}

/// Latency and power of one pipeline stage.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PimModuleConfig {
    /// Stage latency.
    pub latency_cycle: u32,
    /// Leakage power.
    #[serde(rename = "static_power_mW")]
    pub static_power_mw: f64,
    /// Power while active.
    #[serde(rename = "dynamic_power_mW")]
    pub dynamic_power_mw: f64,
}

impl Default for PimModuleConfig {
    fn default() -> Self {
        Self {
            latency_cycle: defaults::LATENCY_CYCLE,
            static_power_mw: defaults::POWER_MW,
            dynamic_power_mw: defaults::POWER_MW,
        }
    }
}

impl PimModuleConfig {
    fn validate(&self, module: &str) -> Result<(), ConfigError> {
        check_non_negative("static_power_mW", self.static_power_mw).map_err(|e| e.within(module))?;
        check_non_negative("dynamic_power_mW", self.dynamic_power_mw).map_err(|e| e.within(module))
    }
}

/// Which macros an SRAM write covers at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SramAddressSpaceMode {
    /// Every macro of the unit is written in parallel.
    #[default]
    Intergroup,
    /// Only the macros of one group are written in parallel.
    Intragroup,
}

/// SRAM array timing and power.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PimSramConfig {
    /// Write parallelism.
    pub as_mode: SramAddressSpaceMode,
    /// Cycles per write.
    pub write_latency_cycle: u32,
    /// Cycles per read.
    pub read_latency_cycle: u32,
    /// Leakage power.
    #[serde(rename = "static_power_mW")]
    pub static_power_mw: f64,
    /// Write power per bit.
    #[serde(rename = "write_dynamic_power_per_bit_mW")]
    pub write_dynamic_power_per_bit_mw: f64,
    /// Read power per bit.
    #[serde(rename = "read_dynamic_power_per_bit_mW")]
    pub read_dynamic_power_per_bit_mw: f64,
}

impl Default for PimSramConfig {
    fn default() -> Self {
        Self {
            as_mode: SramAddressSpaceMode::default(),
            write_latency_cycle: defaults::LATENCY_CYCLE,
            read_latency_cycle: defaults::LATENCY_CYCLE,
            static_power_mw: defaults::POWER_MW,
            write_dynamic_power_per_bit_mw: defaults::POWER_MW,
            read_dynamic_power_per_bit_mw: defaults::POWER_MW,
        }
    }
}

/// Value-sparsity input processing.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PimValueSparseConfig {
    /// Mask bits per input element.
    pub mask_bit_width: usize,
    /// Input processing latency.
    pub latency_cycle: u32,
    /// Leakage power.
    #[serde(rename = "static_power_mW")]
    pub static_power_mw: f64,
    /// Power while active.
    #[serde(rename = "dynamic_power_mW")]
    pub dynamic_power_mw: f64,
    /// Groups whose inputs are prepared per network transfer.
    pub output_macro_group_cnt: usize,
}

impl Default for PimValueSparseConfig {
    fn default() -> Self {
        Self {
            mask_bit_width: defaults::VALUE_SPARSE_MASK_BIT_WIDTH,
            latency_cycle: defaults::LATENCY_CYCLE,
            static_power_mw: defaults::POWER_MW,
            dynamic_power_mw: defaults::POWER_MW,
            output_macro_group_cnt: 1,
        }
    }
}

/// Bit-sparsity post processing and its metadata buffer.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PimBitSparseConfig {
    /// Metadata bits per element.
    pub mask_bit_width: usize,
    /// Post-process latency.
    pub latency_cycle: u32,
    /// Leakage power of one post-process block.
    #[serde(rename = "static_power_mW")]
    pub static_power_mw: f64,
    /// Power of one post-process block while active.
    #[serde(rename = "dynamic_power_mW")]
    pub dynamic_power_mw: f64,
    /// Metadata buffer access unit.
    pub unit_byte: usize,
    /// Metadata buffer leakage power.
    #[serde(rename = "reg_buffer_static_power_mW")]
    pub reg_buffer_static_power_mw: f64,
    /// Metadata buffer power per unit.
    #[serde(rename = "reg_buffer_dynamic_power_mW_per_unit")]
    pub reg_buffer_dynamic_power_mw_per_unit: f64,
}

impl Default for PimBitSparseConfig {
    fn default() -> Self {
        Self {
            mask_bit_width: defaults::BIT_SPARSE_MASK_BIT_WIDTH,
            latency_cycle: defaults::LATENCY_CYCLE,
            static_power_mw: defaults::POWER_MW,
            dynamic_power_mw: defaults::POWER_MW,
            unit_byte: 1,
            reg_buffer_static_power_mw: defaults::POWER_MW,
            reg_buffer_dynamic_power_mw_per_unit: defaults::POWER_MW,
        }
    }
}

/// PIM unit: macro array, address space and pipeline stages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PimUnitConfig {
    /// Total number of macros.
    pub macro_total_cnt: usize,
    /// Macros per group.
    pub macro_group_size: usize,
    /// Size of one macro.
    pub macro_size: PimMacroSizeConfig,
    /// Address range mapped onto the SRAM arrays.
    pub address_space: AddressSpaceConfig,
    /// Input process unit.
    pub ipu: PimModuleConfig,
    /// SRAM arrays.
    pub sram: PimSramConfig,
    /// Adder tree, one per element column.
    pub adder_tree: PimModuleConfig,
    /// Shift adder, one per element column.
    pub shift_adder: PimModuleConfig,
    /// Result adder, one per element column.
    pub result_adder: PimModuleConfig,
    /// Whether value sparsity is supported.
    pub value_sparse: bool,
    /// Value-sparsity parameters.
    pub value_sparse_config: PimValueSparseConfig,
    /// Whether bit sparsity is supported.
    pub bit_sparse: bool,
    /// Bit-sparsity parameters.
    pub bit_sparse_config: PimBitSparseConfig,
    /// Whether all-zero input bit planes are skipped.
    pub input_bit_sparse: bool,
}

impl Default for PimUnitConfig {
    fn default() -> Self {
        Self {
            macro_total_cnt: 4,
            macro_group_size: 2,
            macro_size: PimMacroSizeConfig::default(),
            address_space: AddressSpaceConfig {
                offset_byte: 1 << 20,
                size_byte: 1 << 16,
            },
            ipu: PimModuleConfig::default(),
            sram: PimSramConfig::default(),
            adder_tree: PimModuleConfig::default(),
            shift_adder: PimModuleConfig::default(),
            result_adder: PimModuleConfig::default(),
            value_sparse: false,
            value_sparse_config: PimValueSparseConfig::default(),
            bit_sparse: false,
            bit_sparse_config: PimBitSparseConfig::default(),
            input_bit_sparse: false,
        }
    }
}

impl PimUnitConfig {
    /// Number of macro groups.
    pub const fn macro_group_cnt(&self) -> usize {
        if self.macro_group_size == 0 {
            0
        } else {
            self.macro_total_cnt / self.macro_group_size
        }
    }

    /// Element columns of one group.
    pub const fn group_element_cols(&self) -> usize {
        self.macro_size.element_cnt_per_compartment * self.macro_group_size
    }

    /// Bits written into the SRAM arrays per write.
    pub const fn sram_write_bit_width(&self) -> usize {
        let macros = match self.sram.as_mode {
            SramAddressSpaceMode::Intergroup => self.macro_total_cnt,
            SramAddressSpaceMode::Intragroup => self.macro_group_size,
        };
        self.macro_size.macro_bit_width() * macros
    }

    /// Checks the macro array dimensions, the stages and the address space.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("macro_total_cnt", self.macro_total_cnt)?;
        check_positive("macro_group_size", self.macro_group_size)?;
        if self.macro_total_cnt % self.macro_group_size != 0 {
            return Err(ConfigError::new(
                "macro_group_size",
                format!("does not divide macro_total_cnt {}", self.macro_total_cnt),
            ));
        }
        let size = &self.macro_size;
        check_positive("macro_size.compartment_cnt_per_macro", size.compartment_cnt_per_macro)?;
        check_positive("macro_size.element_cnt_per_compartment", size.element_cnt_per_compartment)?;
        check_positive("macro_size.row_cnt_per_element", size.row_cnt_per_element)?;
        check_positive("macro_size.bit_width_per_row", size.bit_width_per_row)?;
        self.address_space.validate().map_err(|e| e.within("address_space"))?;

        self.ipu.validate("ipu")?;
        self.adder_tree.validate("adder_tree")?;
        self.shift_adder.validate("shift_adder")?;
        self.result_adder.validate("result_adder")?;
        check_non_negative("sram.static_power_mW", self.sram.static_power_mw)?;
        check_non_negative("sram.write_dynamic_power_per_bit_mW", self.sram.write_dynamic_power_per_bit_mw)?;
        check_non_negative("sram.read_dynamic_power_per_bit_mW", self.sram.read_dynamic_power_per_bit_mw)?;

        if self.value_sparse {
            let vs = &self.value_sparse_config;
            check_positive("value_sparse_config.mask_bit_width", vs.mask_bit_width)?;
            check_positive("value_sparse_config.output_macro_group_cnt", vs.output_macro_group_cnt)?;
            check_non_negative("value_sparse_config.dynamic_power_mW", vs.dynamic_power_mw)?;
        }
        if self.bit_sparse {
            let bs = &self.bit_sparse_config;
            check_positive("bit_sparse_config.mask_bit_width", bs.mask_bit_width)?;
            check_positive("bit_sparse_config.unit_byte", bs.unit_byte)?;
            check_non_negative("bit_sparse_config.dynamic_power_mW", bs.dynamic_power_mw)?;
        }

        let total = self.macro_total_cnt * size.macro_byte_size();
        if total as i64 > self.address_space.size_byte {
            return Err(ConfigError::new(
                "address_space.size_byte",
                format!("smaller than the {total} bytes of the macro array"),
            ));
        }
        Ok(())
    }
}
