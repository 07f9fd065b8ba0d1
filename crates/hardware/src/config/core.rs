//! Core configuration: control, register, scalar, SIMD and transfer units.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};

use super::memory::LocalMemoryUnitConfig;
use super::pim::PimUnitConfig;
use super::{check_non_negative, check_positive, defaults};
use crate::common::constants::{SIMD_DATA_WIDTHS, SIMD_MAX_INPUT_NUM, SIMD_MAX_OPCODE};
use crate::common::{ConfigError, GENERAL_REG_NUM, SPECIAL_REG_NUM};

/// Fetch, decode and control logic power.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_field_names)]
pub struct ControlUnitConfig {
    /// Controller leakage power.
    #[serde(rename = "controller_static_power_mW")]
    pub controller_static_power_mw: f64,
    /// Controller power per issued instruction.
    #[serde(rename = "controller_dynamic_power_mW")]
    pub controller_dynamic_power_mw: f64,
    /// Fetch leakage power.
    #[serde(rename = "fetch_static_power_mW")]
    pub fetch_static_power_mw: f64,
    /// Fetch power per instruction.
    #[serde(rename = "fetch_dynamic_power_mW")]
    pub fetch_dynamic_power_mw: f64,
    /// Decoder leakage power.
    #[serde(rename = "decode_static_power_mW")]
    pub decode_static_power_mw: f64,
    /// Decoder power per instruction.
    #[serde(rename = "decode_dynamic_power_mW")]
    pub decode_dynamic_power_mw: f64,
}

impl ControlUnitConfig {
    /// Checks that every power is non-negative.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative("controller_static_power_mW", self.controller_static_power_mw)?;
        check_non_negative("controller_dynamic_power_mW", self.controller_dynamic_power_mw)?;
        check_non_negative("fetch_static_power_mW", self.fetch_static_power_mw)?;
        check_non_negative("fetch_dynamic_power_mW", self.fetch_dynamic_power_mw)?;
        check_non_negative("decode_static_power_mW", self.decode_static_power_mw)?;
        check_non_negative("decode_dynamic_power_mW", self.decode_dynamic_power_mw)
    }
}

/// Maps a special register onto a general register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SpecialRegisterBindingConfig {
    /// Special register id.
    pub special: usize,
    /// General register id it aliases.
    pub general: usize,
}

/// Register file power and special-register aliases.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegisterUnitConfig {
    /// Leakage power.
    #[serde(rename = "static_power_mW")]
    pub static_power_mw: f64,
    /// Power per read or write.
    #[serde(rename = "dynamic_power_mW")]
    pub dynamic_power_mw: f64,
    /// Special registers that alias general registers.
    pub special_register_binding: Vec<SpecialRegisterBindingConfig>,
}

impl RegisterUnitConfig {
    /// Checks powers and binding ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative("static_power_mW", self.static_power_mw)?;
        check_non_negative("dynamic_power_mW", self.dynamic_power_mw)?;
        for binding in &self.special_register_binding {
            if binding.special >= SPECIAL_REG_NUM {
                return Err(ConfigError::new(
                    "special_register_binding.special",
                    format!("{} outside [0, {SPECIAL_REG_NUM})", binding.special),
                ));
            }
            if binding.general >= GENERAL_REG_NUM {
                return Err(ConfigError::new(
                    "special_register_binding.general",
                    format!("{} outside [0, {GENERAL_REG_NUM})", binding.general),
                ));
            }
        }
        Ok(())
    }
}

/// Power of the functor executing one scalar operation.
#[derive(Debug, Clone, Deserialize)]
pub struct ScalarFunctorConfig {
    /// Operation name, such as `add` or `load`.
    pub inst_name: String,
    /// Leakage power.
    #[serde(default, rename = "static_power_mW")]
    pub static_power_mw: f64,
    /// Power while executing.
    #[serde(default, rename = "dynamic_power_mW")]
    pub dynamic_power_mw: f64,
}

/// Scalar ALU.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScalarUnitConfig {
    /// Leakage power of the fallback functor.
    #[serde(rename = "default_functor_static_power_mW")]
    pub default_functor_static_power_mw: f64,
    /// Power of operations without a dedicated functor.
    #[serde(rename = "default_functor_dynamic_power_mW")]
    pub default_functor_dynamic_power_mw: f64,
    /// Dedicated functors.
    pub functor_list: Vec<ScalarFunctorConfig>,
}

impl ScalarUnitConfig {
    /// Checks powers and functor names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative("default_functor_static_power_mW", self.default_functor_static_power_mw)?;
        check_non_negative("default_functor_dynamic_power_mW", self.default_functor_dynamic_power_mw)?;
        for functor in &self.functor_list {
            if functor.inst_name.is_empty() {
                return Err(ConfigError::new("functor_list.inst_name", "must be non-empty"));
            }
            check_non_negative("functor_list.static_power_mW", functor.static_power_mw)?;
            check_non_negative("functor_list.dynamic_power_mW", functor.dynamic_power_mw)?;
        }
        Ok(())
    }
}

/// Operand bit widths of a SIMD functor or binding. Unused inputs are 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct SimdDataWidthConfig {
    /// Width of input 1.
    pub input1: u32,
    /// Width of input 2.
    pub input2: u32,
    /// Width of input 3.
    pub input3: u32,
    /// Width of input 4.
    pub input4: u32,
    /// Width of the output.
    pub output: u32,
}

impl SimdDataWidthConfig {
    /// Builds a width record from an input list and an output width.
    pub fn new(inputs: &[u32], output: u32) -> Self {
        let at = |i: usize| inputs.get(i).copied().unwrap_or(0);
        Self {
            input1: at(0),
            input2: at(1),
            input3: at(2),
            input4: at(3),
            output,
        }
    }

    /// Input widths in operand order.
    pub const fn inputs(&self) -> [u32; SIMD_MAX_INPUT_NUM] {
        [self.input1, self.input2, self.input3, self.input4]
    }

    /// Whether all four input widths are equal.
    pub fn input_bit_width_match(&self, other: &Self) -> bool {
        self.inputs() == other.inputs()
    }

    fn validate(&self, input_cnt: usize, check_output: bool) -> Result<(), ConfigError> {
        let valid = |w: u32| SIMD_DATA_WIDTHS.contains(&w);
        if let Some(w) = self.inputs().iter().take(input_cnt).find(|&&w| !valid(w)) {
            return Err(ConfigError::new("input_bit_width", format!("{w} is not a supported width")));
        }
        if check_output && !valid(self.output) {
            return Err(ConfigError::new("output", format!("{} is not a supported width", self.output)));
        }
        Ok(())
    }
}

/// A bank of identical SIMD lanes.
#[derive(Debug, Clone, Deserialize)]
pub struct SimdFunctorConfig {
    /// Functor name referenced by bindings.
    pub name: String,
    /// Operand count.
    #[serde(default = "SimdFunctorConfig::default_input_cnt")]
    pub input_cnt: u32,
    /// Operand widths.
    #[serde(default)]
    pub data_bit_width: SimdDataWidthConfig,
    /// Number of lanes.
    #[serde(default = "SimdFunctorConfig::default_functor_cnt")]
    pub functor_cnt: usize,
    /// Lane latency.
    #[serde(default = "SimdFunctorConfig::default_latency")]
    pub latency_cycle: u32,
    /// Leakage power per lane.
    #[serde(default = "SimdFunctorConfig::default_power", rename = "static_power_per_functor_mW")]
    pub static_power_per_functor_mw: f64,
    /// Power per active lane.
    #[serde(default = "SimdFunctorConfig::default_power", rename = "dynamic_power_per_functor_mW")]
    pub dynamic_power_per_functor_mw: f64,
}

impl SimdFunctorConfig {
    const fn default_input_cnt() -> u32 {
        defaults::SIMD_INPUT_CNT
    }

    const fn default_functor_cnt() -> usize {
        defaults::SIMD_FUNCTOR_CNT
    }

    const fn default_latency() -> u32 {
        defaults::LATENCY_CYCLE
    }

    const fn default_power() -> f64 {
        defaults::POWER_MW
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::new("name", "must be non-empty"));
        }
        if self.input_cnt as usize > SIMD_MAX_INPUT_NUM {
            return Err(ConfigError::new("input_cnt", format!("exceeds {SIMD_MAX_INPUT_NUM}")));
        }
        check_positive("functor_cnt", self.functor_cnt)?;
        check_non_negative("static_power_per_functor_mW", self.static_power_per_functor_mw)?;
        check_non_negative("dynamic_power_per_functor_mW", self.dynamic_power_per_functor_mw)?;
        self.data_bit_width
            .validate(self.input_cnt as usize, true)
            .map_err(|e| e.within("data_bit_width"))
    }
}

/// Whether a SIMD operand is a vector or a broadcast scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimdInputType {
    /// One element per lane, read from memory.
    #[default]
    Vector,
    /// One register value shared by all lanes.
    Scalar,
}

/// Binds operand widths of an instruction to a functor.
#[derive(Debug, Clone, Deserialize)]
pub struct SimdFunctorBindingConfig {
    /// Operand widths selecting this binding.
    #[serde(default)]
    pub input_bit_width: SimdDataWidthConfig,
    /// Functor executing the instruction.
    pub functor_name: String,
}

/// A SIMD instruction and its functor bindings.
#[derive(Debug, Clone, Deserialize)]
pub struct SimdInstructionConfig {
    /// Instruction name.
    pub name: String,
    /// Operand count.
    #[serde(default = "SimdFunctorConfig::default_input_cnt")]
    pub input_cnt: u32,
    /// Opcode, written as a hex string such as `"0x02"` or as a number.
    #[serde(default, deserialize_with = "deserialize_opcode")]
    pub opcode: u32,
    /// Kind of input 1.
    #[serde(default)]
    pub input1_type: SimdInputType,
    /// Kind of input 2.
    #[serde(default)]
    pub input2_type: SimdInputType,
    /// Kind of input 3.
    #[serde(default)]
    pub input3_type: SimdInputType,
    /// Kind of input 4.
    #[serde(default)]
    pub input4_type: SimdInputType,
    /// Candidate functors, tried in order.
    #[serde(default)]
    pub functor_binding_list: Vec<SimdFunctorBindingConfig>,
}

impl SimdInstructionConfig {
    /// Operand kinds in operand order.
    pub const fn inputs_type(&self) -> [SimdInputType; SIMD_MAX_INPUT_NUM] {
        [self.input1_type, self.input2_type, self.input3_type, self.input4_type]
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::new("name", "must be non-empty"));
        }
        if self.input_cnt as usize > SIMD_MAX_INPUT_NUM {
            return Err(ConfigError::new("input_cnt", format!("exceeds {SIMD_MAX_INPUT_NUM}")));
        }
        if self.opcode > SIMD_MAX_OPCODE {
            return Err(ConfigError::new("opcode", format!("exceeds {SIMD_MAX_OPCODE:#x}")));
        }
        for binding in &self.functor_binding_list {
            if binding.functor_name.is_empty() {
                return Err(ConfigError::new("functor_binding_list.functor_name", "must be non-empty"));
            }
            binding
                .input_bit_width
                .validate(self.input_cnt as usize, false)
                .map_err(|e| e.within("functor_binding_list"))?;
        }
        Ok(())
    }
}

fn deserialize_opcode<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => {
            let digits = text.trim_start_matches("0x").trim_start_matches("0X");
            u32::from_str_radix(digits, 16).map_err(serde::de::Error::custom)
        }
    }
}

/// SIMD unit.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimdUnitConfig {
    /// Overlap read, execute and write of consecutive batches.
    pub pipeline: bool,
    /// Functor banks.
    pub functor_list: Vec<SimdFunctorConfig>,
    /// Instruction set.
    pub instruction_list: Vec<SimdInstructionConfig>,
}

impl SimdUnitConfig {
    /// Checks every functor, instruction and binding.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut functors = HashMap::new();
        for functor in &self.functor_list {
            functor.validate().map_err(|e| e.within("functor_list"))?;
            let _ = functors.insert(functor.name.as_str(), functor);
        }
        for instruction in &self.instruction_list {
            instruction.validate().map_err(|e| e.within("instruction_list"))?;
            for binding in &instruction.functor_binding_list {
                let Some(functor) = functors.get(binding.functor_name.as_str()) else {
                    return Err(ConfigError::new(
                        "instruction_list.functor_binding_list",
                        format!("functor `{}` does not exist", binding.functor_name),
                    ));
                };
                if functor.input_cnt != instruction.input_cnt {
                    return Err(ConfigError::new(
                        "instruction_list.functor_binding_list",
                        format!(
                            "input count of `{}` differs from functor `{}`",
                            instruction.name, functor.name
                        ),
                    ));
                }
                if !functor.data_bit_width.input_bit_width_match(&binding.input_bit_width) {
                    return Err(ConfigError::new(
                        "instruction_list.functor_binding_list",
                        format!(
                            "input widths of `{}` differ from functor `{}`",
                            instruction.name, functor.name
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Transfer unit.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransferUnitConfig {
    /// Overlap read and write of consecutive batches.
    pub pipeline: bool,
    /// Route transfers into the PIM address space to the PIM load unit.
    pub pim_load_fast_path: bool,
}

/// Full description of one core.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Control logic.
    pub control_unit_config: ControlUnitConfig,
    /// Register file.
    pub register_unit_config: RegisterUnitConfig,
    /// Scalar ALU.
    pub scalar_unit_config: ScalarUnitConfig,
    /// SIMD unit.
    pub simd_unit_config: SimdUnitConfig,
    /// PIM unit.
    pub pim_unit_config: PimUnitConfig,
    /// Local memory banks.
    pub local_memory_unit_config: LocalMemoryUnitConfig,
    /// Transfer unit.
    pub transfer_unit_config: TransferUnitConfig,
}

impl CoreConfig {
    /// Checks every unit and that no two address spaces overlap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.control_unit_config
            .validate()
            .map_err(|e| e.within("control_unit_config"))?;
        self.register_unit_config
            .validate()
            .map_err(|e| e.within("register_unit_config"))?;
        self.scalar_unit_config
            .validate()
            .map_err(|e| e.within("scalar_unit_config"))?;
        self.simd_unit_config.validate().map_err(|e| e.within("simd_unit_config"))?;
        self.pim_unit_config.validate().map_err(|e| e.within("pim_unit_config"))?;
        self.local_memory_unit_config
            .validate()
            .map_err(|e| e.within("local_memory_unit_config"))?;

        let mut spaces = vec![("pim_unit", self.pim_unit_config.address_space)];
        spaces.extend(
            self.local_memory_unit_config
                .local_memory_list
                .iter()
                .map(|bank| (bank.name.as_str(), bank.addressing)),
        );
        spaces.sort_by_key(|(_, space)| space.offset_byte);
        for pair in spaces.windows(2) {
            let [(first, a), (second, b)] = pair else {
                continue;
            };
            if a.end() > b.offset_byte {
                return Err(ConfigError::new(
                    "local_memory_unit_config",
                    format!("address spaces of `{first}` and `{second}` overlap"),
                ));
            }
        }
        Ok(())
    }
}
