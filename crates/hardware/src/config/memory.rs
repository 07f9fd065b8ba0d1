//! Memory and network configuration.

use std::path::PathBuf;

use serde::Deserialize;

use super::{check_non_negative, check_positive, defaults};
use crate::common::ConfigError;

/// A contiguous byte address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct AddressSpaceConfig {
    /// First byte address.
    pub offset_byte: i64,
    /// Size in bytes.
    pub size_byte: i64,
}

impl AddressSpaceConfig {
    /// One past the last byte address.
    #[inline]
    pub const fn end(&self) -> i64 {
        self.offset_byte + self.size_byte
    }

    /// Whether `address` lies in the range.
    #[inline]
    pub const fn contains(&self, address: i64) -> bool {
        self.offset_byte <= address && address < self.end()
    }

    /// Whether two non-empty ranges share a byte.
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.size_byte > 0
            && other.size_byte > 0
            && self.offset_byte < other.end()
            && other.offset_byte < self.end()
    }

    /// Rejects negative offsets or sizes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.offset_byte < 0 || self.size_byte < 0 {
            return Err(ConfigError::new("addressing", "offset and size must be non-negative"));
        }
        Ok(())
    }
}

/// Banked RAM cost model.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RamConfig {
    /// Total size in bytes.
    pub size_byte: usize,
    /// Bytes transferred per access.
    pub width_byte: usize,
    /// Cycles per write access.
    pub write_latency_cycle: u32,
    /// Cycles per read access.
    pub read_latency_cycle: u32,
    /// Leakage power.
    #[serde(rename = "static_power_mW")]
    pub static_power_mw: f64,
    /// Power while writing.
    #[serde(rename = "write_dynamic_power_mW")]
    pub write_dynamic_power_mw: f64,
    /// Power while reading.
    #[serde(rename = "read_dynamic_power_mW")]
    pub read_dynamic_power_mw: f64,
    /// Whether the RAM is initialized from an image.
    pub has_image: bool,
    /// Path of the image file.
    pub image_file: Option<PathBuf>,
}

impl Default for RamConfig {
    fn default() -> Self {
        Self {
            size_byte: defaults::RAM_SIZE_BYTE,
            width_byte: defaults::RAM_WIDTH_BYTE,
            write_latency_cycle: defaults::LATENCY_CYCLE,
            read_latency_cycle: defaults::LATENCY_CYCLE,
            static_power_mw: defaults::POWER_MW,
            write_dynamic_power_mw: defaults::POWER_MW,
            read_dynamic_power_mw: defaults::POWER_MW,
            has_image: false,
            image_file: None,
        }
    }
}

impl RamConfig {
    /// Checks sizes, latencies and powers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("size_byte", self.size_byte)?;
        check_positive("width_byte", self.width_byte)?;
        if self.size_byte % self.width_byte != 0 {
            return Err(ConfigError::new("width_byte", "must divide size_byte"));
        }
        check_non_negative("static_power_mW", self.static_power_mw)?;
        check_non_negative("write_dynamic_power_mW", self.write_dynamic_power_mw)?;
        check_non_negative("read_dynamic_power_mW", self.read_dynamic_power_mw)?;
        if self.has_image && self.image_file.is_none() {
            return Err(ConfigError::new("image_file", "required when has_image is set"));
        }
        Ok(())
    }
}

/// Register-buffer cost model.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegBufferConfig {
    /// Total size in bytes.
    pub size_byte: usize,
    /// Widest single read in bytes.
    pub read_max_width_byte: usize,
    /// Widest single write in bytes.
    pub write_max_width_byte: usize,
    /// Granularity of read and write energy accounting.
    pub rw_min_unit_byte: usize,
    /// Leakage power.
    #[serde(rename = "static_power_mW")]
    pub static_power_mw: f64,
    /// Power per accessed unit.
    #[serde(rename = "rw_dynamic_power_per_unit_mW")]
    pub rw_dynamic_power_per_unit_mw: f64,
}

impl Default for RegBufferConfig {
    fn default() -> Self {
        Self {
            size_byte: defaults::REG_BUFFER_SIZE_BYTE,
            read_max_width_byte: defaults::REG_BUFFER_MAX_WIDTH_BYTE,
            write_max_width_byte: defaults::REG_BUFFER_MAX_WIDTH_BYTE,
            rw_min_unit_byte: defaults::REG_BUFFER_UNIT_BYTE,
            static_power_mw: defaults::POWER_MW,
            rw_dynamic_power_per_unit_mw: defaults::POWER_MW,
        }
    }
}

impl RegBufferConfig {
    /// Checks widths divide the size and the unit divides the widths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("size_byte", self.size_byte)?;
        check_positive("read_max_width_byte", self.read_max_width_byte)?;
        check_positive("write_max_width_byte", self.write_max_width_byte)?;
        check_positive("rw_min_unit_byte", self.rw_min_unit_byte)?;
        if self.size_byte % self.read_max_width_byte != 0
            || self.size_byte % self.write_max_width_byte != 0
        {
            return Err(ConfigError::new("size_byte", "must be a multiple of the access widths"));
        }
        if self.read_max_width_byte % self.rw_min_unit_byte != 0
            || self.write_max_width_byte % self.rw_min_unit_byte != 0
        {
            return Err(ConfigError::new("rw_min_unit_byte", "must divide the access widths"));
        }
        check_non_negative("static_power_mW", self.static_power_mw)?;
        check_non_negative("rw_dynamic_power_per_unit_mW", self.rw_dynamic_power_per_unit_mw)
    }
}

/// Cost model behind a local memory bank, selected by its `type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "hardware_config", rename_all = "snake_case")]
pub enum LocalMemoryHardwareConfig {
    /// Banked RAM.
    Ram(RamConfig),
    /// Register buffer.
    RegBuffer(RegBufferConfig),
}

impl LocalMemoryHardwareConfig {
    /// Capacity of the hardware in bytes.
    pub const fn size_byte(&self) -> usize {
        match self {
            Self::Ram(ram) => ram.size_byte,
            Self::RegBuffer(buffer) => buffer.size_byte,
        }
    }
}

impl Default for LocalMemoryHardwareConfig {
    fn default() -> Self {
        Self::Ram(RamConfig::default())
    }
}

/// One local memory bank.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalMemoryConfig {
    /// Bank name, used in reports.
    pub name: String,
    /// Address range served by the bank.
    #[serde(default)]
    pub addressing: AddressSpaceConfig,
    /// Cost model.
    #[serde(flatten)]
    pub hardware: LocalMemoryHardwareConfig,
}

impl LocalMemoryConfig {
    /// Checks the name, the range and the cost model.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::new("name", "must be non-empty"));
        }
        self.addressing.validate()?;
        match &self.hardware {
            LocalMemoryHardwareConfig::Ram(ram) => ram.validate(),
            LocalMemoryHardwareConfig::RegBuffer(buffer) => buffer.validate(),
        }
        .map_err(|e| e.within("hardware_config"))?;
        if self.hardware.size_byte() as i64 > self.addressing.size_byte {
            return Err(ConfigError::new(
                "hardware_config.size_byte",
                "greater than the address space of the bank",
            ));
        }
        Ok(())
    }
}

/// All local memory banks of one core.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalMemoryUnitConfig {
    /// Banks, in id order.
    pub local_memory_list: Vec<LocalMemoryConfig>,
}

impl Default for LocalMemoryUnitConfig {
    fn default() -> Self {
        Self {
            local_memory_list: vec![LocalMemoryConfig {
                name: "local_memory".to_owned(),
                addressing: AddressSpaceConfig {
                    offset_byte: 0,
                    size_byte: defaults::RAM_SIZE_BYTE as i64,
                },
                hardware: LocalMemoryHardwareConfig::default(),
            }],
        }
    }
}

impl LocalMemoryUnitConfig {
    /// Checks every bank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, bank) in self.local_memory_list.iter().enumerate() {
            bank.validate().map_err(|e| e.within(&format!("local_memory_list[{i}]")))?;
        }
        Ok(())
    }
}

/// Network between cores and global memory.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Fixed cycles per message.
    pub latency_cycle: u32,
    /// Bytes moved per cycle.
    pub bus_width_byte: usize,
    /// Power while a message is in flight.
    #[serde(rename = "dynamic_power_mW")]
    pub dynamic_power_mw: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            latency_cycle: defaults::NETWORK_LATENCY_CYCLE,
            bus_width_byte: defaults::NETWORK_BUS_WIDTH_BYTE,
            dynamic_power_mw: defaults::POWER_MW,
        }
    }
}

impl NetworkConfig {
    /// Checks the bus width and power.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("bus_width_byte", self.bus_width_byte)?;
        check_non_negative("dynamic_power_mW", self.dynamic_power_mw)
    }
}
