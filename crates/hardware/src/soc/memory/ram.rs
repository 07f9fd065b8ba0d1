//! Banked RAM.
//!
//! An access of `n` bytes takes `ceil(n / width)` back-to-back transfers of
//! the configured read or write latency each.

use std::cell::RefCell;
use std::fmt;

use super::{MemoryAccess, MemoryAccessType, MemoryHardware, check_bounds};
use crate::common::{SimError, SimResult, bits::div_ceil};
use crate::config::RamConfig;
use crate::core::energy::EnergyCounter;
use crate::sim::SimContext;
use crate::stats::EnergyReporter;

/// RAM cost model with optional real contents.
pub struct Ram {
    name: String,
    config: RamConfig,
    period_ns: f64,
    data: Option<RefCell<Vec<u8>>>,
    static_energy: EnergyCounter,
    read_energy: EnergyCounter,
    write_energy: EnergyCounter,
}

impl fmt::Debug for Ram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ram")
            .field("name", &self.name)
            .field("size_byte", &self.config.size_byte)
            .field("width_byte", &self.config.width_byte)
            .field("real_data", &self.data.is_some())
            .finish_non_exhaustive()
    }
}

impl Ram {
    /// Creates a zeroed RAM, loading its image when one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Io`] if the image file cannot be read.
    pub fn new(ctx: &SimContext, name: impl Into<String>, config: &RamConfig) -> SimResult<Self> {
        let data = if ctx.real_data() {
            let mut bytes = vec![0u8; config.size_byte];
            if config.has_image {
                if let Some(path) = &config.image_file {
                    let image = std::fs::read(path).map_err(|e| SimError::io(path, e))?;
                    let len = image.len().min(bytes.len());
                    bytes[..len].copy_from_slice(&image[..len]);
                }
            }
            Some(RefCell::new(bytes))
        } else {
            None
        };
        Ok(Self {
            name: name.into(),
            config: config.clone(),
            period_ns: ctx.period_ns(),
            data,
            static_energy: EnergyCounter::with_static_power(config.static_power_mw),
            read_energy: EnergyCounter::default(),
            write_energy: EnergyCounter::default(),
        })
    }
}

impl MemoryHardware for Ram {
    fn access(&self, access: &mut MemoryAccess) -> f64 {
        if !check_bounds(&self.name, access, self.config.size_byte) {
            return 0.0;
        }
        let start = access.address_byte as usize;
        let end = start + access.size_byte;
        let times = div_ceil(access.size_byte, self.config.width_byte) as f64;
        match access.access_type {
            MemoryAccessType::Read => {
                let latency = times * f64::from(self.config.read_latency_cycle) * self.period_ns;
                self.read_energy
                    .add_dynamic_energy(latency, self.config.read_dynamic_power_mw);
                access.data = match &self.data {
                    Some(data) => data.borrow()[start..end].to_vec(),
                    None => vec![0; access.size_byte],
                };
                latency
            }
            MemoryAccessType::Write => {
                let latency = times * f64::from(self.config.write_latency_cycle) * self.period_ns;
                self.write_energy
                    .add_dynamic_energy(latency, self.config.write_dynamic_power_mw);
                if let Some(data) = &self.data {
                    let len = access.data.len().min(access.size_byte);
                    data.borrow_mut()[start..start + len].copy_from_slice(&access.data[..len]);
                }
                latency
            }
        }
    }

    fn data_width_byte(&self, _access_type: MemoryAccessType) -> usize {
        self.config.width_byte
    }

    fn size_byte(&self) -> usize {
        self.config.size_byte
    }

    fn energy_reporter(&self, running_time_ns: f64) -> EnergyReporter {
        let mut reporter = EnergyReporter::from_counter(&self.static_energy, running_time_ns);
        reporter.add_sub_module("read", EnergyReporter::from_counter(&self.read_energy, running_time_ns));
        reporter.add_sub_module("write", EnergyReporter::from_counter(&self.write_energy, running_time_ns));
        reporter
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::config::SimConfig;
    use crate::core::payload::{ExecuteUnitType, InstructionPayload};

    fn access(access_type: MemoryAccessType, address_byte: i64, size_byte: usize, data: Vec<u8>) -> MemoryAccess {
        MemoryAccess {
            ins: InstructionPayload {
                pc: 1,
                ins_id: 0,
                unit_type: ExecuteUnitType::Transfer,
            },
            access_type,
            address_byte,
            size_byte,
            data,
        }
    }

    fn config() -> RamConfig {
        RamConfig {
            size_byte: 64,
            width_byte: 8,
            read_latency_cycle: 2,
            write_latency_cycle: 3,
            read_dynamic_power_mw: 1.0,
            write_dynamic_power_mw: 2.0,
            ..RamConfig::default()
        }
    }

    #[test]
    fn test_delay_scales_with_transfers() {
        let ctx = SimContext::new(&SimConfig::default());
        let ram = Ram::new(&ctx, "ram", &config()).unwrap();

        let mut write = access(MemoryAccessType::Write, 4, 9, (1..=9).collect());
        assert!((ram.access(&mut write) - 6.0).abs() < 1e-9);

        let mut read = access(MemoryAccessType::Read, 4, 9, Vec::new());
        assert!((ram.access(&mut read) - 4.0).abs() < 1e-9);
        assert_eq!(read.data, (1..=9).collect::<Vec<u8>>());

        let report = ram.energy_reporter(10.0);
        assert!((report.sub_modules["read"].dynamic_energy_pj - 4.0).abs() < 1e-9);
        assert!((report.sub_modules["write"].dynamic_energy_pj - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_is_free() {
        let ctx = SimContext::new(&SimConfig::default());
        let ram = Ram::new(&ctx, "ram", &config()).unwrap();
        let mut read = access(MemoryAccessType::Read, 60, 8, Vec::new());
        assert!(ram.access(&mut read).abs() < 1e-9);
        assert!(read.data.is_empty());
        let mut negative = access(MemoryAccessType::Read, -1, 1, Vec::new());
        assert!(ram.access(&mut negative).abs() < 1e-9);
    }

    #[test]
    fn test_image_is_loaded() {
        let mut image = tempfile::NamedTempFile::new().unwrap();
        image.write_all(&[7, 8, 9]).unwrap();
        let config = RamConfig {
            has_image: true,
            image_file: Some(image.path().to_path_buf()),
            ..config()
        };
        let ctx = SimContext::new(&SimConfig::default());
        let ram = Ram::new(&ctx, "ram", &config).unwrap();
        let mut read = access(MemoryAccessType::Read, 0, 4, Vec::new());
        let _ = ram.access(&mut read);
        assert_eq!(read.data, vec![7, 8, 9, 0]);
    }

    #[test]
    fn test_missing_image_is_an_error() {
        let config = RamConfig {
            has_image: true,
            image_file: Some("/nonexistent/pimsim/image.bin".into()),
            ..config()
        };
        let ctx = SimContext::new(&SimConfig::default());
        assert!(matches!(Ram::new(&ctx, "ram", &config), Err(SimError::Io { .. })));
    }
}
