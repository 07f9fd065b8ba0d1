//! Register buffer.
//!
//! Reads are combinational; a write takes one clock period. Energy is charged
//! per accessed unit of `rw_min_unit_byte`, capped at the access width.

use std::cell::RefCell;
use std::fmt;

use super::{MemoryAccess, MemoryAccessType, MemoryHardware, check_bounds};
use crate::common::bits::div_ceil;
use crate::config::RegBufferConfig;
use crate::core::energy::EnergyCounter;
use crate::sim::SimContext;
use crate::stats::EnergyReporter;

/// Register-buffer cost model.
pub struct RegBuffer {
    name: String,
    config: RegBufferConfig,
    period_ns: f64,
    data: Option<RefCell<Vec<u8>>>,
    static_energy: EnergyCounter,
    read_energy: EnergyCounter,
    write_energy: EnergyCounter,
}

impl fmt::Debug for RegBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegBuffer")
            .field("name", &self.name)
            .field("size_byte", &self.config.size_byte)
            .finish_non_exhaustive()
    }
}

impl RegBuffer {
    /// Creates a zeroed buffer.
    pub fn new(ctx: &SimContext, name: impl Into<String>, config: &RegBufferConfig) -> Self {
        Self {
            name: name.into(),
            config: config.clone(),
            period_ns: ctx.period_ns(),
            data: ctx.real_data().then(|| RefCell::new(vec![0; config.size_byte])),
            static_energy: EnergyCounter::with_static_power(config.static_power_mw),
            read_energy: EnergyCounter::default(),
            write_energy: EnergyCounter::default(),
        }
    }

    fn unit_power_mw(&self, size_byte: usize, max_width_byte: usize) -> f64 {
        let units = div_ceil(size_byte.min(max_width_byte), self.config.rw_min_unit_byte);
        self.config.rw_dynamic_power_per_unit_mw * units as f64
    }
}

impl MemoryHardware for RegBuffer {
    fn access(&self, access: &mut MemoryAccess) -> f64 {
        if !check_bounds(&self.name, access, self.config.size_byte) {
            return 0.0;
        }
        let start = access.address_byte as usize;
        match access.access_type {
            MemoryAccessType::Read => {
                let power = self.unit_power_mw(access.size_byte, self.config.read_max_width_byte);
                self.read_energy.add_dynamic_energy(self.period_ns, power);
                access.data = match &self.data {
                    Some(data) => data.borrow()[start..start + access.size_byte].to_vec(),
                    None => vec![0; access.size_byte],
                };
                0.0
            }
            MemoryAccessType::Write => {
                let power = self.unit_power_mw(access.size_byte, self.config.write_max_width_byte);
                self.write_energy.add_dynamic_energy(self.period_ns, power);
                if let Some(data) = &self.data {
                    let len = access.data.len().min(access.size_byte);
                    data.borrow_mut()[start..start + len].copy_from_slice(&access.data[..len]);
                }
                self.period_ns
            }
        }
    }

    fn data_width_byte(&self, access_type: MemoryAccessType) -> usize {
        match access_type {
            MemoryAccessType::Read => self.config.read_max_width_byte,
            MemoryAccessType::Write => self.config.write_max_width_byte,
        }
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
