//! Local memory unit of a core.
//!
//! Memory ids used in conflict records are assigned here: local banks take
//! ids `0..n` in configuration order, global memory takes `n` and the PIM
//! macro array takes `n + 1`.

use std::fmt;
use std::rc::Rc;

use super::{MemoryAccessType, MemoryBank, Ram, RegBuffer};
use crate::common::bits::div_ceil;
use crate::common::{BYTE_TO_BIT, SimResult};
use crate::config::{AddressSpaceConfig, LocalMemoryHardwareConfig, LocalMemoryUnitConfig, PimUnitConfig};
use crate::core::conflict::MemoryId;
use crate::core::energy::EnergyCounter;
use crate::core::payload::InstructionPayload;
use crate::sim::SimContext;
use crate::soc::global_memory::GlobalMemory;
use crate::soc::network::{Network, NetworkPayload};
use crate::stats::EnergyReporter;

/// Route from a core to the chip's global memory.
#[derive(Clone)]
pub struct GlobalMemoryPort {
    /// Network node of the core.
    pub node_id: usize,
    /// Network carrying the accesses.
    pub network: Rc<dyn Network>,
    /// The global memory.
    pub memory: Rc<GlobalMemory>,
}

impl fmt::Debug for GlobalMemoryPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalMemoryPort")
            .field("node_id", &self.node_id)
            .field("memory", &self.memory)
            .finish_non_exhaustive()
    }
}

/// Weight-write path into the PIM macro array.
#[derive(Debug, Clone)]
struct PimWritePath {
    space: AddressSpaceConfig,
    bit_width: usize,
    latency_cycle: u32,
    power_per_bit_mw: f64,
}

/// Address decoder and access front end for the memories of one core.
#[derive(Debug)]
pub struct LocalMemoryUnit {
    ctx: SimContext,
    core_id: usize,
    banks: Vec<Rc<MemoryBank>>,
    pim_write: PimWritePath,
    pim_load_energy: EnergyCounter,
    global: Option<GlobalMemoryPort>,
}

impl LocalMemoryUnit {
    /// Builds every configured bank.
    ///
    /// # Errors
    ///
    /// Returns an error if a RAM image cannot be read.
    pub fn new(
        ctx: &SimContext,
        core_id: usize,
        config: &LocalMemoryUnitConfig,
        pim_config: &PimUnitConfig,
        global: Option<GlobalMemoryPort>,
    ) -> SimResult<Self> {
        let mut banks = Vec::with_capacity(config.local_memory_list.len());
        for memory in &config.local_memory_list {
            let name = format!("core{core_id}.{}", memory.name);
            let hardware: Box<dyn super::MemoryHardware> = match &memory.hardware {
                LocalMemoryHardwareConfig::Ram(ram) => Box::new(Ram::new(ctx, &memory.name, ram)?),
                LocalMemoryHardwareConfig::RegBuffer(buffer) => {
                    Box::new(RegBuffer::new(ctx, &memory.name, buffer))
                }
            };
            let bank = MemoryBank::new(ctx.kernel(), name, memory.addressing, hardware);
            banks.push(bank);
        }
        Ok(Self {
            ctx: ctx.clone(),
            core_id,
            banks,
            pim_write: PimWritePath {
                space: pim_config.address_space,
                bit_width: pim_config.sram_write_bit_width(),
                latency_cycle: pim_config.sram.write_latency_cycle,
                power_per_bit_mw: pim_config.sram.write_dynamic_power_per_bit_mw,
            },
            pim_load_energy: EnergyCounter::default(),
            global,
        })
    }

    /// Id of the local bank mapping `address_byte`.
    pub fn local_memory_id_by_address(&self, address_byte: i64) -> Option<MemoryId> {
        self.banks.iter().position(|bank| bank.contains(address_byte))
    }

    /// Id of global memory.
    pub fn global_memory_id(&self) -> MemoryId {
        self.banks.len()
    }

    /// Id of the PIM macro array.
    pub fn pim_memory_id(&self) -> MemoryId {
        self.banks.len() + 1
    }

    /// Whether `address_byte` lies in global memory.
    pub fn is_global_address(&self, address_byte: i64) -> bool {
        self.global
            .as_ref()
            .is_some_and(|port| port.memory.contains(address_byte))
    }

    /// Whether `address_byte` lies in the PIM macro array.
    pub const fn is_pim_address(&self, address_byte: i64) -> bool {
        self.pim_write.space.contains(address_byte)
    }

    /// Id of whatever memory maps `address_byte`: a local bank, global memory
    /// or the PIM array, in that order.
    pub fn memory_id_by_address(&self, address_byte: i64) -> Option<MemoryId> {
        self.local_memory_id_by_address(address_byte).or_else(|| {
            if self.is_global_address(address_byte) {
                Some(self.global_memory_id())
            } else if self.is_pim_address(address_byte) {
                Some(self.pim_memory_id())
            } else {
                None
            }
        })
    }

    /// Widest single access of memory `id` in bytes.
    ///
    /// Global memory has no width limit and yields `None`, as does an unknown id.
    pub fn memory_data_width_by_id(&self, id: MemoryId, access_type: MemoryAccessType) -> Option<usize> {
        if let Some(bank) = self.banks.get(id) {
            return Some(bank.data_width_byte(access_type));
        }
        (id == self.pim_memory_id()).then(|| (self.pim_write.bit_width / BYTE_TO_BIT).max(1))
    }

    /// Capacity of memory `id` in bytes, or zero for an unknown id.
    pub fn memory_size_by_id(&self, id: MemoryId) -> usize {
        if let Some(bank) = self.banks.get(id) {
            return bank.size_byte();
        }
        if id == self.global_memory_id() {
            return self.global.as_ref().map_or(0, |port| port.memory.size_byte());
        }
        if id == self.pim_memory_id() {
            return self.pim_write.space.size_byte.max(0) as usize;
        }
        0
    }

    /// Reads `size_byte` bytes at `address_byte`, suspending until they arrive.
    ///
    /// An unmapped address is logged and reads nothing.
    pub async fn read_data(&self, ins: InstructionPayload, address_byte: i64, size_byte: usize) -> Vec<u8> {
        if let Some(id) = self.local_memory_id_by_address(address_byte) {
            return self.banks[id].read(ins, address_byte, size_byte).await;
        }
        if let Some(port) = self.global_port(address_byte) {
            let payload = NetworkPayload {
                src_id: port.node_id,
                dst_id: port.memory.node_id(),
                request_size_byte: 1,
                response_size_byte: size_byte,
            };
            let memory = Rc::clone(&port.memory);
            let serve = Box::pin(async move { memory.read(ins, address_byte, size_byte).await });
            return port.network.transport(payload, serve).await;
        }
        tracing::error!(
            core_id = self.core_id,
            pc = ins.pc,
            address = address_byte,
            "read from an address outside every memory"
        );
        Vec::new()
    }

    /// Writes `data` as `size_byte` bytes at `address_byte`, suspending until done.
    ///
    /// A write inside the PIM address space loads weights into the macro array
    /// row by row. An unmapped address is logged and dropped.
    pub async fn write_data(&self, ins: InstructionPayload, address_byte: i64, size_byte: usize, data: Vec<u8>) {
        let space = &self.pim_write.space;
        if address_byte >= space.offset_byte && address_byte + size_byte as i64 <= space.end() {
            let times = div_ceil(size_byte * BYTE_TO_BIT, self.pim_write.bit_width);
            let latency = f64::from(self.pim_write.latency_cycle) * self.ctx.period_ns() * times as f64;
            let power = self.pim_write.power_per_bit_mw * self.pim_write.bit_width as f64;
            self.pim_load_energy.add_dynamic_energy(latency, power);
            tracing::trace!(pc = ins.pc, ins_id = ins.ins_id, size_byte, latency, "weight write");
            if latency > 0.0 {
                self.ctx.kernel().wait_ns(latency).await;
            }
            return;
        }
        if let Some(id) = self.local_memory_id_by_address(address_byte) {
            self.banks[id].write(ins, address_byte, size_byte, data).await;
            return;
        }
        if let Some(port) = self.global_port(address_byte) {
            let payload = NetworkPayload {
                src_id: port.node_id,
                dst_id: port.memory.node_id(),
                request_size_byte: size_byte,
                response_size_byte: 0,
            };
            let memory = Rc::clone(&port.memory);
            let serve = Box::pin(async move {
                memory.write(ins, address_byte, size_byte, data).await;
                Vec::new()
            });
            let _ = port.network.transport(payload, serve).await;
            return;
        }
        tracing::error!(
            core_id = self.core_id,
            pc = ins.pc,
            address = address_byte,
            "write to an address outside every memory"
        );
    }

    fn global_port(&self, address_byte: i64) -> Option<&GlobalMemoryPort> {
        self.global
            .as_ref()
            .filter(|port| port.memory.contains(address_byte))
    }

    /// Energy report with one sub-module per bank plus `PimLoad`.
    pub fn energy_reporter(&self, running_time_ns: f64) -> EnergyReporter {
        let mut reporter = EnergyReporter::default();
        for bank in &self.banks {
            let name = bank.name().split_once('.').map_or(bank.name(), |(_, name)| name);
            reporter.add_sub_module(name, bank.energy_reporter(running_time_ns));
        }
        reporter.add_sub_module(
            "PimLoad",
            EnergyReporter::from_counter(&self.pim_load_energy, running_time_ns),
        );
        reporter
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::config::{LocalMemoryConfig, NetworkConfig, RamConfig, RegBufferConfig, SimConfig};
    use crate::core::payload::ExecuteUnitType;
    use crate::soc::network::SimpleNetwork;

    fn ins(unit_type: ExecuteUnitType) -> InstructionPayload {
        InstructionPayload { pc: 1, ins_id: 0, unit_type }
    }

    fn config() -> LocalMemoryUnitConfig {
        LocalMemoryUnitConfig {
            local_memory_list: vec![
                LocalMemoryConfig {
                    name: "ram".to_owned(),
                    addressing: AddressSpaceConfig { offset_byte: 0, size_byte: 256 },
                    hardware: LocalMemoryHardwareConfig::Ram(RamConfig {
                        size_byte: 256,
                        width_byte: 16,
                        ..RamConfig::default()
                    }),
                },
                LocalMemoryConfig {
                    name: "buffer".to_owned(),
                    addressing: AddressSpaceConfig { offset_byte: 256, size_byte: 64 },
                    hardware: LocalMemoryHardwareConfig::RegBuffer(RegBufferConfig {
                        size_byte: 64,
                        ..RegBufferConfig::default()
                    }),
                },
            ],
        }
    }

    fn pim_config() -> PimUnitConfig {
        PimUnitConfig {
            address_space: AddressSpaceConfig { offset_byte: 4096, size_byte: 4096 },
            ..PimUnitConfig::default()
        }
    }

    fn unit(ctx: &SimContext) -> Rc<LocalMemoryUnit> {
        let global = GlobalMemoryPort {
            node_id: 0,
            network: Rc::new(SimpleNetwork::new(ctx, &NetworkConfig::default())),
            memory: Rc::new(
                GlobalMemory::new(
                    ctx,
                    &RamConfig::default(),
                    AddressSpaceConfig { offset_byte: 1 << 20, size_byte: 1024 },
                    1,
                )
                .unwrap(),
            ),
        };
        Rc::new(LocalMemoryUnit::new(ctx, 0, &config(), &pim_config(), Some(global)).unwrap())
    }

    #[test]
    fn test_memory_ids() {
        let ctx = SimContext::new(&SimConfig::default());
        let lmu = unit(&ctx);
        assert_eq!(lmu.memory_id_by_address(10), Some(0));
        assert_eq!(lmu.memory_id_by_address(300), Some(1));
        assert_eq!(lmu.memory_id_by_address(1 << 20), Some(2));
        assert_eq!(lmu.memory_id_by_address(5000), Some(3));
        assert_eq!(lmu.memory_id_by_address(2000), None);
        assert_eq!(lmu.local_memory_id_by_address(1 << 20), None);
        assert_eq!(lmu.memory_data_width_by_id(0, MemoryAccessType::Read), Some(16));
        assert_eq!(lmu.memory_data_width_by_id(2, MemoryAccessType::Read), None);
        assert_eq!(lmu.memory_size_by_id(1), 64);
        assert_eq!(lmu.memory_size_by_id(9), 0);
    }

    #[test]
    fn test_local_and_global_round_trip() {
        let ctx = SimContext::new(&SimConfig::default());
        let lmu = unit(&ctx);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let (u, s) = (Rc::clone(&lmu), Rc::clone(&seen));
        ctx.kernel().spawn("user", async move {
            let ins = ins(ExecuteUnitType::Transfer);
            u.write_data(ins, 16, 4, vec![1, 2, 3, 4]).await;
            s.borrow_mut().push(u.read_data(ins, 16, 4).await);
            u.write_data(ins, (1 << 20) + 8, 2, vec![9, 9]).await;
            s.borrow_mut().push(u.read_data(ins, (1 << 20) + 8, 2).await);
            s.borrow_mut().push(u.read_data(ins, 2000, 2).await);
        });
        let _ = ctx.kernel().run(Some(1_000_000));
        assert_eq!(*seen.borrow(), vec![vec![1, 2, 3, 4], vec![9, 9], Vec::new()]);
        let report = lmu.energy_reporter(ctx.now_ns());
        assert!(report.sub_modules.contains_key("ram"));
        assert!(report.sub_modules.contains_key("buffer"));
        assert!(report.sub_modules.contains_key("PimLoad"));
    }

    #[test]
    fn test_pim_space_write_takes_sram_path() {
        let ctx = SimContext::new(&SimConfig::default());
        let lmu = unit(&ctx);
        let bit_width = pim_config().sram_write_bit_width();
        let size_byte = bit_width * 3 / BYTE_TO_BIT;

        let (u, k) = (Rc::clone(&lmu), ctx.kernel().clone());
        ctx.kernel().spawn("loader", async move {
            u.write_data(ins(ExecuteUnitType::Transfer), 4096, size_byte, Vec::new()).await;
            k.stop();
        });
        let _ = ctx.kernel().run(None);
        let expected = f64::from(pim_config().sram.write_latency_cycle) * ctx.period_ns() * 3.0;
        assert!((ctx.now_ns() - expected).abs() < 1e-9);
        let report = lmu.energy_reporter(0.0);
        assert!(report.sub_modules["PimLoad"].activity_time_ns > 0.0);
    }
}
