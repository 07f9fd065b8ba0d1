//! PIM compute unit.
//!
//! Orchestrates one matrix-vector instruction over the macro groups:
//! 1. **Sparsity metadata:** the value-sparse mask and the bit-sparse metadata
//!    are read in parallel when both the hardware and the instruction use them.
//! 2. **Inputs:** each active group reads its inputs. With value sparsity every
//!    macro keeps only the inputs its mask selects.
//! 3. **Dispatch:** the sub-instruction is handed to each group in turn. With
//!    value sparsity the input network stalls after every
//!    `output_macro_group_cnt` groups.
//!
//! An instruction is a single sub-instruction. The latch is released once
//! every active group has taken its work; the last group's result adder
//! completes the instruction. An instruction naming an output register has its
//! results written to local memory first, by the unit's output writer.
//!
//! Element column counts follow each group's rule: zero selects the columns
//! enabled by the last `pim-set`.

use std::fmt;
use std::rc::Rc;

use super::group::MacroGroup;
use super::payload::{MacroGroupPayload, PimInsInfo, PimOutputWrite};
use crate::common::BYTE_TO_BIT;
use crate::common::bits::{div_ceil, mask_bit, unpack_values};
use crate::config::PimUnitConfig;
use crate::core::energy::EnergyCounter;
use crate::core::fsm::Fsm;
use crate::core::payload::{PimComputeInsPayload, UnitPayload};
use crate::core::ports::UnitPorts;
use crate::core::socket::SubmoduleSocket;
use crate::core::units::ExecuteUnit;
use crate::sim::SimContext;
use crate::soc::memory::LocalMemoryUnit;
use crate::stats::EnergyReporter;

/// Top-level PIM compute unit.
pub struct PimComputeUnit {
    ctx: SimContext,
    config: Rc<PimUnitConfig>,
    ports: Rc<UnitPorts>,
    fsm: Fsm<PimComputeInsPayload>,
    memory: Rc<LocalMemoryUnit>,
    groups: Vec<Rc<MacroGroup>>,
    output_socket: Rc<SubmoduleSocket<PimOutputWrite>>,
    value_sparse_network_energy: EnergyCounter,
    meta_buffer_energy: EnergyCounter,
}

impl fmt::Debug for PimComputeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PimComputeUnit")
            .field("fsm", &self.fsm)
            .field("groups", &self.groups.len())
            .finish_non_exhaustive()
    }
}

impl PimComputeUnit {
    /// Creates the unit with `macro_total_cnt / macro_group_size` groups.
    pub fn new(
        ctx: &SimContext,
        config: &Rc<PimUnitConfig>,
        ports: Rc<UnitPorts>,
        memory: Rc<LocalMemoryUnit>,
    ) -> Rc<Self> {
        let output_socket = Rc::new(SubmoduleSocket::new(ctx.kernel(), "PimComputeUnit.output"));
        let groups = (0..config.macro_group_cnt())
            .map(|group_id| {
                MacroGroup::new(
                    ctx,
                    format!("MacroGroup_{group_id}"),
                    config,
                    Rc::clone(&ports),
                    Rc::clone(&output_socket),
                )
            })
            .collect();
        let unit = Rc::new(Self {
            ctx: ctx.clone(),
            fsm: Fsm::new(ctx.kernel(), ctx.clock(), "PimComputeUnit"),
            value_sparse_network_energy: EnergyCounter::with_static_power(if config.value_sparse {
                config.value_sparse_config.static_power_mw
            } else {
                0.0
            }),
            meta_buffer_energy: EnergyCounter::with_static_power(if config.bit_sparse {
                config.bit_sparse_config.reg_buffer_static_power_mw
            } else {
                0.0
            }),
            config: Rc::clone(config),
            ports,
            memory,
            groups,
            output_socket,
        });
        let this = Rc::clone(&unit);
        ctx.kernel().spawn("PimComputeUnit.issue", async move { this.process_issue().await });
        let this = Rc::clone(&unit);
        ctx.kernel().spawn("PimComputeUnit.output", async move { this.process_output_write().await });
        unit
    }

    /// Enables the element columns in `mask` on one group, or on every group
    /// when `broadcast` is set. An unknown group id is ignored.
    pub fn set_activation_element_col_mask(&self, mask: &[u8], broadcast: bool, group_id: usize) {
        if broadcast {
            for group in &self.groups {
                group.set_activation_element_col_mask(mask);
            }
        } else if let Some(group) = self.groups.get(group_id) {
            group.set_activation_element_col_mask(mask);
        } else {
            tracing::error!(group_id, groups = self.groups.len(), "pim set targets an unknown macro group");
        }
    }

    /// The macro groups.
    pub fn groups(&self) -> &[Rc<MacroGroup>] {
        &self.groups
    }

    async fn process_issue(&self) {
        loop {
            let payload = self.fsm.wait_start().await;
            self.ports.set_busy(true);
            tracing::debug!(
                unit = "PimComputeUnit",
                pc = payload.ins.pc,
                ins_id = payload.ins.ins_id,
                groups = payload.activation_group_num,
                "start"
            );

            let pim_ins_info = PimInsInfo {
                ins: payload.ins,
                sub_ins_num: 1,
                last_sub_ins: true,
            };
            let value_sparse_mask = self.read_sparsity_metadata(&payload).await;
            self.compute_sub_ins(&payload, pim_ins_info, &value_sparse_mask).await;

            self.ports.set_busy(false);
            self.fsm.finish_exec();
        }
    }

    fn active_groups(&self, payload: &PimComputeInsPayload) -> impl Iterator<Item = &Rc<MacroGroup>> {
        self.groups.iter().take(payload.activation_group_num)
    }

    fn activation_macro_cnt(&self, group: &MacroGroup, payload: &PimComputeInsPayload) -> usize {
        div_ceil(
            group.activation_element_col_num(payload.activation_element_col_num),
            self.config.macro_size.element_cnt_per_compartment,
        )
    }

    /// Bytes of value-sparse mask and of bit-sparse metadata `payload` reads.
    ///
    /// Both cover the widest active group; a kind of metadata the hardware or
    /// the instruction does not use reads nothing.
    pub fn sparsity_read_sizes(&self, payload: &PimComputeInsPayload) -> (usize, usize) {
        let macro_cnt = self
            .active_groups(payload)
            .map(|group| self.activation_macro_cnt(group, payload))
            .max()
            .unwrap_or(0);
        let size = &self.config.macro_size;
        let mask_byte = if self.config.value_sparse && payload.value_sparse {
            self.config.value_sparse_config.mask_bit_width * payload.input_len * macro_cnt / BYTE_TO_BIT
        } else {
            0
        };
        let meta_byte = if self.config.bit_sparse && payload.bit_sparse {
            self.config.bit_sparse_config.mask_bit_width
                * size.element_cnt_per_compartment
                * size.compartment_cnt_per_macro
                * macro_cnt
                / BYTE_TO_BIT
        } else {
            0
        };
        (mask_byte, meta_byte)
    }

    /// Result write of `payload`, if it names an output register.
    ///
    /// Every active group yields one value of the output bit width per element
    /// column.
    pub fn output_write(&self, payload: &PimComputeInsPayload) -> Option<PimOutputWrite> {
        let address_byte = payload.output_addr_byte?;
        let col_num: usize = self
            .active_groups(payload)
            .map(|group| group.activation_element_col_num(payload.activation_element_col_num))
            .sum();
        let size_byte = div_ceil(payload.output_bit_width * col_num, BYTE_TO_BIT);
        (size_byte > 0).then_some(PimOutputWrite {
            ins: payload.ins,
            address_byte,
            size_byte,
        })
    }

    /// Reads the value-sparse mask and bit-sparse metadata in parallel and
    /// returns the mask.
    async fn read_sparsity_metadata(&self, payload: &PimComputeInsPayload) -> Vec<u8> {
        let (mask_byte, meta_byte) = self.sparsity_read_sizes(payload);

        let read_mask = async {
            if !(self.config.value_sparse && payload.value_sparse) {
                return Vec::new();
            }
            self.memory
                .read_data(payload.ins, payload.value_sparse_mask_addr_byte, mask_byte)
                .await
        };
        let read_meta = async {
            if !(self.config.bit_sparse && payload.bit_sparse) {
                return;
            }
            let bs = &self.config.bit_sparse_config;
            let _ = self
                .memory
                .read_data(payload.ins, payload.bit_sparse_meta_addr_byte, meta_byte)
                .await;
            self.meta_buffer_energy.add_dynamic_energy(
                self.ctx.period_ns(),
                bs.reg_buffer_dynamic_power_mw_per_unit * div_ceil(meta_byte, bs.unit_byte) as f64,
            );
        };
        let (mask, ()) = futures::join!(read_mask, read_meta);
        mask
    }

    async fn compute_sub_ins(&self, payload: &PimComputeInsPayload, pim_ins_info: PimInsInfo, value_sparse_mask: &[u8]) {
        let group_cnt = payload.activation_group_num.min(self.groups.len());
        if group_cnt == 0 {
            tracing::debug!(unit = "PimComputeUnit", pc = payload.ins.pc, "no active group");
            self.ports.finish_ins(&payload.ins);
            self.ports.complete(&payload.ins);
            return;
        }

        let value_sparse = self.config.value_sparse && payload.value_sparse;
        let output = self.output_write(payload);
        let size_byte = div_ceil(payload.input_bit_width * payload.input_len, BYTE_TO_BIT);
        for (group_id, group) in self.groups.iter().enumerate().take(group_cnt) {
            let address_byte = payload.input_addr_byte + payload.group_input_step_byte * group_id as i64;
            let data = self.memory.read_data(payload.ins, address_byte, size_byte).await;
            let macro_cnt = self.activation_macro_cnt(group, payload);
            let macro_inputs = self.macro_inputs(payload, &data, value_sparse_mask, value_sparse, macro_cnt);
            let last_group = group_id + 1 == group_cnt;

            group
                .start_execute(MacroGroupPayload {
                    pim_ins_info,
                    last_group,
                    row: payload.row,
                    input_bit_width: payload.input_bit_width,
                    activation_element_col_num: payload.activation_element_col_num,
                    bit_sparse: self.config.bit_sparse && payload.bit_sparse,
                    macro_inputs,
                    output: if last_group { output } else { None },
                })
                .await;

            let vs = &self.config.value_sparse_config;
            if value_sparse && (group_id + 1) % vs.output_macro_group_cnt.max(1) == 0 {
                let latency = self.ctx.cycles_ns(vs.latency_cycle);
                self.value_sparse_network_energy
                    .add_dynamic_energy(latency, vs.dynamic_power_mw);
                if latency > 0.0 {
                    self.ctx.kernel().wait_ns(latency).await;
                }
            }
        }

        for group in self.groups.iter().take(group_cnt) {
            group.wait_until_finish_if_busy().await;
        }
    }

    /// Splits one group's input vector over its active macros.
    ///
    /// Without real data every input is taken as all ones, so timing follows
    /// the dense worst case.
    fn macro_inputs(
        &self,
        payload: &PimComputeInsPayload,
        data: &[u8],
        value_sparse_mask: &[u8],
        value_sparse: bool,
        macro_cnt: usize,
    ) -> Vec<Vec<u64>> {
        let inputs = if self.ctx.real_data() {
            unpack_values(data, payload.input_bit_width, payload.input_len)
        } else {
            let width = payload.input_bit_width.min(u64::BITS as usize);
            let ones = if width == 0 { 0 } else { u64::MAX >> (u64::BITS as usize - width) };
            vec![ones; payload.input_len]
        };
        if !value_sparse {
            return vec![inputs; macro_cnt];
        }
        let capacity = self.config.macro_size.compartment_cnt_per_macro;
        (0..macro_cnt)
            .map(|macro_id| {
                inputs
                    .iter()
                    .enumerate()
                    .filter(|&(i, _)| mask_bit(value_sparse_mask, macro_id * payload.input_len + i))
                    .map(|(_, &input)| input)
                    .take(capacity)
                    .collect()
            })
            .collect()
    }

    /// Writes the results of each finished instruction to local memory.
    async fn process_output_write(&self) {
        loop {
            let write = self.output_socket.wait_until_start().await;
            tracing::debug!(
                unit = "PimComputeUnit",
                pc = write.ins.pc,
                ins_id = write.ins.ins_id,
                address = write.address_byte,
                size = write.size_byte,
                "write output"
            );
            self.memory
                .write_data(write.ins, write.address_byte, write.size_byte, Vec::new())
                .await;
            self.output_socket.finish();
        }
    }
}

impl ExecuteUnit for PimComputeUnit {
    fn ports(&self) -> &Rc<UnitPorts> {
        &self.ports
    }

    fn try_issue(&self, payload: UnitPayload) -> Result<(), UnitPayload> {
        match payload {
            UnitPayload::PimCompute(compute) => self.fsm.try_latch(compute).map_err(UnitPayload::PimCompute),
            other => Err(other),
        }
    }

    fn energy_reporter(&self, running_time_ns: f64) -> EnergyReporter {
        let mut reporter = EnergyReporter::default();
        if self.config.value_sparse {
            reporter.add_sub_module(
                "value sparsity network",
                EnergyReporter::from_counter(&self.value_sparse_network_energy, running_time_ns),
            );
        }
        if self.config.bit_sparse {
            reporter.add_sub_module(
                "meta buffer",
                EnergyReporter::from_counter(&self.meta_buffer_energy, running_time_ns),
            );
        }
        for group in &self.groups {
            reporter += &group.energy_reporter(running_time_ns);
        }
        reporter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LocalMemoryUnitConfig, SimConfig};
    use crate::core::payload::{ExecuteUnitType, InstructionPayload};

    fn unit(ctx: &SimContext) -> Rc<PimComputeUnit> {
        let config = Rc::new(PimUnitConfig {
            value_sparse: true,
            bit_sparse: true,
            ..PimUnitConfig::default()
        });
        let kernel = ctx.kernel();
        let ports = UnitPorts::new(ExecuteUnitType::PimCompute, kernel, 1, false, kernel.event("activity"));
        let memory = Rc::new(LocalMemoryUnit::new(ctx, 0, &LocalMemoryUnitConfig::default(), &config, None).unwrap());
        PimComputeUnit::new(ctx, &config, ports, memory)
    }

    fn payload(activation_element_col_num: usize) -> PimComputeInsPayload {
        PimComputeInsPayload {
            ins: InstructionPayload {
                pc: 1,
                ins_id: 0,
                unit_type: ExecuteUnitType::PimCompute,
            },
            input_addr_byte: 0,
            input_len: 16,
            input_bit_width: 8,
            activation_group_num: 2,
            activation_element_col_num,
            group_input_step_byte: 16,
            row: 0,
            bit_sparse: true,
            bit_sparse_meta_addr_byte: 0,
            value_sparse: true,
            value_sparse_mask_addr_byte: 0,
            output_addr_byte: Some(64),
            output_bit_width: 32,
        }
    }

    #[test]
    fn test_default_columns_follow_activation_mask() {
        let ctx = SimContext::new(&SimConfig::default());
        let unit = unit(&ctx);
        // 16 columns per group: two macros of 8
        assert_eq!(unit.sparsity_read_sizes(&payload(0)), (4, 96));

        unit.set_activation_element_col_mask(&[0xFF, 0x00], true, 0);
        assert_eq!(unit.groups()[1].activation_element_col_num(0), 8);
        assert_eq!(unit.sparsity_read_sizes(&payload(0)), (2, 48));
        assert_eq!(unit.output_write(&payload(0)).map(|w| w.size_byte), Some(64));

        // an explicit count overrides the mask
        assert_eq!(unit.sparsity_read_sizes(&payload(16)), (4, 96));
        assert_eq!(unit.output_write(&payload(16)).map(|w| w.size_byte), Some(128));
    }

    #[test]
    fn test_widest_group_sizes_sparsity_reads() {
        let ctx = SimContext::new(&SimConfig::default());
        let unit = unit(&ctx);
        unit.set_activation_element_col_mask(&[0x0F], false, 0);
        assert_eq!(unit.groups()[0].activation_element_col_num(0), 4);
        assert_eq!(unit.sparsity_read_sizes(&payload(0)), (4, 96));

        let one_group = PimComputeInsPayload {
            activation_group_num: 1,
            ..payload(0)
        };
        assert_eq!(unit.sparsity_read_sizes(&one_group), (2, 48));
        // 4 columns of 32 bits
        assert_eq!(unit.output_write(&one_group).map(|w| w.size_byte), Some(16));
    }

    #[test]
    fn test_no_output_register_writes_nothing() {
        let ctx = SimContext::new(&SimConfig::default());
        let unit = unit(&ctx);
        let plain = PimComputeInsPayload {
            output_addr_byte: None,
            ..payload(0)
        };
        assert_eq!(unit.output_write(&plain), None);
        let zero_width = PimComputeInsPayload {
            output_bit_width: 0,
            ..payload(0)
        };
        assert_eq!(unit.output_write(&zero_width), None);
    }
}
