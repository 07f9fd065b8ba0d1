//! Register unit with write-to-read bypass.
//!
//! A write lands in a one-cycle staging register before it is committed to the
//! array. A read looks at the write of the current cycle first, then at the
//! staged write of the previous cycle and only then at the array, so a value
//! written in one cycle is visible to every read in the same or a later cycle.
//! Special registers bound to a general register are redirected to it on both
//! paths.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::common::{GENERAL_REG_NUM, SPECIAL_REG_NUM};
use crate::config::RegisterUnitConfig;
use crate::core::conflict::RegisterRef;
use crate::core::energy::EnergyCounter;
use crate::sim::{Clock, SimContext};
use crate::stats::EnergyReporter;

/// A register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegUnitWriteRequest {
    /// Target register.
    pub reg_id: usize,
    /// Value to write.
    pub reg_value: i32,
    /// Whether `reg_id` names a special register.
    pub write_special_register: bool,
}

#[derive(Debug, Clone, Copy)]
struct StagedWrite {
    cycle: u64,
    target: RegisterRef,
    value: i32,
}

struct RegFile {
    general: [i32; GENERAL_REG_NUM],
    special: [i32; SPECIAL_REG_NUM],
    current: Option<StagedWrite>,
    last: Option<StagedWrite>,
}

impl RegFile {
    fn commit(&mut self, write: StagedWrite) {
        match write.target {
            RegisterRef::General(id) => self.general[id] = write.value,
            RegisterRef::Special(id) => self.special[id] = write.value,
        }
    }

    /// Moves staged writes along as cycles pass.
    fn advance(&mut self, cycle: u64) {
        if let Some(current) = self.current {
            if current.cycle < cycle {
                if let Some(last) = self.last.take() {
                    self.commit(last);
                }
                if current.cycle + 1 < cycle {
                    self.commit(current);
                } else {
                    self.last = Some(current);
                }
                self.current = None;
            }
        }
        if let Some(last) = self.last {
            if last.cycle + 1 < cycle {
                self.commit(last);
                self.last = None;
            }
        }
    }

    fn lookup(&self, target: RegisterRef) -> i32 {
        for staged in [self.current, self.last].into_iter().flatten() {
            if staged.target == target {
                return staged.value;
            }
        }
        match target {
            RegisterRef::General(id) => self.general[id],
            RegisterRef::Special(id) => self.special[id],
        }
    }
}

/// General and special register files of one core.
pub struct RegUnit {
    clock: Rc<Clock>,
    period_ns: f64,
    dynamic_power_mw: f64,
    special_binding: HashMap<usize, usize>,
    file: RefCell<RegFile>,
    energy: EnergyCounter,
}

impl fmt::Debug for RegUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self.file.borrow();
        f.debug_struct("RegUnit")
            .field("general", &file.general)
            .field("special", &file.special)
            .finish_non_exhaustive()
    }
}

impl RegUnit {
    /// Creates a zeroed register unit.
    pub fn new(ctx: &SimContext, config: &RegisterUnitConfig) -> Self {
        Self {
            clock: Rc::clone(ctx.clock()),
            period_ns: ctx.period_ns(),
            dynamic_power_mw: config.dynamic_power_mw,
            special_binding: config
                .special_register_binding
                .iter()
                .map(|b| (b.special, b.general))
                .collect(),
            file: RefCell::new(RegFile {
                general: [0; GENERAL_REG_NUM],
                special: [0; SPECIAL_REG_NUM],
                current: None,
                last: None,
            }),
            energy: EnergyCounter::with_static_power(config.static_power_mw),
        }
    }

    /// General register a special register is bound to.
    pub fn special_bound_general_id(&self, special_id: usize) -> Option<usize> {
        self.special_binding.get(&special_id).copied()
    }

    /// Storage a register id resolves to, or `None` if it is out of range.
    pub fn resolve(&self, id: usize, special: bool) -> Option<RegisterRef> {
        let target = if special {
            match self.special_bound_general_id(id) {
                Some(general) => RegisterRef::General(general),
                None => RegisterRef::Special(id),
            }
        } else {
            RegisterRef::General(id)
        };
        let in_range = match target {
            RegisterRef::General(id) => id < GENERAL_REG_NUM,
            RegisterRef::Special(id) => id < SPECIAL_REG_NUM,
        };
        in_range.then_some(target)
    }

    /// Reads a register, observing pending writes. Out-of-range ids read zero.
    pub fn read_register(&self, id: usize, special: bool) -> i32 {
        self.energy
            .add_tagged_dynamic_energy(0, self.clock.cycle(), self.period_ns, self.dynamic_power_mw);
        let Some(target) = self.resolve(id, special) else {
            tracing::error!(id, special, "read of a register out of range");
            return 0;
        };
        let mut file = self.file.borrow_mut();
        file.advance(self.clock.cycle());
        file.lookup(target)
    }

    /// Stages a register write. Out-of-range ids are dropped.
    pub fn write_register(&self, request: RegUnitWriteRequest) {
        self.energy.add_dynamic_energy(self.period_ns, self.dynamic_power_mw);
        let Some(target) = self.resolve(request.reg_id, request.write_special_register) else {
            tracing::error!(id = request.reg_id, "write of a register out of range");
            return;
        };
        let cycle = self.clock.cycle();
        let mut file = self.file.borrow_mut();
        file.advance(cycle);
        if let Some(current) = file.current.take() {
            if let Some(last) = file.last.replace(current) {
                file.commit(last);
            }
        }
        file.current = Some(StagedWrite {
            cycle,
            target,
            value: request.reg_value,
        });
        tracing::trace!(?target, value = request.reg_value, "register write");
    }

    /// Committed and staged general register values, as a read would see them.
    pub fn general_registers(&self) -> [i32; GENERAL_REG_NUM] {
        let mut values = [0; GENERAL_REG_NUM];
        for (id, value) in values.iter_mut().enumerate() {
            *value = self.file.borrow().lookup(RegisterRef::General(id));
        }
        values
    }

    /// Energy report of the register files.
    pub fn energy_reporter(&self, running_time_ns: f64) -> EnergyReporter {
        EnergyReporter::from_counter(&self.energy, running_time_ns)
    }
}
