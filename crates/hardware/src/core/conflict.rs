//! Data conflict records.
//!
//! Every decoded instruction carries a [`DataConflictPayload`] describing the
//! memory banks and registers it touches and whether it occupies the shared
//! PIM macro array. A unit publishes the records of its in-flight instructions;
//! the stall handler merges them with `+=` and tests the candidate instruction
//! against the merged footprint with [`DataConflictPayload::conflicts_with`].

use std::collections::BTreeSet;
use std::ops::AddAssign;

use super::payload::ExecuteUnitType;

/// Index of a memory: local banks first, then the global memory, then the PIM array.
pub type MemoryId = usize;

/// A register named by a conflict record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegisterRef {
    /// General-purpose register.
    General(usize),
    /// Special register not bound to a general one.
    Special(usize),
}

/// Memory, register and PIM-array footprint of one instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataConflictPayload {
    /// Owning instruction instance; `None` for a merged footprint.
    pub ins_id: Option<u64>,
    /// Owning unit; a merged footprint keeps the greatest.
    pub unit_type: Option<ExecuteUnitType>,
    /// Whether the instruction occupies the PIM macro array.
    pub uses_pim_unit: bool,
    /// Banks only read.
    pub read_memory_ids: BTreeSet<MemoryId>,
    /// Banks only written.
    pub write_memory_ids: BTreeSet<MemoryId>,
    /// Banks both read and written.
    pub read_write_memory_ids: BTreeSet<MemoryId>,
    /// Registers read.
    pub read_register_ids: BTreeSet<RegisterRef>,
    /// Registers written.
    pub write_register_ids: BTreeSet<RegisterRef>,
}

impl DataConflictPayload {
    /// Creates an empty footprint owned by `ins_id` on `unit_type`.
    pub fn new(ins_id: u64, unit_type: ExecuteUnitType) -> Self {
        Self {
            ins_id: Some(ins_id),
            unit_type: Some(unit_type),
            ..Self::default()
        }
    }

    /// Adds a bank that is read. An unmapped address is ignored.
    pub fn add_read_memory(&mut self, id: Option<MemoryId>) {
        if let Some(id) = id {
            let _ = self.read_memory_ids.insert(id);
        }
    }

    /// Adds a bank that is written. An unmapped address is ignored.
    pub fn add_write_memory(&mut self, id: Option<MemoryId>) {
        if let Some(id) = id {
            let _ = self.write_memory_ids.insert(id);
        }
    }

    /// Adds a bank that is both read and written. An unmapped address is ignored.
    pub fn add_read_write_memory(&mut self, id: Option<MemoryId>) {
        if let Some(id) = id {
            let _ = self.read_write_memory_ids.insert(id);
        }
    }

    /// Adds a register that is read.
    pub fn add_read_register(&mut self, reg: RegisterRef) {
        let _ = self.read_register_ids.insert(reg);
    }

    /// Adds a register that is written.
    pub fn add_write_register(&mut self, reg: RegisterRef) {
        let _ = self.write_register_ids.insert(reg);
    }

    /// Whether the footprint touches nothing.
    pub fn is_empty(&self) -> bool {
        !self.uses_pim_unit
            && self.read_memory_ids.is_empty()
            && self.write_memory_ids.is_empty()
            && self.read_write_memory_ids.is_empty()
            && self.read_register_ids.is_empty()
            && self.write_register_ids.is_empty()
    }

    fn writes_memory(&self, id: MemoryId) -> bool {
        self.write_memory_ids.contains(&id) || self.read_write_memory_ids.contains(&id)
    }

    fn uses_memory(&self, id: MemoryId) -> bool {
        self.read_memory_ids.contains(&id) || self.writes_memory(id)
    }

    fn used_memory_ids(&self) -> impl Iterator<Item = MemoryId> + '_ {
        self.read_memory_ids
            .iter()
            .chain(&self.write_memory_ids)
            .chain(&self.read_write_memory_ids)
            .copied()
    }

    /// Whether a bank is written by one footprint and used by the other.
    pub fn memory_conflicts_with(&self, other: &Self) -> bool {
        self.used_memory_ids().any(|id| {
            (self.writes_memory(id) && other.uses_memory(id))
                || (other.writes_memory(id) && self.uses_memory(id))
        })
    }

    /// Read-after-write, write-after-read or write-after-write on a register.
    pub fn register_conflicts_with(&self, other: &Self) -> bool {
        !self.write_register_ids.is_disjoint(&other.read_register_ids)
            || !self.read_register_ids.is_disjoint(&other.write_register_ids)
            || !self.write_register_ids.is_disjoint(&other.write_register_ids)
    }

    /// Both occupy the PIM array on the same unit.
    pub fn pim_unit_conflicts_with(&self, other: &Self) -> bool {
        self.uses_pim_unit
            && other.uses_pim_unit
            && self.unit_type.is_some()
            && self.unit_type == other.unit_type
    }

    /// Whether the two footprints must not execute at the same time.
    pub fn conflicts_with(&self, other: &Self) -> bool {
        self.memory_conflicts_with(other)
            || self.register_conflicts_with(other)
            || self.pim_unit_conflicts_with(other)
    }
}

impl AddAssign<&Self> for DataConflictPayload {
    fn add_assign(&mut self, other: &Self) {
        self.ins_id = self.ins_id.max(other.ins_id);
        self.unit_type = self.unit_type.max(other.unit_type);
        self.uses_pim_unit |= other.uses_pim_unit;
        self.read_memory_ids.extend(&other.read_memory_ids);
        self.write_memory_ids.extend(&other.write_memory_ids);
        self.read_write_memory_ids.extend(&other.read_write_memory_ids);
        self.read_register_ids.extend(&other.read_register_ids);
        self.write_register_ids.extend(&other.write_register_ids);
    }
}
