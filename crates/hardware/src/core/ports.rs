//! Execution unit channel.
//!
//! [`UnitPorts`] is the bundle of signals between the core and one execution
//! unit: the busy flag, the conflict records of the unit's in-flight
//! instructions, the count of accepted but unfinished instructions and the
//! end-of-program flag. Every write from a unit is applied in the kernel's
//! update phase, so all processes reacting to one clock edge see the same
//! values regardless of the order they run in.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::conflict::DataConflictPayload;
use super::payload::{ExecuteUnitType, InstructionPayload};
use crate::sim::{Event, Kernel};

/// Signals between the core and one execution unit.
pub struct UnitPorts {
    unit_type: ExecuteUnitType,
    kernel: Kernel,
    end_pc: usize,
    report_finish_run: bool,
    busy: Cell<bool>,
    conflicts: RefCell<BTreeMap<u64, DataConflictPayload>>,
    active: Cell<usize>,
    finish_run: Cell<bool>,
    activity: Event,
}

impl fmt::Debug for UnitPorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitPorts")
            .field("unit", &self.unit_type)
            .field("busy", &self.busy.get())
            .field("in_flight", &self.in_flight_ins_ids())
            .field("active", &self.active.get())
            .field("finish_run", &self.finish_run.get())
            .finish_non_exhaustive()
    }
}

impl UnitPorts {
    /// Creates the channel of `unit_type`.
    ///
    /// `end_pc` is the pc of the last static instruction; completing it raises
    /// the finish-run flag when `report_finish_run` is set. `activity` fires
    /// whenever the unit retires an instruction.
    pub fn new(
        unit_type: ExecuteUnitType,
        kernel: &Kernel,
        end_pc: usize,
        report_finish_run: bool,
        activity: Event,
    ) -> Rc<Self> {
        Rc::new(Self {
            unit_type,
            kernel: kernel.clone(),
            end_pc,
            report_finish_run,
            busy: Cell::new(false),
            conflicts: RefCell::new(BTreeMap::new()),
            active: Cell::new(0),
            finish_run: Cell::new(false),
            activity,
        })
    }

    /// Unit this channel belongs to.
    pub const fn unit_type(&self) -> ExecuteUnitType {
        self.unit_type
    }

    /// Whether `pc` is the last static instruction.
    pub const fn is_end_pc(&self, pc: usize) -> bool {
        pc == self.end_pc
    }

    /// Whether the unit's issue stage holds an instruction.
    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    /// Drives the busy flag.
    pub fn set_busy(self: &Rc<Self>, busy: bool) {
        let this = Rc::clone(self);
        self.kernel.request_update(move || this.busy.set(busy));
    }

    /// Publishes the conflict record of an instruction the unit started.
    ///
    /// A record without an owner, or whose owner is already published, is ignored.
    pub fn publish_conflict(self: &Rc<Self>, conflict: DataConflictPayload) {
        let Some(ins_id) = conflict.ins_id else {
            return;
        };
        let this = Rc::clone(self);
        self.kernel.request_update(move || {
            let _ = this.conflicts.borrow_mut().entry(ins_id).or_insert(conflict);
        });
    }

    /// Releases the conflict record of `ins`.
    ///
    /// Later instructions touching the same resources may issue from the next
    /// edge on.
    pub fn finish_ins(self: &Rc<Self>, ins: &InstructionPayload) {
        tracing::debug!(unit = %self.unit_type, pc = ins.pc, ins_id = ins.ins_id, "finish instruction");
        let this = Rc::clone(self);
        let ins_id = ins.ins_id;
        self.kernel.request_update(move || {
            let _ = this.conflicts.borrow_mut().remove(&ins_id);
            this.activity.notify();
        });
    }

    /// Counts an instruction the core handed to the unit.
    pub fn accept(&self) {
        self.active.set(self.active.get() + 1);
    }

    /// Marks `ins` as fully executed.
    pub fn complete(self: &Rc<Self>, ins: &InstructionPayload) {
        let last = self.report_finish_run && self.is_end_pc(ins.pc);
        let this = Rc::clone(self);
        self.kernel.request_update(move || {
            this.active.set(this.active.get().saturating_sub(1));
            if last {
                this.finish_run.set(true);
            }
            this.activity.notify();
        });
    }

    /// Union of the conflict records of every in-flight instruction.
    pub fn in_flight_conflict(&self) -> DataConflictPayload {
        self.conflicts
            .borrow()
            .values()
            .fold(DataConflictPayload::default(), |mut acc, c| {
                acc += c;
                acc
            })
    }

    /// Number of published conflict records.
    pub fn in_flight_count(&self) -> usize {
        self.conflicts.borrow().len()
    }

    /// Owners of the published conflict records, in ascending order.
    pub fn in_flight_ins_ids(&self) -> Vec<u64> {
        self.conflicts.borrow().keys().copied().collect()
    }

    /// Accepted instructions not yet completed.
    pub fn active_count(&self) -> usize {
        self.active.get()
    }

    /// Whether the unit has completed the last static instruction.
    pub fn finish_run(&self) -> bool {
        self.finish_run.get()
    }

    /// Whether the unit holds no instruction at all.
    pub fn is_idle(&self) -> bool {
        !self.busy.get() && self.active.get() == 0 && self.conflicts.borrow().is_empty()
    }
}
