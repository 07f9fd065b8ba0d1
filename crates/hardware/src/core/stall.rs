//! Per-unit stall decision.

use std::rc::Rc;

use super::conflict::DataConflictPayload;
use super::ports::UnitPorts;

/// Decides whether one unit blocks the instruction the core wants to issue.
#[derive(Debug, Clone)]
pub struct StallHandler {
    ports: Rc<UnitPorts>,
}

impl StallHandler {
    /// Watches the in-flight instructions published on `ports`.
    pub const fn new(ports: Rc<UnitPorts>) -> Self {
        Self { ports }
    }

    /// Whether `candidate` must wait for this unit.
    ///
    /// It must wait when its footprint intersects the merged footprint of the
    /// unit's in-flight instructions, or when it targets this unit while the
    /// unit's issue stage is busy.
    pub fn is_stalled(&self, candidate: &DataConflictPayload) -> bool {
        let unit = self.ports.in_flight_conflict();
        let same_unit = candidate.unit_type == Some(self.ports.unit_type());
        candidate.conflicts_with(&unit) || (same_unit && self.ports.is_busy())
    }
}
