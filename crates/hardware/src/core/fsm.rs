//! Ready/busy instruction latch.
//!
//! Every execution unit accepts instructions through an [`Fsm`]. In the READY
//! state an offer made while the clock edge is asserted is latched, the FSM
//! turns BUSY and the unit's issue process is started one delta round later.
//! The unit returns the FSM to READY with [`Fsm::finish_exec`]; the transition
//! lands in the update phase, so an offer on the same edge still sees BUSY.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::sim::{Clock, Event, Kernel};

/// Two-state latch in front of an execution unit.
pub struct Fsm<T> {
    name: String,
    kernel: Kernel,
    clock: Rc<Clock>,
    ready: Rc<Cell<bool>>,
    value: RefCell<Option<T>>,
    start_exec: Event,
}

impl<T> fmt::Debug for Fsm<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fsm")
            .field("name", &self.name)
            .field("ready", &self.ready.get())
            .finish_non_exhaustive()
    }
}

impl<T> Fsm<T> {
    /// Creates a READY latch driven by `clock`.
    pub fn new(kernel: &Kernel, clock: &Rc<Clock>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            start_exec: kernel.event(format!("{name}.start_exec")),
            name,
            kernel: kernel.clone(),
            clock: Rc::clone(clock),
            ready: Rc::new(Cell::new(true)),
            value: RefCell::new(None),
        }
    }

    /// Offers `payload`; it is latched only on an asserted edge while READY.
    ///
    /// A rejected payload is handed back.
    pub fn try_latch(&self, payload: T) -> Result<(), T> {
        if !self.clock.is_pos_edge() || !self.ready.get() {
            return Err(payload);
        }
        self.ready.set(false);
        *self.value.borrow_mut() = Some(payload);
        self.start_exec.notify_delta();
        Ok(())
    }

    /// Suspends the issue process until a payload is latched and takes it.
    pub async fn wait_start(&self) -> T {
        loop {
            let latched = self.value.borrow_mut().take();
            if let Some(payload) = latched {
                return payload;
            }
            self.start_exec.wait().await;
        }
    }

    /// Returns the latch to READY at the end of the current delta round.
    pub fn finish_exec(&self) {
        let ready = Rc::clone(&self.ready);
        self.kernel.request_update(move || ready.set(true));
    }
}
