//! Two-phase simulation clock.
//!
//! Every period the clock asserts its positive edge, fires the one-shot events
//! registered for that edge and then, one delta round later, deasserts the edge.
//! Every process that reacts immediately to an edge therefore observes
//! [`Clock::is_pos_edge`] as `true`; nothing that runs after the settle round
//! does.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::event::Event;
use super::kernel::{Kernel, SimTime, ns_to_time};

/// Shared clock of one chip.
pub struct Clock {
    kernel: Kernel,
    period: SimTime,
    pos_edge: Cell<bool>,
    cycle: Cell<u64>,
    registered: RefCell<Vec<Event>>,
    edge: Event,
    settle: Event,
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("period", &self.period)
            .field("cycle", &self.cycle.get())
            .field("pos_edge", &self.pos_edge.get())
            .finish_non_exhaustive()
    }
}

impl Clock {
    /// Creates a clock with the given period and spawns its processes.
    ///
    /// The first edge happens one period after time zero.
    pub fn new(kernel: &Kernel, period_ns: f64) -> Rc<Self> {
        let clock = Rc::new(Self {
            kernel: kernel.clone(),
            period: ns_to_time(period_ns).max(1),
            pos_edge: Cell::new(false),
            cycle: Cell::new(0),
            registered: RefCell::new(Vec::new()),
            edge: kernel.event("clock.edge"),
            settle: kernel.event("clock.settle"),
        });

        let this = Rc::clone(&clock);
        kernel.spawn("clock.tick", async move {
            loop {
                this.kernel.wait(this.period).await;
                this.pos_edge.set(true);
                this.cycle.set(this.cycle.get() + 1);
                let registered = this.registered.take();
                for event in &registered {
                    event.notify();
                }
                this.edge.notify();
                this.settle.notify_delta();
            }
        });

        let this = Rc::clone(&clock);
        kernel.spawn("clock.settle", async move {
            loop {
                this.settle.wait().await;
                this.pos_edge.set(false);
            }
        });

        clock
    }

    /// Clock period.
    #[inline]
    pub const fn period(&self) -> SimTime {
        self.period
    }

    /// Number of edges produced so far.
    #[inline]
    pub fn cycle(&self) -> u64 {
        self.cycle.get()
    }

    /// Whether the current delta round belongs to an asserted edge.
    #[inline]
    pub fn is_pos_edge(&self) -> bool {
        self.pos_edge.get()
    }

    /// Registers `event` to fire once at the next edge.
    ///
    /// Registering the same event twice before the edge fires it once.
    pub fn notify_next_pos_edge(&self, event: &Event) {
        let mut registered = self.registered.borrow_mut();
        if !registered.iter().any(|e| e.same_as(event)) {
            registered.push(event.clone());
        }
    }

    /// Suspends until the next edge.
    pub async fn next_pos_edge(&self) {
        self.edge.wait().await;
    }
}
