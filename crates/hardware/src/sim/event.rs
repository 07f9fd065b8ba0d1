//! Kernel events.
//!
//! An [`Event`] carries no value. Processes suspend on [`Event::wait`] and are
//! resumed by the next notification after the wait was created; a notification
//! with no waiter is lost.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

use super::kernel::{Kernel, KernelState, SimTime};

struct EventInner {
    name: String,
    kernel: Weak<KernelState>,
    generation: Cell<u64>,
    waiters: RefCell<Vec<Waker>>,
}

/// A notification point processes can wait on.
#[derive(Clone)]
pub struct Event {
    inner: Rc<EventInner>,
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.inner.name)
            .field("generation", &self.inner.generation.get())
            .finish()
    }
}

impl Event {
    pub(super) fn new(kernel: &Kernel, name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(EventInner {
                name: name.into(),
                kernel: Rc::downgrade(kernel.state()),
                generation: Cell::new(0),
                waiters: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Event name, for tracing.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether two handles refer to the same event.
    pub fn same_as(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Fires the event now. Waiters run later in the current evaluation phase.
    pub fn notify(&self) {
        self.trigger();
    }

    /// Fires the event at the start of the next delta round.
    pub fn notify_delta(&self) {
        if let Some(kernel) = self.inner.kernel.upgrade() {
            kernel.schedule_delta(self.clone());
        }
    }

    /// Fires the event after `delay`; a zero delay is a delta notification.
    pub fn notify_after(&self, delay: SimTime) {
        if delay == 0 {
            self.notify_delta();
        } else if let Some(kernel) = self.inner.kernel.upgrade() {
            kernel.schedule_at(delay, self.clone());
        }
    }

    /// Returns a future that completes at the next notification.
    pub fn wait(&self) -> EventWait {
        EventWait {
            event: Rc::clone(&self.inner),
            target: self.inner.generation.get() + 1,
        }
    }

    pub(super) fn trigger(&self) {
        self.inner.generation.set(self.inner.generation.get() + 1);
        let waiters = self.inner.waiters.take();
        for waker in waiters {
            waker.wake();
        }
    }
}

/// Future returned by [`Event::wait`] and [`Kernel::wait`].
#[must_use = "an event wait does nothing unless awaited"]
pub struct EventWait {
    event: Rc<EventInner>,
    target: u64,
}

impl fmt::Debug for EventWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventWait")
            .field("event", &self.event.name)
            .field("target", &self.target)
            .finish()
    }
}

impl Future for EventWait {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.event.generation.get() >= self.target {
            return Poll::Ready(());
        }
        let mut waiters = self.event.waiters.borrow_mut();
        if !waiters.iter().any(|w| w.will_wake(cx.waker())) {
            waiters.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::kernel::RunOutcome;

    #[test]
    fn test_notify_wakes_only_existing_waiters() {
        let kernel = Kernel::new();
        let event = kernel.event("ev");
        let hits = Rc::new(Cell::new(0));

        let (e, h) = (event.clone(), Rc::clone(&hits));
        kernel.spawn("waiter", async move {
            e.wait().await;
            h.set(h.get() + 1);
            e.wait().await;
            h.set(h.get() + 1);
        });
        let (e, k) = (event, kernel.clone());
        kernel.spawn("notifier", async move {
            k.wait_ns(1.0).await;
            e.notify();
            e.notify();
        });

        assert_eq!(kernel.run(None), RunOutcome::Starved);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_delta_and_timed_notification() {
        let kernel = Kernel::new();
        let event = kernel.event("ev");
        let times = Rc::new(RefCell::new(Vec::new()));

        let (e, k, t) = (event.clone(), kernel.clone(), Rc::clone(&times));
        kernel.spawn("waiter", async move {
            e.wait().await;
            t.borrow_mut().push(k.now());
            e.wait().await;
            t.borrow_mut().push(k.now());
        });
        let (e, k) = (event, kernel.clone());
        kernel.spawn("notifier", async move {
            e.notify_delta();
            k.wait(0).await;
            k.wait(0).await;
            e.notify_after(2500);
        });

        let _ = kernel.run(None);
        assert_eq!(*times.borrow(), vec![0, 2500]);
    }
}
