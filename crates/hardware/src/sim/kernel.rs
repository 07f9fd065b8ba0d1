//! Cooperative discrete-event kernel.
//!
//! The kernel drives every hardware process of the simulator on a single thread.
//! A process is an `async` block spawned onto the kernel; it suspends on
//! [`Event`] waits or timed waits and is resumed by the kernel when the event
//! fires. One simulated instant is processed as a sequence of delta rounds:
//! 1. **Evaluation:** Every runnable task is polled until none remains runnable.
//!    Immediate notifications wake tasks inside this same phase.
//! 2. **Update:** Deferred effects queued with [`Kernel::request_update`] are
//!    applied, so a value written during evaluation becomes visible only to the
//!    next round.
//! 3. **Delta notification:** Events notified with [`Event::notify_delta`] fire
//!    and start the next round at the same instant.
//!
//! Time advances to the earliest timed notification once an instant has
//! settled.

use std::cell::{Cell, RefCell};
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Waker};

use futures::task::{ArcWake, waker};

use super::event::{Event, EventWait};
use crate::common::constants::PS_PER_NS;

/// Simulated time in picoseconds.
pub type SimTime = u64;

/// Converts nanoseconds to simulated time, rounding to the nearest picosecond.
pub fn ns_to_time(ns: f64) -> SimTime {
    if ns <= 0.0 { 0 } else { (ns * PS_PER_NS).round() as SimTime }
}

/// Converts simulated time to nanoseconds.
pub fn time_to_ns(time: SimTime) -> f64 {
    time as f64 / PS_PER_NS
}

/// Why [`Kernel::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A process called [`Kernel::stop`].
    Stopped,
    /// No process is runnable and no notification is pending.
    Starved,
    /// The next notification lies beyond the time limit.
    TimeLimit,
}

type ReadyQueue = Arc<Mutex<VecDeque<usize>>>;

struct TaskWaker {
    id: usize,
    queued: AtomicBool,
    ready: ReadyQueue,
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        if arc_self.queued.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Ok(mut ready) = arc_self.ready.lock() {
            ready.push_back(arc_self.id);
        }
    }
}

struct Task {
    name: String,
    future: Option<Pin<Box<dyn Future<Output = ()>>>>,
    handle: Arc<TaskWaker>,
    waker: Waker,
}

pub(super) struct TimedEntry {
    time: SimTime,
    seq: u64,
    event: Event,
}

impl PartialEq for TimedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for TimedEntry {}

impl PartialOrd for TimedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.time, self.seq).cmp(&(other.time, other.seq))
    }
}

pub(super) struct KernelState {
    now: Cell<SimTime>,
    delta_count: Cell<u64>,
    tasks: RefCell<Vec<Task>>,
    ready: ReadyQueue,
    updates: RefCell<Vec<Box<dyn FnOnce()>>>,
    delta_events: RefCell<Vec<Event>>,
    timed: RefCell<BinaryHeap<Reverse<TimedEntry>>>,
    seq: Cell<u64>,
    stop_requested: Cell<bool>,
}

impl KernelState {
    pub(super) fn schedule_delta(&self, event: Event) {
        self.delta_events.borrow_mut().push(event);
    }

    pub(super) fn schedule_at(&self, delay: SimTime, event: Event) {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        self.timed.borrow_mut().push(Reverse(TimedEntry {
            time: self.now.get() + delay,
            seq,
            event,
        }));
    }

    fn has_ready(&self) -> bool {
        self.ready.lock().is_ok_and(|ready| !ready.is_empty())
    }

    fn pop_ready(&self) -> Option<usize> {
        self.ready.lock().ok().and_then(|mut ready| ready.pop_front())
    }
}

/// Handle to the discrete-event kernel.
///
/// Cloning is cheap; all clones drive the same simulation.
#[derive(Clone)]
pub struct Kernel {
    inner: Rc<KernelState>,
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("now", &self.inner.now.get())
            .field("delta", &self.inner.delta_count.get())
            .field("tasks", &self.inner.tasks.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel {
    /// Creates an empty kernel at time zero.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(KernelState {
                now: Cell::new(0),
                delta_count: Cell::new(0),
                tasks: RefCell::new(Vec::new()),
                ready: Arc::new(Mutex::new(VecDeque::new())),
                updates: RefCell::new(Vec::new()),
                delta_events: RefCell::new(Vec::new()),
                timed: RefCell::new(BinaryHeap::new()),
                seq: Cell::new(0),
                stop_requested: Cell::new(false),
            }),
        }
    }

    pub(super) fn state(&self) -> &Rc<KernelState> {
        &self.inner
    }

    /// Current simulated time.
    #[inline]
    pub fn now(&self) -> SimTime {
        self.inner.now.get()
    }

    /// Current simulated time in nanoseconds.
    #[inline]
    pub fn now_ns(&self) -> f64 {
        time_to_ns(self.now())
    }

    /// Number of delta rounds executed so far.
    pub fn delta_count(&self) -> u64 {
        self.inner.delta_count.get()
    }

    /// Creates a new event bound to this kernel.
    pub fn event(&self, name: impl Into<String>) -> Event {
        Event::new(self, name)
    }

    /// Spawns a process. It is first polled in the current or next evaluation phase.
    pub fn spawn(&self, name: impl Into<String>, future: impl Future<Output = ()> + 'static) {
        let name = name.into();
        let waker = {
            let mut tasks = self.inner.tasks.borrow_mut();
            let handle = Arc::new(TaskWaker {
                id: tasks.len(),
                queued: AtomicBool::new(false),
                ready: Arc::clone(&self.inner.ready),
            });
            let waker = waker(Arc::clone(&handle));
            tracing::trace!(task = %name, id = handle.id, "spawn");
            tasks.push(Task {
                name,
                future: Some(Box::pin(future)),
                handle,
                waker: waker.clone(),
            });
            waker
        };
        waker.wake();
    }

    /// Suspends the calling process for `duration`.
    ///
    /// A zero duration resumes in the next delta round of the same instant.
    pub fn wait(&self, duration: SimTime) -> EventWait {
        let event = self.event("timeout");
        let wait = event.wait();
        event.notify_after(duration);
        wait
    }

    /// Suspends the calling process for `ns` nanoseconds.
    pub fn wait_ns(&self, ns: f64) -> EventWait {
        self.wait(ns_to_time(ns))
    }

    /// Queues an effect for the update phase of the current delta round.
    pub fn request_update(&self, update: impl FnOnce() + 'static) {
        self.inner.updates.borrow_mut().push(Box::new(update));
    }

    /// Requests the run loop to return once the current evaluation phase ends.
    pub fn stop(&self) {
        self.inner.stop_requested.set(true);
    }

    /// Runs the simulation until it stops, starves or passes `limit`.
    ///
    /// On [`RunOutcome::TimeLimit`] the clock is left at `limit`.
    pub fn run(&self, limit: Option<SimTime>) -> RunOutcome {
        let state = &self.inner;
        loop {
            self.evaluate();
            self.apply_updates();
            if state.stop_requested.get() {
                return RunOutcome::Stopped;
            }

            let deltas = state.delta_events.take();
            if !deltas.is_empty() {
                state.delta_count.set(state.delta_count.get() + 1);
                for event in &deltas {
                    event.trigger();
                }
                continue;
            }
            if state.has_ready() {
                continue;
            }

            let next = state.timed.borrow().peek().map(|Reverse(entry)| entry.time);
            let Some(next) = next else {
                return RunOutcome::Starved;
            };
            if limit.is_some_and(|limit| next > limit) {
                state.now.set(limit.unwrap_or(next));
                return RunOutcome::TimeLimit;
            }

            state.now.set(next);
            loop {
                let entry = {
                    let mut timed = state.timed.borrow_mut();
                    match timed.peek() {
                        Some(Reverse(entry)) if entry.time == next => timed.pop(),
                        _ => None,
                    }
                };
                let Some(Reverse(entry)) = entry else { break };
                entry.event.trigger();
            }
        }
    }

    fn evaluate(&self) {
        while let Some(id) = self.inner.pop_ready() {
            let taken = {
                let mut tasks = self.inner.tasks.borrow_mut();
                tasks.get_mut(id).map(|task| {
                    task.handle.queued.store(false, Ordering::Release);
                    (task.future.take(), task.waker.clone())
                })
            };
            let Some((Some(mut future), waker)) = taken else {
                continue;
            };

            let mut cx = Context::from_waker(&waker);
            if future.as_mut().poll(&mut cx).is_pending() {
                if let Some(task) = self.inner.tasks.borrow_mut().get_mut(id) {
                    task.future = Some(future);
                }
            } else if let Some(task) = self.inner.tasks.borrow().get(id) {
                tracing::trace!(task = %task.name, "process returned");
            }
        }
    }

    fn apply_updates(&self) {
        loop {
            let updates = self.inner.updates.take();
            if updates.is_empty() {
                break;
            }
            for update in updates {
                update();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_conversion() {
        assert_eq!(ns_to_time(1.0), 1000);
        assert_eq!(ns_to_time(0.5), 500);
        assert_eq!(ns_to_time(-3.0), 0);
        assert!((time_to_ns(2500) - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_timed_waits_advance_time() {
        let kernel = Kernel::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for (name, delay) in [("a", 3.0), ("b", 1.0), ("c", 2.0)] {
            let k = kernel.clone();
            let log = Rc::clone(&log);
            kernel.spawn(name, async move {
                k.wait_ns(delay).await;
                log.borrow_mut().push((name, k.now()));
            });
        }
        assert_eq!(kernel.run(None), RunOutcome::Starved);
        assert_eq!(*log.borrow(), vec![("b", 1000), ("c", 2000), ("a", 3000)]);
    }

    #[test]
    fn test_time_limit() {
        let kernel = Kernel::new();
        let k = kernel.clone();
        let reached = Rc::new(Cell::new(false));
        let flag = Rc::clone(&reached);
        kernel.spawn("late", async move {
            k.wait_ns(10.0).await;
            flag.set(true);
        });
        assert_eq!(kernel.run(Some(5000)), RunOutcome::TimeLimit);
        assert_eq!(kernel.now(), 5000);
        assert!(!reached.get());
    }

    #[test]
    fn test_stop() {
        let kernel = Kernel::new();
        let k = kernel.clone();
        kernel.spawn("forever", async move {
            loop {
                k.wait_ns(1.0).await;
                if k.now() == 4000 {
                    k.stop();
                }
            }
        });
        assert_eq!(kernel.run(None), RunOutcome::Stopped);
        assert_eq!(kernel.now(), 4000);
    }

    #[test]
    fn test_update_phase_is_seen_next_delta() {
        let kernel = Kernel::new();
        let value = Rc::new(Cell::new(0));
        let observed = Rc::new(RefCell::new(Vec::new()));

        let (k, v, o) = (kernel.clone(), Rc::clone(&value), Rc::clone(&observed));
        kernel.spawn("writer", async move {
            let v2 = Rc::clone(&v);
            k.request_update(move || v2.set(7));
            o.borrow_mut().push(v.get());
            k.wait(0).await;
            o.borrow_mut().push(v.get());
        });
        let _ = kernel.run(None);
        assert_eq!(*observed.borrow(), vec![0, 7]);
        assert_eq!(kernel.now(), 0);
        assert!(kernel.delta_count() >= 1);
    }

    #[test]
    fn test_spawn_from_process() {
        let kernel = Kernel::new();
        let hits = Rc::new(Cell::new(0));
        let (k, h) = (kernel.clone(), Rc::clone(&hits));
        kernel.spawn("parent", async move {
            let (k2, h2) = (k.clone(), Rc::clone(&h));
            k.spawn("child", async move {
                k2.wait_ns(1.0).await;
                h2.set(h2.get() + 1);
            });
            h.set(h.get() + 1);
        });
        let _ = kernel.run(None);
        assert_eq!(hits.get(), 2);
        assert_eq!(kernel.now(), 1000);
    }
}
