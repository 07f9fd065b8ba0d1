//! Single-slot handshake between pipeline stages.
//!
//! A [`SubmoduleSocket`] connects a producer stage to the process of the next
//! stage. The producer hands over one payload with [`SubmoduleSocket::start`];
//! the consumer picks it up with [`SubmoduleSocket::wait_until_start`] and
//! releases the slot with [`SubmoduleSocket::finish`]. While the slot is busy a
//! producer must suspend in [`SubmoduleSocket::wait_until_finish_if_busy`], so
//! back-pressure travels upstream through blocking waits and no stage ever
//! queues more than one payload.

use std::cell::{Cell, RefCell};
use std::fmt;

use crate::common::bits::div_ceil;
use crate::sim::{Event, Kernel};

/// One-payload slot between two pipeline stages.
pub struct SubmoduleSocket<T> {
    name: String,
    payload: RefCell<Option<T>>,
    started: Cell<bool>,
    busy: Cell<bool>,
    start_exec: Event,
    finish_exec: Event,
}

impl<T> fmt::Debug for SubmoduleSocket<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmoduleSocket")
            .field("name", &self.name)
            .field("busy", &self.busy.get())
            .field("started", &self.started.get())
            .finish_non_exhaustive()
    }
}

impl<T: Clone> SubmoduleSocket<T> {
    /// Creates an idle socket.
    pub fn new(kernel: &Kernel, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            start_exec: kernel.event(format!("{name}.start")),
            finish_exec: kernel.event(format!("{name}.finish")),
            name,
            payload: RefCell::new(None),
            started: Cell::new(false),
            busy: Cell::new(false),
        }
    }

    /// Whether the slot holds a payload that has not been finished.
    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    /// Hands `payload` to the consumer.
    ///
    /// Returns the payload back if the slot is still busy.
    pub fn try_start(&self, payload: T) -> Result<(), T> {
        if self.busy.get() {
            return Err(payload);
        }
        *self.payload.borrow_mut() = Some(payload);
        self.busy.set(true);
        self.started.set(true);
        self.start_exec.notify();
        Ok(())
    }

    /// Waits for the slot to free up, then hands `payload` to the consumer.
    pub async fn start(&self, mut payload: T) {
        loop {
            self.wait_until_finish_if_busy().await;
            match self.try_start(payload) {
                Ok(()) => return,
                Err(rejected) => payload = rejected,
            }
        }
    }

    /// Suspends the consumer until a payload arrives and returns it.
    pub async fn wait_until_start(&self) -> T {
        loop {
            if self.started.replace(false) {
                if let Some(payload) = self.payload.borrow().clone() {
                    return payload;
                }
            }
            self.start_exec.wait().await;
        }
    }

    /// Suspends the producer until the slot is free.
    pub async fn wait_until_finish_if_busy(&self) {
        while self.busy.get() {
            self.finish_exec.wait().await;
        }
    }

    /// Payload currently in the slot.
    pub fn payload(&self) -> Option<T> {
        self.payload.borrow().clone()
    }

    /// Releases the slot and wakes a waiting producer.
    pub fn finish(&self) {
        self.busy.set(false);
        self.finish_exec.notify();
    }
}

/// Position of one batch within its instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchInfo {
    /// Zero-based batch number.
    pub batch_num: usize,
    /// Elements in this batch.
    pub batch_len: usize,
    /// Whether this is the first batch.
    pub first_batch: bool,
    /// Whether this is the last batch.
    pub last_batch: bool,
}

impl BatchInfo {
    /// Splits `total_len` elements into batches of at most `batch_max`.
    ///
    /// At least one batch is produced, even for an empty vector.
    pub fn split(total_len: usize, batch_max: usize) -> Vec<Self> {
        let batch_max = batch_max.max(1);
        let count = div_ceil(total_len, batch_max).max(1);
        (0..count)
            .map(|batch_num| Self {
                batch_num,
                batch_len: if batch_num + 1 == count {
                    total_len.saturating_sub(batch_num * batch_max)
                } else {
                    batch_max
                },
                first_batch: batch_num == 0,
                last_batch: batch_num + 1 == count,
            })
            .collect()
    }

    /// One single-element batch per bit plane; `count` may be zero.
    pub fn bit_planes(count: usize) -> Vec<Self> {
        (0..count)
            .map(|batch_num| Self {
                batch_num,
                batch_len: 1,
                first_batch: batch_num == 0,
                last_batch: batch_num + 1 == count,
            })
            .collect()
    }
}
