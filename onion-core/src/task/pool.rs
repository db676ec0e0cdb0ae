use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};

use crate::error::{OnionError, Result};

struct Slots {
    in_flight: AtomicUsize,
    capacity: usize,
}

/// One in-flight task. Dropping it frees the slot, however the task ended.
pub struct SlotGuard {
    slots: Arc<Slots>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slots.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Fixed-size worker threads plus an admission counter. Work beyond
/// `capacity` concurrent tasks is refused, never queued.
pub struct WorkerPool {
    threads: rayon::ThreadPool,
    slots: Arc<Slots>,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = capacity.max(1);
        let threads = rayon::ThreadPoolBuilder::new()
            .num_threads(capacity)
            .thread_name(|i| format!("onion-worker-{i}"))
            .build()
            .map_err(std::io::Error::other)?;
        Ok(Self {
            threads,
            slots: Arc::new(Slots {
                in_flight: AtomicUsize::new(0),
                capacity,
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.slots.in_flight.load(Ordering::Acquire)
    }

    pub fn try_acquire(&self) -> Result<SlotGuard> {
        let cap = self.slots.capacity;
        self.slots
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < cap).then_some(n + 1))
            .map_err(|_| OnionError::Busy { capacity: cap })?;
        Ok(SlotGuard {
            slots: Arc::clone(&self.slots),
        })
    }

    /// Runs `job` on a worker. The slot is released before the result is
    /// published, so a caller woken by the handle can submit again at once.
    pub fn spawn<T, F>(&self, slot: SlotGuard, job: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        self.threads.spawn(move || {
            let out = job();
            drop(slot);
            let _ = tx.send(out);
        });
        TaskHandle { rx }
    }
}

pub struct TaskHandle<T> {
    rx: Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the job finishes. `None` if it never reported back.
    pub fn wait(self) -> Option<T> {
        self.rx.recv().ok()
    }
}
