//! Bounded queue of dispatch-ready tasks
//!
//! Producers must reserve capacity before pushing. A reservation either
//! waits for free slots ([`PendingQueue::reserve`]) or fails straight away
//! ([`PendingQueue::try_reserve`]); once held, committing tasks never
//! suspends. This lets callers do all their waiting before they touch any
//! other shared state.
//!
//! The capacity is a backpressure valve. When timeouts split cubes faster
//! than workers drain the queue, submitters wait in `reserve` until a
//! worker pops a task, which delays that submitter's next acquisition.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};

use crate::checkbook::TaskId;
use crate::cube::Cube;
use crate::formula::FormulaView;

/// A task ready to hand to a worker
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub task_id: TaskId,
    pub cube: Cube,
    pub formula: Arc<FormulaView>,
    pub timeout: Duration,
}

/// Bounded FIFO of [`TaskDescriptor`]s
#[derive(Debug)]
pub struct PendingQueue {
    items: Mutex<VecDeque<TaskDescriptor>>,
    /// Free slots; permits are forgotten on reserve and restored on pop
    slots: Semaphore,
    ready: Notify,
    closed: AtomicBool,
    capacity: usize,
}

impl PendingQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            slots: Semaphore::new(capacity),
            ready: Notify::new(),
            closed: AtomicBool::new(false),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wait until `n` slots are free and hold them.
    ///
    /// Cancel-safe: dropping the future before it resolves reserves nothing.
    pub async fn reserve(&self, n: usize) -> Result<Reservation<'_>, QueueError> {
        let permits = self.permits_for(n)?;
        let permit = self
            .slots
            .acquire_many(permits)
            .await
            .map_err(|_| QueueError::Closed)?;
        permit.forget();
        Ok(Reservation { queue: self, slots: n })
    }

    /// Hold `n` slots only if they are free right now
    pub fn try_reserve(&self, n: usize) -> Result<Reservation<'_>, QueueError> {
        let permits = self.permits_for(n)?;
        match self.slots.try_acquire_many(permits) {
            Ok(permit) => {
                permit.forget();
                Ok(Reservation { queue: self, slots: n })
            }
            Err(tokio::sync::TryAcquireError::Closed) => Err(QueueError::Closed),
            Err(tokio::sync::TryAcquireError::NoPermits) => Err(QueueError::Full {
                requested: n,
                capacity: self.capacity,
            }),
        }
    }

    /// Pop the head of the queue without waiting
    pub fn try_pop(&self) -> Option<TaskDescriptor> {
        let task = self.lock().pop_front();
        if task.is_some() {
            self.slots.add_permits(1);
        }
        task
    }

    /// Pop the head of the queue, waiting at most `window` for one to appear.
    ///
    /// Returns `None` when the window elapses or the queue is closed.
    /// Cancel-safe: a dropped future never removes a task.
    pub async fn pop_within(&self, window: Duration) -> Option<TaskDescriptor> {
        let deadline = tokio::time::Instant::now() + window;

        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(task) = self.try_pop() {
                return Some(task);
            }
            if self.is_closed() {
                return None;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }

    /// Close the queue: pending and future reservations fail, waiting
    /// consumers wake up. Tasks already queued can still be popped.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.slots.close();
        self.ready.notify_waiters();
    }

    fn permits_for(&self, n: usize) -> Result<u32, QueueError> {
        if n > self.capacity {
            return Err(QueueError::Full {
                requested: n,
                capacity: self.capacity,
            });
        }
        u32::try_from(n).map_err(|_| QueueError::Full {
            requested: n,
            capacity: self.capacity,
        })
    }

    fn push_reserved(&self, tasks: Vec<TaskDescriptor>) {
        let count = tasks.len();
        self.lock().extend(tasks);
        for _ in 0..count {
            self.ready.notify_one();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<TaskDescriptor>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Slots held in a [`PendingQueue`]; unused slots are released on drop
#[derive(Debug)]
pub struct Reservation<'a> {
    queue: &'a PendingQueue,
    slots: usize,
}

impl Reservation<'_> {
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Push tasks into the reserved slots. Never suspends.
    pub fn commit(mut self, tasks: Vec<TaskDescriptor>) -> Result<(), QueueError> {
        if tasks.len() > self.slots {
            return Err(QueueError::OverCommitted {
                reserved: self.slots,
                pushed: tasks.len(),
            });
        }
        self.slots -= tasks.len();
        self.queue.push_reserved(tasks);
        Ok(())
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.slots > 0 {
            self.queue.slots.add_permits(self.slots);
        }
    }
}

/// Queue errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Pending queue full: {requested} slot(s) requested, capacity {capacity}")]
    Full { requested: usize, capacity: usize },

    #[error("Pending queue closed")]
    Closed,

    #[error("Reservation of {reserved} slot(s) cannot take {pushed} task(s)")]
    OverCommitted { reserved: usize, pushed: usize },
}
