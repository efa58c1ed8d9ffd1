//! Outstanding-work counter and completion signal
//!
//! The run is finished when the number of outstanding leaf tasks drops to
//! zero. The decrement that performs the 1 -> 0 transition is the only one
//! allowed to fire the completion signal, which makes the check-and-signal
//! a single atomic step no matter how many submissions race.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

/// One-shot, multi-writer completion notification.
///
/// Firing never blocks and only the first call has an effect. Waiting after
/// the signal has fired returns immediately.
#[derive(Debug)]
pub struct CompletionSignal {
    tx: watch::Sender<bool>,
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Fire the signal. Returns `true` only for the call that fired it.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|done| {
            if *done {
                false
            } else {
                *done = true;
                true
            }
        })
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal has fired
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|done| *done).await;
    }
}

/// Result of finishing one unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finished {
    /// Work remains
    Remaining(u64),

    /// This call took the count to zero and fired completion
    Completed,

    /// The counter was already zero; nothing changed
    Underflow,
}

/// Count of outstanding leaf tasks (queued or dispatched)
#[derive(Debug)]
pub struct ActiveWorkTracker {
    active: AtomicU64,
    done: CompletionSignal,
}

impl ActiveWorkTracker {
    pub fn new() -> Self {
        Self {
            active: AtomicU64::new(0),
            done: CompletionSignal::new(),
        }
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Acquire)
    }

    /// Account for `n` new outstanding tasks
    pub fn add(&self, n: u64) -> u64 {
        self.active.fetch_add(n, Ordering::AcqRel) + n
    }

    /// Account for one resolved task, firing completion on the last one.
    ///
    /// Saturates at zero instead of wrapping.
    pub fn finish_one(&self) -> Finished {
        match self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(1) => {
                self.done.fire();
                Finished::Completed
            }
            Ok(prev) => Finished::Remaining(prev - 1),
            Err(_) => Finished::Underflow,
        }
    }

    /// Fire completion if nothing is outstanding; used once the initial load
    /// is in place, in case it was empty.
    pub fn complete_if_idle(&self) -> bool {
        self.active() == 0 && self.done.fire()
    }

    pub fn is_complete(&self) -> bool {
        self.done.is_fired()
    }

    /// Wait for the outstanding count to reach zero
    pub async fn wait(&self) {
        self.done.wait().await
    }
}

impl Default for ActiveWorkTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_signal_fires_once() {
        let signal = CompletionSignal::new();
        assert!(!signal.is_fired());
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_fired());
    }

    #[tokio::test]
    async fn test_wait_after_fire_returns() {
        let signal = CompletionSignal::new();
        signal.fire();
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .expect("wait should not block after fire");
    }

    #[tokio::test]
    async fn test_wait_wakes_on_fire() {
        let tracker = Arc::new(ActiveWorkTracker::new());
        tracker.add(1);

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        assert_eq!(tracker.finish_one(), Finished::Completed);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_finish_counts_down() {
        let tracker = ActiveWorkTracker::new();
        assert_eq!(tracker.add(3), 3);

        assert_eq!(tracker.finish_one(), Finished::Remaining(2));
        assert_eq!(tracker.finish_one(), Finished::Remaining(1));
        assert!(!tracker.is_complete());
        assert_eq!(tracker.finish_one(), Finished::Completed);
        assert!(tracker.is_complete());
    }

    #[test]
    fn test_underflow_is_refused() {
        let tracker = ActiveWorkTracker::new();
        assert_eq!(tracker.finish_one(), Finished::Underflow);
        assert_eq!(tracker.active(), 0);
        assert!(!tracker.is_complete());
    }

    #[test]
    fn test_complete_if_idle() {
        let tracker = ActiveWorkTracker::new();
        assert!(tracker.complete_if_idle());
        assert!(!tracker.complete_if_idle());

        let busy = ActiveWorkTracker::new();
        busy.add(1);
        assert!(!busy.complete_if_idle());
    }

    #[test]
    fn test_concurrent_finish_completes_exactly_once() {
        for _ in 0..50 {
            let tracker = Arc::new(ActiveWorkTracker::new());
            tracker.add(64);
            let completions = Arc::new(AtomicUsize::new(0));

            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let tracker = tracker.clone();
                    let completions = completions.clone();
                    std::thread::spawn(move || {
                        for _ in 0..8 {
                            if tracker.finish_one() == Finished::Completed {
                                completions.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            assert_eq!(completions.load(Ordering::SeqCst), 1);
            assert_eq!(tracker.active(), 0);
        }
    }
}
