//! Task lifecycle engine
//!
//! [`Coordinator`] owns every piece of shared run state and exposes the two
//! worker-facing operations plus the completion wait:
//!
//! - [`Coordinator::acquire_task`] pops one ready task, or answers "no work"
//!   after the poll window.
//! - [`Coordinator::submit_result`] resolves a task and either counts it,
//!   splits it (timeout), discards it or requeues it (malformed count).
//! - [`Coordinator::wait_for_completion`] resolves once no work remains.
//!
//! Every outstanding task has exactly one checkbook entry, whether it is
//! still queued or already with a worker, so the outstanding-work counter
//! always equals the checkbook size between operations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::aggregator::{parse_count, Aggregator};
use crate::checkbook::{Checkbook, CheckbookEntry, TaskId};
use crate::cube::{initial_partition, split_on, Cube};
use crate::formula::FormulaView;
use crate::metrics::CoordinatorMetrics;
use crate::queue::{PendingQueue, Reservation, TaskDescriptor};
use crate::tracker::{ActiveWorkTracker, Finished};

use super::config::{CoordinatorConfig, MalformedCountPolicy};
use super::error::{CoordinatorError, CoordinatorResult};

// ============================================================================
// Operation Types
// ============================================================================

/// Answer to a task acquisition
#[derive(Debug, Clone)]
pub enum Acquired {
    /// A task now owned by the caller until it reports back
    Task(TaskDescriptor),

    /// Nothing became ready within the poll window; retry after a backoff
    NoWork,
}

impl Acquired {
    pub fn task(&self) -> Option<&TaskDescriptor> {
        match self {
            Self::Task(task) => Some(task),
            Self::NoWork => None,
        }
    }
}

/// What the worker reports for a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The worker could not finish within the task's budget
    TimedOut,

    /// The worker finished; `count` is the raw decimal payload
    Counted { count: String },
}

/// One result submission
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub task_id: TaskId,
    pub worker_id: String,
    pub outcome: TaskOutcome,
    /// Worker-reported solve time, informational only
    pub duration_secs: Option<f64>,
}

impl SubmitRequest {
    pub fn counted(task_id: TaskId, worker_id: impl Into<String>, count: impl Into<String>) -> Self {
        Self {
            task_id,
            worker_id: worker_id.into(),
            outcome: TaskOutcome::Counted {
                count: count.into(),
            },
            duration_secs: None,
        }
    }

    pub fn timed_out(task_id: TaskId, worker_id: impl Into<String>) -> Self {
        Self {
            task_id,
            worker_id: worker_id.into(),
            outcome: TaskOutcome::TimedOut,
            duration_secs: None,
        }
    }
}

/// How a submitted task was resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// Count added to the running total
    Counted { count: String },

    /// Timed out; replaced by two child tasks
    Split { children: Vec<TaskId> },

    /// Count could not be parsed; contribution dropped
    Discarded { raw: String },

    /// Same cube re-registered under a new id
    Requeued { task_id: TaskId },
}

/// Acknowledgement of an accepted submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitAck {
    pub task_id: TaskId,
    pub resolution: Resolution,
    /// Outstanding tasks after this submission
    pub remaining: u64,
    /// Whether this submission finished the run
    pub completed: bool,
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Default)]
struct OutcomeCounters {
    dispatched: AtomicU64,
    empty_polls: AtomicU64,
    counted: AtomicU64,
    split: AtomicU64,
    discarded: AtomicU64,
    requeued: AtomicU64,
    unknown: AtomicU64,
}

impl OutcomeCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Snapshot of coordinator state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorStats {
    pub active: u64,
    pub outstanding: usize,
    pub queued: usize,
    pub issued: TaskId,
    pub dispatched: u64,
    pub empty_polls: u64,
    pub counted: u64,
    pub split: u64,
    pub discarded: u64,
    pub requeued: u64,
    pub unknown_submissions: u64,
    /// Running total in decimal
    pub total: String,
    /// False once any contribution has been discarded
    pub exact: bool,
    pub complete: bool,
    pub started_at: DateTime<Utc>,
}

impl CoordinatorStats {
    /// Format as display string
    pub fn display(&self) -> String {
        format!(
            "Coordinator Stats\n\
             {:-<30}\n\
             Active: {}\n\
             Queued: {}\n\
             Tasks Issued: {}\n\
             - Counted: {}\n\
             - Split: {}\n\
             - Requeued: {}\n\
             - Discarded: {}\n\
             Unknown Submissions: {}\n\
             Running Total: {}{}",
            "",
            self.active,
            self.queued,
            self.issued,
            self.counted,
            self.split,
            self.requeued,
            self.discarded,
            self.unknown_submissions,
            self.total,
            if self.exact { "" } else { " (inexact)" }
        )
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Shared state of one counting run
#[derive(Debug)]
pub struct Coordinator {
    config: CoordinatorConfig,
    formula: Arc<FormulaView>,
    checkbook: Checkbook,
    queue: PendingQueue,
    aggregator: Aggregator,
    tracker: ActiveWorkTracker,
    counters: OutcomeCounters,
    metrics: CoordinatorMetrics,
    started_at: DateTime<Utc>,
}

impl Coordinator {
    /// Create a coordinator seeded with the initial partition.
    ///
    /// The partition branches on the first `initial_split_depth` variables,
    /// capped at the formula's variable count.
    pub fn new(config: CoordinatorConfig, formula: FormulaView) -> CoordinatorResult<Self> {
        let depth = config
            .initial_split_depth
            .min(u32::try_from(formula.num_vars).unwrap_or(0));
        Self::with_cubes(config, formula, initial_partition(depth))
    }

    /// Create a coordinator seeded with explicit starting cubes.
    ///
    /// The cubes must be pairwise disjoint for the total to be exact. An
    /// empty list completes the run immediately.
    pub fn with_cubes(
        config: CoordinatorConfig,
        formula: FormulaView,
        cubes: Vec<Cube>,
    ) -> CoordinatorResult<Self> {
        config.validate()?;

        let coordinator = Self {
            queue: PendingQueue::new(config.queue_capacity),
            formula: Arc::new(formula),
            checkbook: Checkbook::new(),
            aggregator: Aggregator::new(),
            tracker: ActiveWorkTracker::new(),
            counters: OutcomeCounters::default(),
            metrics: CoordinatorMetrics::new()?,
            started_at: Utc::now(),
            config,
        };

        // No consumer exists yet, so waiting for room would never end
        let reservation = coordinator.queue.try_reserve(cubes.len())?;
        coordinator.tracker.add(cubes.len() as u64);
        let ids = coordinator.register(reservation, cubes)?;

        tracing::info!(
            initial_tasks = ids.len(),
            num_vars = coordinator.formula.num_vars,
            num_clauses = coordinator.formula.num_clauses,
            "Initial cubes queued"
        );

        if coordinator.tracker.complete_if_idle() {
            tracing::info!("No initial cubes; run is trivially complete");
        }
        coordinator.refresh_load();

        Ok(coordinator)
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn formula(&self) -> &Arc<FormulaView> {
        &self.formula
    }

    pub fn metrics(&self) -> &CoordinatorMetrics {
        &self.metrics
    }

    // ------------------------------------------------------------------------
    // Task acquisition
    // ------------------------------------------------------------------------

    /// Hand one ready task to `worker_id`.
    ///
    /// Waits up to the configured poll window for work to appear, then
    /// answers [`Acquired::NoWork`]. If `cancel` fires first the call returns
    /// [`CoordinatorError::Cancelled`] and no task leaves the queue. Dropping
    /// the future is equally safe.
    pub async fn acquire_task(
        &self,
        worker_id: &str,
        cancel: &CancellationToken,
    ) -> CoordinatorResult<Acquired> {
        tracing::debug!(worker_id, "Worker requested a task");

        let deadline = tokio::time::Instant::now() + self.config.poll_window();
        let popped = loop {
            let window = deadline.saturating_duration_since(tokio::time::Instant::now());
            let popped = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CoordinatorError::Cancelled),
                popped = self.queue.pop_within(window) => popped,
            };
            match popped {
                // Resolved while still queued (a result arrived for it early)
                Some(task) if !self.checkbook.contains(task.task_id) => {
                    tracing::debug!(task_id = task.task_id, "Skipping already resolved task");
                }
                other => break other,
            }
        };

        match popped {
            Some(task) => {
                OutcomeCounters::bump(&self.counters.dispatched);
                self.metrics.record_dispatch(worker_id);
                self.refresh_load();
                tracing::info!(
                    task_id = task.task_id,
                    worker_id,
                    cube = %task.cube,
                    "Task assigned"
                );
                Ok(Acquired::Task(task))
            }
            None => {
                OutcomeCounters::bump(&self.counters.empty_polls);
                self.metrics.record_empty_poll();
                Ok(Acquired::NoWork)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Result submission
    // ------------------------------------------------------------------------

    /// Resolve a submitted result.
    ///
    /// Any queue space the resolution needs is reserved before the task is
    /// looked up; that wait is the only suspension point, so cancelling the
    /// call either changes nothing or lets it finish as a unit.
    pub async fn submit_result(&self, request: SubmitRequest) -> CoordinatorResult<SubmitAck> {
        let SubmitRequest {
            task_id,
            worker_id,
            outcome,
            duration_secs,
        } = request;

        if !self.checkbook.contains(task_id) {
            return Err(self.unknown_task(task_id, &worker_id));
        }
        if let Some(secs) = duration_secs {
            self.metrics.observe_solve_duration(secs);
        }

        match outcome {
            TaskOutcome::TimedOut => {
                let reservation = self.queue.reserve(2).await?;
                let cube = self
                    .checkbook
                    .resolve(task_id)
                    .ok_or_else(|| self.unknown_task(task_id, &worker_id))?;
                self.resolve_timeout(task_id, &worker_id, cube, reservation)
            }
            TaskOutcome::Counted { count } => match parse_count(&count) {
                Ok(value) => {
                    let cube = self
                        .checkbook
                        .resolve(task_id)
                        .ok_or_else(|| self.unknown_task(task_id, &worker_id))?;
                    self.aggregator.add(&value);
                    OutcomeCounters::bump(&self.counters.counted);
                    self.metrics.record_counted();
                    tracing::info!(
                        task_id,
                        worker_id = %worker_id,
                        cube = %cube,
                        count = %value,
                        "Cube counted"
                    );
                    Ok(self.finish(task_id, Resolution::Counted { count: value.to_string() }))
                }
                Err(malformed) => {
                    self.resolve_malformed(task_id, &worker_id, malformed.raw).await
                }
            },
        }
    }

    fn resolve_timeout(
        &self,
        task_id: TaskId,
        worker_id: &str,
        cube: Cube,
        reservation: Reservation<'_>,
    ) -> CoordinatorResult<SubmitAck> {
        let num_vars = u32::try_from(self.formula.num_vars).unwrap_or(0);

        let Some(var) = cube.branch_variable(num_vars) else {
            // Every variable is already assigned; splitting would invent one
            tracing::warn!(
                task_id,
                worker_id,
                cube = %cube,
                "Fully assigned cube timed out; requeueing unchanged"
            );
            let ids = self.register(reservation, vec![cube])?;
            OutcomeCounters::bump(&self.counters.requeued);
            self.metrics.record_requeued();
            return Ok(self.ack_unfinished(task_id, Resolution::Requeued { task_id: ids[0] }));
        };

        let (positive, negative) = split_on(&cube, var);
        tracing::info!(
            task_id,
            worker_id,
            cube = %cube,
            branch = var,
            "Worker timed out; splitting cube"
        );

        // One outstanding unit becomes two
        self.tracker.add(1);
        let children = self.register(reservation, vec![positive, negative])?;

        OutcomeCounters::bump(&self.counters.split);
        self.metrics.record_split();
        Ok(self.ack_unfinished(task_id, Resolution::Split { children }))
    }

    async fn resolve_malformed(
        &self,
        task_id: TaskId,
        worker_id: &str,
        raw: String,
    ) -> CoordinatorResult<SubmitAck> {
        match self.config.malformed_count_policy {
            MalformedCountPolicy::Discard => {
                let cube = self
                    .checkbook
                    .resolve(task_id)
                    .ok_or_else(|| self.unknown_task(task_id, worker_id))?;
                OutcomeCounters::bump(&self.counters.discarded);
                self.metrics.record_discarded();
                tracing::warn!(
                    task_id,
                    worker_id,
                    cube = %cube,
                    raw = %raw,
                    "Malformed count discarded; final total will be inexact"
                );
                Ok(self.finish(task_id, Resolution::Discarded { raw }))
            }
            MalformedCountPolicy::Requeue => {
                let reservation = self.queue.reserve(1).await?;
                let cube = self
                    .checkbook
                    .resolve(task_id)
                    .ok_or_else(|| self.unknown_task(task_id, worker_id))?;
                tracing::warn!(
                    task_id,
                    worker_id,
                    cube = %cube,
                    raw = %raw,
                    "Malformed count; requeueing cube"
                );
                let ids = self.register(reservation, vec![cube])?;
                OutcomeCounters::bump(&self.counters.requeued);
                self.metrics.record_requeued();
                Ok(self.ack_unfinished(task_id, Resolution::Requeued { task_id: ids[0] }))
            }
        }
    }

    /// Register cubes in the checkbook and push them into reserved slots
    fn register(
        &self,
        reservation: Reservation<'_>,
        cubes: Vec<Cube>,
    ) -> CoordinatorResult<Vec<TaskId>> {
        let timeout = self.config.task_timeout();
        let tasks: Vec<TaskDescriptor> = cubes
            .into_iter()
            .map(|cube| TaskDescriptor {
                task_id: self.checkbook.register(cube.clone()),
                cube,
                formula: Arc::clone(&self.formula),
                timeout,
            })
            .collect();
        let ids = tasks.iter().map(|t| t.task_id).collect();

        reservation.commit(tasks)?;
        Ok(ids)
    }

    /// Retire one outstanding task
    fn finish(&self, task_id: TaskId, resolution: Resolution) -> SubmitAck {
        let (remaining, completed) = match self.tracker.finish_one() {
            Finished::Remaining(n) => (n, false),
            Finished::Completed => {
                tracing::info!(total = %self.aggregator.total(), "All tasks resolved");
                (0, true)
            }
            Finished::Underflow => {
                tracing::error!(task_id, "Outstanding count already zero when finishing a task");
                (0, false)
            }
        };
        tracing::debug!(task_id, remaining, "Task done");
        self.refresh_load();

        SubmitAck {
            task_id,
            resolution,
            remaining,
            completed,
        }
    }

    fn ack_unfinished(&self, task_id: TaskId, resolution: Resolution) -> SubmitAck {
        self.refresh_load();
        SubmitAck {
            task_id,
            resolution,
            remaining: self.tracker.active(),
            completed: false,
        }
    }

    fn unknown_task(&self, task_id: TaskId, worker_id: &str) -> CoordinatorError {
        OutcomeCounters::bump(&self.counters.unknown);
        self.metrics.record_unknown();
        tracing::warn!(task_id, worker_id, "Result for unknown task ignored");
        CoordinatorError::UnknownTask { task_id }
    }

    fn refresh_load(&self) {
        self.metrics.set_load(self.tracker.active(), self.queue.len());
    }

    // ------------------------------------------------------------------------
    // Completion and inspection
    // ------------------------------------------------------------------------

    /// Wait until no work remains, then return the final total
    pub async fn wait_for_completion(&self) -> BigUint {
        self.tracker.wait().await;
        self.aggregator.total()
    }

    pub fn is_complete(&self) -> bool {
        self.tracker.is_complete()
    }

    /// Running total so far
    pub fn total(&self) -> BigUint {
        self.aggregator.total()
    }

    /// Whether every resolved task contributed to the total
    pub fn is_exact(&self) -> bool {
        OutcomeCounters::get(&self.counters.discarded) == 0
    }

    /// Outstanding leaf tasks (queued or dispatched)
    pub fn active(&self) -> u64 {
        self.tracker.active()
    }

    /// Checkbook entries
    pub fn outstanding(&self) -> usize {
        self.checkbook.len()
    }

    /// Tasks waiting in the queue
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn outstanding_tasks(&self) -> Vec<CheckbookEntry> {
        self.checkbook.snapshot()
    }

    /// Stop handing out work; pending acquisitions answer "no work"
    pub fn shutdown(&self) {
        self.queue.close();
    }

    pub fn stats(&self) -> CoordinatorStats {
        let c = &self.counters;
        CoordinatorStats {
            active: self.tracker.active(),
            outstanding: self.checkbook.len(),
            queued: self.queue.len(),
            issued: self.checkbook.issued(),
            dispatched: OutcomeCounters::get(&c.dispatched),
            empty_polls: OutcomeCounters::get(&c.empty_polls),
            counted: OutcomeCounters::get(&c.counted),
            split: OutcomeCounters::get(&c.split),
            discarded: OutcomeCounters::get(&c.discarded),
            requeued: OutcomeCounters::get(&c.requeued),
            unknown_submissions: OutcomeCounters::get(&c.unknown),
            total: self.aggregator.total().to_string(),
            exact: self.is_exact(),
            complete: self.tracker.is_complete(),
            started_at: self.started_at,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
