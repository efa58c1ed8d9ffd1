//! Worker pull loop
//!
//! A worker repeatedly acquires a cube from the coordinator, counts the
//! models of the formula restricted to that cube with a [`ModelCounter`],
//! and reports either the count or a timeout. It backs off when the
//! coordinator has no work and stops once the coordinator goes away.

pub mod counter;

pub use counter::{parse_counter_output, CountOutcome, ExternalCounter, ModelCounter};

use std::path::PathBuf;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::coordinator::api::TaskResponse;
use crate::coordinator::client::{ClientError, CoordinatorClient};
use crate::formula::FormulaView;

// ============================================================================
// Configuration
// ============================================================================

/// Worker settings
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Counter binary
    pub counter_path: PathBuf,

    /// Extra counter arguments, placed before the input path
    pub counter_args: Vec<String>,

    /// Base delay after a no-work answer or a failed call
    pub backoff: Duration,

    /// Stop after this many tasks (None = until the coordinator is gone)
    pub max_tasks: Option<u64>,

    /// Give up after this many consecutive failed coordinator calls
    pub max_consecutive_errors: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            counter_path: PathBuf::from("ganak"),
            counter_args: Vec::new(),
            backoff: Duration::from_secs(2),
            max_tasks: None,
            max_consecutive_errors: 5,
        }
    }
}

impl WorkerConfig {
    pub fn with_counter(mut self, path: impl Into<PathBuf>) -> Self {
        self.counter_path = path.into();
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_tasks(mut self, max_tasks: Option<u64>) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    /// Build the counter this configuration describes
    pub fn external_counter(&self) -> ExternalCounter {
        ExternalCounter::new(&self.counter_path).with_args(self.counter_args.clone())
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Totals for one worker run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub tasks: u64,
    pub counted: u64,
    pub timed_out: u64,
    pub unrecognized: u64,
    pub rejected: u64,
    pub empty_polls: u64,
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The coordinator stopped answering, normally because the run finished
    CoordinatorGone,
    MaxTasks,
    Shutdown,
}

/// Pull/solve/submit loop over one coordinator
pub struct Worker<C: ModelCounter> {
    client: CoordinatorClient,
    counter: C,
    config: WorkerConfig,
}

impl<C: ModelCounter> Worker<C> {
    pub fn new(client: CoordinatorClient, counter: C, config: WorkerConfig) -> Self {
        Self {
            client,
            counter,
            config,
        }
    }

    /// Run until the coordinator goes away, `max_tasks` is reached or
    /// `shutdown` fires
    pub async fn run(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<(WorkerSummary, StopReason), WorkerError> {
        let worker_id = self.client.worker_id();
        let mut summary = WorkerSummary::default();
        let mut failures = 0u32;

        tracing::info!(worker_id, counter = self.counter.name(), "Worker started");

        let reason = loop {
            if self.config.max_tasks.is_some_and(|max| summary.tasks >= max) {
                break StopReason::MaxTasks;
            }

            let acquired = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break StopReason::Shutdown,
                acquired = self.client.acquire_task() => acquired,
            };

            let task = match acquired {
                Ok(task) => {
                    failures = 0;
                    task
                }
                Err(ClientError::CoordinatorUnavailable) => break StopReason::CoordinatorGone,
                Err(e) => {
                    failures += 1;
                    tracing::warn!(worker_id, error = %e, failures, "Task acquisition failed");
                    if failures >= self.config.max_consecutive_errors {
                        return Err(WorkerError::Client(e));
                    }
                    if self.pause(shutdown).await {
                        break StopReason::Shutdown;
                    }
                    continue;
                }
            };

            if task.is_no_work() {
                summary.empty_polls += 1;
                tracing::debug!(worker_id, "No work available; backing off");
                if self.pause(shutdown).await {
                    break StopReason::Shutdown;
                }
                continue;
            }

            summary.tasks += 1;
            match self.process(&task, &mut summary).await {
                Ok(()) => {}
                Err(WorkerError::Client(ClientError::CoordinatorUnavailable)) => {
                    break StopReason::CoordinatorGone
                }
                Err(e @ WorkerError::Client(_)) => {
                    tracing::warn!(worker_id, task_id = task.task_id, error = %e, "Submission failed");
                }
                Err(e) => return Err(e),
            }
        };

        tracing::info!(
            worker_id,
            tasks = summary.tasks,
            counted = summary.counted,
            timed_out = summary.timed_out,
            reason = ?reason,
            "Worker stopped"
        );
        Ok((summary, reason))
    }

    /// Count one task and report the outcome
    async fn process(
        &self,
        task: &TaskResponse,
        summary: &mut WorkerSummary,
    ) -> Result<(), WorkerError> {
        let worker_id = self.client.worker_id();
        let dimacs = render_task(task);
        let budget = Duration::from_secs(u64::try_from(task.timeout_sec.max(1)).unwrap_or(1));

        tracing::info!(
            worker_id,
            task_id = task.task_id,
            cube = ?task.literals,
            budget_secs = budget.as_secs(),
            "Counting cube"
        );

        let started = Instant::now();
        let outcome = self.counter.count(&dimacs, budget).await;
        let elapsed = started.elapsed();

        let submitted = match &outcome {
            Ok(CountOutcome::Count(count)) => {
                summary.counted += 1;
                tracing::info!(worker_id, task_id = task.task_id, count = %count, "Cube counted");
                self.client.submit_count(task.task_id, count.as_str(), elapsed).await
            }
            Ok(CountOutcome::TimedOut) => {
                summary.timed_out += 1;
                tracing::info!(worker_id, task_id = task.task_id, "Counter timed out");
                self.client.submit_timeout(task.task_id, elapsed).await
            }
            Ok(CountOutcome::Unrecognized(raw)) => {
                summary.unrecognized += 1;
                tracing::warn!(worker_id, task_id = task.task_id, raw = %raw, "Counter output not understood");
                self.client.submit_count(task.task_id, raw.as_str(), elapsed).await
            }
            Err(e) => {
                // Hand the task back as malformed so the coordinator's policy
                // decides its fate instead of it staying outstanding forever
                tracing::error!(worker_id, task_id = task.task_id, error = %e, "Counter failed");
                self.client.submit_count(task.task_id, e.to_string(), elapsed).await
            }
        };

        match submitted {
            Ok(ack) => {
                tracing::debug!(
                    worker_id,
                    task_id = task.task_id,
                    remaining = ack.remaining,
                    "Result accepted"
                );
            }
            Err(e) if e.is_unknown_task() => {
                summary.rejected += 1;
                tracing::warn!(worker_id, task_id = task.task_id, "Coordinator no longer knows this task");
            }
            Err(e) => return Err(WorkerError::Client(e)),
        }

        // A counter that cannot run at all will fail every task
        outcome.map(|_| ())
    }

    /// Sleep for the backoff plus jitter; true if shutdown fired meanwhile
    async fn pause(&self, shutdown: &CancellationToken) -> bool {
        let base = self.config.backoff;
        let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 4);
        tokio::select! {
            _ = shutdown.cancelled() => true,
            _ = tokio::time::sleep(base + Duration::from_millis(jitter_ms)) => false,
        }
    }
}

/// Formula text for a task: the shared body plus the cube as unit clauses
pub fn render_task(task: &TaskResponse) -> String {
    let formula = FormulaView {
        num_vars: task.num_vars,
        num_clauses: task.num_clauses,
        body: task.formula_body.clone(),
    };
    formula.with_cube(&task.literals)
}

/// Default worker id: host-independent and unique per process
pub fn default_worker_id() -> String {
    format!("worker-{}", uuid::Uuid::new_v4().simple())
}

// ============================================================================
// Worker Errors
// ============================================================================

/// Worker errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkerError {
    /// Counter binary could not be started
    #[error("Failed to start counter {}: {reason}", program.display())]
    CounterSpawn { program: PathBuf, reason: String },

    /// Scratch file or process I/O failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Coordinator call failed
    #[error("Coordinator error: {0}")]
    Client(#[from] ClientError),
}

// ============================================================================
// Tests
// ============================================================================
