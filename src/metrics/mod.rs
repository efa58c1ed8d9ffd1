//! Prometheus metrics for the coordinator
//!
//! Tracks task outcomes so that lossy resolutions (malformed counts) are
//! visible separately from successful ones, plus dispatch volume per worker
//! and the current amount of outstanding work.
//!
//! Each [`CoordinatorMetrics`] owns its own registry, so several
//! coordinators (for example in tests) never collide on metric names.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Metric handles for one coordinator
#[derive(Clone)]
pub struct CoordinatorMetrics {
    registry: Registry,
    tasks_dispatched: IntCounterVec,
    tasks_counted: IntCounter,
    tasks_split: IntCounter,
    tasks_discarded: IntCounter,
    tasks_requeued: IntCounter,
    unknown_submissions: IntCounter,
    empty_polls: IntCounter,
    active_tasks: IntGauge,
    queued_tasks: IntGauge,
    solve_duration: Histogram,
}

impl CoordinatorMetrics {
    /// Create and register all metrics in a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("hydrasat".to_string()), None)?;

        let tasks_dispatched = IntCounterVec::new(
            Opts::new("tasks_dispatched_total", "Tasks handed to workers"),
            &["worker"],
        )?;
        let tasks_counted = IntCounter::new(
            "tasks_counted_total",
            "Tasks whose count was added to the running total",
        )?;
        let tasks_split = IntCounter::new(
            "tasks_split_total",
            "Timed-out tasks replaced by two child cubes",
        )?;
        let tasks_discarded = IntCounter::new(
            "tasks_discarded_total",
            "Tasks dropped because of a malformed count; the total is inexact when non-zero",
        )?;
        let tasks_requeued = IntCounter::new(
            "tasks_requeued_total",
            "Tasks re-registered unchanged under a fresh id",
        )?;
        let unknown_submissions = IntCounter::new(
            "unknown_submissions_total",
            "Results submitted for task ids that were not outstanding",
        )?;
        let empty_polls = IntCounter::new(
            "empty_polls_total",
            "Acquire calls answered with the no-work sentinel",
        )?;
        let active_tasks = IntGauge::new("active_tasks", "Outstanding leaf tasks")?;
        let queued_tasks = IntGauge::new("queued_tasks", "Tasks waiting in the pending queue")?;
        let solve_duration = Histogram::with_opts(
            HistogramOpts::new(
                "solve_duration_seconds",
                "Worker-reported solve time per submission",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        )?;

        registry.register(Box::new(tasks_dispatched.clone()))?;
        registry.register(Box::new(tasks_counted.clone()))?;
        registry.register(Box::new(tasks_split.clone()))?;
        registry.register(Box::new(tasks_discarded.clone()))?;
        registry.register(Box::new(tasks_requeued.clone()))?;
        registry.register(Box::new(unknown_submissions.clone()))?;
        registry.register(Box::new(empty_polls.clone()))?;
        registry.register(Box::new(active_tasks.clone()))?;
        registry.register(Box::new(queued_tasks.clone()))?;
        registry.register(Box::new(solve_duration.clone()))?;

        Ok(Self {
            registry,
            tasks_dispatched,
            tasks_counted,
            tasks_split,
            tasks_discarded,
            tasks_requeued,
            unknown_submissions,
            empty_polls,
            active_tasks,
            queued_tasks,
            solve_duration,
        })
    }

    pub fn record_dispatch(&self, worker: &str) {
        self.tasks_dispatched.with_label_values(&[worker]).inc();
    }

    pub fn record_empty_poll(&self) {
        self.empty_polls.inc();
    }

    pub fn record_counted(&self) {
        self.tasks_counted.inc();
    }

    pub fn record_split(&self) {
        self.tasks_split.inc();
    }

    pub fn record_discarded(&self) {
        self.tasks_discarded.inc();
    }

    pub fn record_requeued(&self) {
        self.tasks_requeued.inc();
    }

    pub fn record_unknown(&self) {
        self.unknown_submissions.inc();
    }

    pub fn observe_solve_duration(&self, secs: f64) {
        if secs.is_finite() && secs >= 0.0 {
            self.solve_duration.observe(secs);
        }
    }

    /// Refresh the outstanding-work gauges
    pub fn set_load(&self, active: u64, queued: usize) {
        self.active_tasks.set(i64::try_from(active).unwrap_or(i64::MAX));
        self.queued_tasks.set(i64::try_from(queued).unwrap_or(i64::MAX));
    }

    /// Encode all metrics in Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl std::fmt::Debug for CoordinatorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_independent_registries() {
        let a = CoordinatorMetrics::new();
        let b = CoordinatorMetrics::new();
        assert!(a.is_ok());
        assert!(b.is_ok());
    }

    #[test]
    fn test_encode_contains_outcomes() {
        let metrics = CoordinatorMetrics::new().unwrap();
        metrics.record_dispatch("w1");
        metrics.record_counted();
        metrics.record_discarded();
        metrics.set_load(3, 2);

        let text = metrics.encode().unwrap();
        assert!(text.contains("hydrasat_tasks_dispatched_total{worker=\"w1\"} 1"));
        assert!(text.contains("hydrasat_tasks_discarded_total 1"));
        assert!(text.contains("hydrasat_active_tasks 3"));
        assert!(text.contains("hydrasat_queued_tasks 2"));
    }

    #[test]
    fn test_invalid_duration_ignored() {
        let metrics = CoordinatorMetrics::new().unwrap();
        metrics.observe_solve_duration(f64::NAN);
        metrics.observe_solve_duration(-1.0);
        metrics.observe_solve_duration(2.5);

        let text = metrics.encode().unwrap();
        assert!(text.contains("hydrasat_solve_duration_seconds_count 1"));
    }
}
