//! Integration tests for the task lifecycle engine
//!
//! These tests drive a [`Coordinator`] directly, without HTTP:
//! - A full run over the initial partition
//! - Timeout splitting and stale submissions
//! - Exact totals under concurrent simulated workers
//! - Queue backpressure and cancellation
//! - Formula loading from disk

mod common;

use std::sync::Arc;
use std::time::Duration;

use num_bigint::BigUint;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use hydrasat::coordinator::{
    Acquired, Coordinator, CoordinatorConfig, CoordinatorError, MalformedCountPolicy, Resolution,
    SubmitRequest,
};
use hydrasat::formula::{FormulaError, FormulaView};

use common::{count_models, cube, expected_total, fast_config, formula, parse_dimacs, FORMULA};

async fn acquire(c: &Coordinator, worker: &str) -> Option<hydrasat::queue::TaskDescriptor> {
    match c.acquire_task(worker, &CancellationToken::new()).await.unwrap() {
        Acquired::Task(task) => Some(task),
        Acquired::NoWork => None,
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_initial_partition_counted_once_each() {
    let free = FormulaView::parse("p cnf 3 0\n").unwrap();
    let c = Coordinator::new(fast_config(), free).unwrap();
    assert_eq!(c.active(), 8);

    for i in 1..=8u64 {
        let task = acquire(&c, "w1").await.unwrap();
        assert_eq!(task.cube.len(), 3);
        let ack = c
            .submit_result(SubmitRequest::counted(task.task_id, "w1", "1"))
            .await
            .unwrap();
        assert_eq!(ack.remaining, 8 - i);
        assert_eq!(ack.completed, i == 8);
        assert_eq!(c.is_complete(), i == 8);
    }

    assert!(c.is_complete());
    assert_eq!(c.wait_for_completion().await, BigUint::from(8u32));
    assert!(acquire(&c, "w1").await.is_none());
}

#[tokio::test]
async fn test_timeout_split_registers_children() {
    let c = Coordinator::with_cubes(fast_config(), formula(), vec![cube(&[1])]).unwrap();
    let task = acquire(&c, "w1").await.unwrap();

    let ack = c
        .submit_result(SubmitRequest::timed_out(task.task_id, "w1"))
        .await
        .unwrap();
    let children = match ack.resolution {
        Resolution::Split { children } => children,
        other => panic!("unexpected resolution {other:?}"),
    };
    assert_eq!(children.len(), 2);
    assert!(children.iter().all(|id| *id != task.task_id));
    assert_eq!(c.active(), 2);

    let first = acquire(&c, "w1").await.unwrap();
    let second = acquire(&c, "w2").await.unwrap();
    assert_eq!(first.cube, cube(&[1, 2]));
    assert_eq!(second.cube, cube(&[1, -2]));

    // The parent id is gone for good
    let stale = c.submit_result(SubmitRequest::counted(task.task_id, "w1", "9")).await;
    assert!(matches!(stale, Err(CoordinatorError::UnknownTask { .. })));
    assert_eq!(c.total(), BigUint::from(0u32));
}

#[tokio::test]
async fn test_duplicate_submission_rejected() {
    let c = Coordinator::with_cubes(fast_config(), formula(), vec![cube(&[1]), cube(&[-1])]).unwrap();
    let task = acquire(&c, "w1").await.unwrap();

    c.submit_result(SubmitRequest::counted(task.task_id, "w1", "3"))
        .await
        .unwrap();
    let before = c.stats();

    let again = c.submit_result(SubmitRequest::counted(task.task_id, "w2", "3")).await;
    assert!(matches!(again, Err(CoordinatorError::UnknownTask { .. })));

    let after = c.stats();
    assert_eq!(after.total, before.total);
    assert_eq!(after.active, before.active);
    assert_eq!(after.unknown_submissions, before.unknown_submissions + 1);
}

#[tokio::test]
async fn test_every_waiter_sees_completion() {
    let c = Arc::new(Coordinator::with_cubes(fast_config(), formula(), vec![cube(&[2])]).unwrap());

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let c = c.clone();
            tokio::spawn(async move { c.wait_for_completion().await })
        })
        .collect();

    c.submit_result(SubmitRequest::counted(0, "w1", "12345678901234567890"))
        .await
        .unwrap();

    for waiter in waiters {
        let total = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(total.to_string(), "12345678901234567890");
    }
}

#[tokio::test]
async fn test_requeue_policy_keeps_total_exact() {
    let config = CoordinatorConfig::builder()
        .poll_window_ms(20)
        .malformed_count_policy(MalformedCountPolicy::Requeue)
        .build()
        .unwrap();
    let c = Coordinator::with_cubes(config, formula(), vec![cube(&[1])]).unwrap();

    let task = acquire(&c, "w1").await.unwrap();
    c.submit_result(SubmitRequest::counted(task.task_id, "w1", "-4"))
        .await
        .unwrap();

    let retry = acquire(&c, "w2").await.unwrap();
    assert_eq!(retry.cube, task.cube);
    assert_ne!(retry.task_id, task.task_id);

    c.submit_result(SubmitRequest::counted(retry.task_id, "w2", "4"))
        .await
        .unwrap();
    assert!(c.is_complete());
    assert!(c.is_exact());
    assert_eq!(c.total(), BigUint::from(4u32));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_workers_reach_exact_total() {
    let c = Arc::new(Coordinator::new(fast_config(), formula()).unwrap());
    let (num_vars, clauses) = parse_dimacs(FORMULA);
    let clauses = Arc::new(clauses);

    let workers: Vec<_> = (0..6)
        .map(|i| {
            let c = c.clone();
            let clauses = clauses.clone();
            tokio::spawn(async move {
                let worker = format!("w{i}");
                while !c.is_complete() {
                    let Some(task) = acquire(&c, &worker).await else {
                        continue;
                    };
                    // Randomly give up on cubes that can still be split
                    let give_up =
                        task.cube.len() < num_vars && rand::thread_rng().gen_bool(0.5);
                    let request = if give_up {
                        SubmitRequest::timed_out(task.task_id, worker.as_str())
                    } else {
                        let count = count_models(num_vars, &clauses, &task.cube);
                        SubmitRequest::counted(task.task_id, worker.as_str(), count.to_string())
                    };
                    c.submit_result(request).await.unwrap();
                }
            })
        })
        .collect();

    let total = tokio::time::timeout(Duration::from_secs(30), c.wait_for_completion())
        .await
        .unwrap();
    for worker in workers {
        worker.await.unwrap();
    }

    assert_eq!(total, BigUint::from(expected_total()));
    assert_eq!(c.active(), 0);
    assert_eq!(c.outstanding(), 0);
    assert!(c.is_exact());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_complete_exactly_once() {
    let config = CoordinatorConfig::builder()
        .poll_window_ms(20)
        .initial_split_depth(6)
        .build()
        .unwrap();
    let c = Arc::new(Coordinator::new(config, formula()).unwrap());
    assert_eq!(c.active(), 64);

    let mut tasks = Vec::new();
    while let Some(task) = acquire(&c, "w1").await {
        tasks.push(task);
    }
    assert_eq!(tasks.len(), 64);

    let start = Arc::new(tokio::sync::Barrier::new(tasks.len()));
    let submitters: Vec<_> = tasks
        .into_iter()
        .map(|task| {
            let c = c.clone();
            let start = start.clone();
            tokio::spawn(async move {
                start.wait().await;
                c.submit_result(SubmitRequest::counted(task.task_id, "w1", "1"))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut completions = 0;
    for submitter in submitters {
        if submitter.await.unwrap().completed {
            completions += 1;
        }
    }

    assert_eq!(completions, 1);
    assert!(c.is_complete());
    assert_eq!(c.active(), 0);
    assert_eq!(c.wait_for_completion().await, BigUint::from(64u32));
}

// ============================================================================
// Backpressure and cancellation
// ============================================================================

#[tokio::test]
async fn test_split_waits_for_queue_room() {
    let config = CoordinatorConfig::builder()
        .poll_window_ms(20)
        .queue_capacity(2)
        .initial_split_depth(1)
        .build()
        .unwrap();
    let c = Arc::new(
        Coordinator::with_cubes(config, formula(), vec![cube(&[1]), cube(&[-1])]).unwrap(),
    );
    let task = acquire(&c, "w1").await.unwrap();

    // One slot free, the split needs two
    let submit = {
        let c = c.clone();
        tokio::spawn(async move {
            c.submit_result(SubmitRequest::timed_out(task.task_id, "w1")).await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!submit.is_finished());
    assert_eq!(c.active(), 2);
    assert_eq!(c.outstanding(), 2);

    // Taking the other task frees the second slot
    let _other = acquire(&c, "w2").await.unwrap();
    let ack = tokio::time::timeout(Duration::from_secs(1), submit)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(ack.resolution, Resolution::Split { .. }));
    assert_eq!(c.active(), 3);
}

#[tokio::test]
async fn test_cancelled_submission_changes_nothing() {
    let config = CoordinatorConfig::builder()
        .poll_window_ms(20)
        .queue_capacity(2)
        .initial_split_depth(1)
        .build()
        .unwrap();
    let c = Coordinator::with_cubes(config, formula(), vec![cube(&[1]), cube(&[-1])]).unwrap();
    let task = acquire(&c, "w1").await.unwrap();

    let pending = tokio::time::timeout(
        Duration::from_millis(30),
        c.submit_result(SubmitRequest::timed_out(task.task_id, "w1")),
    )
    .await;
    assert!(pending.is_err());

    assert_eq!(c.active(), 2);
    assert_eq!(c.outstanding(), 2);
    assert_eq!(c.queued(), 1);

    // The task is still outstanding and can be resolved normally
    c.submit_result(SubmitRequest::counted(task.task_id, "w1", "2"))
        .await
        .unwrap();
    assert_eq!(c.active(), 1);
}

#[tokio::test]
async fn test_cancelled_acquire_keeps_task() {
    let c = Coordinator::with_cubes(fast_config(), formula(), vec![cube(&[1])]).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = c.acquire_task("w1", &cancel).await;
    assert!(matches!(result, Err(CoordinatorError::Cancelled)));
    assert_eq!(c.queued(), 1);
    assert!(acquire(&c, "w1").await.is_some());
}

// ============================================================================
// Formula loading
// ============================================================================

#[test]
fn test_load_formula_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fixture.cnf");
    std::fs::write(&path, FORMULA).unwrap();

    let view = FormulaView::load(&path).unwrap();
    assert_eq!(view.num_vars, 6);
    assert_eq!(view.num_clauses, 5);
    assert!(!view.body.contains("fixture"));
    assert_eq!(view.body.lines().count(), 5);
}

#[test]
fn test_load_rejects_wrong_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fixture.txt");
    std::fs::write(&path, FORMULA).unwrap();

    assert!(matches!(
        FormulaView::load(&path),
        Err(FormulaError::InvalidFormat { .. })
    ));
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.cnf");

    assert!(matches!(
        FormulaView::load(&path),
        Err(FormulaError::NotFound { .. })
    ));
}
