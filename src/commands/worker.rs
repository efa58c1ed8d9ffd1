use std::path::PathBuf;
use std::time::Duration;

use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;
use url::Url;

use hydrasat::coordinator::{ClientConfig, CoordinatorClient};
use hydrasat::error::{Error, Result};
use hydrasat::worker::{default_worker_id, StopReason, Worker, WorkerConfig};

/// Options for the `worker` subcommand
pub struct WorkerParams {
    pub coordinator: String,
    pub worker_id: Option<String>,
    pub counter: PathBuf,
    pub counter_args: Vec<String>,
    pub backoff_ms: u64,
    pub max_tasks: Option<u64>,
    pub parallel: usize,
}

/// Pull and count cubes until the coordinator finishes
pub async fn worker(params: WorkerParams) -> Result<()> {
    let url = Url::parse(&params.coordinator)
        .map_err(|e| Error::with_source(format!("Invalid coordinator URL '{}'", params.coordinator), e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::other(format!("Unsupported URL scheme '{}'", url.scheme())));
    }

    let base_id = params.worker_id.clone().unwrap_or_else(default_worker_id);
    let config = WorkerConfig {
        counter_args: params.counter_args.clone(),
        ..WorkerConfig::default()
    }
    .with_counter(&params.counter)
    .with_backoff(Duration::from_millis(params.backoff_ms))
    .with_max_tasks(params.max_tasks);

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received; finishing current tasks");
                shutdown.cancel();
            }
        });
    }

    let slots = params.parallel.max(1);
    let runs = (0..slots).map(|slot| {
        let worker_id = if slots == 1 {
            base_id.clone()
        } else {
            format!("{base_id}-{slot}")
        };
        let config = config.clone();
        let shutdown = shutdown.clone();
        let url = url.as_str().to_string();
        async move {
            let client = CoordinatorClient::new(ClientConfig::new(url, worker_id))?;
            let worker = Worker::new(client, config.external_counter(), config);
            Ok::<_, Error>(worker.run(&shutdown).await?)
        }
    });

    let results = try_join_all(runs).await?;

    let tasks: u64 = results.iter().map(|(summary, _)| summary.tasks).sum();
    let counted: u64 = results.iter().map(|(summary, _)| summary.counted).sum();
    let timed_out: u64 = results.iter().map(|(summary, _)| summary.timed_out).sum();
    let finished = results
        .iter()
        .all(|(_, reason)| *reason == StopReason::CoordinatorGone);

    println!("Worker {base_id} finished");
    println!("  Tasks: {tasks}");
    println!("  Counted: {counted}");
    println!("  Timed out: {timed_out}");
    if finished {
        println!("  Coordinator closed; run is over");
    }
    Ok(())
}
