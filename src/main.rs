use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hydrasat::coordinator::MalformedCountPolicy;
use hydrasat::error::HydraErrorTrait;

mod commands;

use commands::{coordinator, worker, CoordinatorParams, WorkerParams};

#[derive(Parser)]
#[command(
    name = "hydrasat",
    version,
    about = "Distributed exact model counting with cube-and-conquer",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a formula to workers and print its model count
    Coordinator {
        /// DIMACS CNF file (.cnf)
        formula: PathBuf,

        /// Address to listen on (default 0.0.0.0:50051)
        #[arg(short, long)]
        bind: Option<String>,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Per-task solve budget in seconds
        #[arg(long)]
        task_timeout: Option<u32>,

        /// How long an acquire call waits for work, in milliseconds
        #[arg(long)]
        poll_window_ms: Option<u64>,

        /// Pending queue capacity
        #[arg(long)]
        queue_capacity: Option<usize>,

        /// Number of variables fixed by the initial partition
        #[arg(long)]
        split_depth: Option<u32>,

        /// Handling of unparseable counts (discard, requeue)
        #[arg(long)]
        malformed_policy: Option<MalformedCountPolicy>,
    },

    /// Pull cubes from a coordinator and count them
    Worker {
        /// Coordinator base URL
        #[arg(long, default_value = "http://127.0.0.1:50051")]
        coordinator: String,

        /// Worker identity reported to the coordinator (random if omitted)
        #[arg(long)]
        worker_id: Option<String>,

        /// Model counter binary
        #[arg(long, default_value = "ganak")]
        counter: PathBuf,

        /// Extra argument passed to the counter before the input file
        #[arg(long = "counter-arg", allow_hyphen_values = true)]
        counter_args: Vec<String>,

        /// Delay after a no-work answer, in milliseconds
        #[arg(long, default_value = "2000")]
        backoff_ms: u64,

        /// Stop after this many tasks
        #[arg(long)]
        max_tasks: Option<u64>,

        /// Concurrent pull loops in this process
        #[arg(short, long, default_value = "1")]
        parallel: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    setup_tracing(&cli.log_format, cli.verbose)?;

    let result = match cli.command {
        Commands::Coordinator {
            formula,
            bind,
            config,
            task_timeout,
            poll_window_ms,
            queue_capacity,
            split_depth,
            malformed_policy,
        } => {
            tracing::info!(
                formula = %formula.display(),
                bind = ?bind,
                config = ?config,
                "Starting coordinator command"
            );
            coordinator(CoordinatorParams {
                formula,
                config_file: config,
                bind,
                task_timeout,
                poll_window_ms,
                queue_capacity,
                split_depth,
                malformed_policy,
            })
            .await
        }

        Commands::Worker {
            coordinator,
            worker_id,
            counter,
            counter_args,
            backoff_ms,
            max_tasks,
            parallel,
        } => {
            tracing::info!(
                coordinator = %coordinator,
                counter = %counter.display(),
                parallel = %parallel,
                "Starting worker command"
            );
            worker(WorkerParams {
                coordinator,
                worker_id,
                counter,
                counter_args,
                backoff_ms,
                max_tasks,
                parallel,
            })
            .await
        }
    };

    if let Err(e) = &result {
        tracing::error!(
            category = %e.category(),
            recoverable = e.is_recoverable(),
            error = %e,
            "Command failed"
        );
    }
    result?;

    tracing::info!("hydrasat completed successfully");
    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            tracing_subscriber::EnvFilter::new("hydrasat=debug,tower_http=debug,info")
        } else {
            tracing_subscriber::EnvFilter::new("hydrasat=info,warn")
        }
    });

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
