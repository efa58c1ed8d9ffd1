use std::path::PathBuf;

use hydrasat::coordinator::{
    ConfigError, CoordinatorConfig, CoordinatorServer, MalformedCountPolicy,
};
use hydrasat::error::Result;
use hydrasat::formula::FormulaView;

/// Options for the `coordinator` subcommand; `None` keeps the file/env value
pub struct CoordinatorParams {
    pub formula: PathBuf,
    pub config_file: Option<PathBuf>,
    pub bind: Option<String>,
    pub task_timeout: Option<u32>,
    pub poll_window_ms: Option<u64>,
    pub queue_capacity: Option<usize>,
    pub split_depth: Option<u32>,
    pub malformed_policy: Option<MalformedCountPolicy>,
}

/// File (or defaults), then `HYDRASAT_*` environment, then flags
fn resolve_config(params: &CoordinatorParams) -> std::result::Result<CoordinatorConfig, ConfigError> {
    let base = match &params.config_file {
        Some(path) => CoordinatorConfig::from_file(path)?,
        None => CoordinatorConfig::default(),
    }
    .with_env_overrides()?;

    let mut builder = CoordinatorConfig::builder();
    if let Some(bind) = &params.bind {
        builder = builder.bind_address_str(bind)?;
    }
    if let Some(secs) = params.task_timeout {
        builder = builder.task_timeout_secs(secs);
    }
    if let Some(ms) = params.poll_window_ms {
        builder = builder.poll_window_ms(ms);
    }
    if let Some(capacity) = params.queue_capacity {
        builder = builder.queue_capacity(capacity);
    }
    if let Some(depth) = params.split_depth {
        builder = builder.initial_split_depth(depth);
    }
    if let Some(policy) = params.malformed_policy {
        builder = builder.malformed_count_policy(policy);
    }
    builder.build_from(base)
}

/// Run a counting job to completion and print the total
pub async fn coordinator(params: CoordinatorParams) -> Result<()> {
    let config = resolve_config(&params)?;
    let formula = FormulaView::load(&params.formula)?;

    tracing::info!(
        formula = %params.formula.display(),
        num_vars = formula.num_vars,
        num_clauses = formula.num_clauses,
        "Formula loaded"
    );

    let server = CoordinatorServer::new(config, formula)?;

    println!("{}", server.info().display());
    println!();
    println!("API Endpoints:");
    println!("  POST /api/tasks/acquire - Hand out a cube");
    println!("  POST /api/tasks/submit  - Report a count or timeout");
    println!("  GET  /api/health        - Health check");
    println!("  GET  /api/stats         - Run statistics");
    println!("  GET  /metrics           - Prometheus metrics");
    println!();

    let outcome = server.run(shutdown_signal()).await?;

    println!("{}", outcome.stats.display());
    println!();
    if !outcome.completed {
        println!("Run interrupted; partial total: {}", outcome.total);
        return Err(hydrasat::error::Error::other("run interrupted before completion"));
    }
    if outcome.exact {
        println!("Model count: {}", outcome.total);
    } else {
        println!(
            "Model count: {} (inexact: {} cube(s) discarded)",
            outcome.total, outcome.stats.discarded
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
