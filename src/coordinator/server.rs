//! Coordinator server implementation
//!
//! This module provides the HTTP server that exposes a [`Coordinator`] to
//! workers and stops once the run is complete.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use num_bigint::BigUint;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::formula::FormulaView;

use super::api::create_router;
use super::config::CoordinatorConfig;
use super::engine::{Coordinator, CoordinatorStats};

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Run state
    pub coordinator: Arc<Coordinator>,

    /// Fired when the server starts shutting down; long polls end early
    pub shutdown: CancellationToken,

    /// Server start time
    pub start_time: Instant,
}

// ============================================================================
// Coordinator Server
// ============================================================================

/// How a served run ended
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Sum of every counted cube
    pub total: BigUint,

    /// False when some contribution was discarded
    pub exact: bool,

    /// False when the server was stopped before all work finished
    pub completed: bool,

    pub stats: CoordinatorStats,
}

/// Main Coordinator server
pub struct CoordinatorServer {
    config: CoordinatorConfig,
    state: AppState,
}

impl CoordinatorServer {
    /// Create a server for a fresh run over `formula`
    pub fn new(config: CoordinatorConfig, formula: FormulaView) -> Result<Self, ServerError> {
        let coordinator = Coordinator::new(config, formula)
            .map_err(|e| ServerError::InitError(e.to_string()))?;
        Ok(Self::from_coordinator(Arc::new(coordinator)))
    }

    /// Serve an already seeded coordinator
    pub fn from_coordinator(coordinator: Arc<Coordinator>) -> Self {
        let config = coordinator.config().clone();
        let state = AppState {
            coordinator,
            shutdown: CancellationToken::new(),
            start_time: Instant::now(),
        };
        Self { config, state }
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.state.coordinator
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        // Add CORS layer if enabled
        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        // Add tracing layer if enabled
        if self.config.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self.config.bind_address;
        TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("{}: {}", addr, e)))
    }

    /// Serve on the configured address until the run completes or
    /// `shutdown_signal` resolves
    pub async fn run(
        &self,
        shutdown_signal: impl Future<Output = ()> + Send + 'static,
    ) -> Result<RunOutcome, ServerError> {
        let listener = self.bind().await?;
        self.run_on(listener, shutdown_signal).await
    }

    /// Serve on an existing listener until the run completes or
    /// `shutdown_signal` resolves
    pub async fn run_on(
        &self,
        listener: TcpListener,
        shutdown_signal: impl Future<Output = ()> + Send + 'static,
    ) -> Result<RunOutcome, ServerError> {
        let router = self.build_router();
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(e.to_string()))?;

        tracing::info!("Starting Coordinator server on {}", addr);

        let coordinator = self.state.coordinator.clone();
        let token = self.state.shutdown.clone();
        let stop = async move {
            tokio::select! {
                _ = coordinator.wait_for_completion() => {
                    tracing::info!("Run complete; shutting down");
                }
                _ = shutdown_signal => {
                    tracing::warn!("Shutdown requested before the run completed");
                }
            }
            token.cancel();
            coordinator.shutdown();
        };

        axum::serve(listener, router)
            .with_graceful_shutdown(stop)
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()))?;

        tracing::info!("Coordinator server shutdown complete");

        let coordinator = &self.state.coordinator;
        Ok(RunOutcome {
            total: coordinator.total(),
            exact: coordinator.is_exact(),
            completed: coordinator.is_complete(),
            stats: coordinator.stats(),
        })
    }

    /// Get server info
    pub fn info(&self) -> ServerInfo {
        let formula = self.state.coordinator.formula();
        ServerInfo {
            bind_address: self.config.bind_address,
            num_vars: formula.num_vars,
            num_clauses: formula.num_clauses,
            initial_tasks: self.state.coordinator.active(),
            task_timeout_secs: self.config.task_timeout_secs,
            poll_window_ms: self.config.poll_window_ms,
            queue_capacity: self.config.queue_capacity,
            cors_enabled: self.config.enable_cors,
            request_logging_enabled: self.config.enable_request_logging,
        }
    }
}

/// Server information
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub bind_address: SocketAddr,
    pub num_vars: i32,
    pub num_clauses: i32,
    pub initial_tasks: u64,
    pub task_timeout_secs: u32,
    pub poll_window_ms: u64,
    pub queue_capacity: usize,
    pub cors_enabled: bool,
    pub request_logging_enabled: bool,
}

impl ServerInfo {
    /// Format as display string
    pub fn display(&self) -> String {
        format!(
            "Coordinator Server\n\
             {:-<40}\n\
             Bind Address: {}\n\
             Formula: {} vars, {} clauses\n\
             Initial Tasks: {}\n\
             Task Timeout: {}s\n\
             Poll Window: {}ms\n\
             Queue Capacity: {}\n\
             CORS: {}\n\
             Request Logging: {}",
            "",
            self.bind_address,
            self.num_vars,
            self.num_clauses,
            self.initial_tasks,
            self.task_timeout_secs,
            self.poll_window_ms,
            self.queue_capacity,
            if self.cors_enabled { "enabled" } else { "disabled" },
            if self.request_logging_enabled { "enabled" } else { "disabled" }
        )
    }
}

// ============================================================================
// Server Errors
// ============================================================================

/// Server errors
#[derive(Debug, Clone)]
pub enum ServerError {
    /// Configuration error
    ConfigError(String),

    /// Initialization error
    InitError(String),

    /// Failed to bind to address
    BindError(String),

    /// Server error
    ServeError(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::InitError(msg) => write!(f, "Initialization error: {}", msg),
            Self::BindError(msg) => write!(f, "Failed to bind: {}", msg),
            Self::ServeError(msg) => write!(f, "Server error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {}

// ============================================================================
// Tests
// ============================================================================
