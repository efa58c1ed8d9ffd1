//! REST API handlers for the Coordinator server
//!
//! This module defines the wire types and handlers workers talk to.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::checkbook::{TaskId, NO_WORK_TASK_ID};
use crate::queue::TaskDescriptor;

use super::engine::{Acquired, CoordinatorStats, SubmitAck, SubmitRequest, TaskOutcome};
use super::error::CoordinatorError;
use super::server::AppState;

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Simple error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub complete: bool,
}

// ============================================================================
// Task Wire Types
// ============================================================================

/// Body of an acquire call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquireRequest {
    pub worker_id: String,
}

/// A task for a worker, or the no-work sentinel (`task_id == -1`, every
/// other field empty)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task_id: TaskId,
    #[serde(default)]
    pub literals: Vec<i32>,
    #[serde(default)]
    pub num_vars: i32,
    #[serde(default)]
    pub num_clauses: i32,
    #[serde(default)]
    pub formula_body: String,
    #[serde(default)]
    pub timeout_sec: i32,
}

impl TaskResponse {
    pub fn no_work() -> Self {
        Self {
            task_id: NO_WORK_TASK_ID,
            ..Default::default()
        }
    }

    pub fn is_no_work(&self) -> bool {
        self.task_id == NO_WORK_TASK_ID
    }
}

impl From<&TaskDescriptor> for TaskResponse {
    fn from(task: &TaskDescriptor) -> Self {
        Self {
            task_id: task.task_id,
            literals: task.cube.literals().to_vec(),
            num_vars: task.formula.num_vars,
            num_clauses: task.formula.num_clauses,
            formula_body: task.formula.body.clone(),
            timeout_sec: i32::try_from(task.timeout.as_secs()).unwrap_or(i32::MAX),
        }
    }
}

/// Body of a submit call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResultRequest {
    pub task_id: TaskId,
    pub worker_id: String,
    pub timed_out: bool,
    /// Decimal count; only meaningful when `timed_out` is false
    #[serde(default)]
    pub count: Option<String>,
    #[serde(default)]
    pub duration_sec: Option<f64>,
}

impl From<SubmitResultRequest> for SubmitRequest {
    fn from(req: SubmitResultRequest) -> Self {
        let outcome = if req.timed_out {
            TaskOutcome::TimedOut
        } else {
            // A missing count is treated like any other unparseable payload
            TaskOutcome::Counted {
                count: req.count.unwrap_or_default(),
            }
        };
        Self {
            task_id: req.task_id,
            worker_id: req.worker_id,
            outcome,
            duration_secs: req.duration_sec,
        }
    }
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/api/health", get(health_check))
        // Task endpoints
        .route("/api/tasks/acquire", post(acquire_task))
        .route("/api/tasks/submit", post(submit_result))
        // Stats endpoints
        .route("/api/stats", get(get_stats))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

// ============================================================================
// Health Handlers
// ============================================================================

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        complete: state.coordinator.is_complete(),
    }))
}

// ============================================================================
// Task Handlers
// ============================================================================

/// Hand out one task, or the no-work sentinel after the poll window
async fn acquire_task(
    State(state): State<AppState>,
    Json(request): Json<AcquireRequest>,
) -> axum::response::Response {
    match state
        .coordinator
        .acquire_task(&request.worker_id, &state.shutdown)
        .await
    {
        Ok(Acquired::Task(task)) => (StatusCode::OK, Json(TaskResponse::from(&task))).into_response(),
        Ok(Acquired::NoWork) | Err(CoordinatorError::Cancelled) => {
            (StatusCode::OK, Json(TaskResponse::no_work())).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Accept a worker's result
async fn submit_result(
    State(state): State<AppState>,
    Json(request): Json<SubmitResultRequest>,
) -> axum::response::Response {
    // Run detached so a dropped connection cannot interrupt a submission
    // that has already started resolving
    let coordinator = state.coordinator.clone();
    let outcome =
        tokio::spawn(async move { coordinator.submit_result(request.into()).await }).await;

    match outcome {
        Ok(Ok(ack)) => (StatusCode::OK, Json(ApiResponse::<SubmitAck>::success(ack))).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(join_error) => {
            tracing::error!(error = %join_error, "Submission task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Submission failed")),
            )
                .into_response()
        }
    }
}

fn error_response(error: CoordinatorError) -> axum::response::Response {
    let status = match &error {
        CoordinatorError::UnknownTask { .. } => StatusCode::NOT_FOUND,
        CoordinatorError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        CoordinatorError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse::new(error.to_string()))).into_response()
}

// ============================================================================
// Stats Handlers
// ============================================================================

/// Get coordinator stats
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::<CoordinatorStats>::success(state.coordinator.stats()))
}

/// Prometheus exposition
async fn get_metrics(State(state): State<AppState>) -> axum::response::Response {
    match state.coordinator.metrics().encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
    }
}

// ============================================================================
// Tests
// ============================================================================
