//! Coordinator client for workers
//!
//! This module provides a client for workers to acquire tasks from and
//! submit results to the coordinator server.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::checkbook::TaskId;

use super::api::{
    AcquireRequest, ApiResponse, HealthResponse, SubmitResultRequest, TaskResponse,
};
use super::engine::{CoordinatorStats, SubmitAck};

// ============================================================================
// Client Configuration
// ============================================================================

/// Configuration for the coordinator client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Coordinator server URL
    pub coordinator_url: String,

    /// Request timeout; must exceed the coordinator's poll window
    pub timeout: Duration,

    /// Retry count for failed requests
    pub retry_count: u32,

    /// Retry delay
    pub retry_delay: Duration,

    /// Worker ID sent with every call
    pub worker_id: String,
}

impl ClientConfig {
    /// Create a new client config
    pub fn new(coordinator_url: impl Into<String>, worker_id: impl Into<String>) -> Self {
        Self {
            coordinator_url: coordinator_url.into().trim_end_matches('/').to_string(),
            worker_id: worker_id.into(),
            timeout: Duration::from_secs(30),
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set retry count
    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Set retry delay
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

// ============================================================================
// Coordinator Client
// ============================================================================

/// Client for communicating with the Coordinator server
pub struct CoordinatorClient {
    config: ClientConfig,
    http_client: Client,
}

impl CoordinatorClient {
    /// Create a new coordinator client
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::InitError(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Ask for a task. A response with `task_id == -1` means no work was
    /// ready within the coordinator's poll window.
    pub async fn acquire_task(&self) -> Result<TaskResponse, ClientError> {
        let request = AcquireRequest {
            worker_id: self.config.worker_id.clone(),
        };
        let url = format!("{}/api/tasks/acquire", self.config.coordinator_url);

        self.post_with_retry(&url, &request).await
    }

    /// Report the exact count for a task
    pub async fn submit_count(
        &self,
        task_id: TaskId,
        count: impl Into<String>,
        duration: Duration,
    ) -> Result<SubmitAck, ClientError> {
        self.submit_result(&SubmitResultRequest {
            task_id,
            worker_id: self.config.worker_id.clone(),
            timed_out: false,
            count: Some(count.into()),
            duration_sec: Some(duration.as_secs_f64()),
        })
        .await
    }

    /// Report that a task ran out of time
    pub async fn submit_timeout(
        &self,
        task_id: TaskId,
        duration: Duration,
    ) -> Result<SubmitAck, ClientError> {
        self.submit_result(&SubmitResultRequest {
            task_id,
            worker_id: self.config.worker_id.clone(),
            timed_out: true,
            count: None,
            duration_sec: Some(duration.as_secs_f64()),
        })
        .await
    }

    /// Submit a result
    pub async fn submit_result(
        &self,
        request: &SubmitResultRequest,
    ) -> Result<SubmitAck, ClientError> {
        let url = format!("{}/api/tasks/submit", self.config.coordinator_url);

        let response: ApiResponse<SubmitAck> = self.post_with_retry(&url, request).await?;
        response.data.ok_or_else(|| {
            ClientError::InvalidResponse(
                response
                    .error
                    .unwrap_or_else(|| "Missing acknowledgement".to_string()),
            )
        })
    }

    /// Check coordinator health
    pub async fn health_check(&self) -> Result<HealthStatus, ClientError> {
        let url = format!("{}/api/health", self.config.coordinator_url);

        let response: ApiResponse<HealthResponse> = self.get_with_retry(&url).await?;

        if let Some(health) = response.data {
            Ok(HealthStatus {
                healthy: health.status == "healthy",
                version: health.version,
                uptime_secs: health.uptime_secs,
                complete: health.complete,
            })
        } else {
            Err(ClientError::InvalidResponse(
                "Missing health data".to_string(),
            ))
        }
    }

    /// Fetch coordinator statistics
    pub async fn stats(&self) -> Result<CoordinatorStats, ClientError> {
        let url = format!("{}/api/stats", self.config.coordinator_url);

        let response: ApiResponse<CoordinatorStats> = self.get_with_retry(&url).await?;
        response
            .data
            .ok_or_else(|| ClientError::InvalidResponse("Missing stats".to_string()))
    }

    // Internal: GET request with retry
    async fn get_with_retry<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
    ) -> Result<T, ClientError> {
        self.send_with_retry(|| self.http_client.get(url)).await
    }

    // Internal: POST request with retry
    async fn post_with_retry<T: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<R, ClientError> {
        self.send_with_retry(|| self.http_client.post(url).json(body))
            .await
    }

    // Client errors (4xx) are answers, not failures, and are never retried
    async fn send_with_retry<R: for<'de> Deserialize<'de>>(
        &self,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<R, ClientError> {
        let mut last_error = None;
        let mut unreachable = false;

        for attempt in 0..=self.config.retry_count {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay).await;
            }

            match build().send().await {
                Ok(response) => {
                    unreachable = false;
                    let status = response.status();
                    if status.is_success() {
                        match response.json::<R>().await {
                            Ok(data) => return Ok(data),
                            Err(e) => {
                                last_error = Some(ClientError::ParseError(e.to_string()));
                            }
                        }
                    } else {
                        let error = ClientError::HttpError {
                            status: status.as_u16(),
                            message: response.text().await.unwrap_or_default(),
                        };
                        if status.is_client_error() {
                            return Err(error);
                        }
                        last_error = Some(error);
                    }
                }
                Err(e) => {
                    unreachable = e.is_connect();
                    last_error = Some(ClientError::NetworkError(e.to_string()));
                }
            }
        }

        if unreachable {
            return Err(ClientError::CoordinatorUnavailable);
        }
        Err(last_error.unwrap_or_else(|| ClientError::NetworkError("Unknown error".to_string())))
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Health status from coordinator
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub version: String,
    pub uptime_secs: u64,
    pub complete: bool,
}

// ============================================================================
// Client Errors
// ============================================================================

/// Client errors
#[derive(Debug, Clone)]
pub enum ClientError {
    /// Initialization error
    InitError(String),

    /// Network error
    NetworkError(String),

    /// HTTP error
    HttpError { status: u16, message: String },

    /// Parse error
    ParseError(String),

    /// Invalid response
    InvalidResponse(String),

    /// Coordinator unreachable after all retries
    CoordinatorUnavailable,
}

impl ClientError {
    /// The coordinator no longer knows the submitted task
    pub fn is_unknown_task(&self) -> bool {
        matches!(self, Self::HttpError { status, .. } if *status == StatusCode::NOT_FOUND.as_u16())
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InitError(msg) => write!(f, "Initialization error: {msg}"),
            Self::NetworkError(msg) => write!(f, "Network error: {msg}"),
            Self::HttpError { status, message } => {
                write!(f, "HTTP error ({status}): {message}")
            }
            Self::ParseError(msg) => write!(f, "Parse error: {msg}"),
            Self::InvalidResponse(msg) => write!(f, "Invalid response: {msg}"),
            Self::CoordinatorUnavailable => write!(f, "Coordinator unavailable"),
        }
    }
}

impl std::error::Error for ClientError {}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> CoordinatorClient {
        let config = ClientConfig::new(server.uri(), "w1")
            .with_retry_count(2)
            .with_retry_delay(Duration::from_millis(10));
        CoordinatorClient::new(config).unwrap()
    }

    #[test]
    fn test_client_config_creation() {
        let config = ClientConfig::new("http://localhost:50051/", "w1");

        assert_eq!(config.coordinator_url, "http://localhost:50051");
        assert_eq!(config.worker_id, "w1");
        assert_eq!(config.retry_count, 3);
    }

    #[test]
    fn test_client_config_with_timeout() {
        let config = ClientConfig::new("http://localhost:50051", "w1")
            .with_timeout(Duration::from_secs(60))
            .with_retry_count(5);

        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.retry_count, 5);
    }

    #[tokio::test]
    async fn test_acquire_task() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tasks/acquire"))
            .and(body_partial_json(serde_json::json!({"worker_id": "w1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "task_id": 3,
                "literals": [1, -2],
                "num_vars": 5,
                "num_clauses": 1,
                "formula_body": "1 2 0",
                "timeout_sec": 30
            })))
            .expect(1)
            .mount(&server)
            .await;

        let task = client_for(&server).acquire_task().await.unwrap();
        assert_eq!(task.task_id, 3);
        assert_eq!(task.literals, vec![1, -2]);
        assert!(!task.is_no_work());
    }

    #[tokio::test]
    async fn test_submit_unknown_task_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tasks/submit"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "success": false,
                "error": "Unknown task id 3"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .submit_count(3, "10", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_unknown_task());
    }

    #[tokio::test]
    async fn test_server_error_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let err = client_for(&server).health_check().await.unwrap_err();
        assert!(matches!(err, ClientError::HttpError { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_coordinator() {
        let config = ClientConfig::new("http://127.0.0.1:1", "w1")
            .with_retry_count(1)
            .with_retry_delay(Duration::from_millis(1));
        let client = CoordinatorClient::new(config).unwrap();

        let err = client.acquire_task().await.unwrap_err();
        assert!(matches!(err, ClientError::CoordinatorUnavailable));
    }
}
