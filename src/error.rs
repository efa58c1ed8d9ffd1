//! Unified error handling for the hydrasat crate
//!
//! This module provides a unified error type that consolidates all domain-specific
//! errors into a single `Error` enum, while maintaining the ability to use
//! domain-specific errors when needed.
//!
//! # Architecture
//!
//! - [`HydraErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::coordinator::client::ClientError;
pub use crate::coordinator::config::ConfigError;
pub use crate::coordinator::error::CoordinatorError;
pub use crate::coordinator::server::ServerError;
pub use crate::cube::CubeError;
pub use crate::formula::FormulaError;
pub use crate::queue::QueueError;
pub use crate::worker::WorkerError;

/// Common trait for all hydrasat error types
pub trait HydraErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Transport errors (HTTP, unreachable coordinator)
    Network,
    /// Formula and cube input errors
    Input,
    /// Task lifecycle errors (unknown task, full or closed queue)
    Lifecycle,
    /// External counter errors
    Counter,
    /// Configuration and validation errors
    Config,
    /// Storage and I/O errors
    Storage,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Input => "input",
            Self::Lifecycle => "lifecycle",
            Self::Counter => "counter",
            Self::Config => "config",
            Self::Storage => "storage",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the hydrasat crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    #[error("Formula error: {0}")]
    Formula(#[from] FormulaError),

    #[error("Cube error: {0}")]
    Cube(#[from] CubeError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl HydraErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Coordinator(e) => e.is_recoverable(),
            Self::Formula(_) | Self::Cube(_) | Self::Config(_) => false,
            Self::Server(_) => false,
            Self::Client(e) => matches!(
                e,
                ClientError::NetworkError(_) | ClientError::CoordinatorUnavailable
            ),
            Self::Worker(WorkerError::Client(_)) => true,
            Self::Worker(_) => false,
            Self::Io(_) => true, // I/O errors are often transient
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Coordinator(e) => match e {
                CoordinatorError::Formula(_) => ErrorCategory::Input,
                CoordinatorError::Config(_) => ErrorCategory::Config,
                CoordinatorError::Metrics(_) => ErrorCategory::Other,
                _ => ErrorCategory::Lifecycle,
            },
            Self::Formula(FormulaError::Io { .. }) => ErrorCategory::Storage,
            Self::Formula(_) | Self::Cube(_) => ErrorCategory::Input,
            Self::Config(_) => ErrorCategory::Config,
            Self::Server(ServerError::ConfigError(_)) => ErrorCategory::Config,
            Self::Server(_) | Self::Client(_) => ErrorCategory::Network,
            Self::Worker(WorkerError::Client(_)) => ErrorCategory::Network,
            Self::Worker(_) => ErrorCategory::Counter,
            Self::Io(_) => ErrorCategory::Storage,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_category() {
        let err = Error::Formula(FormulaError::NotFound {
            path: PathBuf::from("a.cnf"),
        });
        assert_eq!(err.category(), ErrorCategory::Input);

        let err = Error::Coordinator(CoordinatorError::UnknownTask { task_id: 1 });
        assert_eq!(err.category(), ErrorCategory::Lifecycle);

        let err = Error::Client(ClientError::CoordinatorUnavailable);
        assert_eq!(err.category(), ErrorCategory::Network);
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::Coordinator(CoordinatorError::Cancelled).is_recoverable());
        assert!(Error::Client(ClientError::NetworkError("reset".into())).is_recoverable());
        assert!(!Error::Cube(CubeError::ZeroLiteral { position: 0 }).is_recoverable());
    }

    #[test]
    fn test_error_conversion() {
        let coordinator: CoordinatorError = QueueError::Closed.into();
        let unified: Error = coordinator.into();
        assert!(matches!(unified, Error::Coordinator(_)));
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("Something went wrong");
        assert_eq!(err.category(), ErrorCategory::Other);
        assert_eq!(err.to_string(), "Something went wrong");
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Counter.to_string(), "counter");
    }
}
