//! Error types for the coordinator module

use thiserror::Error;

use crate::checkbook::TaskId;
use crate::formula::FormulaError;
use crate::queue::QueueError;

use super::config::ConfigError;

/// Result type for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Coordinator errors
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// Result submitted for a task that is not outstanding (duplicate,
    /// stale after a split, or never issued)
    #[error("Unknown task id {task_id}")]
    UnknownTask { task_id: TaskId },

    /// The caller's cancellation fired before the operation completed
    #[error("Operation cancelled")]
    Cancelled,

    /// Pending queue could not take the tasks
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Formula error: {0}")]
    Formula(#[from] FormulaError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl CoordinatorError {
    /// Errors that only reject one request and leave the run going
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnknownTask { .. } | Self::Cancelled | Self::Queue(QueueError::Full { .. })
        )
    }
}
