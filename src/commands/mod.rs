pub mod coordinator;
pub mod worker;

// Re-export command functions for convenience
pub use coordinator::{coordinator, CoordinatorParams};
pub use worker::{worker, WorkerParams};
