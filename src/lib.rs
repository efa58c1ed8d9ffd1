//! hydrasat - Distributed exact model counting
//!
//! A cube-and-conquer coordinator for #SAT: the formula's search space is
//! split into cubes (partial assignments), remote workers count each cube
//! with an external model counter, and cubes whose workers run out of time
//! are split further. Counts are summed with arbitrary precision.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`cube`] - Cubes, the splitter and the initial partition
//! - [`checkbook`] - Outstanding task registry
//! - [`queue`] - Bounded pending-task queue
//! - [`aggregator`] - Arbitrary-precision running total
//! - [`tracker`] - Outstanding-work counter and completion signal
//! - [`formula`] - DIMACS CNF loading
//! - [`coordinator`] - Lifecycle engine, HTTP server and client
//! - [`worker`] - Worker pull loop and counter backends
//! - [`metrics`] - Prometheus metrics
//!
//! # Example
//!
//! ```no_run
//! use hydrasat::coordinator::{CoordinatorConfig, CoordinatorServer};
//! use hydrasat::formula::FormulaView;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let formula = FormulaView::load("problem.cnf")?;
//!     let server = CoordinatorServer::new(CoordinatorConfig::default(), formula)?;
//!     let outcome = server.run(std::future::pending()).await?;
//!     println!("{}", outcome.total);
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod checkbook;
pub mod coordinator;
pub mod cube;
pub mod error;
pub mod formula;
pub mod metrics;
pub mod queue;
pub mod tracker;
pub mod worker;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::coordinator::{
        Coordinator, CoordinatorClient, CoordinatorConfig, CoordinatorServer, SubmitRequest,
    };
    pub use crate::cube::{split, Cube};
    pub use crate::error::{Error, ErrorCategory, HydraErrorTrait, Result};
    pub use crate::formula::FormulaView;
    pub use crate::worker::{ExternalCounter, ModelCounter, Worker, WorkerConfig};
}

// Direct re-exports for convenience
pub use checkbook::{TaskId, NO_WORK_TASK_ID};
pub use cube::Cube;
