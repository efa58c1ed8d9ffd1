//! Coordinator for distributed model counting
//!
//! This module provides the central server that partitions a formula into
//! cubes, hands them to workers, splits cubes whose workers time out, and
//! sums the counts until no work remains.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │         Coordinator Server          │
//! │                                     │
//! │  ┌──────────────────────────────┐  │
//! │  │       Lifecycle Engine       │  │
//! │  │  - Checkbook (task → cube)   │  │
//! │  │  - Pending queue             │  │
//! │  │  - Outstanding-work counter  │  │
//! │  │  - Running total             │  │
//! │  └──────────────────────────────┘  │
//! │                                     │
//! │  ┌──────────────────────────────┐  │
//! │  │        REST API              │  │
//! │  │  POST /api/tasks/acquire     │  │
//! │  │  POST /api/tasks/submit      │  │
//! │  │  GET  /api/health            │  │
//! │  │  GET  /api/stats             │  │
//! │  │  GET  /metrics               │  │
//! │  └──────────────────────────────┘  │
//! └─────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use hydrasat::coordinator::{CoordinatorConfig, CoordinatorServer};
//! use hydrasat::formula::FormulaView;
//!
//! let formula = FormulaView::load("problem.cnf")?;
//! let server = CoordinatorServer::new(CoordinatorConfig::default(), formula)?;
//! let outcome = server.run(std::future::pending()).await?;
//! println!("{}", outcome.total);
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod server;

// Re-export main types
pub use client::{ClientConfig, ClientError, CoordinatorClient};
pub use config::{ConfigError, CoordinatorConfig, MalformedCountPolicy};
pub use engine::{
    Acquired, Coordinator, CoordinatorStats, Resolution, SubmitAck, SubmitRequest, TaskOutcome,
};
pub use error::{CoordinatorError, CoordinatorResult};
pub use server::{CoordinatorServer, RunOutcome, ServerError};
