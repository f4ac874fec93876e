//! Engine for the container metrics sidecar
//!
//! This crate provides the core functionality for:
//! - Sampling container stats from the Docker engine
//! - CPU rate derivation from cumulative counters
//! - Bounded per-container history and the latest-rate cache
//! - On-demand queries and resource limit updates
//! - Health checks and observability

pub mod cache;
pub mod collector;
pub mod config;
pub mod error;
pub mod health;
pub mod history;
pub mod identity;
pub mod models;
pub mod observability;
pub mod query;
pub mod requests;
pub mod runtime;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::{RateCache, RateSample};
pub use config::EngineConfig;
pub use error::{AgentError, Result};
pub use health::{
    AgentStatus, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse,
    ReadinessResponse,
};
pub use history::HistoryStore;
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
pub use query::QueryEngine;
pub use requests::AccessLog;
pub use runtime::{ContainerRuntime, DockerRuntime};
