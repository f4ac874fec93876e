//! Engine configuration shared by the collector and the query engine

use crate::history::DEFAULT_MAX_POINTS;
use std::time::Duration;

/// Tunables for sampling, retention and runtime calls
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time between collector ticks (default: 5 minutes)
    pub sample_interval: Duration,
    /// Points kept per series (default: 288, 24h at the default interval)
    pub retention_points: usize,
    /// Budget for a single runtime call (default: 30 seconds)
    pub call_timeout: Duration,
    /// Containers sampled concurrently within one tick (default: 4)
    pub max_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(5 * 60),
            retention_points: DEFAULT_MAX_POINTS,
            call_timeout: Duration::from_secs(30),
            max_concurrency: 4,
        }
    }
}
