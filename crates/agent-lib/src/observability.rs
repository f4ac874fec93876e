//! Observability infrastructure for the metrics agent
//!
//! Provides:
//! - Prometheus metrics (tick duration, containers sampled, sample errors, tracked series)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for tick durations (in seconds)
const TICK_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct AgentMetricsInner {
    tick_duration_seconds: Histogram,
    containers_sampled: IntGauge,
    sample_errors: IntCounter,
    ticks_failed: IntCounter,
    series_tracked: IntGauge,
    limit_updates: IntCounter,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            tick_duration_seconds: register_histogram!(
                "metrics_agent_tick_duration_seconds",
                "Time spent sampling all containers in one collector tick",
                TICK_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_duration_seconds"),

            containers_sampled: register_int_gauge!(
                "metrics_agent_containers_sampled",
                "Number of containers sampled successfully in the last tick"
            )
            .expect("Failed to register containers_sampled"),

            sample_errors: register_int_counter!(
                "metrics_agent_sample_errors_total",
                "Total number of per-container sampling failures"
            )
            .expect("Failed to register sample_errors"),

            ticks_failed: register_int_counter!(
                "metrics_agent_ticks_failed_total",
                "Total number of ticks aborted because containers could not be listed"
            )
            .expect("Failed to register ticks_failed"),

            series_tracked: register_int_gauge!(
                "metrics_agent_series_tracked",
                "Number of containers with stored history"
            )
            .expect("Failed to register series_tracked"),

            limit_updates: register_int_counter!(
                "metrics_agent_limit_updates_total",
                "Total number of resource limit updates applied"
            )
            .expect("Failed to register limit_updates"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new)
    }

    /// Record the outcome of a completed tick
    pub fn observe_tick(&self, duration_secs: f64, sampled: usize, failed: usize) {
        let inner = self.inner();
        inner.tick_duration_seconds.observe(duration_secs);
        inner.containers_sampled.set(sampled as i64);
        inner.sample_errors.inc_by(failed as u64);
    }

    /// Count a tick aborted by a listing failure
    pub fn inc_ticks_failed(&self) {
        self.inner().ticks_failed.inc();
    }

    pub fn set_series_tracked(&self, count: usize) {
        self.inner().series_tracked.set(count as i64);
    }

    pub fn inc_limit_updates(&self) {
        self.inner().limit_updates.inc();
    }
}

/// Structured logger for agent lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, port: u16) {
        info!(
            event = "agent_started",
            instance = %self.instance,
            agent_version = %version,
            port = port,
            "Metrics agent started"
        );
    }

    /// Log a successful runtime handshake
    pub fn log_runtime_connected(&self, endpoint: &str) {
        info!(
            event = "runtime_connected",
            instance = %self.instance,
            endpoint = %endpoint,
            "Connected to container runtime"
        );
    }

    /// Log a resource limits change
    pub fn log_limits_update(
        &self,
        container_id: &str,
        nano_cpus: Option<i64>,
        memory_bytes: Option<i64>,
        success: bool,
    ) {
        if success {
            info!(
                event = "limits_updated",
                instance = %self.instance,
                container_id = %container_id,
                nano_cpus = ?nano_cpus,
                memory_bytes = ?memory_bytes,
                "Updated container resource limits"
            );
        } else {
            warn!(
                event = "limits_update_failed",
                instance = %self.instance,
                container_id = %container_id,
                nano_cpus = ?nano_cpus,
                memory_bytes = ?memory_bytes,
                "Runtime rejected resource limits update"
            );
        }
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Metrics agent shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_metrics_creation() {
        // Metrics live in the global Prometheus registry; repeated handles
        // share one registration.
        let metrics = AgentMetrics::new();
        let again = AgentMetrics::new();

        metrics.observe_tick(0.5, 3, 1);
        metrics.inc_ticks_failed();
        again.set_series_tracked(3);
        again.inc_limit_updates();
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-host");
        assert_eq!(logger.instance, "test-host");
    }
}
