//! Periodic collection loop
//!
//! Samples every running container on a fixed interval, records one history
//! point per series and refreshes the rate cache. The first tick runs
//! immediately. A listing failure skips the whole tick; a failing container
//! only skips itself. The next tick always retries.

use super::decoder::Snapshot;
use super::rate::CpuEstimate;
use crate::cache::{RateCache, RateSample};
use crate::config::EngineConfig;
use crate::error::{AgentError, Result};
use crate::health::{components, HealthRegistry};
use crate::history::{HistoryStore, TickSample};
use crate::identity::short_id;
use crate::models::bytes_to_mb;
use crate::observability::AgentMetrics;
use crate::runtime::{bounded, ContainerRuntime};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Outcome of one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub sampled: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

/// Shared state each per-container task needs
#[derive(Clone)]
struct Sampler {
    runtime: Arc<dyn ContainerRuntime>,
    history: Arc<HistoryStore>,
    rates: Arc<RateCache>,
    call_timeout: Duration,
}

impl Sampler {
    /// Sample one container and write the results. Returns its short id.
    async fn sample(&self, container_id: String, timestamp: DateTime<Utc>) -> Result<String> {
        let stats = bounded(
            &container_id,
            self.call_timeout,
            self.runtime.stats(&container_id, true),
        )
        .await?;

        let snapshot = Snapshot::decode(&stats);
        let estimate = CpuEstimate::from_snapshot(&snapshot);
        let key = short_id(&container_id).to_string();

        self.rates
            .set(&key, RateSample::from_estimate(estimate, timestamp));
        self.history
            .record(
                &key,
                TickSample {
                    timestamp,
                    rx_mb: bytes_to_mb(snapshot.net_rx),
                    tx_mb: bytes_to_mb(snapshot.net_tx),
                    cpu_percent: estimate.percent,
                    memory_mb: bytes_to_mb(snapshot.mem_usage),
                },
            )
            .await;

        Ok(key)
    }
}

/// Metrics collection loop that periodically samples all containers
pub struct CollectionLoop {
    sampler: Sampler,
    config: EngineConfig,
    health: Option<HealthRegistry>,
    metrics: AgentMetrics,
}

impl CollectionLoop {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        history: Arc<HistoryStore>,
        rates: Arc<RateCache>,
        config: EngineConfig,
    ) -> Self {
        Self {
            sampler: Sampler {
                runtime,
                history,
                rates,
                call_timeout: config.call_timeout,
            },
            config,
            health: None,
            metrics: AgentMetrics::new(),
        }
    }

    /// Report collector health into a registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Run until a shutdown signal arrives
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.sample_interval.as_secs(),
            retention_points = self.sampler.history.max_points(),
            "Starting metrics collection loop"
        );

        let mut ticker = interval(self.config.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = shutdown.recv() => {
                    info!("Shutting down metrics collection loop");
                    break;
                }
            }
        }
    }

    /// One tick with health and metrics bookkeeping
    async fn tick(&self) {
        match self.collect_once().await {
            Ok(report) => {
                debug!(
                    sampled = report.sampled,
                    failed = report.failed,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Collection tick complete"
                );
                self.metrics.observe_tick(
                    report.elapsed.as_secs_f64(),
                    report.sampled,
                    report.failed,
                );
                self.metrics
                    .set_series_tracked(self.sampler.history.len().await);
                if let Some(health) = &self.health {
                    health.set_healthy(components::COLLECTOR).await;
                    health.set_healthy(components::RUNTIME).await;
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to list containers, skipping tick");
                self.metrics.inc_ticks_failed();
                if let Some(health) = &self.health {
                    health
                        .set_degraded(components::COLLECTOR, "last tick skipped")
                        .await;
                    health
                        .set_degraded(components::RUNTIME, e.to_string())
                        .await;
                }
            }
        }
    }

    /// Sample all running containers once
    pub async fn collect_once(&self) -> Result<TickReport> {
        let start = Instant::now();
        let timestamp = Utc::now();

        let containers = bounded(
            "*",
            self.sampler.call_timeout,
            self.sampler.runtime.list_containers(false),
        )
        .await
        .map_err(|e| match e {
            AgentError::Timeout { timeout, .. } => {
                AgentError::unreachable(format!("listing timed out after {:?}", timeout))
            }
            other => other,
        })?;

        let permits = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for container in containers {
            let sampler = self.sampler.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let id = container.id;
                let result = sampler.sample(id.clone(), timestamp).await;
                (id, result)
            });
        }

        let mut report = TickReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(_))) => report.sampled += 1,
                Ok((container_id, Err(e))) => {
                    report.failed += 1;
                    debug!(
                        container_id = %container_id,
                        error = %e,
                        "Failed to sample container"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(error = %e, "Sampling task aborted");
                }
            }
        }

        report.elapsed = start.elapsed();
        Ok(report)
    }
}

/// Builder for creating the collection loop
pub struct CollectionLoopBuilder {
    runtime: Option<Arc<dyn ContainerRuntime>>,
    history: Option<Arc<HistoryStore>>,
    rates: Option<Arc<RateCache>>,
    health: Option<HealthRegistry>,
    config: EngineConfig,
}

impl CollectionLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            runtime: None,
            history: None,
            rates: None,
            health: None,
            config: EngineConfig::default(),
        }
    }

    pub fn runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn history(mut self, history: Arc<HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn rates(mut self, rates: Arc<RateCache>) -> Self {
        self.rates = Some(rates);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the sampling interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.sample_interval = interval;
        self
    }

    /// Set the per-call timeout
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Build the collection loop
    pub fn build(self) -> anyhow::Result<CollectionLoop> {
        let runtime = self
            .runtime
            .ok_or_else(|| anyhow::anyhow!("Runtime is required"))?;
        let history = self
            .history
            .ok_or_else(|| anyhow::anyhow!("History store is required"))?;
        let rates = self.rates.unwrap_or_default();

        let collection_loop = CollectionLoop::new(runtime, history, rates, self.config);
        Ok(match self.health {
            Some(health) => collection_loop.with_health(health),
            None => collection_loop,
        })
    }
}

impl Default for CollectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockContainer, MockRuntime};

    #[test]
    fn test_builder_requires_runtime() {
        let result = CollectionLoopBuilder::new()
            .history(Arc::new(HistoryStore::default()))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_requires_history() {
        let result = CollectionLoopBuilder::new()
            .runtime(Arc::new(MockRuntime::new()))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_applies_overrides() {
        let collection_loop = CollectionLoopBuilder::new()
            .runtime(Arc::new(MockRuntime::new()))
            .history(Arc::new(HistoryStore::default()))
            .interval(Duration::from_secs(60))
            .call_timeout(Duration::from_secs(2))
            .build()
            .unwrap();

        assert_eq!(collection_loop.config.sample_interval, Duration::from_secs(60));
        assert_eq!(collection_loop.sampler.call_timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_collect_once_empty_runtime() {
        let collection_loop = CollectionLoopBuilder::new()
            .runtime(Arc::new(MockRuntime::new()))
            .history(Arc::new(HistoryStore::default()))
            .build()
            .unwrap();

        let report = collection_loop.collect_once().await.unwrap();
        assert_eq!(report.sampled, 0);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_collect_once_skips_stopped_containers() {
        let runtime = Arc::new(
            MockRuntime::new()
                .with_container(MockContainer::stopped("deadbeef00001111", "old-job")),
        );
        let collection_loop = CollectionLoopBuilder::new()
            .runtime(runtime.clone())
            .history(Arc::new(HistoryStore::default()))
            .build()
            .unwrap();

        let report = collection_loop.collect_once().await.unwrap();
        assert_eq!(report.sampled, 0);
        assert_eq!(runtime.stats_calls(), 0);
    }
}
