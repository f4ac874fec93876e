//! On-demand queries over the runtime, the rate cache and the history store
//!
//! Live stats combine a fresh single-shot snapshot with the collector's
//! cached CPU rate, since a single snapshot cannot yield a true rate.

use crate::cache::RateCache;
use crate::collector::{estimate, Snapshot};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::history::HistoryStore;
use crate::identity::short_id;
use crate::models::{
    AllStats, ContainerInfo, ContainerOverview, ContainerStats, CpuStats, MemoryStats,
    NetworkStats, RequestStats, ResolvedHistory, ResourceLimits,
};
use crate::runtime::{bounded, ContainerRuntime, ContainerSummary, ResourceUpdate};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const NANO_CPUS_PER_CORE: f64 = 1e9;
const BYTES_PER_MB: i64 = 1024 * 1024;

impl ResourceLimits {
    /// Translate into runtime units. Swap is pinned to the memory limit.
    pub fn to_update(&self) -> ResourceUpdate {
        let nano_cpus = self
            .cpu_cores
            .filter(|cores| *cores > 0.0)
            .map(|cores| (cores * NANO_CPUS_PER_CORE) as i64);
        let memory_bytes = self
            .memory_mb
            .filter(|mb| *mb > 0)
            .map(|mb| mb.saturating_mul(BYTES_PER_MB));

        ResourceUpdate {
            nano_cpus,
            memory_bytes,
            memory_swap_bytes: memory_bytes,
        }
    }
}

fn name_matches(name: &str, filter: Option<&str>) -> bool {
    filter.map_or(true, |f| f.is_empty() || name.contains(f))
}

/// Read side of the engine
#[derive(Clone)]
pub struct QueryEngine {
    runtime: Arc<dyn ContainerRuntime>,
    history: Arc<HistoryStore>,
    rates: Arc<RateCache>,
    call_timeout: Duration,
}

impl QueryEngine {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        history: Arc<HistoryStore>,
        rates: Arc<RateCache>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            runtime,
            history,
            rates,
            call_timeout: config.call_timeout,
        }
    }

    async fn list(&self, include_stopped: bool, filter: Option<&str>) -> Result<Vec<ContainerSummary>> {
        let containers = bounded(
            "*",
            self.call_timeout,
            self.runtime.list_containers(include_stopped),
        )
        .await?;

        Ok(containers
            .into_iter()
            .filter(|c| name_matches(&c.display_name(), filter))
            .collect())
    }

    /// All containers, including stopped ones, optionally filtered by a
    /// case-sensitive substring of the name
    pub async fn list_containers(&self, filter: Option<&str>) -> Result<Vec<ContainerInfo>> {
        let containers = self.list(true, filter).await?;
        let mut result = Vec::with_capacity(containers.len());

        for container in containers {
            let started_at = match bounded(
                &container.id,
                self.call_timeout,
                self.runtime.inspect(&container.id),
            )
            .await
            {
                Ok(details) => details.started_at(),
                Err(e) => {
                    debug!(container_id = %container.id, error = %e, "Inspect failed during listing");
                    None
                }
            };

            result.push(ContainerInfo {
                id: short_id(&container.id).to_string(),
                name: container.display_name(),
                status: container.state.clone(),
                created: container.created_at,
                started_at,
            });
        }

        Ok(result)
    }

    /// Live stats for one container
    pub async fn current_stats(&self, id: &str) -> Result<ContainerStats> {
        let details = bounded(id, self.call_timeout, self.runtime.inspect(id)).await?;
        let stats = bounded(id, self.call_timeout, self.runtime.stats(id, false)).await?;
        let snapshot = Snapshot::decode(&stats);

        let key = short_id(&details.id).to_string();
        let cpu = estimate(&snapshot, self.rates.get(&key));

        let limit_cores = if details.nano_cpus > 0 {
            details.nano_cpus as f64 / NANO_CPUS_PER_CORE
        } else {
            snapshot.online_cpus as f64
        };

        let memory_limit = if details.memory_limit > 0 {
            details.memory_limit as u64
        } else {
            snapshot.mem_limit
        };

        Ok(ContainerStats {
            container_id: key,
            container_name: details.name.trim_start_matches('/').to_string(),
            timestamp: Utc::now(),
            started_at: details.started_at(),
            cpu: CpuStats {
                usage_percent: cpu.percent,
                cores: cpu.percent / 100.0 * limit_cores,
                limit_cores,
                source: cpu.source,
            },
            memory: MemoryStats::from_bytes(snapshot.mem_usage, memory_limit),
            network: NetworkStats::from_bytes(snapshot.net_rx, snapshot.net_tx),
        })
    }

    /// Stored history for an id in short, long or prefix form
    pub async fn history(&self, id: &str) -> ResolvedHistory {
        let container_id = self.history.resolve(id).await;
        let history = self.history.read_all(&container_id).await;
        ResolvedHistory {
            container_id,
            history,
        }
    }

    /// Live stats for every running container; failures are left out
    pub async fn all_stats(&self, filter: Option<&str>) -> Result<AllStats> {
        let containers = self.list(false, filter).await?;
        let mut result = Vec::with_capacity(containers.len());

        for container in containers {
            match self.current_stats(&container.id).await {
                Ok(stats) => result.push(stats),
                Err(e) => debug!(container_id = %container.id, error = %e, "Omitting container from stats"),
            }
        }

        Ok(AllStats {
            timestamp: Utc::now(),
            containers: result,
        })
    }

    /// Stats, history and optional request counts in one view
    pub async fn overview(
        &self,
        id: &str,
        requests: Option<RequestStats>,
    ) -> Result<ContainerOverview> {
        let stats = self.current_stats(id).await?;
        let resolved = self.history(&stats.container_id).await;

        Ok(ContainerOverview {
            container_id: stats.container_id.clone(),
            stats,
            history: resolved.history,
            requests,
        })
    }

    /// Apply resource limits once; a rejection is returned as is
    pub async fn set_limits(&self, id: &str, limits: ResourceLimits) -> Result<ResourceUpdate> {
        let update = limits.to_update();
        bounded(id, self.call_timeout, self.runtime.update(id, update)).await?;
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RateSample;
    use crate::error::AgentError;
    use crate::history::TickSample;
    use crate::models::CpuSource;
    use crate::testing::{MockContainer, MockRuntime, StatsFixture};

    const WEB_ID: &str = "abcdef0123456789abcdef0123456789abcdef0123456789abcdef0123456789";
    const API_ID: &str = "feedface0000feedface0000feedface0000feedface0000feedface0000feed";
    const JOB_ID: &str = "0badc0de1111";

    fn single_shot() -> StatsFixture {
        StatsFixture::new()
            .cpu(150, 1100)
            .online_cpus(4)
            .memory(50_000_000, 100_000_000)
            .network("eth0", 1_048_576, 3_145_728)
    }

    fn engine(runtime: MockRuntime) -> (QueryEngine, Arc<MockRuntime>, Arc<HistoryStore>, Arc<RateCache>) {
        let runtime = Arc::new(runtime);
        let history = Arc::new(HistoryStore::default());
        let rates = Arc::new(RateCache::new());
        let engine = QueryEngine::new(
            runtime.clone(),
            history.clone(),
            rates.clone(),
            &EngineConfig::default(),
        );
        (engine, runtime, history, rates)
    }

    fn fleet() -> MockRuntime {
        MockRuntime::new()
            .with_container(MockContainer::running(WEB_ID, "web-frontend").single_shot(single_shot()))
            .with_container(MockContainer::running(API_ID, "api").single_shot(single_shot()))
            .with_container(MockContainer::stopped(JOB_ID, "web-migrate"))
    }

    #[test]
    fn test_limits_cpu_to_nano_cpus() {
        let update = ResourceLimits {
            cpu_cores: Some(2.0),
            memory_mb: None,
        }
        .to_update();
        assert_eq!(update.nano_cpus, Some(2_000_000_000));
        assert_eq!(update.memory_bytes, None);
        assert_eq!(update.memory_swap_bytes, None);
    }

    #[test]
    fn test_limits_memory_pins_swap() {
        let update = ResourceLimits {
            cpu_cores: None,
            memory_mb: Some(512),
        }
        .to_update();
        assert_eq!(update.memory_bytes, Some(536_870_912));
        assert_eq!(update.memory_swap_bytes, Some(536_870_912));
        assert_eq!(update.nano_cpus, None);
    }

    #[test]
    fn test_limits_ignore_non_positive() {
        let update = ResourceLimits {
            cpu_cores: Some(0.0),
            memory_mb: Some(-1),
        }
        .to_update();
        assert_eq!(update, ResourceUpdate::default());
    }

    #[test]
    fn test_name_filter_is_case_sensitive() {
        assert!(name_matches("web-frontend", Some("web")));
        assert!(!name_matches("WEB-frontend", Some("web")));
        assert!(!name_matches("api", Some("web")));
        assert!(name_matches("api", None));
        assert!(name_matches("api", Some("")));
    }

    #[tokio::test]
    async fn test_list_containers_filters_by_name() {
        let (engine, _, _, _) = engine(fleet());

        let all = engine.list_containers(None).await.unwrap();
        assert_eq!(all.len(), 3);

        let web = engine.list_containers(Some("web")).await.unwrap();
        let names: Vec<_> = web.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["web-frontend", "web-migrate"]);
        assert_eq!(web[0].id, "abcdef012345");
        assert_eq!(web[0].status, "running");
        assert!(web[0].started_at.is_some());
        assert_eq!(web[1].status, "exited");
    }

    #[tokio::test]
    async fn test_list_containers_runtime_failure() {
        let (engine, runtime, _, _) = engine(fleet());
        runtime.fail_listing(true);

        let result = engine.list_containers(None).await;
        assert!(matches!(result, Err(AgentError::RuntimeUnreachable { .. })));
    }

    #[tokio::test]
    async fn test_current_stats_uses_cached_rate() {
        let (engine, _, _, rates) = engine(fleet());
        rates.set(
            "abcdef012345",
            RateSample {
                cpu_percent: 50.0,
                source: CpuSource::Measured,
                sampled_at: Utc::now(),
            },
        );

        let stats = engine.current_stats(WEB_ID).await.unwrap();

        assert_eq!(stats.container_id, "abcdef012345");
        assert_eq!(stats.container_name, "web-frontend");
        assert_eq!(stats.cpu.usage_percent, 50.0);
        assert_eq!(stats.cpu.source, CpuSource::Cached);
        assert_eq!(stats.cpu.limit_cores, 4.0);
        assert_eq!(stats.cpu.cores, 2.0);
        assert_eq!(stats.memory.usage_percent, 50.0);
        assert_eq!(stats.network.rx_mb, 1.0);
        assert_eq!(stats.network.tx_mb, 3.0);
    }

    #[tokio::test]
    async fn test_current_stats_short_id_hits_cache() {
        let (engine, _, _, rates) = engine(fleet());
        rates.set(
            "abcdef012345",
            RateSample {
                cpu_percent: 12.0,
                source: CpuSource::Measured,
                sampled_at: Utc::now(),
            },
        );

        let stats = engine.current_stats("abcdef").await.unwrap();
        assert_eq!(stats.cpu.usage_percent, 12.0);
    }

    #[tokio::test]
    async fn test_current_stats_without_cache_reports_sentinel() {
        let (engine, _, _, _) = engine(fleet());

        let stats = engine.current_stats(WEB_ID).await.unwrap();

        assert_eq!(stats.cpu.usage_percent, 0.1);
        assert_eq!(stats.cpu.source, CpuSource::Estimated);
    }

    #[tokio::test]
    async fn test_current_stats_uses_configured_limits() {
        let runtime = MockRuntime::new().with_container(
            MockContainer::running(WEB_ID, "web")
                .single_shot(single_shot())
                .limits(1_500_000_000, 25_000_000),
        );
        let (engine, _, _, rates) = engine(runtime);
        rates.set(
            "abcdef012345",
            RateSample {
                cpu_percent: 100.0,
                source: CpuSource::Measured,
                sampled_at: Utc::now(),
            },
        );

        let stats = engine.current_stats(WEB_ID).await.unwrap();

        assert_eq!(stats.cpu.limit_cores, 1.5);
        assert_eq!(stats.cpu.cores, 1.5);
        assert_eq!(stats.memory.limit_bytes, 25_000_000);
        assert_eq!(stats.memory.usage_percent, 200.0);
    }

    #[tokio::test]
    async fn test_current_stats_unknown_container() {
        let (engine, _, _, _) = engine(fleet());
        let result = engine.current_stats("nope").await;
        assert!(matches!(result, Err(AgentError::ContainerUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_history_resolves_prefix_and_unknown() {
        let (engine, _, history, _) = engine(fleet());
        history
            .record(
                "abcdef012345",
                TickSample {
                    timestamp: Utc::now(),
                    rx_mb: 1.0,
                    tx_mb: 2.0,
                    cpu_percent: 3.0,
                    memory_mb: 4.0,
                },
            )
            .await;

        let exact = engine.history("abcdef012345").await;
        let short = engine.history("abcdef").await;
        assert_eq!(exact.container_id, "abcdef012345");
        assert_eq!(short.container_id, "abcdef012345");
        assert_eq!(exact.history, short.history);
        assert_eq!(short.history.cpu.len(), 1);

        let unknown = engine.history("something-else").await;
        assert_eq!(unknown.container_id, "something-else");
        assert!(unknown.history.network.is_empty());
        assert!(unknown.history.cpu.is_empty());
        assert!(unknown.history.memory.is_empty());
    }

    #[tokio::test]
    async fn test_all_stats_omits_failures_and_stopped() {
        let runtime = fleet()
            // Listed as running but has no stats to offer
            .with_container(MockContainer::running("cafebabe2222", "web-broken"));
        let (engine, _, _, _) = engine(runtime);

        let all = engine.all_stats(None).await.unwrap();
        let ids: Vec<_> = all.containers.iter().map(|c| c.container_id.as_str()).collect();
        assert_eq!(ids, vec!["abcdef012345", "feedface0000"]);

        let web = engine.all_stats(Some("web")).await.unwrap();
        assert_eq!(web.containers.len(), 1);
        assert_eq!(web.containers[0].container_name, "web-frontend");
    }

    #[tokio::test]
    async fn test_overview_combines_views() {
        let (engine, _, history, _) = engine(fleet());
        history
            .record(
                "abcdef012345",
                TickSample {
                    timestamp: Utc::now(),
                    rx_mb: 1.0,
                    tx_mb: 2.0,
                    cpu_percent: 3.0,
                    memory_mb: 4.0,
                },
            )
            .await;

        let requests = RequestStats {
            domain: "example.com".to_string(),
            today_count: 2,
            total_count: 9,
        };
        let overview = engine.overview(WEB_ID, Some(requests.clone())).await.unwrap();

        assert_eq!(overview.container_id, "abcdef012345");
        assert_eq!(overview.history.memory.len(), 1);
        assert_eq!(overview.requests, Some(requests));

        let without = engine.overview(WEB_ID, None).await.unwrap();
        let json = serde_json::to_value(&without).unwrap();
        assert!(json.get("requests").is_none());
    }

    #[tokio::test]
    async fn test_set_limits_issues_single_update() {
        let (engine, runtime, _, _) = engine(fleet());

        let update = engine
            .set_limits(
                WEB_ID,
                ResourceLimits {
                    cpu_cores: Some(2.0),
                    memory_mb: Some(512),
                },
            )
            .await
            .unwrap();

        assert_eq!(update.nano_cpus, Some(2_000_000_000));
        let updates = runtime.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, WEB_ID);
        assert_eq!(updates[0].1.memory_swap_bytes, Some(536_870_912));
    }

    #[tokio::test]
    async fn test_set_limits_surfaces_rejection() {
        let (engine, runtime, _, _) = engine(fleet());
        runtime.reject_updates("Minimum memory limit allowed is 6MB");

        let err = engine
            .set_limits(
                WEB_ID,
                ResourceLimits {
                    cpu_cores: None,
                    memory_mb: Some(1),
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Minimum memory limit allowed is 6MB");
        assert!(runtime.updates().is_empty());
    }
}
