//! In-memory runtime and stats fixtures shared by the crate's tests

use crate::error::{AgentError, Result};
use crate::runtime::{ContainerDetails, ContainerRuntime, ContainerSummary, RawStats, ResourceUpdate};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Builder for Docker-shaped stats payloads
#[derive(Debug, Clone)]
pub struct StatsFixture {
    read: String,
    cpu: (u64, Option<u64>),
    precpu: (u64, Option<u64>),
    online_cpus: Option<u64>,
    per_cpu_usage: Option<Vec<u64>>,
    memory: (Option<u64>, Option<u64>),
    networks: Map<String, Value>,
}

impl Default for StatsFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsFixture {
    pub fn new() -> Self {
        Self {
            read: "2025-12-29T14:00:31Z".to_string(),
            cpu: (0, None),
            precpu: (0, None),
            online_cpus: None,
            per_cpu_usage: None,
            memory: (None, None),
            networks: Map::new(),
        }
    }

    pub fn read(mut self, read: &str) -> Self {
        self.read = read.to_string();
        self
    }

    pub fn cpu(mut self, total_usage: u64, system_usage: u64) -> Self {
        self.cpu = (total_usage, Some(system_usage));
        self
    }

    pub fn precpu(mut self, total_usage: u64, system_usage: u64) -> Self {
        self.precpu = (total_usage, Some(system_usage));
        self
    }

    pub fn online_cpus(mut self, online_cpus: u64) -> Self {
        self.online_cpus = Some(online_cpus);
        self
    }

    pub fn per_cpu_usage(mut self, usage: Vec<u64>) -> Self {
        self.per_cpu_usage = Some(usage);
        self
    }

    pub fn memory(mut self, usage: u64, limit: u64) -> Self {
        self.memory = (Some(usage), Some(limit));
        self
    }

    pub fn network(mut self, interface: &str, rx_bytes: u64, tx_bytes: u64) -> Self {
        self.networks.insert(
            interface.to_string(),
            json!({
                "rx_bytes": rx_bytes,
                "rx_packets": 10,
                "rx_errors": 0,
                "rx_dropped": 0,
                "tx_bytes": tx_bytes,
                "tx_packets": 10,
                "tx_errors": 0,
                "tx_dropped": 0
            }),
        );
        self
    }

    fn cpu_block(
        (total_usage, system_usage): (u64, Option<u64>),
        online_cpus: Option<u64>,
        per_cpu_usage: Option<&Vec<u64>>,
    ) -> Value {
        let mut cpu_usage = json!({
            "total_usage": total_usage,
            "usage_in_kernelmode": 0,
            "usage_in_usermode": 0
        });
        if let Some(per_cpu) = per_cpu_usage {
            cpu_usage["percpu_usage"] = json!(per_cpu);
        }

        let mut block = json!({
            "cpu_usage": cpu_usage,
            "throttling_data": {
                "periods": 0,
                "throttled_periods": 0,
                "throttled_time": 0
            }
        });
        if let Some(system) = system_usage {
            block["system_cpu_usage"] = json!(system);
        }
        if let Some(cpus) = online_cpus {
            block["online_cpus"] = json!(cpus);
        }
        block
    }

    pub fn to_json(&self) -> Value {
        let mut memory_stats = Map::new();
        if let Some(usage) = self.memory.0 {
            memory_stats.insert("usage".to_string(), json!(usage));
        }
        if let Some(limit) = self.memory.1 {
            memory_stats.insert("limit".to_string(), json!(limit));
        }

        let mut payload = json!({
            "read": self.read,
            "preread": "0001-01-01T00:00:00Z",
            "num_procs": 0,
            "pids_stats": { "current": 3 },
            "memory_stats": Value::Object(memory_stats),
            "blkio_stats": {
                "io_service_bytes_recursive": null,
                "io_serviced_recursive": null,
                "io_queue_recursive": null,
                "io_service_time_recursive": null,
                "io_wait_time_recursive": null,
                "io_merged_recursive": null,
                "io_time_recursive": null,
                "sectors_recursive": null
            },
            "cpu_stats": Self::cpu_block(self.cpu, self.online_cpus, self.per_cpu_usage.as_ref()),
            "precpu_stats": Self::cpu_block(self.precpu, self.online_cpus, None),
            "storage_stats": {},
            "name": "/fixture",
            "id": "fixture"
        });
        if !self.networks.is_empty() {
            payload["networks"] = Value::Object(self.networks.clone());
        }
        payload
    }

    pub fn build(&self) -> RawStats {
        serde_json::from_value(self.to_json()).expect("stats fixture should deserialize")
    }
}

/// One container known to [`MockRuntime`]
#[derive(Debug, Clone)]
pub struct MockContainer {
    pub id: String,
    pub name: String,
    pub state: String,
    pub nano_cpus: i64,
    pub memory_limit: i64,
    pub started_at: Option<String>,
    pub streaming: Option<RawStats>,
    pub single_shot: Option<RawStats>,
    pub stats_delay: Option<Duration>,
}

impl MockContainer {
    pub fn running(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            state: "running".to_string(),
            nano_cpus: 0,
            memory_limit: 0,
            started_at: Some("2025-12-29T14:00:31.427569156Z".to_string()),
            streaming: None,
            single_shot: None,
            stats_delay: None,
        }
    }

    pub fn stopped(id: &str, name: &str) -> Self {
        Self {
            state: "exited".to_string(),
            ..Self::running(id, name)
        }
    }

    pub fn streaming(mut self, stats: StatsFixture) -> Self {
        self.streaming = Some(stats.build());
        self
    }

    pub fn single_shot(mut self, stats: StatsFixture) -> Self {
        self.single_shot = Some(stats.build());
        self
    }

    pub fn limits(mut self, nano_cpus: i64, memory_limit: i64) -> Self {
        self.nano_cpus = nano_cpus;
        self.memory_limit = memory_limit;
        self
    }

    pub fn stats_delay(mut self, delay: Duration) -> Self {
        self.stats_delay = Some(delay);
        self
    }

    fn matches(&self, query: &str) -> bool {
        self.id == query || self.name == query || (!query.is_empty() && self.id.starts_with(query))
    }
}

#[derive(Debug, Default)]
struct MockState {
    containers: Vec<MockContainer>,
    fail_listing: bool,
    list_delay: Option<Duration>,
    reject_updates: Option<String>,
    updates: Vec<(String, ResourceUpdate)>,
}

/// Container runtime backed by a fixed set of containers
#[derive(Debug, Default)]
pub struct MockRuntime {
    state: Mutex<MockState>,
    stats_calls: AtomicUsize,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(self, container: MockContainer) -> Self {
        self.state.lock().unwrap().containers.push(container);
        self
    }

    pub fn fail_listing(&self, fail: bool) {
        self.state.lock().unwrap().fail_listing = fail;
    }

    pub fn list_delay(&self, delay: Duration) {
        self.state.lock().unwrap().list_delay = Some(delay);
    }

    pub fn reject_updates(&self, message: &str) {
        self.state.lock().unwrap().reject_updates = Some(message.to_string());
    }

    pub fn updates(&self) -> Vec<(String, ResourceUpdate)> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    fn find(&self, id: &str) -> Result<MockContainer> {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .find(|c| c.matches(id))
            .cloned()
            .ok_or_else(|| AgentError::unavailable(id, "No such container"))
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn ping(&self) -> Result<()> {
        if self.state.lock().unwrap().fail_listing {
            return Err(AgentError::unreachable("connection refused"));
        }
        Ok(())
    }

    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerSummary>> {
        let delay = self.state.lock().unwrap().list_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock().unwrap();
        if state.fail_listing {
            return Err(AgentError::unreachable("connection refused"));
        }

        Ok(state
            .containers
            .iter()
            .filter(|c| include_stopped || c.state == "running")
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                names: vec![format!("/{}", c.name)],
                state: c.state.clone(),
                created_at: Utc.with_ymd_and_hms(2025, 12, 1, 8, 0, 0).unwrap(),
            })
            .collect())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerDetails> {
        let container = self.find(id)?;
        Ok(ContainerDetails {
            id: container.id,
            name: container.name,
            started_at: container.started_at,
            nano_cpus: container.nano_cpus,
            memory_limit: container.memory_limit,
        })
    }

    async fn stats(&self, id: &str, streaming: bool) -> Result<RawStats> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        let container = self.find(id)?;

        if let Some(delay) = container.stats_delay {
            tokio::time::sleep(delay).await;
        }

        let stats = if streaming {
            container.streaming
        } else {
            container.single_shot.or(container.streaming)
        };
        stats.ok_or_else(|| AgentError::malformed(id, "unexpected EOF"))
    }

    async fn update(&self, id: &str, update: ResourceUpdate) -> Result<()> {
        self.find(id)?;
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.reject_updates.clone() {
            return Err(AgentError::UpdateRejected {
                container_id: id.to_string(),
                message,
            });
        }
        state.updates.push((id.to_string(), update));
        Ok(())
    }
}
