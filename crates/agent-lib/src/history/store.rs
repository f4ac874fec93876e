//! Per-container history storage

use super::series::BoundedSeries;
use crate::models::{ContainerHistory, MetricHistoryPoint, NetworkHistoryPoint};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Default retention: 24 hours at a 5 minute cadence
pub const DEFAULT_MAX_POINTS: usize = 288;

/// Values sampled for one container in one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSample {
    pub timestamp: DateTime<Utc>,
    pub rx_mb: f64,
    pub tx_mb: f64,
    pub cpu_percent: f64,
    pub memory_mb: f64,
}

#[derive(Debug)]
struct SeriesSet {
    network: BoundedSeries<NetworkHistoryPoint>,
    cpu: BoundedSeries<MetricHistoryPoint>,
    memory: BoundedSeries<MetricHistoryPoint>,
}

impl SeriesSet {
    fn new(max_points: usize) -> Self {
        Self {
            network: BoundedSeries::with_capacity(max_points),
            cpu: BoundedSeries::with_capacity(max_points),
            memory: BoundedSeries::with_capacity(max_points),
        }
    }

    fn snapshot(&self) -> ContainerHistory {
        ContainerHistory {
            network: self.network.to_vec(),
            cpu: self.cpu.to_vec(),
            memory: self.memory.to_vec(),
        }
    }
}

/// Bounded network, CPU and memory history keyed by short container id
#[derive(Debug)]
pub struct HistoryStore {
    series: RwLock<HashMap<String, SeriesSet>>,
    max_points: usize,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POINTS)
    }
}

impl HistoryStore {
    pub fn new(max_points: usize) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            max_points,
        }
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    /// Append one tick to all three series of a container under a single
    /// write lock, keeping them time-aligned
    pub async fn record(&self, key: &str, sample: TickSample) {
        let mut series = self.series.write().await;
        let set = series
            .entry(key.to_string())
            .or_insert_with(|| SeriesSet::new(self.max_points));

        set.network.push(NetworkHistoryPoint {
            timestamp: sample.timestamp,
            rx_mb: sample.rx_mb,
            tx_mb: sample.tx_mb,
        });
        set.cpu.push(MetricHistoryPoint {
            timestamp: sample.timestamp,
            value: sample.cpu_percent,
        });
        set.memory.push(MetricHistoryPoint {
            timestamp: sample.timestamp,
            value: sample.memory_mb,
        });
    }

    pub async fn append_network(&self, key: &str, point: NetworkHistoryPoint) {
        let mut series = self.series.write().await;
        series
            .entry(key.to_string())
            .or_insert_with(|| SeriesSet::new(self.max_points))
            .network
            .push(point);
    }

    pub async fn append_cpu(&self, key: &str, point: MetricHistoryPoint) {
        let mut series = self.series.write().await;
        series
            .entry(key.to_string())
            .or_insert_with(|| SeriesSet::new(self.max_points))
            .cpu
            .push(point);
    }

    pub async fn append_memory(&self, key: &str, point: MetricHistoryPoint) {
        let mut series = self.series.write().await;
        series
            .entry(key.to_string())
            .or_insert_with(|| SeriesSet::new(self.max_points))
            .memory
            .push(point);
    }

    /// All three series for a key; empty when the key is unknown
    pub async fn read_all(&self, key: &str) -> ContainerHistory {
        let series = self.series.read().await;
        series
            .get(key)
            .map(SeriesSet::snapshot)
            .unwrap_or_default()
    }

    /// Map a caller-supplied id onto a stored key.
    ///
    /// An exact key wins; otherwise the first stored key where either side
    /// is a prefix of the other. Iteration order is unspecified, so an
    /// ambiguous prefix may match any candidate. Without a match the query
    /// is returned verbatim and later lookups simply find no series.
    pub async fn resolve(&self, query: &str) -> String {
        if query.is_empty() {
            return String::new();
        }

        let series = self.series.read().await;
        if series.contains_key(query) {
            return query.to_string();
        }

        series
            .keys()
            .find(|stored| stored.starts_with(query) || query.starts_with(stored.as_str()))
            .cloned()
            .unwrap_or_else(|| query.to_string())
    }

    /// Number of containers with stored history
    pub async fn len(&self) -> usize {
        self.series.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.series.read().await.is_empty()
    }
}
