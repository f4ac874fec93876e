//! Core data models for the metrics agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Convert a byte count to mebibytes
pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// Container listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub status: String,
    pub created: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Where a reported CPU percentage came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuSource {
    /// Computed from two counter readings of the same container
    Measured,
    /// Borrowed from the collector's last tick
    Cached,
    /// Placeholder for a running container that could not be measured
    Estimated,
    /// No usable reading
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuStats {
    pub usage_percent: f64,
    pub cores: f64,
    pub limit_cores: f64,
    pub source: CpuSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub usage_bytes: u64,
    pub usage_mb: f64,
    pub limit_bytes: u64,
    pub limit_mb: f64,
    pub usage_percent: f64,
}

impl MemoryStats {
    /// Derive memory figures; a zero limit reports 0%
    pub fn from_bytes(usage_bytes: u64, limit_bytes: u64) -> Self {
        let usage_percent = if limit_bytes > 0 {
            usage_bytes as f64 / limit_bytes as f64 * 100.0
        } else {
            0.0
        };

        Self {
            usage_bytes,
            usage_mb: bytes_to_mb(usage_bytes),
            limit_bytes,
            limit_mb: bytes_to_mb(limit_bytes),
            usage_percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub rx_bytes: u64,
    pub rx_mb: f64,
    pub tx_bytes: u64,
    pub tx_mb: f64,
}

impl NetworkStats {
    pub fn from_bytes(rx_bytes: u64, tx_bytes: u64) -> Self {
        Self {
            rx_bytes,
            rx_mb: bytes_to_mb(rx_bytes),
            tx_bytes,
            tx_mb: bytes_to_mb(tx_bytes),
        }
    }
}

/// Combined point-in-time view of one container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStats {
    pub container_id: String,
    pub container_name: String,
    pub timestamp: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub network: NetworkStats,
}

/// Cumulative network totals at one tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkHistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub rx_mb: f64,
    pub tx_mb: f64,
}

/// Single metric value at one tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricHistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// The three history series of one container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerHistory {
    pub network: Vec<NetworkHistoryPoint>,
    pub cpu: Vec<MetricHistoryPoint>,
    pub memory: Vec<MetricHistoryPoint>,
}

/// History together with the stored key it was resolved to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedHistory {
    pub container_id: String,
    #[serde(flatten)]
    pub history: ContainerHistory,
}

/// Stats for every running container at one instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllStats {
    pub timestamp: DateTime<Utc>,
    pub containers: Vec<ContainerStats>,
}

/// Request counts for one domain from the access log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStats {
    pub domain: String,
    #[serde(rename = "today")]
    pub today_count: u64,
    #[serde(rename = "total")]
    pub total_count: u64,
}

impl RequestStats {
    pub fn empty(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }
}

/// Stats, history and optional request counts for one container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerOverview {
    pub container_id: String,
    pub stats: ContainerStats,
    pub history: ContainerHistory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<RequestStats>,
}

/// Requested resource limits; unset or non-positive values are left alone
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default)]
    pub cpu_cores: Option<f64>,
    #[serde(default)]
    pub memory_mb: Option<i64>,
}
