//! Stats payload decoding
//!
//! Normalizes a raw Docker stats payload into the typed readings the rate
//! estimator and history store work with.

use crate::runtime::RawStats;
use chrono::{DateTime, Utc};

/// Cumulative CPU counters at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuCounters {
    /// Total CPU time consumed by the container
    pub total_usage: u64,
    /// Total CPU time of the host
    pub system_usage: u64,
}

/// One point-in-time read of a container's counters
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub cpu: CpuCounters,
    /// Counters of the previous sample, absent in single-shot captures
    pub precpu: Option<CpuCounters>,
    pub online_cpus: u64,
    pub mem_usage: u64,
    pub mem_limit: u64,
    /// Received bytes summed over all interfaces
    pub net_rx: u64,
    /// Transmitted bytes summed over all interfaces
    pub net_tx: u64,
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// Decode a raw payload
    pub fn decode(stats: &RawStats) -> Self {
        let cpu = CpuCounters {
            total_usage: stats.cpu_stats.cpu_usage.total_usage,
            system_usage: stats.cpu_stats.system_cpu_usage.unwrap_or(0),
        };

        let previous = CpuCounters {
            total_usage: stats.precpu_stats.cpu_usage.total_usage,
            system_usage: stats.precpu_stats.system_cpu_usage.unwrap_or(0),
        };
        let precpu = (previous.total_usage > 0 && previous.system_usage > 0).then_some(previous);

        let online_cpus = stats.cpu_stats.online_cpus.unwrap_or_else(|| {
            stats
                .cpu_stats
                .cpu_usage
                .percpu_usage
                .as_ref()
                .map(|per_cpu| per_cpu.len() as u64)
                .unwrap_or(0)
        });

        let (net_rx, net_tx) = stats
            .networks
            .as_ref()
            .map(|networks| {
                networks.values().fold((0u64, 0u64), |(rx, tx), net| {
                    (rx.saturating_add(net.rx_bytes), tx.saturating_add(net.tx_bytes))
                })
            })
            .unwrap_or((0, 0));

        Self {
            cpu,
            precpu,
            online_cpus,
            mem_usage: stats.memory_stats.usage.unwrap_or(0),
            mem_limit: stats.memory_stats.limit.unwrap_or(0),
            net_rx,
            net_tx,
            captured_at: parse_read_time(&stats.read).unwrap_or_else(Utc::now),
        }
    }

    /// Whether the runtime reports the container as consuming CPU
    pub fn is_running(&self) -> bool {
        self.online_cpus > 0 && self.cpu.total_usage > 0
    }
}

fn parse_read_time(raw: &str) -> Option<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw).ok()?.with_timezone(&Utc);
    (parsed.timestamp() > 0).then_some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StatsFixture;

    #[test]
    fn test_decode_streaming_payload() {
        let stats = StatsFixture::new()
            .cpu(150, 1100)
            .precpu(100, 1000)
            .online_cpus(4)
            .memory(50_000_000, 100_000_000)
            .network("eth0", 1000, 2000)
            .network("eth1", 500, 250)
            .build();

        let snapshot = Snapshot::decode(&stats);

        assert_eq!(
            snapshot.cpu,
            CpuCounters {
                total_usage: 150,
                system_usage: 1100
            }
        );
        assert_eq!(
            snapshot.precpu,
            Some(CpuCounters {
                total_usage: 100,
                system_usage: 1000
            })
        );
        assert_eq!(snapshot.online_cpus, 4);
        assert_eq!(snapshot.mem_usage, 50_000_000);
        assert_eq!(snapshot.mem_limit, 100_000_000);
        assert_eq!(snapshot.net_rx, 1500);
        assert_eq!(snapshot.net_tx, 2250);
        assert_eq!(snapshot.captured_at.to_rfc3339(), "2025-12-29T14:00:31+00:00");
    }

    #[test]
    fn test_decode_single_shot_has_no_previous_counters() {
        let stats = StatsFixture::new().cpu(150, 1100).online_cpus(2).build();

        let snapshot = Snapshot::decode(&stats);

        assert!(snapshot.precpu.is_none());
        assert!(snapshot.is_running());
    }

    #[test]
    fn test_decode_partial_previous_counters_treated_as_absent() {
        let stats = StatsFixture::new().cpu(150, 1100).precpu(100, 0).build();
        assert!(Snapshot::decode(&stats).precpu.is_none());
    }

    #[test]
    fn test_decode_without_networks() {
        let stats = StatsFixture::new().cpu(10, 20).build();

        let snapshot = Snapshot::decode(&stats);

        assert_eq!(snapshot.net_rx, 0);
        assert_eq!(snapshot.net_tx, 0);
        assert_eq!(snapshot.mem_limit, 0);
    }

    #[test]
    fn test_decode_falls_back_to_per_cpu_count() {
        let stats = StatsFixture::new()
            .cpu(10, 20)
            .per_cpu_usage(vec![1, 2, 3])
            .build();

        assert_eq!(Snapshot::decode(&stats).online_cpus, 3);
    }

    #[test]
    fn test_decode_zero_read_time_uses_now() {
        let before = Utc::now();
        let stats = StatsFixture::new().read("0001-01-01T00:00:00Z").build();

        let snapshot = Snapshot::decode(&stats);

        assert!(snapshot.captured_at >= before);
    }
}
