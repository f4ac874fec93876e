//! Latest CPU rate per container
//!
//! Written by the collector on every tick, read by on-demand stats queries.
//! Entries are never evicted; a container that stops reporting keeps its
//! last value.

use crate::collector::CpuEstimate;
use crate::models::CpuSource;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Most recent CPU rate for one container
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSample {
    pub cpu_percent: f64,
    /// How the collector obtained the value
    pub source: CpuSource,
    pub sampled_at: DateTime<Utc>,
}

impl RateSample {
    pub fn from_estimate(estimate: CpuEstimate, sampled_at: DateTime<Utc>) -> Self {
        Self {
            cpu_percent: estimate.percent.max(0.0),
            source: estimate.source,
            sampled_at,
        }
    }
}

/// Map of short container id -> latest rate
#[derive(Debug, Default)]
pub struct RateCache {
    rates: DashMap<String, RateSample>,
}

impl RateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the rate for a container
    pub fn set(&self, key: &str, sample: RateSample) {
        self.rates.insert(key.to_string(), sample);
    }

    /// Latest rate for a container, if the collector has seen it
    pub fn get(&self, key: &str) -> Option<RateSample> {
        self.rates.get(key).map(|entry| *entry)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(cpu_percent: f64) -> RateSample {
        RateSample {
            cpu_percent,
            source: CpuSource::Measured,
            sampled_at: Utc::now(),
        }
    }

    #[test]
    fn test_get_missing() {
        let cache = RateCache::new();
        assert!(cache.get("abcdef012345").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_overwrites() {
        let cache = RateCache::new();
        cache.set("abcdef012345", sample(12.5));
        cache.set("abcdef012345", sample(30.0));

        assert_eq!(cache.get("abcdef012345").unwrap().cpu_percent, 30.0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_from_estimate_keeps_source() {
        let now = Utc::now();
        let sentinel = RateSample::from_estimate(
            CpuEstimate {
                percent: 0.1,
                source: CpuSource::Estimated,
            },
            now,
        );
        assert_eq!(sentinel.source, CpuSource::Estimated);

        let measured = RateSample::from_estimate(
            CpuEstimate {
                percent: 55.0,
                source: CpuSource::Measured,
            },
            now,
        );
        assert_eq!(measured.source, CpuSource::Measured);
        assert_eq!(measured.sampled_at, now);

        let stopped = RateSample::from_estimate(
            CpuEstimate {
                percent: 0.0,
                source: CpuSource::Unavailable,
            },
            now,
        );
        assert_eq!(stopped.source, CpuSource::Unavailable);
    }

    #[tokio::test]
    async fn test_concurrent_writers_and_readers() {
        let cache = std::sync::Arc::new(RateCache::new());
        let mut handles = Vec::new();

        for i in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let key = format!("container{:04}", i);
                for round in 0..100 {
                    cache.set(&key, sample(round as f64));
                    let read = cache.get(&key).unwrap();
                    assert!(read.cpu_percent >= 0.0);
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len(), 8);
        assert_eq!(cache.get("container0003").unwrap().cpu_percent, 99.0);
    }
}
