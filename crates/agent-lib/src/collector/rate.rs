//! CPU rate estimation from cumulative counters
//!
//! A true utilization percentage needs two counter reads of the same
//! container. The collector gets both from a streaming capture; on-demand
//! queries only get one, so they borrow the collector's cached rate and fall
//! back to [`RUNNING_SENTINEL_PERCENT`] when nothing is cached.

use super::decoder::{CpuCounters, Snapshot};
use crate::cache::RateSample;
use crate::models::CpuSource;

/// Placeholder reported for a running container whose rate cannot be
/// measured from a single snapshot. It only marks the container as
/// "running, unmeasured" for clients that read 0 as idle; it is not a
/// measurement.
pub const RUNNING_SENTINEL_PERCENT: f64 = 0.1;

/// A CPU percentage and where it came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuEstimate {
    pub percent: f64,
    pub source: CpuSource,
}

impl CpuEstimate {
    fn new(percent: f64, source: CpuSource) -> Self {
        Self { percent, source }
    }

    /// Collector path: delta mode when previous counters are present,
    /// otherwise the running sentinel rule.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        match snapshot.precpu {
            Some(previous) => Self::new(
                delta_percent(previous, snapshot.cpu, snapshot.online_cpus),
                CpuSource::Measured,
            ),
            None if snapshot.is_running() => {
                Self::new(RUNNING_SENTINEL_PERCENT, CpuSource::Estimated)
            }
            None => Self::new(0.0, CpuSource::Unavailable),
        }
    }
}

/// Delta mode: `(Δtotal / Δsystem) × online_cpus × 100`, truncated to
/// hundredths. Any non-positive delta yields 0.
pub fn delta_percent(previous: CpuCounters, current: CpuCounters, online_cpus: u64) -> f64 {
    let cpu_delta = current.total_usage.saturating_sub(previous.total_usage);
    let system_delta = current.system_usage.saturating_sub(previous.system_usage);

    if cpu_delta == 0 || system_delta == 0 {
        return 0.0;
    }

    let percent = (cpu_delta as f64 / system_delta as f64) * online_cpus as f64 * 100.0;
    if !percent.is_finite() {
        return 0.0;
    }
    truncate_hundredths(percent)
}

/// Fallback mode for single-snapshot queries: a cached rate wins, then a
/// delta if the snapshot happens to carry previous counters, then the
/// sentinel rule. A cached sentinel stays labelled as an estimate and a
/// cached unmeasurable reading stays unavailable.
pub fn estimate(snapshot: &Snapshot, cached: Option<RateSample>) -> CpuEstimate {
    match cached {
        Some(sample) => {
            let source = match sample.source {
                CpuSource::Measured | CpuSource::Cached => CpuSource::Cached,
                other => other,
            };
            CpuEstimate::new(sample.cpu_percent, source)
        }
        None => CpuEstimate::from_snapshot(snapshot),
    }
}

fn truncate_hundredths(value: f64) -> f64 {
    (value * 100.0).trunc() / 100.0
}
