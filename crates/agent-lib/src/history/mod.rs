//! In-memory time series of container metrics
//!
//! Each container tracked by the collector gets a network, a CPU and a
//! memory series, all capped at the same retention and all appended in one
//! critical section per tick.

mod series;
mod store;

pub use series::{BoundedSeries, Timestamped};
pub use store::{HistoryStore, TickSample, DEFAULT_MAX_POINTS};
