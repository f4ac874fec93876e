//! Metrics collection from the container runtime
//!
//! This module decodes runtime stats payloads, derives CPU rates from the
//! cumulative counters, and drives the periodic loop that feeds the history
//! store and the rate cache.

mod decoder;
mod r#loop;
mod rate;


pub use decoder::{CpuCounters, Snapshot};
pub use r#loop::{CollectionLoop, CollectionLoopBuilder, TickReport};
pub use rate::{delta_percent, estimate, CpuEstimate, RUNNING_SENTINEL_PERCENT};
