//! Metrics agent HTTP layer and configuration

pub mod api;
pub mod config;
