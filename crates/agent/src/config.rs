//! Agent configuration

use agent_lib::EngineConfig;
use anyhow::{bail, Result};
use serde::Deserialize;
use std::time::Duration;

/// Agent configuration, read from `METRICS_AGENT_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Bearer token required on the container API
    pub token: String,

    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Collector interval in seconds
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// History points kept per series
    #[serde(default = "default_retention_points")]
    pub retention_points: usize,

    /// Budget for a single Docker call in seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Containers sampled concurrently within one tick
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Traefik access log used for request counts
    #[serde(default = "default_access_log_path")]
    pub access_log_path: String,

    /// Docker socket path; local defaults when unset
    #[serde(default)]
    pub docker_socket: Option<String>,

    /// Name reported in lifecycle logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
}

fn default_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(3000)
}

fn default_interval() -> u64 {
    300
}

fn default_retention_points() -> usize {
    agent_lib::history::DEFAULT_MAX_POINTS
}

fn default_call_timeout() -> u64 {
    30
}

fn default_max_concurrency() -> usize {
    4
}

fn default_access_log_path() -> String {
    std::env::var("TRAEFIK_LOG_PATH").unwrap_or_else(|_| "/var/log/traefik/access.log".to_string())
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_env(config::Environment::with_prefix("METRICS_AGENT"))
    }

    fn from_env(env: config::Environment) -> Result<Self> {
        let config: AgentConfig = config::Config::builder()
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            bail!("METRICS_AGENT_TOKEN must not be empty");
        }
        if self.interval_secs == 0 {
            bail!("METRICS_AGENT_INTERVAL_SECS must be positive");
        }
        if self.call_timeout_secs == 0 {
            bail!("METRICS_AGENT_CALL_TIMEOUT_SECS must be positive");
        }
        Ok(())
    }

    /// Engine tunables derived from this configuration
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            sample_interval: Duration::from_secs(self.interval_secs),
            retention_points: self.retention_points,
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            max_concurrency: self.max_concurrency.max(1),
        }
    }
}
