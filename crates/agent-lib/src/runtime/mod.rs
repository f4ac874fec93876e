//! Container runtime collaborator
//!
//! The engine talks to the runtime only through [`ContainerRuntime`], so the
//! collector and query engine can be exercised against an in-memory runtime
//! in tests. [`DockerRuntime`] is the production implementation.

mod docker;

pub use docker::DockerRuntime;

use crate::error::{AgentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Raw stats payload as reported by the Docker engine
pub use bollard::container::Stats as RawStats;

/// Container as returned by a runtime listing
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: String,
    pub names: Vec<String>,
    pub state: String,
    pub created_at: DateTime<Utc>,
}

impl ContainerSummary {
    /// Primary name without the leading `/` the runtime adds
    pub fn display_name(&self) -> String {
        self.names
            .first()
            .map(|name| name.trim_start_matches('/').to_string())
            .unwrap_or_default()
    }
}

/// Subset of a container inspection the engine needs
#[derive(Debug, Clone, Default)]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    pub started_at: Option<String>,
    /// Configured CPU quota in units of 1e-9 CPUs; 0 when unset
    pub nano_cpus: i64,
    /// Configured memory limit in bytes; 0 when unset
    pub memory_limit: i64,
}

impl ContainerDetails {
    /// Start time, or `None` when absent, unparsable or the zero time
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.started_at.as_deref()?;
        let parsed = DateTime::parse_from_rfc3339(raw).ok()?.with_timezone(&Utc);
        (parsed.timestamp() > 0).then_some(parsed)
    }
}

/// Resource update sent to the runtime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUpdate {
    pub nano_cpus: Option<i64>,
    pub memory_bytes: Option<i64>,
    pub memory_swap_bytes: Option<i64>,
}

/// Operations the engine consumes from a container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check that the runtime answers
    async fn ping(&self) -> Result<()>;

    /// List containers, optionally including stopped ones
    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerSummary>>;

    /// Inspect a single container by id or name
    async fn inspect(&self, id: &str) -> Result<ContainerDetails>;

    /// Capture one stats payload. A streaming capture carries previous
    /// counters suitable for a delta; a non-streaming one may not.
    async fn stats(&self, id: &str, streaming: bool) -> Result<RawStats>;

    /// Apply a resource update
    async fn update(&self, id: &str, update: ResourceUpdate) -> Result<()>;
}

/// Run a runtime call with a time budget; expiry counts as that container's
/// failure.
pub async fn bounded<T, F>(container_id: &str, timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(AgentError::Timeout {
            container_id: container_id.to_string(),
            timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_strips_slash() {
        let summary = ContainerSummary {
            id: "abc".to_string(),
            names: vec!["/web-frontend".to_string(), "/alias".to_string()],
            state: "running".to_string(),
            created_at: Utc::now(),
        };
        assert_eq!(summary.display_name(), "web-frontend");

        let unnamed = ContainerSummary {
            names: vec![],
            ..summary
        };
        assert_eq!(unnamed.display_name(), "");
    }

    #[test]
    fn test_started_at_parsing() {
        let details = ContainerDetails {
            started_at: Some("2025-12-29T14:00:31.427569156Z".to_string()),
            ..Default::default()
        };
        let started = details.started_at().unwrap();
        assert_eq!(started.to_rfc3339(), "2025-12-29T14:00:31.427569156+00:00");

        let never = ContainerDetails {
            started_at: Some("0001-01-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        assert!(never.started_at().is_none());

        let garbage = ContainerDetails {
            started_at: Some("yesterday".to_string()),
            ..Default::default()
        };
        assert!(garbage.started_at().is_none());
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<()> = bounded("abc", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(AgentError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let result = bounded("abc", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
