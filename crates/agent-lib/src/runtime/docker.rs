//! Docker engine implementation of [`ContainerRuntime`]

use super::{ContainerDetails, ContainerRuntime, ContainerSummary, RawStats, ResourceUpdate};
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use bollard::container::{
    InspectContainerOptions, ListContainersOptions, StatsOptions, UpdateContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::Docker;
use tokio_stream::StreamExt;
use tracing::debug;

/// Seconds bollard waits on a single request before giving up
const CLIENT_TIMEOUT_SECS: u64 = 120;

/// Frames read from a streaming capture before settling for what we have
const MAX_STREAM_FRAMES: usize = 2;

/// Docker client wrapper
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using the local defaults (`DOCKER_HOST` or the standard socket)
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| AgentError::unreachable(e.to_string()))?;
        Ok(Self { docker })
    }

    /// Connect to an explicit socket path
    pub fn with_socket(socket_path: &str) -> Result<Self> {
        let docker =
            Docker::connect_with_socket(socket_path, CLIENT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
                .map_err(|e| AgentError::unreachable(e.to_string()))?;
        Ok(Self { docker })
    }

    fn container_error(container_id: &str, err: DockerError) -> AgentError {
        match err {
            DockerError::JsonDataError { message, .. } => {
                AgentError::malformed(container_id, message)
            }
            DockerError::JsonSerdeError { err } => AgentError::malformed(container_id, err.to_string()),
            other => AgentError::unavailable(container_id, other.to_string()),
        }
    }
}

/// True when a frame carries the previous counters needed for a delta
fn has_previous_counters(stats: &RawStats) -> bool {
    stats.precpu_stats.cpu_usage.total_usage > 0
        && stats.precpu_stats.system_cpu_usage.unwrap_or(0) > 0
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| AgentError::unreachable(e.to_string()))
    }

    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all: include_stopped,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| AgentError::unreachable(e.to_string()))?;

        Ok(containers
            .into_iter()
            .filter_map(|container| {
                let id = container.id?;
                let created_at = chrono::DateTime::from_timestamp(container.created.unwrap_or(0), 0)
                    .unwrap_or_default();
                Some(ContainerSummary {
                    id,
                    names: container.names.unwrap_or_default(),
                    state: container.state.unwrap_or_default(),
                    created_at,
                })
            })
            .collect())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerDetails> {
        let response = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| Self::container_error(id, e))?;

        let host_config = response.host_config.unwrap_or_default();

        Ok(ContainerDetails {
            id: response.id.unwrap_or_else(|| id.to_string()),
            name: response
                .name
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            started_at: response.state.and_then(|state| state.started_at),
            nano_cpus: host_config.nano_cpus.unwrap_or(0),
            memory_limit: host_config.memory.unwrap_or(0),
        })
    }

    async fn stats(&self, id: &str, streaming: bool) -> Result<RawStats> {
        let options = StatsOptions {
            stream: streaming,
            one_shot: !streaming,
        };

        let mut stream = Box::pin(self.docker.stats(id, Some(options)));
        let mut latest = None;

        for frame in 0..MAX_STREAM_FRAMES {
            match stream.next().await {
                Some(Ok(stats)) => {
                    let complete = has_previous_counters(&stats);
                    latest = Some(stats);
                    if complete || !streaming {
                        break;
                    }
                    debug!(container_id = %id, frame, "Stats frame without previous counters");
                }
                Some(Err(e)) => return Err(Self::container_error(id, e)),
                None => break,
            }
        }

        latest.ok_or_else(|| AgentError::malformed(id, "stats stream ended before first sample"))
    }

    async fn update(&self, id: &str, update: ResourceUpdate) -> Result<()> {
        let options = UpdateContainerOptions::<String> {
            nano_cpus: update.nano_cpus,
            memory: update.memory_bytes,
            memory_swap: update.memory_swap_bytes,
            ..Default::default()
        };

        self.docker
            .update_container(id, options)
            .await
            .map_err(|e| {
                let message = match e {
                    DockerError::DockerResponseServerError { message, .. } => message,
                    other => other.to_string(),
                };
                AgentError::UpdateRejected {
                    container_id: id.to_string(),
                    message,
                }
            })
    }
}
