mod config;
mod docker;
mod session;
#[cfg(test)]
pub(crate) mod testing;

pub use config::ContainerConfig;
pub use docker::DockerCli;
pub use session::{ContainerSession, session_token};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Docker ids are 64 hex chars; the short form is what `docker ps` shows.
        let short = self.0.get(..12).unwrap_or(&self.0);
        f.write_str(short)
    }
}

/// What to run. `session` is the per-invocation token that names the container.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub image: String,
    pub command: Vec<String>,
    pub env: Vec<(String, String)>,
    pub session: String,
}

/// How a container's wait ended. Exactly one variant per wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerOutcome {
    Completed(i64),
    Failed(String),
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    #[error("failed to launch container from {image}: {reason}")]
    Launch { image: String, reason: String },

    #[error("failed to collect output of container {id}: {reason}")]
    Output { id: String, reason: String },
}

/// Container engine seam. The worker talks to Docker through [`DockerCli`];
/// tests substitute a scripted runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<ContainerId, RuntimeError>;

    /// Wait for the container to stop running.
    async fn await_completion(&self, id: &ContainerId) -> ContainerOutcome;

    /// Merged stdout/stderr of the container, buffered in full. Follows the
    /// log until the container exits.
    async fn collect_output(
        &self,
        id: &ContainerId,
        stdout: bool,
        stderr: bool,
    ) -> Result<Bytes, RuntimeError>;

    /// Stop within the configured grace period, then remove.
    async fn terminate(&self, id: &ContainerId) -> Result<(), RuntimeError>;

    /// Remove an exited container.
    async fn remove(&self, id: &ContainerId) -> Result<(), RuntimeError>;

    /// Fire-and-forget [`terminate`](Self::terminate). Never blocks, so it is
    /// usable from `Drop`.
    fn abort(&self, id: &ContainerId);

    /// Wait until every [`abort`](Self::abort) issued so far has finished.
    async fn drain(&self) {}
}
