use bytes::Bytes;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ContainerId, ContainerOutcome, ContainerRuntime, LaunchSpec, RuntimeError};

pub const SESSION_TOKEN_LEN: usize = 10;

/// Random lowercase alphabetic token naming one connector invocation.
pub fn session_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_lowercase())
        .take(SESSION_TOKEN_LEN)
        .collect()
}

/// Owns one launched container until it is released.
///
/// Dropping a session that was never released aborts the container, which is
/// what happens when an activity times out or its workflow is canceled.
pub struct ContainerSession {
    runtime: Arc<dyn ContainerRuntime>,
    id: ContainerId,
    armed: bool,
}

impl ContainerSession {
    pub async fn launch(
        runtime: Arc<dyn ContainerRuntime>,
        spec: &LaunchSpec,
    ) -> Result<Self, RuntimeError> {
        let id = runtime.launch(spec).await?;
        Ok(Self {
            runtime,
            id,
            armed: true,
        })
    }

    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    pub async fn wait(&self) -> ContainerOutcome {
        self.runtime.await_completion(&self.id).await
    }

    pub async fn output(&self, stdout: bool, stderr: bool) -> Result<Bytes, RuntimeError> {
        self.runtime.collect_output(&self.id, stdout, stderr).await
    }

    /// Gracefully remove the container once its output has been consumed.
    pub async fn release(mut self) -> Result<(), RuntimeError> {
        self.armed = false;
        self.runtime.terminate(&self.id).await
    }

    /// Hand removal to a synchronous callback, e.g. the protocol reader's
    /// end-of-stream hook.
    pub fn into_releaser(mut self) -> impl FnOnce() + Send + 'static {
        self.armed = false;
        let runtime = self.runtime.clone();
        let id = self.id.clone();
        move || {
            debug!("Releasing container {}", id);
            runtime.abort(&id);
        }
    }
}

impl Drop for ContainerSession {
    fn drop(&mut self) {
        if self.armed {
            warn!("Container {} dropped before release, aborting", self.id);
            self.runtime.abort(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::container::testing::ScriptedRuntime;

    fn spec() -> LaunchSpec {
        LaunchSpec {
            image: "connector:latest".to_string(),
            command: vec!["check".to_string()],
            env: Vec::new(),
            session: session_token(),
        }
    }

    #[test]
    fn session_token_is_ten_lowercase_letters() {
        for _ in 0..32 {
            let token = session_token();
            assert_eq!(token.len(), SESSION_TOKEN_LEN);
            assert!(token.chars().all(|c| c.is_ascii_lowercase()));
        }
        assert_ne!(session_token(), session_token());
    }

    #[tokio::test]
    async fn dropping_unreleased_session_aborts_container() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let session = ContainerSession::launch(runtime.clone(), &spec())
            .await
            .unwrap();
        let id = session.id().clone();
        drop(session);
        assert_eq!(runtime.aborted(), vec![id]);
    }

    #[tokio::test]
    async fn released_session_is_not_aborted_again() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let session = ContainerSession::launch(runtime.clone(), &spec())
            .await
            .unwrap();
        let id = session.id().clone();
        session.release().await.unwrap();
        assert!(runtime.aborted().is_empty());
        assert_eq!(runtime.terminated(), vec![id]);
    }

    #[tokio::test]
    async fn releaser_runs_abort_once_when_called() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let session = ContainerSession::launch(runtime.clone(), &spec())
            .await
            .unwrap();
        let release = session.into_releaser();
        assert!(runtime.aborted().is_empty());
        release();
        assert_eq!(runtime.aborted().len(), 1);
    }
}
