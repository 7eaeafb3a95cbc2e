//! Scripted container runtime for tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ContainerId, ContainerOutcome, ContainerRuntime, LaunchSpec, RuntimeError};

/// Replays canned connector output. Every launch gets a fresh id.
pub(crate) struct ScriptedRuntime {
    output: Mutex<Vec<String>>,
    outcome: Mutex<ContainerOutcome>,
    unavailable_launches: AtomicUsize,
    hang: bool,
    launches: AtomicUsize,
    launched: Mutex<Vec<LaunchSpec>>,
    aborted: Mutex<Vec<ContainerId>>,
    terminated: Mutex<Vec<ContainerId>>,
    drains: AtomicUsize,
}

impl ScriptedRuntime {
    pub(crate) fn new() -> Self {
        Self {
            output: Mutex::new(Vec::new()),
            outcome: Mutex::new(ContainerOutcome::Completed(0)),
            unavailable_launches: AtomicUsize::new(0),
            hang: false,
            launches: AtomicUsize::new(0),
            launched: Mutex::new(Vec::new()),
            aborted: Mutex::new(Vec::new()),
            terminated: Mutex::new(Vec::new()),
            drains: AtomicUsize::new(0),
        }
    }

    /// Output lines, each written as one line of stdout.
    pub(crate) fn with_lines<I, S>(self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.output.lock().unwrap() = lines.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn with_json_lines(self, lines: Vec<serde_json::Value>) -> Self {
        self.with_lines(lines.into_iter().map(|v| v.to_string()))
    }

    pub(crate) fn with_exit_code(self, code: i64) -> Self {
        *self.outcome.lock().unwrap() = ContainerOutcome::Completed(code);
        self
    }

    pub(crate) fn with_wait_error(self, error: &str) -> Self {
        *self.outcome.lock().unwrap() = ContainerOutcome::Failed(error.to_string());
        self
    }

    /// The first `n` launches fail as if the daemon were down.
    pub(crate) fn failing_launches(self, n: usize) -> Self {
        self.unavailable_launches.store(n, Ordering::SeqCst);
        self
    }

    /// Containers never finish; only a timeout or cancel ends the activity.
    pub(crate) fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub(crate) fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub(crate) fn launched(&self) -> Vec<LaunchSpec> {
        self.launched.lock().unwrap().clone()
    }

    pub(crate) fn aborted(&self) -> Vec<ContainerId> {
        self.aborted.lock().unwrap().clone()
    }

    pub(crate) fn terminated(&self) -> Vec<ContainerId> {
        self.terminated.lock().unwrap().clone()
    }

    pub(crate) fn drain_count(&self) -> usize {
        self.drains.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn launch(&self, spec: &LaunchSpec) -> Result<ContainerId, RuntimeError> {
        let n = self.launches.fetch_add(1, Ordering::SeqCst);
        if n < self.unavailable_launches.load(Ordering::SeqCst) {
            return Err(RuntimeError::Unavailable("scripted outage".to_string()));
        }
        self.launched.lock().unwrap().push(spec.clone());
        Ok(ContainerId::new(format!("scripted-{}-{}", n, spec.session)))
    }

    async fn await_completion(&self, _id: &ContainerId) -> ContainerOutcome {
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.outcome.lock().unwrap().clone()
    }

    async fn collect_output(
        &self,
        _id: &ContainerId,
        stdout: bool,
        _stderr: bool,
    ) -> Result<Bytes, RuntimeError> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        if !stdout {
            return Ok(Bytes::new());
        }
        let mut buf = String::new();
        for line in self.output.lock().unwrap().iter() {
            buf.push_str(line);
            buf.push('\n');
        }
        Ok(Bytes::from(buf))
    }

    async fn terminate(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        self.terminated.lock().unwrap().push(id.clone());
        Ok(())
    }

    async fn remove(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        self.terminated.lock().unwrap().push(id.clone());
        Ok(())
    }

    fn abort(&self, id: &ContainerId) {
        self.aborted.lock().unwrap().push(id.clone());
    }

    async fn drain(&self) {
        self.drains.fetch_add(1, Ordering::SeqCst);
    }
}
