//! Docker engine access through the `docker` CLI.
//!
//! Every call shells out with `tokio::process`; no daemon socket client is
//! linked in. A missing binary or an unreachable daemon is reported as
//! [`RuntimeError::Unavailable`] so the activity layer can retry it.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::config::RESERVED_LABEL_PREFIX;
use super::{ContainerConfig, ContainerId, ContainerOutcome, ContainerRuntime, LaunchSpec, RuntimeError};

const DAEMON_UNREACHABLE_HINTS: &[&str] = &[
    "Cannot connect to the Docker daemon",
    "error during connect",
    "Is the docker daemon running",
];

#[derive(Debug, Clone)]
pub struct DockerCli {
    config: ContainerConfig,
    /// Host this worker runs on, recorded on every container it starts.
    worker: String,
    /// Aborts still in flight; shared by all clones.
    aborts: TaskTracker,
}

impl DockerCli {
    fn new(config: ContainerConfig) -> Self {
        let worker = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            config: config.sanitize(),
            worker,
            aborts: TaskTracker::new(),
        }
    }

    /// Check that the CLI is installed and the daemon answers.
    pub async fn connect(config: ContainerConfig) -> Result<Self, RuntimeError> {
        let runtime = Self::new(config);
        let version = runtime
            .run(&["version", "--format", "{{.Server.Version}}"])
            .await
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        info!(
            "Container runtime ready: {} (server {})",
            runtime.config.runtime_binary,
            version.trim()
        );
        Ok(runtime)
    }

    /// Build the `run -d` argument list for a launch.
    pub(crate) fn run_args(&self, spec: &LaunchSpec) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.config.container_name(&spec.session),
            "--label".to_string(),
            format!("{}session={}", RESERVED_LABEL_PREFIX, spec.session),
            "--label".to_string(),
            format!("{}worker={}", RESERVED_LABEL_PREFIX, self.worker),
        ];
        for (key, value) in &self.config.labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }
        if let Some(network) = &self.config.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }
        if self.config.max_memory_mb > 0 {
            args.push("--memory".to_string());
            args.push(format!("{}m", self.config.max_memory_mb));
        }
        for (key, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());
        args
    }

    async fn run(&self, args: &[&str]) -> Result<String, CliFailure> {
        let output = Command::new(&self.config.runtime_binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                CliFailure::Unreachable(format!(
                    "failed to execute {}: {}",
                    self.config.runtime_binary, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if is_daemon_unreachable(&stderr) {
                return Err(CliFailure::Unreachable(stderr));
            }
            return Err(CliFailure::Rejected(stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Why a CLI invocation failed, before it is mapped onto [`RuntimeError`].
#[derive(Debug)]
enum CliFailure {
    Unreachable(String),
    Rejected(String),
}

impl CliFailure {
    fn into_runtime_error(self, rejected: impl FnOnce(String) -> RuntimeError) -> RuntimeError {
        match self {
            CliFailure::Unreachable(reason) => RuntimeError::Unavailable(reason),
            CliFailure::Rejected(reason) => rejected(reason),
        }
    }
}

impl std::fmt::Display for CliFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliFailure::Unreachable(reason) | CliFailure::Rejected(reason) => f.write_str(reason),
        }
    }
}

fn is_daemon_unreachable(stderr: &str) -> bool {
    DAEMON_UNREACHABLE_HINTS
        .iter()
        .any(|hint| stderr.contains(hint))
}

/// Forward one pipe to the merge channel a line at a time so that stdout and
/// stderr interleave on line boundaries.
async fn pump<R: AsyncRead + Unpin>(pipe: R, tx: mpsc::Sender<Vec<u8>>) {
    let mut segments = BufReader::new(pipe).split(b'\n');
    loop {
        match segments.next_segment().await {
            Ok(Some(mut line)) => {
                line.push(b'\n');
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading container log pipe: {}", e);
                break;
            }
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn launch(&self, spec: &LaunchSpec) -> Result<ContainerId, RuntimeError> {
        let args = self.run_args(spec);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let stdout = self.run(&arg_refs).await.map_err(|e| {
            e.into_runtime_error(|reason| RuntimeError::Launch {
                image: spec.image.clone(),
                reason,
            })
        })?;

        let id = stdout.trim();
        if id.is_empty() {
            return Err(RuntimeError::Launch {
                image: spec.image.clone(),
                reason: "runtime returned no container id".to_string(),
            });
        }
        let id = ContainerId::new(id);
        info!(
            "Launched container {} ({}) from {}",
            id,
            self.config.container_name(&spec.session),
            spec.image
        );
        Ok(id)
    }

    async fn await_completion(&self, id: &ContainerId) -> ContainerOutcome {
        match self.run(&["wait", id.as_str()]).await {
            Ok(stdout) => match stdout.trim().parse::<i64>() {
                Ok(code) => {
                    debug!("Container {} exited with status {}", id, code);
                    ContainerOutcome::Completed(code)
                }
                Err(e) => ContainerOutcome::Failed(format!(
                    "unexpected wait output {:?}: {}",
                    stdout.trim(),
                    e
                )),
            },
            Err(e) => ContainerOutcome::Failed(e.to_string()),
        }
    }

    async fn collect_output(
        &self,
        id: &ContainerId,
        stdout: bool,
        stderr: bool,
    ) -> Result<Bytes, RuntimeError> {
        let output_error = |reason: String| RuntimeError::Output {
            id: id.to_string(),
            reason,
        };

        let pipe = |wanted: bool| if wanted { Stdio::piped() } else { Stdio::null() };
        let mut child = Command::new(&self.config.runtime_binary)
            .args(["logs", "--follow", id.as_str()])
            .stdin(Stdio::null())
            .stdout(pipe(stdout))
            .stderr(pipe(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;

        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(64);
        if let Some(out) = child.stdout.take() {
            tokio::spawn(pump(out, tx.clone()));
        }
        if let Some(err) = child.stderr.take() {
            tokio::spawn(pump(err, tx.clone()));
        }
        drop(tx);

        let mut buf = BytesMut::new();
        while let Some(chunk) = rx.recv().await {
            buf.extend_from_slice(&chunk);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| output_error(e.to_string()))?;
        if !status.success() {
            return Err(output_error(format!("log stream exited with {}", status)));
        }
        debug!("Collected {} bytes of output from container {}", buf.len(), id);
        Ok(buf.freeze())
    }

    async fn terminate(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        let grace = self.config.stop_grace_secs.to_string();
        if let Err(e) = self.run(&["stop", "-t", grace.as_str(), id.as_str()]).await {
            // Already gone or already stopped; removal below settles it.
            debug!("Stopping container {} failed: {}", id, e);
        }
        self.remove(id).await
    }

    async fn remove(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        self.run(&["rm", "-f", id.as_str()]).await.map_err(|e| {
            e.into_runtime_error(|reason| RuntimeError::Output {
                id: id.to_string(),
                reason: format!("remove failed: {}", reason),
            })
        })?;
        debug!("Removed container {}", id);
        Ok(())
    }

    fn abort(&self, id: &ContainerId) {
        let id = id.clone();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            // No runtime left (process teardown): force-remove synchronously.
            let _ = std::process::Command::new(&self.config.runtime_binary)
                .args(["rm", "-f", id.as_str()])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            return;
        };
        let runtime = self.clone();
        self.aborts.spawn_on(
            async move {
                if let Err(e) = runtime.terminate(&id).await {
                    warn!("Failed to abort container {}: {}", id, e);
                }
            },
            &handle,
        );
    }

    async fn drain(&self) {
        if !self.aborts.is_empty() {
            info!("Waiting for {} container aborts", self.aborts.len());
        }
        self.aborts.close();
        self.aborts.wait().await;
        self.aborts.reopen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn spec() -> LaunchSpec {
        LaunchSpec {
            image: "connectors/postgres:1.2".to_string(),
            command: vec!["check".to_string(), "--config".to_string(), "{}".to_string()],
            env: vec![("SILO_SESSION".to_string(), "abcdefghij".to_string())],
            session: "abcdefghij".to_string(),
        }
    }

    #[test]
    fn run_args_place_image_before_command() {
        let docker = DockerCli::new(ContainerConfig::default());
        let args = docker.run_args(&spec());
        let image_at = args
            .iter()
            .position(|a| a == "connectors/postgres:1.2")
            .unwrap();
        assert_eq!(&args[image_at + 1..], &["check", "--config", "{}"]);
        assert_eq!(&args[..4], &["run", "-d", "--name", "silo-connector-abcdefghij"]);
        assert!(args.contains(&"silo-runner.session=abcdefghij".to_string()));
        assert!(args.iter().any(|a| a.starts_with("silo-runner.worker=")));
        assert!(args.contains(&"SILO_SESSION=abcdefghij".to_string()));
        assert!(!args.contains(&"--memory".to_string()));
    }

    #[test]
    fn run_args_include_limits_network_and_labels() {
        let mut labels = BTreeMap::new();
        labels.insert("owner".to_string(), "privacy".to_string());
        let docker = DockerCli::new(ContainerConfig {
            network: Some("connectors".to_string()),
            max_memory_mb: 256,
            labels,
            ..ContainerConfig::default()
        });
        let args = docker.run_args(&spec());
        let joined = args.join(" ");
        assert!(joined.contains("--network connectors"));
        assert!(joined.contains("--memory 256m"));
        assert!(joined.contains("--label owner=privacy"));
    }

    #[test]
    fn daemon_unreachable_is_detected() {
        assert!(is_daemon_unreachable(
            "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?"
        ));
        assert!(!is_daemon_unreachable(
            "Unable to find image 'nope:latest' locally"
        ));
    }

    #[tokio::test]
    async fn drain_waits_for_pending_aborts() {
        let runtime = DockerCli::new(ContainerConfig {
            runtime_binary: "/nonexistent/silo-runner-docker".to_string(),
            stop_grace_secs: 0,
            ..ContainerConfig::default()
        });
        runtime.abort(&ContainerId::new("abc123"));
        runtime.abort(&ContainerId::new("def456"));
        assert_eq!(runtime.aborts.len(), 2);

        runtime.drain().await;
        assert!(runtime.aborts.is_empty());
    }

    #[tokio::test]
    async fn connect_reports_missing_binary_as_unavailable() {
        let config = ContainerConfig {
            runtime_binary: "/nonexistent/silo-runner-docker".to_string(),
            ..ContainerConfig::default()
        };
        let err = DockerCli::connect(config).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Unavailable(_)));
    }
}
