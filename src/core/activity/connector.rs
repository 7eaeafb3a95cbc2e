use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{ActivityError, ConnectorQuery};
use crate::core::container::{
    ContainerOutcome, ContainerRuntime, ContainerSession, LaunchSpec, session_token,
};
use crate::core::protocol::{ProtocolMessage, read_messages, split_lines};

pub const SESSION_ENV: &str = "SILO_SESSION";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorCommand {
    Check,
    Discover,
    Query,
}

impl ConnectorCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectorCommand::Check => "check",
            ConnectorCommand::Discover => "discover",
            ConnectorCommand::Query => "query",
        }
    }
}

/// A finished connector container and the decoded protocol stream of its
/// stdout. The container is removed once the stream has been drained.
pub struct ConnectorRun {
    pub exit_code: i64,
    pub messages: mpsc::Receiver<ProtocolMessage>,
}

/// Argument vector passed to the connector entrypoint.
pub(crate) fn connector_args(
    command: ConnectorCommand,
    config: &Value,
    query: Option<&ConnectorQuery>,
) -> Result<Vec<String>, serde_json::Error> {
    let mut args = vec![
        command.as_str().to_string(),
        "--config".to_string(),
        serde_json::to_string(config)?,
    ];
    if let Some(query) = query {
        args.push("--query".to_string());
        args.push(serde_json::to_string(query)?);
    }
    Ok(args)
}

/// Launch `image`, wait for it to finish while collecting its stdout, and
/// hand back the decoded message stream.
///
/// If this future is dropped (timeout, cancellation) before it resolves, the
/// container session is dropped with it and the container is aborted.
pub async fn run_connector(
    runtime: Arc<dyn ContainerRuntime>,
    image: &str,
    command: ConnectorCommand,
    config: &Value,
    query: Option<&ConnectorQuery>,
    capacity: usize,
) -> Result<ConnectorRun, ActivityError> {
    let session = session_token();
    let spec = LaunchSpec {
        image: image.to_string(),
        command: connector_args(command, config, query)?,
        env: vec![(SESSION_ENV.to_string(), session.clone())],
        session,
    };

    let container = ContainerSession::launch(runtime, &spec).await?;
    info!(
        "Running connector {} {} in container {}",
        image,
        command.as_str(),
        container.id()
    );

    let (outcome, output) = tokio::join!(container.wait(), container.output(true, false));
    let exit_code = match outcome {
        ContainerOutcome::Completed(code) => code,
        ContainerOutcome::Failed(reason) => return Err(ActivityError::Wait(reason)),
    };
    let output = output?;
    debug!(
        "Connector {} {} exited with {} after {} bytes of output",
        image,
        command.as_str(),
        exit_code,
        output.len()
    );

    let lines = split_lines(output, capacity);
    let messages = read_messages(lines, capacity, container.into_releaser());
    Ok(ConnectorRun {
        exit_code,
        messages,
    })
}
