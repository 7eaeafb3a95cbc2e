use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowKind {
    ValidateSilo,
    DetectSources,
    HandleRequest,
}

impl WorkflowKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowKind::ValidateSilo => "ValidateSilo",
            WorkflowKind::DetectSources => "DetectSources",
            WorkflowKind::HandleRequest => "HandleRequest",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "ValidateSilo" => Some(WorkflowKind::ValidateSilo),
            "DetectSources" => Some(WorkflowKind::DetectSources),
            "HandleRequest" => Some(WorkflowKind::HandleRequest),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic workflow identity: the same kind, workspace and resource
/// always map to the same id, so a repeated submission finds the live run.
/// Parts are percent-encoded before joining on `:`, so distinct triples
/// never share an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    pub fn derive(kind: WorkflowKind, workspace_id: &str, resource: &str) -> Self {
        Self(format!(
            "{}:{}:{}",
            kind.as_str(),
            urlencoding::encode(workspace_id),
            urlencoding::encode(resource)
        ))
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short stable digest of a set of inputs, for resources without an id of
/// their own (e.g. a configuration that has not been saved yet).
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(&hasher.finalize()[..12])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Canceled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Canceled => "canceled",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            "canceled" => Some(RunStatus::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Live state of one run, published to everyone awaiting its result.
#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    Running,
    Completed(Value),
    Failed(String),
    Canceled,
}

impl RunState {
    pub fn status(&self) -> RunStatus {
        match self {
            RunState::Running => RunStatus::Running,
            RunState::Completed(_) => RunStatus::Completed,
            RunState::Failed(_) => RunStatus::Failed,
            RunState::Canceled => RunStatus::Canceled,
        }
    }
}

/// Returned by a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowHandle {
    pub workflow_id: WorkflowId,
    pub run_id: String,
    /// True when the submission joined a run that was already in progress.
    pub attached: bool,
}

/// Persisted record of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub workflow_id: WorkflowId,
    pub run_id: String,
    pub kind: WorkflowKind,
    pub task_queue: String,
    pub input: Value,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// How many times the run was started (restarts resume it).
    pub attempts: u32,
    pub started_at: String,
    pub updated_at: String,
}
