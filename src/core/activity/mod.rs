//! Workflow activities: the individually retryable units of work.
//!
//! Each activity launches at most one connector container. An activity future
//! may be dropped at any point (timeout, cancellation); the container session
//! it owns is aborted when that happens.

mod connector;
mod discovery;
mod request;
mod validation;

pub use connector::{ConnectorCommand, ConnectorRun, SESSION_ENV, run_connector};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::core::container::{ContainerRuntime, RuntimeError};
use crate::core::protocol::{Schema, ValidationStatus};
use crate::core::store::{DiscoveryChanges, Job, JobSpec, JobStatus, SiloStore, StoreError};

pub const VALIDATE_DATA_SILO_DEF: &str = "ValidateDataSiloDef";
pub const DETECT_DATA_SOURCES: &str = "DetectDataSources";
pub const FIND_OR_CREATE_JOB: &str = "FindOrCreateJob";
pub const UPDATE_JOB_STATUS: &str = "UpdateJobStatus";
pub const EXECUTE_REQUEST: &str = "ExecuteRequest";

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("connector exited with status {code}")]
    ConnectorExited { code: i64 },

    #[error("waiting for connector failed: {0}")]
    Wait(String),

    #[error("connector produced no {0} message")]
    MissingOutput(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode connector arguments: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ActivityError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ActivityError::Runtime(_)
            | ActivityError::ConnectorExited { .. }
            | ActivityError::Wait(_)
            | ActivityError::MissingOutput(_) => true,
            ActivityError::Store(e) => e.is_retryable(),
            ActivityError::Encode(_) => false,
        }
    }
}

/// Connector configuration to check, together with the image that checks it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiloCheck {
    pub docker_image: String,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn is_success(&self) -> bool {
        self.status == ValidationStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredSchema {
    pub schemas: Vec<Schema>,
    pub changes: DiscoveryChanges,
}

/// One data-subject identifier a connector should look up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIdentifier {
    pub schema_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_group: Option<String>,
    pub identifier: String,
    pub identifier_query: Value,
    #[serde(default)]
    pub json_schema: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorQuery {
    #[serde(default)]
    pub identifiers: Vec<QueryIdentifier>,
}

/// A data-subject request against one silo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    pub request_id: String,
    pub workspace_id: String,
    pub silo_definition_id: String,
    #[serde(default)]
    pub query: ConnectorQuery,
}

#[derive(Clone)]
pub struct Activities {
    runtime: Arc<dyn ContainerRuntime>,
    store: SiloStore,
    pipeline_capacity: usize,
}

impl Activities {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, store: SiloStore, pipeline_capacity: usize) -> Self {
        Self {
            runtime,
            store,
            pipeline_capacity: pipeline_capacity.max(1),
        }
    }

    pub fn store(&self) -> &SiloStore {
        &self.store
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub(crate) async fn run(
        &self,
        image: &str,
        command: ConnectorCommand,
        config: &Value,
        query: Option<&ConnectorQuery>,
    ) -> Result<ConnectorRun, ActivityError> {
        run_connector(
            self.runtime.clone(),
            image,
            command,
            config,
            query,
            self.pipeline_capacity,
        )
        .await
    }

    pub async fn find_or_create_job(&self, spec: &JobSpec) -> Result<Job, ActivityError> {
        Ok(self.store.find_or_create_job(spec).await?)
    }

    pub async fn update_job_status(&self, job_id: &str, status: JobStatus) -> Result<(), ActivityError> {
        self.store.update_job_status(job_id, status).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::JobType;

    #[test]
    fn retryability_follows_error_kind() {
        assert!(ActivityError::ConnectorExited { code: 1 }.is_retryable());
        assert!(ActivityError::MissingOutput("VALIDATE").is_retryable());
        assert!(ActivityError::Runtime(RuntimeError::Unavailable("down".into())).is_retryable());
        assert!(!ActivityError::Store(StoreError::Consistency("bad".into())).is_retryable());
        let encode = serde_json::from_str::<Value>("{").unwrap_err();
        assert!(!ActivityError::Encode(encode).is_retryable());
    }

    #[tokio::test]
    async fn job_activities_are_idempotent() {
        let store = SiloStore::in_memory().unwrap();
        let runtime = Arc::new(crate::core::container::testing::ScriptedRuntime::new());
        let activities = Activities::new(runtime, store, 8);
        let spec = JobSpec {
            id: "run-1".to_string(),
            workspace_id: "ws1".to_string(),
            job_type: JobType::DiscoverSources,
            resource_id: "silo-1".to_string(),
        };
        activities.find_or_create_job(&spec).await.unwrap();
        activities.find_or_create_job(&spec).await.unwrap();
        activities.update_job_status("run-1", JobStatus::Running).await.unwrap();
        activities.update_job_status("run-1", JobStatus::Running).await.unwrap();
        let err = activities
            .update_job_status("run-1", JobStatus::Queued)
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
