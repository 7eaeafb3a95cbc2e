use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::review::TentativeStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    DiscoverSources,
    HandleRequest,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::DiscoverSources => "discover_sources",
            JobType::HandleRequest => "handle_request",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "discover_sources" => Some(JobType::DiscoverSources),
            "handle_request" => Some(JobType::HandleRequest),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "succeeded" => Some(JobStatus::Succeeded),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// What a caller asks for when it needs a job to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: String,
    pub workspace_id: String,
    pub job_type: JobType,
    pub resource_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub workspace_id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub resource_id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiloSpecification {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub workspace_id: Option<String>,
    pub docker_image: String,
}

/// A configured silo: which connector to run, with which settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiloDefinition {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub config: Value,
    pub specification: SiloSpecification,
}

/// A silo definition that has not been validated or persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSiloDefinition {
    pub workspace_id: String,
    pub name: String,
    pub silo_specification_id: String,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: String,
    pub silo_definition_id: String,
    pub name: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub tentative: Option<TentativeStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: String,
    pub data_source_id: String,
    pub name: String,
    #[serde(default)]
    pub tentative: Option<TentativeStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub workspace_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    /// New entities, flagged CREATED.
    pub created: usize,
    /// Vanished committed entities, flagged DELETED.
    pub deleted: usize,
    /// DELETED entities that reappeared and were un-flagged.
    pub restored: usize,
    /// Vanished entities that were never committed, removed outright.
    pub removed: usize,
}

impl ChangeCounts {
    pub fn is_empty(&self) -> bool {
        *self == ChangeCounts::default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryChanges {
    pub data_sources: ChangeCounts,
    pub properties: ChangeCounts,
}

impl DiscoveryChanges {
    pub fn is_empty(&self) -> bool {
        self.data_sources.is_empty() && self.properties.is_empty()
    }
}
