//! Durable workflow orchestration.
//!
//! A workflow is a strictly sequential script of activities. Each activity
//! call goes through [`execute_activity`], which applies the start-to-close
//! timeout and the retry policy. The [`WorkflowEngine`] owns the live runs,
//! records them in an [`ExecutionHistory`] and resumes interrupted runs after
//! a restart, so every activity is executed at least once.

mod engine;
mod history;
mod registry;
mod retry;
mod types;
mod workflows;

#[cfg(test)]
mod tests;

pub use engine::WorkflowEngine;
pub use history::{EngineEndpoint, ExecutionHistory};
pub use registry::{Registry, RegistryBuilder};
pub use retry::{ActivityOptions, RetryPolicy, execute_activity};
pub use types::{
    RunState, RunStatus, WorkflowExecution, WorkflowHandle, WorkflowId, WorkflowKind, fingerprint,
};
pub use workflows::{
    DetectSourcesInput, DetectSourcesWorkflow, HandleRequestWorkflow, ValidateSiloWorkflow,
};

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::activity::{Activities, ActivityError};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("activity {activity} timed out after {attempts} attempts")]
    Timeout { activity: String, attempts: u32 },

    #[error("activity {activity} failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        activity: String,
        attempts: u32,
        message: String,
    },

    #[error("activity {activity} failed: {message}")]
    NonRetryable { activity: String, message: String },

    #[error("workflow canceled")]
    Canceled,

    #[error("no workflow registered for {0}")]
    Unregistered(WorkflowKind),

    #[error("invalid workflow payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("workflow {0} not found")]
    NotFound(String),

    #[error("workflow history error: {0}")]
    History(String),

    #[error("invalid workflow engine endpoint: {0}")]
    Endpoint(String),

    #[error("workflow failed: {0}")]
    Failed(String),
}

/// Everything a workflow run needs. Cheap to clone.
#[derive(Clone)]
pub struct WorkflowContext {
    pub workflow_id: WorkflowId,
    pub run_id: String,
    pub activities: Activities,
    pub options: ActivityOptions,
    pub cancel: CancellationToken,
}

impl WorkflowContext {
    /// Run one activity with this workflow's options and cancellation.
    pub async fn activity<T, F, Fut>(&self, name: &str, attempt: F) -> Result<T, WorkflowError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ActivityError>>,
    {
        execute_activity(name, &self.options, &self.cancel, attempt).await
    }
}

#[async_trait]
pub trait Workflow: Send + Sync {
    fn kind(&self) -> WorkflowKind;

    async fn run(&self, ctx: WorkflowContext, input: Value) -> Result<Value, WorkflowError>;
}
