//! Operations exposed to the outside world: the HTTP control surface and the
//! CLI both go through [`SiloService`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::core::activity::{RequestSpec, SiloCheck, ValidationResult};
use crate::core::review::{EntityKind, ReviewPlan, ReviewResult};
use crate::core::store::{
    Category, Job, JobSpec, JobType, NewSiloDefinition, SiloDefinition, SiloStore, StoreError,
};
use crate::core::workflow::{
    DetectSourcesInput, WorkflowEngine, WorkflowError, WorkflowExecution, WorkflowHandle,
    WorkflowId, WorkflowKind, fingerprint,
};

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The connector rejected the configuration; carries its message as is.
    #[error("{0}")]
    ValidationFailed(String),

    #[error("silo definition {silo} does not belong to workspace {workspace}")]
    WrongWorkspace { silo: String, workspace: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl ServiceError {
    /// True for errors caused by the caller rather than the worker.
    pub fn is_client_error(&self) -> bool {
        match self {
            ServiceError::ValidationFailed(_) | ServiceError::WrongWorkspace { .. } => true,
            ServiceError::Store(StoreError::NotFound { .. } | StoreError::Consistency(_)) => true,
            ServiceError::Workflow(WorkflowError::NotFound(_)) => true,
            _ => false,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// A workflow started on behalf of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job: Job,
    pub workflow: WorkflowHandle,
}

#[derive(Clone)]
pub struct SiloService {
    store: SiloStore,
    engine: WorkflowEngine,
}

impl SiloService {
    pub fn new(store: SiloStore, engine: WorkflowEngine) -> Self {
        Self { store, engine }
    }

    pub fn store(&self) -> &SiloStore {
        &self.store
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    /// Validate a configuration by running its connector, then save it. Nothing
    /// is written unless the connector reports success.
    pub async fn create_silo_definition(
        &self,
        new: &NewSiloDefinition,
    ) -> ServiceResult<SiloDefinition> {
        let specification = self
            .store
            .get_silo_specification(&new.silo_specification_id)
            .await?;
        let result = self
            .validate(&new.workspace_id, &specification.docker_image, &new.config)
            .await?;
        if !result.is_success() {
            let message = result.message.unwrap_or_default();
            warn!("Silo {} failed validation: {}", new.name, message);
            return Err(ServiceError::ValidationFailed(message));
        }

        let definition = self.store.create_silo_definition(new).await?;
        info!(
            "Created silo definition {} ({}) in workspace {}",
            definition.id, definition.name, definition.workspace_id
        );
        Ok(definition)
    }

    /// Run the connector's check without saving anything.
    pub async fn validate(
        &self,
        workspace_id: &str,
        docker_image: &str,
        config: &serde_json::Value,
    ) -> ServiceResult<ValidationResult> {
        let config_json = serde_json::to_string(config)?;
        let resource = fingerprint(&[docker_image, &config_json]);
        let input = serde_json::to_value(SiloCheck {
            docker_image: docker_image.to_string(),
            config: config.clone(),
        })?;
        let handle = self
            .engine
            .submit(WorkflowKind::ValidateSilo, workspace_id, &resource, input)
            .await?;
        let value = self.engine.result(&handle.workflow_id).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Start source discovery for a saved silo. Returns as soon as the job is
    /// recorded; the workflow keeps running in the background.
    pub async fn detect_silo_sources(
        &self,
        workspace_id: &str,
        silo_definition_id: &str,
    ) -> ServiceResult<JobHandle> {
        let definition = self.store.get_silo_definition(silo_definition_id).await?;
        if definition.workspace_id != workspace_id {
            return Err(ServiceError::WrongWorkspace {
                silo: definition.id,
                workspace: workspace_id.to_string(),
            });
        }
        let input = serde_json::to_value(DetectSourcesInput {
            workspace_id: workspace_id.to_string(),
            definition,
        })?;
        self.start_job(
            WorkflowKind::DetectSources,
            JobType::DiscoverSources,
            workspace_id,
            silo_definition_id,
            input,
        )
        .await
    }

    /// Start a data-subject request against one silo.
    pub async fn handle_request(&self, request: &RequestSpec) -> ServiceResult<JobHandle> {
        let definition = self
            .store
            .get_silo_definition(&request.silo_definition_id)
            .await?;
        if definition.workspace_id != request.workspace_id {
            return Err(ServiceError::WrongWorkspace {
                silo: definition.id,
                workspace: request.workspace_id.clone(),
            });
        }
        self.start_job(
            WorkflowKind::HandleRequest,
            JobType::HandleRequest,
            &request.workspace_id,
            &request.request_id,
            serde_json::to_value(request)?,
        )
        .await
    }

    async fn start_job(
        &self,
        kind: WorkflowKind,
        job_type: JobType,
        workspace_id: &str,
        resource_id: &str,
        input: serde_json::Value,
    ) -> ServiceResult<JobHandle> {
        let workflow = self
            .engine
            .submit(kind, workspace_id, resource_id, input)
            .await?;
        // The workflow records the same job; creating it here makes it visible
        // before the first activity runs.
        let job = self
            .store
            .find_or_create_job(&JobSpec {
                id: workflow.run_id.clone(),
                workspace_id: workspace_id.to_string(),
                job_type,
                resource_id: resource_id.to_string(),
            })
            .await?;
        Ok(JobHandle { job, workflow })
    }

    /// Approve or reject tentative entities in one batch.
    pub async fn review(
        &self,
        kind: EntityKind,
        ids: &[String],
        result: ReviewResult,
    ) -> ServiceResult<ReviewPlan> {
        let plan = self.store.review_commit(kind, ids, result).await?;
        info!(
            "Review {:?} of {} {}: {} committed, {} deleted",
            result,
            ids.len(),
            kind.as_str(),
            plan.commit.len(),
            plan.delete.len()
        );
        Ok(plan)
    }

    pub async fn create_category(
        &self,
        name: &str,
        workspace_id: Option<&str>,
    ) -> ServiceResult<Category> {
        Ok(self.store.create_category(name, workspace_id).await?)
    }

    pub async fn property_categories(&self, property_id: &str) -> ServiceResult<Vec<Category>> {
        Ok(self.store.list_property_categories(property_id).await?)
    }

    /// Replace the categories of a property and return the new set.
    pub async fn categorize_property(
        &self,
        property_id: &str,
        category_ids: &[String],
    ) -> ServiceResult<Vec<Category>> {
        self.store
            .replace_property_categories(property_id, category_ids)
            .await?;
        Ok(self.store.list_property_categories(property_id).await?)
    }

    pub async fn job(&self, id: &str) -> ServiceResult<Job> {
        Ok(self.store.get_job(id).await?)
    }

    pub async fn workflow(&self, id: &str) -> ServiceResult<WorkflowExecution> {
        Ok(self.engine.describe(&WorkflowId::from_string(id)).await?)
    }
}
