use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{Workflow, WorkflowContext, WorkflowError, WorkflowKind, execute_activity};
use crate::core::activity::{
    DETECT_DATA_SOURCES, EXECUTE_REQUEST, FIND_OR_CREATE_JOB, RequestSpec, SiloCheck,
    UPDATE_JOB_STATUS, VALIDATE_DATA_SILO_DEF,
};
use crate::core::store::{JobSpec, JobStatus, JobType, SiloDefinition};

/// Checks a connector configuration. Produces a `ValidationResult`.
pub struct ValidateSiloWorkflow;

#[async_trait]
impl Workflow for ValidateSiloWorkflow {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::ValidateSilo
    }

    async fn run(&self, ctx: WorkflowContext, input: Value) -> Result<Value, WorkflowError> {
        let check: SiloCheck = serde_json::from_value(input)?;
        let activities = &ctx.activities;
        let check = &check;
        let result = ctx
            .activity(VALIDATE_DATA_SILO_DEF, move |_| {
                activities.validate_data_silo_def(check)
            })
            .await?;
        Ok(serde_json::to_value(result)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectSourcesInput {
    pub workspace_id: String,
    pub definition: SiloDefinition,
}

/// Discovers the data sources of a silo, tracked by a `DiscoverSources` job
/// whose id is the run id.
pub struct DetectSourcesWorkflow;

#[async_trait]
impl Workflow for DetectSourcesWorkflow {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::DetectSources
    }

    async fn run(&self, ctx: WorkflowContext, input: Value) -> Result<Value, WorkflowError> {
        let input: DetectSourcesInput = serde_json::from_value(input)?;
        let job = JobSpec {
            id: ctx.run_id.clone(),
            workspace_id: input.workspace_id.clone(),
            job_type: JobType::DiscoverSources,
            resource_id: input.definition.id.clone(),
        };
        let activities = &ctx.activities;
        let job_id = job.id.as_str();
        let definition = &input.definition;
        let discovered = run_as_job(&ctx, &job, async {
            ctx.activity(DETECT_DATA_SOURCES, move |_| {
                activities.detect_data_sources(job_id, definition)
            })
            .await
        })
        .await?;
        Ok(serde_json::to_value(discovered)?)
    }
}

/// Executes a data-subject request against one silo, tracked by a
/// `HandleRequest` job whose id is the run id.
pub struct HandleRequestWorkflow;

#[async_trait]
impl Workflow for HandleRequestWorkflow {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::HandleRequest
    }

    async fn run(&self, ctx: WorkflowContext, input: Value) -> Result<Value, WorkflowError> {
        let request: RequestSpec = serde_json::from_value(input)?;
        let job = JobSpec {
            id: ctx.run_id.clone(),
            workspace_id: request.workspace_id.clone(),
            job_type: JobType::HandleRequest,
            resource_id: request.request_id.clone(),
        };
        let activities = &ctx.activities;
        let request = &request;
        let records = run_as_job(&ctx, &job, async {
            ctx.activity(EXECUTE_REQUEST, move |_| activities.execute_request(request))
                .await
        })
        .await?;
        Ok(serde_json::to_value(records)?)
    }
}

/// FindOrCreateJob, mark it running, run `body`, then record the outcome on
/// the job. Any error along the way, including a cancel before `body`
/// starts, marks the job failed.
async fn run_as_job<T, Fut>(
    ctx: &WorkflowContext,
    job: &JobSpec,
    body: Fut,
) -> Result<T, WorkflowError>
where
    Fut: Future<Output = Result<T, WorkflowError>>,
{
    let activities = &ctx.activities;
    let outcome = async {
        ctx.activity(FIND_OR_CREATE_JOB, move |_| activities.find_or_create_job(job))
            .await?;
        set_status(ctx, &ctx.cancel, &job.id, JobStatus::Running).await?;
        let value = body.await?;
        set_status(ctx, &ctx.cancel, &job.id, JobStatus::Succeeded).await?;
        Ok::<T, WorkflowError>(value)
    }
    .await;

    match &outcome {
        Ok(_) => info!("Job {} succeeded", job.id),
        Err(e) => {
            warn!("Job {} failed: {}", job.id, e);
            // Not tied to the run's token, so a canceled run is still closed out.
            let detached = CancellationToken::new();
            if let Err(mark) = set_status(ctx, &detached, &job.id, JobStatus::Failed).await {
                warn!("Could not mark job {} as failed: {}", job.id, mark);
            }
        }
    }
    outcome
}

async fn set_status(
    ctx: &WorkflowContext,
    cancel: &CancellationToken,
    job_id: &str,
    status: JobStatus,
) -> Result<(), WorkflowError> {
    let activities = &ctx.activities;
    execute_activity(UPDATE_JOB_STATUS, &ctx.options, cancel, move |_| {
        activities.update_job_status(job_id, status)
    })
    .await
}
