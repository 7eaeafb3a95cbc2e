use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use super::{
    ActivityOptions, EngineEndpoint, ExecutionHistory, Registry, RunState, RunStatus,
    WorkflowContext, WorkflowError, WorkflowExecution, WorkflowHandle, WorkflowId, WorkflowKind,
};
use crate::core::activity::Activities;

struct LiveRun {
    run_id: String,
    state: watch::Receiver<RunState>,
    cancel: CancellationToken,
}

struct EngineInner {
    registry: Registry,
    activities: Activities,
    options: ActivityOptions,
    history: ExecutionHistory,
    task_queue: String,
    /// Runs in progress. Entries go away once their outcome is recorded.
    runs: Mutex<HashMap<WorkflowId, LiveRun>>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

/// Runs workflows on the local tokio runtime and keeps their history in
/// SQLite.
#[derive(Clone)]
pub struct WorkflowEngine {
    inner: Arc<EngineInner>,
}

impl WorkflowEngine {
    pub async fn connect(
        endpoint: &str,
        task_queue: &str,
        registry: Registry,
        activities: Activities,
        options: ActivityOptions,
    ) -> Result<Self, WorkflowError> {
        let endpoint = EngineEndpoint::parse(endpoint)?;
        let history = ExecutionHistory::open(&endpoint).await?;
        info!(
            "Workflow engine connected ({:?}), task queue {}",
            endpoint, task_queue
        );
        Ok(Self {
            inner: Arc::new(EngineInner {
                registry,
                activities,
                options,
                history,
                task_queue: task_queue.to_string(),
                runs: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        })
    }

    pub fn activities(&self) -> &Activities {
        &self.inner.activities
    }

    /// Start a workflow, or attach to the run already in progress for the
    /// same id. A finished id starts a fresh run.
    pub async fn submit(
        &self,
        kind: WorkflowKind,
        workspace_id: &str,
        resource: &str,
        input: Value,
    ) -> Result<WorkflowHandle, WorkflowError> {
        self.inner.registry.get(kind)?;
        let workflow_id = WorkflowId::derive(kind, workspace_id, resource);
        let mut runs = self.inner.runs.lock().await;
        let running = runs
            .get(&workflow_id)
            .filter(|live| *live.state.borrow() == RunState::Running)
            .map(|live| live.run_id.clone());
        if let Some(run_id) = running {
            info!("Workflow {} already running as {}, attaching", workflow_id, run_id);
            return Ok(WorkflowHandle {
                workflow_id,
                run_id,
                attached: true,
            });
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        self.inner
            .history
            .start_run(&workflow_id, &run_id, kind, &self.inner.task_queue, &input)
            .await?;
        let live = self.spawn_run(kind, workflow_id.clone(), run_id.clone(), input)?;
        runs.insert(workflow_id.clone(), live);
        info!("Started workflow {} run {}", workflow_id, run_id);
        Ok(WorkflowHandle {
            workflow_id,
            run_id,
            attached: false,
        })
    }

    fn spawn_run(
        &self,
        kind: WorkflowKind,
        workflow_id: WorkflowId,
        run_id: String,
        input: Value,
    ) -> Result<LiveRun, WorkflowError> {
        let workflow = self.inner.registry.get(kind)?;
        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(RunState::Running);
        let ctx = WorkflowContext {
            workflow_id: workflow_id.clone(),
            run_id: run_id.clone(),
            activities: self.inner.activities.clone(),
            options: self.inner.options.clone(),
            cancel: cancel.clone(),
        };
        let inner = self.inner.clone();
        let task_run_id = run_id.clone();

        self.inner.tasks.spawn(async move {
            let outcome = tokio::select! {
                // Left as running in the history; resumed on next start.
                _ = inner.shutdown.cancelled() => {
                    info!("Workflow {} interrupted by shutdown", workflow_id);
                    return;
                }
                outcome = workflow.run(ctx, input) => outcome,
            };
            let state = match outcome {
                Ok(value) => RunState::Completed(value),
                Err(WorkflowError::Canceled) => RunState::Canceled,
                Err(e) => RunState::Failed(e.to_string()),
            };
            match &state {
                RunState::Failed(message) => {
                    warn!("Workflow {} run {} failed: {}", workflow_id, task_run_id, message)
                }
                other => info!(
                    "Workflow {} run {} finished: {}",
                    workflow_id,
                    task_run_id,
                    other.status().as_str()
                ),
            }
            if let Err(e) = inner.history.finish_run(&task_run_id, &state).await {
                error!("Failed to record outcome of run {}: {}", task_run_id, e);
            }
            let _ = tx.send(state);

            // Later lookups read the history. A newer run under the same id
            // keeps its entry.
            let mut runs = inner.runs.lock().await;
            if runs
                .get(&workflow_id)
                .is_some_and(|live| live.run_id == task_run_id)
            {
                runs.remove(&workflow_id);
            }
        });

        Ok(LiveRun {
            run_id,
            state: rx,
            cancel,
        })
    }

    /// Wait for the latest run of `workflow_id` to finish and return its
    /// result.
    pub async fn result(&self, workflow_id: &WorkflowId) -> Result<Value, WorkflowError> {
        let live = {
            let runs = self.inner.runs.lock().await;
            runs.get(workflow_id).map(|run| run.state.clone())
        };
        if let Some(mut state) = live {
            let finished = state
                .wait_for(|s| *s != RunState::Running)
                .await
                .map_err(|_| WorkflowError::Failed("workflow task ended without a result".into()))?
                .clone();
            return finished_result(finished);
        }

        let execution = self
            .inner
            .history
            .latest(workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))?;
        match execution.status {
            RunStatus::Completed => Ok(execution.result.unwrap_or(Value::Null)),
            RunStatus::Failed => Err(WorkflowError::Failed(execution.error.unwrap_or_default())),
            RunStatus::Canceled => Err(WorkflowError::Canceled),
            RunStatus::Running => Err(WorkflowError::Failed(format!(
                "run {} is not active in this worker",
                execution.run_id
            ))),
        }
    }

    /// Request cancellation of the live run. Returns false when nothing was
    /// running under that id.
    pub async fn cancel(&self, workflow_id: &WorkflowId) -> bool {
        let runs = self.inner.runs.lock().await;
        match runs.get(workflow_id) {
            Some(live) if *live.state.borrow() == RunState::Running => {
                info!("Canceling workflow {} run {}", workflow_id, live.run_id);
                live.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub async fn describe(&self, workflow_id: &WorkflowId) -> Result<WorkflowExecution, WorkflowError> {
        self.inner
            .history
            .latest(workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))
    }

    /// Re-execute every run the history still shows as running. Returns how
    /// many were resumed.
    pub async fn resume_pending(&self) -> Result<usize, WorkflowError> {
        let pending = self.inner.history.running().await?;
        let mut runs = self.inner.runs.lock().await;
        let mut resumed = 0;
        for execution in pending {
            if runs.contains_key(&execution.workflow_id) {
                continue;
            }
            self.inner.history.resume_run(&execution.run_id).await?;
            let live = match self.spawn_run(
                execution.kind,
                execution.workflow_id.clone(),
                execution.run_id.clone(),
                execution.input,
            ) {
                Ok(live) => live,
                Err(e) => {
                    let state = RunState::Failed(e.to_string());
                    self.inner.history.finish_run(&execution.run_id, &state).await?;
                    warn!("Could not resume run {}: {}", execution.run_id, e);
                    continue;
                }
            };
            info!(
                "Resumed workflow {} run {} (start #{})",
                execution.workflow_id,
                execution.run_id,
                execution.attempts + 1
            );
            runs.insert(execution.workflow_id, live);
            resumed += 1;
        }
        Ok(resumed)
    }

    /// Stop all live runs without recording an outcome for them, then wait
    /// until their containers are gone.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.activities.runtime().drain().await;
        info!("Workflow engine stopped");
    }

    #[cfg(test)]
    pub(crate) async fn live_runs(&self) -> usize {
        self.inner.runs.lock().await.len()
    }
}

fn finished_result(state: RunState) -> Result<Value, WorkflowError> {
    match state {
        RunState::Completed(value) => Ok(value),
        RunState::Failed(message) => Err(WorkflowError::Failed(message)),
        RunState::Canceled => Err(WorkflowError::Canceled),
        RunState::Running => Err(WorkflowError::Failed("run still in progress".into())),
    }
}
