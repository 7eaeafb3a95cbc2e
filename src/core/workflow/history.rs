use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use url::Url;

use super::{RunState, RunStatus, WorkflowError, WorkflowExecution, WorkflowId, WorkflowKind};
use crate::platform::{NativePlatform, Platform};

/// Where the engine keeps its execution history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEndpoint {
    Memory,
    File(PathBuf),
}

impl EngineEndpoint {
    /// Accepts `sqlite::memory:` and `sqlite://<path>`; anything else is
    /// rejected.
    pub fn parse(endpoint: &str) -> Result<Self, WorkflowError> {
        let endpoint = endpoint.trim();
        let url = Url::parse(endpoint)
            .map_err(|e| WorkflowError::Endpoint(format!("{}: {}", endpoint, e)))?;
        if url.scheme() != "sqlite" {
            return Err(WorkflowError::Endpoint(format!(
                "unsupported workflow engine scheme '{}' in {}",
                url.scheme(),
                endpoint
            )));
        }
        if url.path() == ":memory:" {
            return Ok(EngineEndpoint::Memory);
        }

        // sqlite:///abs/path has an empty host; sqlite://rel/path puts the
        // first segment in the host.
        let mut path = String::new();
        if let Some(host) = url.host_str() {
            path.push_str(host);
        }
        path.push_str(url.path());
        let path = urlencoding::decode(&path)
            .map_err(|e| WorkflowError::Endpoint(format!("{}: {}", endpoint, e)))?
            .into_owned();
        if path.is_empty() || path == "/" {
            return Err(WorkflowError::Endpoint(format!(
                "workflow engine endpoint {} has no database path",
                endpoint
            )));
        }
        Ok(EngineEndpoint::File(PathBuf::from(path)))
    }
}

type Row = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    u32,
    String,
    String,
);

const SELECT_COLUMNS: &str = "workflow_id, run_id, kind, task_queue, input_json, status, result_json, error, attempts, started_at, updated_at";

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

fn into_execution(row: Row) -> Result<WorkflowExecution, WorkflowError> {
    let (
        workflow_id,
        run_id,
        kind,
        task_queue,
        input_json,
        status,
        result_json,
        error,
        attempts,
        started_at,
        updated_at,
    ) = row;
    let kind = WorkflowKind::from_status(&kind)
        .ok_or_else(|| WorkflowError::History(format!("run {} has unknown kind {}", run_id, kind)))?;
    let status = RunStatus::from_status(&status).ok_or_else(|| {
        WorkflowError::History(format!("run {} has unknown status {}", run_id, status))
    })?;
    let result = match result_json {
        Some(json) => Some(serde_json::from_str(&json)?),
        None => None,
    };
    Ok(WorkflowExecution {
        workflow_id: WorkflowId::from_string(workflow_id),
        run_id,
        kind,
        task_queue,
        input: serde_json::from_str(&input_json)?,
        status,
        result,
        error,
        attempts,
        started_at,
        updated_at,
    })
}

fn sql(e: rusqlite::Error) -> WorkflowError {
    WorkflowError::History(e.to_string())
}

/// Durable record of every workflow run, so that runs interrupted by a
/// restart can be picked up again.
#[derive(Clone)]
pub struct ExecutionHistory {
    db: Arc<Mutex<Connection>>,
}

impl ExecutionHistory {
    pub async fn open(endpoint: &EngineEndpoint) -> Result<Self, WorkflowError> {
        let db = match endpoint {
            EngineEndpoint::Memory => Connection::open_in_memory().map_err(sql)?,
            EngineEndpoint::File(path) => {
                if let Some(dir) = path.parent()
                    && !dir.as_os_str().is_empty()
                    && !dir.exists()
                {
                    tokio::fs::create_dir_all(dir)
                        .await
                        .map_err(|e| WorkflowError::History(e.to_string()))?;
                    NativePlatform::restrict_dir_permissions(dir);
                }
                let db = Connection::open(path).map_err(sql)?;
                NativePlatform::restrict_file_permissions(path);
                db
            }
        };

        db.execute(
            "CREATE TABLE IF NOT EXISTS workflow_executions (
                run_id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                task_queue TEXT NOT NULL,
                input_json TEXT NOT NULL,
                status TEXT NOT NULL,
                result_json TEXT,
                error TEXT,
                attempts INTEGER NOT NULL DEFAULT 1,
                started_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )
        .map_err(sql)?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_workflow_executions_workflow
             ON workflow_executions (workflow_id, started_at)",
            [],
        )
        .map_err(sql)?;

        info!("Workflow history ready ({:?})", endpoint);
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    pub async fn start_run(
        &self,
        workflow_id: &WorkflowId,
        run_id: &str,
        kind: WorkflowKind,
        task_queue: &str,
        input: &Value,
    ) -> Result<(), WorkflowError> {
        let input_json = serde_json::to_string(input)?;
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO workflow_executions (run_id, workflow_id, kind, task_queue, input_json, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id,
                workflow_id.as_str(),
                kind.as_str(),
                task_queue,
                input_json,
                RunStatus::Running.as_str()
            ],
        )
        .map_err(sql)?;
        Ok(())
    }

    /// Bump the attempt counter of a run picked up again after a restart.
    pub async fn resume_run(&self, run_id: &str) -> Result<(), WorkflowError> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE workflow_executions SET attempts = attempts + 1, updated_at = CURRENT_TIMESTAMP
             WHERE run_id = ?1",
            params![run_id],
        )
        .map_err(sql)?;
        Ok(())
    }

    pub async fn finish_run(&self, run_id: &str, state: &RunState) -> Result<(), WorkflowError> {
        let (result_json, error) = match state {
            RunState::Completed(value) => (Some(serde_json::to_string(value)?), None),
            RunState::Failed(message) => (None, Some(message.clone())),
            RunState::Canceled => (None, Some("canceled".to_string())),
            RunState::Running => (None, None),
        };
        let db = self.db.lock().await;
        db.execute(
            "UPDATE workflow_executions
             SET status = ?1, result_json = ?2, error = ?3, updated_at = CURRENT_TIMESTAMP
             WHERE run_id = ?4",
            params![state.status().as_str(), result_json, error, run_id],
        )
        .map_err(sql)?;
        Ok(())
    }

    /// Most recent run of a workflow id.
    pub async fn latest(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Option<WorkflowExecution>, WorkflowError> {
        let db = self.db.lock().await;
        let row = db
            .query_row(
                &format!(
                    "SELECT {} FROM workflow_executions WHERE workflow_id = ?1
                     ORDER BY started_at DESC, rowid DESC LIMIT 1",
                    SELECT_COLUMNS
                ),
                params![workflow_id.as_str()],
                read_row,
            )
            .optional()
            .map_err(sql)?;
        row.map(into_execution).transpose()
    }

    pub async fn running(&self) -> Result<Vec<WorkflowExecution>, WorkflowError> {
        let db = self.db.lock().await;
        let mut stmt = db
            .prepare(&format!(
                "SELECT {} FROM workflow_executions WHERE status = ?1 ORDER BY started_at ASC, rowid ASC",
                SELECT_COLUMNS
            ))
            .map_err(sql)?;
        let rows = stmt
            .query_map(params![RunStatus::Running.as_str()], read_row)
            .map_err(sql)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(into_execution(row.map_err(sql)?)?);
        }
        Ok(out)
    }
}
