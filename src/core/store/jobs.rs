use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use super::types::{Job, JobSpec, JobStatus, JobType};
use super::{SiloStore, StoreError, StoreResult};

/// Job statuses only move forward. Re-applying the current status is allowed
/// so that a repeated activity attempt is harmless.
pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
    if from == to {
        return true;
    }
    match from {
        JobStatus::Queued => matches!(to, JobStatus::Running | JobStatus::Failed),
        JobStatus::Running => matches!(to, JobStatus::Succeeded | JobStatus::Failed),
        JobStatus::Succeeded | JobStatus::Failed => false,
    }
}

fn read_job(db: &Connection, id: &str) -> StoreResult<Option<Job>> {
    let row = db
        .query_row(
            "SELECT id, workspace_id, job_type, status, resource_id, created_at, updated_at
             FROM jobs WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;
    let Some((id, workspace_id, job_type, status, resource_id, created_at, updated_at)) = row
    else {
        return Ok(None);
    };
    let job_type = JobType::from_status(&job_type)
        .ok_or_else(|| StoreError::Consistency(format!("job {} has unknown type {}", id, job_type)))?;
    let status = JobStatus::from_status(&status)
        .ok_or_else(|| StoreError::Consistency(format!("job {} has unknown status {}", id, status)))?;
    Ok(Some(Job {
        id,
        workspace_id,
        job_type,
        status,
        resource_id,
        created_at,
        updated_at,
    }))
}

impl SiloStore {
    /// Return the job with `spec.id`, creating it as `Queued` if absent.
    /// An existing job that disagrees with `spec` is a consistency error.
    pub async fn find_or_create_job(&self, spec: &JobSpec) -> StoreResult<Job> {
        let db = self.db.lock().await;
        let inserted = db.execute(
            "INSERT OR IGNORE INTO jobs (id, workspace_id, job_type, status, resource_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                spec.id,
                spec.workspace_id,
                spec.job_type.as_str(),
                JobStatus::Queued.as_str(),
                spec.resource_id
            ],
        )?;
        let job = read_job(&db, &spec.id)?.ok_or_else(|| StoreError::not_found("job", &spec.id))?;
        if job.workspace_id != spec.workspace_id
            || job.job_type != spec.job_type
            || job.resource_id != spec.resource_id
        {
            return Err(StoreError::Consistency(format!(
                "job {} already exists for {} {} in workspace {}",
                job.id,
                job.job_type.as_str(),
                job.resource_id,
                job.workspace_id
            )));
        }
        if inserted > 0 {
            info!("Created {} job {}", job.job_type.as_str(), job.id);
        } else {
            debug!("Found existing job {} ({})", job.id, job.status.as_str());
        }
        Ok(job)
    }

    pub async fn update_job_status(&self, id: &str, status: JobStatus) -> StoreResult<Job> {
        let db = self.db.lock().await;
        let job = read_job(&db, id)?.ok_or_else(|| StoreError::not_found("job", id))?;
        if job.status == status {
            return Ok(job);
        }
        if !can_transition(job.status, status) {
            return Err(StoreError::Consistency(format!(
                "job {} cannot move from {} to {}",
                id,
                job.status.as_str(),
                status.as_str()
            )));
        }
        db.execute(
            "UPDATE jobs SET status = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        info!("Job {} is now {}", id, status.as_str());
        read_job(&db, id)?.ok_or_else(|| StoreError::not_found("job", id))
    }

    pub async fn get_job(&self, id: &str) -> StoreResult<Job> {
        let db = self.db.lock().await;
        read_job(&db, id)?.ok_or_else(|| StoreError::not_found("job", id))
    }
}
