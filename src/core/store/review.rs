use rusqlite::{Connection, params_from_iter};
use std::collections::BTreeSet;
use tracing::info;

use super::discovery::{delete_data_sources, delete_properties, set_tentative};
use super::{SiloStore, StoreError, StoreResult, placeholders};
use crate::core::review::{EntityKind, ReviewPlan, ReviewResult, TentativeStatus, plan};

fn table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Property => "properties",
        EntityKind::DataSource => "data_sources",
    }
}

fn load_flags(
    db: &Connection,
    kind: EntityKind,
    ids: &[String],
) -> StoreResult<Vec<(String, Option<String>)>> {
    let mut stmt = db.prepare(&format!(
        "SELECT id, tentative FROM {} WHERE id IN ({})",
        table(kind),
        placeholders(ids.len())
    ))?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

impl SiloStore {
    /// Apply a review decision to a batch of tentative entities.
    ///
    /// All ids must exist or the whole batch fails. Committed entities in the
    /// batch are left as they are. Returns what was committed and deleted.
    pub async fn review_commit(
        &self,
        kind: EntityKind,
        ids: &[String],
        result: ReviewResult,
    ) -> StoreResult<ReviewPlan> {
        let ids: Vec<String> = ids
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return Ok(ReviewPlan::default());
        }

        let mut db = self.db.lock().await;
        let tx = db.transaction()?;

        let rows = load_flags(&tx, kind, &ids)?;
        if rows.len() != ids.len() {
            return Err(StoreError::Consistency(format!(
                "could not find {} of {} {} entities",
                ids.len() - rows.len(),
                ids.len(),
                kind.as_str()
            )));
        }
        let mut entities = Vec::with_capacity(rows.len());
        for (id, flag) in &rows {
            let flag = match flag {
                None => None,
                Some(v) => Some(TentativeStatus::from_status(v).ok_or_else(|| {
                    StoreError::Consistency(format!("entity {} has unknown tentative flag {}", id, v))
                })?),
            };
            entities.push((id.as_str(), flag));
        }

        let plan = plan(entities, result);
        set_tentative(&tx, table(kind), &plan.commit, None)?;
        match kind {
            EntityKind::Property => delete_properties(&tx, &plan.delete)?,
            EntityKind::DataSource => delete_data_sources(&tx, &plan.delete)?,
        };
        tx.commit()?;

        info!(
            "Review {} of {} {}: {} committed, {} deleted",
            result.as_str(),
            ids.len(),
            kind.as_str(),
            plan.commit.len(),
            plan.delete.len()
        );
        Ok(plan)
    }
}
