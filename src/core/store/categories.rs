use rusqlite::{ErrorCode, OptionalExtension, params, params_from_iter};
use std::collections::BTreeSet;
use tracing::info;

use super::types::Category;
use super::{SiloStore, StoreError, StoreResult, new_id, placeholders};

impl SiloStore {
    pub async fn create_category(
        &self,
        name: &str,
        workspace_id: Option<&str>,
    ) -> StoreResult<Category> {
        let category = Category {
            id: new_id(),
            name: name.to_string(),
            workspace_id: workspace_id.map(str::to_string),
        };
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO categories (id, name, workspace_id) VALUES (?1, ?2, ?3)",
            params![category.id, category.name, category.workspace_id],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref f, _) if f.code == ErrorCode::ConstraintViolation => {
                StoreError::Consistency(format!("category {} already exists", category.name))
            }
            other => other.into(),
        })?;
        Ok(category)
    }

    pub async fn list_property_categories(&self, property_id: &str) -> StoreResult<Vec<Category>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT c.id, c.name, c.workspace_id
             FROM property_categories pc
             JOIN categories c ON c.id = pc.category_id
             WHERE pc.property_id = ?1
             ORDER BY c.name ASC",
        )?;
        let rows = stmt.query_map(params![property_id], |row| {
            Ok(Category {
                id: row.get(0)?,
                name: row.get(1)?,
                workspace_id: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Replace the full category set of a property. Every category id must
    /// exist, otherwise nothing changes.
    pub async fn replace_property_categories(
        &self,
        property_id: &str,
        category_ids: &[String],
    ) -> StoreResult<()> {
        let wanted: Vec<String> = category_ids
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut db = self.db.lock().await;
        let tx = db.transaction()?;

        let property: Option<String> = tx
            .query_row(
                "SELECT id FROM properties WHERE id = ?1",
                params![property_id],
                |row| row.get(0),
            )
            .optional()?;
        if property.is_none() {
            return Err(StoreError::not_found("property", property_id));
        }

        if !wanted.is_empty() {
            let found: i64 = tx.query_row(
                &format!(
                    "SELECT COUNT(*) FROM categories WHERE id IN ({})",
                    placeholders(wanted.len())
                ),
                params_from_iter(wanted.iter()),
                |row| row.get(0),
            )?;
            if found as usize != wanted.len() {
                return Err(StoreError::Consistency(format!(
                    "{} of {} categories not found",
                    wanted.len() - found as usize,
                    wanted.len()
                )));
            }
        }

        tx.execute(
            "DELETE FROM property_categories WHERE property_id = ?1",
            params![property_id],
        )?;
        for category_id in &wanted {
            tx.execute(
                "INSERT INTO property_categories (property_id, category_id) VALUES (?1, ?2)",
                params![property_id, category_id],
            )?;
        }
        tx.commit()?;
        info!(
            "Property {} now has {} categories",
            property_id,
            wanted.len()
        );
        Ok(())
    }
}
