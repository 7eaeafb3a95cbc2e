use rusqlite::{Connection, params, params_from_iter};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use super::types::{ChangeCounts, DataSource, DiscoveryChanges, Property};
use super::{SiloStore, StoreError, StoreResult, new_id, placeholders};
use crate::core::protocol::Schema;
use crate::core::review::TentativeStatus;

fn parse_tentative(id: &str, value: Option<String>) -> StoreResult<Option<TentativeStatus>> {
    match value {
        None => Ok(None),
        Some(v) => TentativeStatus::from_status(&v).map(Some).ok_or_else(|| {
            StoreError::Consistency(format!("entity {} has unknown tentative flag {}", id, v))
        }),
    }
}

fn group_from_column(group: String) -> Option<String> {
    if group.is_empty() { None } else { Some(group) }
}

pub(super) fn load_data_sources(db: &Connection, silo_id: &str) -> StoreResult<Vec<DataSource>> {
    let mut stmt = db.prepare(
        "SELECT id, silo_definition_id, group_name, name, tentative
         FROM data_sources WHERE silo_definition_id = ?1
         ORDER BY group_name ASC, name ASC",
    )?;
    let rows = stmt.query_map(params![silo_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (id, silo_definition_id, group, name, tentative) = row?;
        let tentative = parse_tentative(&id, tentative)?;
        out.push(DataSource {
            id,
            silo_definition_id,
            name,
            group: group_from_column(group),
            tentative,
        });
    }
    Ok(out)
}

pub(super) fn load_properties(db: &Connection, data_source_id: &str) -> StoreResult<Vec<Property>> {
    let mut stmt = db.prepare(
        "SELECT id, data_source_id, name, tentative
         FROM properties WHERE data_source_id = ?1 ORDER BY name ASC",
    )?;
    let rows = stmt.query_map(params![data_source_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (id, data_source_id, name, tentative) = row?;
        let tentative = parse_tentative(&id, tentative)?;
        out.push(Property {
            id,
            data_source_id,
            name,
            tentative,
        });
    }
    Ok(out)
}

/// Delete properties together with their category associations.
pub(super) fn delete_properties(db: &Connection, ids: &[String]) -> StoreResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let list = placeholders(ids.len());
    db.execute(
        &format!("DELETE FROM property_categories WHERE property_id IN ({})", list),
        params_from_iter(ids.iter()),
    )?;
    let deleted = db.execute(
        &format!("DELETE FROM properties WHERE id IN ({})", list),
        params_from_iter(ids.iter()),
    )?;
    Ok(deleted)
}

/// Delete data sources together with their properties.
pub(super) fn delete_data_sources(db: &Connection, ids: &[String]) -> StoreResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut property_ids = Vec::new();
    for id in ids {
        property_ids.extend(load_properties(db, id)?.into_iter().map(|p| p.id));
    }
    delete_properties(db, &property_ids)?;
    let deleted = db.execute(
        &format!("DELETE FROM data_sources WHERE id IN ({})", placeholders(ids.len())),
        params_from_iter(ids.iter()),
    )?;
    Ok(deleted)
}

pub(super) fn set_tentative(
    db: &Connection,
    table: &str,
    ids: &[String],
    flag: Option<TentativeStatus>,
) -> StoreResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    // ?1 is the flag, ids follow from ?2
    let list = (2..=ids.len() + 1)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let mut values: Vec<Option<String>> = vec![flag.map(|f| f.as_str().to_string())];
    values.extend(ids.iter().cloned().map(Some));
    let updated = db.execute(
        &format!("UPDATE {} SET tentative = ?1 WHERE id IN ({})", table, list),
        params_from_iter(values.iter()),
    )?;
    Ok(updated)
}

/// Reconcile one level (data sources or properties). `existing` holds
/// `(key, id, flag)` rows; `discovered` the keys reported by the connector.
fn reconcile_level<K: Ord + Clone>(
    existing: Vec<(K, String, Option<TentativeStatus>)>,
    discovered: &BTreeSet<K>,
    counts: &mut ChangeCounts,
) -> LevelPlan<K> {
    let mut plan = LevelPlan {
        create: Vec::new(),
        restore: Vec::new(),
        mark_deleted: Vec::new(),
        remove: Vec::new(),
        present: BTreeMap::new(),
    };
    let mut seen = BTreeSet::new();
    for (key, id, flag) in existing {
        if discovered.contains(&key) {
            if flag == Some(TentativeStatus::Deleted) {
                plan.restore.push(id.clone());
                counts.restored += 1;
            }
            seen.insert(key.clone());
            plan.present.insert(key, id);
        } else {
            match flag {
                None => {
                    plan.mark_deleted.push(id);
                    counts.deleted += 1;
                }
                Some(TentativeStatus::Created) => {
                    plan.remove.push(id);
                    counts.removed += 1;
                }
                Some(TentativeStatus::Deleted) => {}
            }
        }
    }
    for key in discovered {
        if !seen.contains(key) {
            plan.create.push(key.clone());
            counts.created += 1;
        }
    }
    plan
}

struct LevelPlan<K> {
    create: Vec<K>,
    restore: Vec<String>,
    mark_deleted: Vec<String>,
    remove: Vec<String>,
    /// Discovered entities that already exist, key -> id.
    present: BTreeMap<K, String>,
}

fn reconcile_properties(
    db: &Connection,
    data_source_id: &str,
    schema: &Schema,
    counts: &mut ChangeCounts,
) -> StoreResult<()> {
    let existing = load_properties(db, data_source_id)?
        .into_iter()
        .map(|p| (p.name, p.id, p.tentative))
        .collect();
    let discovered: BTreeSet<String> = schema.property_names().into_iter().collect();
    let plan = reconcile_level(existing, &discovered, counts);

    set_tentative(db, "properties", &plan.restore, None)?;
    set_tentative(
        db,
        "properties",
        &plan.mark_deleted,
        Some(TentativeStatus::Deleted),
    )?;
    delete_properties(db, &plan.remove)?;
    for name in plan.create {
        db.execute(
            "INSERT INTO properties (id, data_source_id, name, tentative) VALUES (?1, ?2, ?3, ?4)",
            params![
                new_id(),
                data_source_id,
                name,
                TentativeStatus::Created.as_str()
            ],
        )?;
    }
    Ok(())
}

impl SiloStore {
    /// Fold one discovery result into the stored data map of a silo.
    ///
    /// Runs in a single transaction and is idempotent: reconciling the same
    /// schemas twice changes nothing the second time.
    pub async fn reconcile_discovery(
        &self,
        silo_definition_id: &str,
        schemas: &[Schema],
    ) -> StoreResult<DiscoveryChanges> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;

        let exists: i64 = tx.query_row(
            "SELECT COUNT(*) FROM silo_definitions WHERE id = ?1",
            params![silo_definition_id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(StoreError::not_found("silo definition", silo_definition_id));
        }

        // Later duplicates of the same (group, name) win.
        let mut by_key: BTreeMap<(String, String), &Schema> = BTreeMap::new();
        for schema in schemas {
            let key = (schema.group.clone().unwrap_or_default(), schema.name.clone());
            by_key.insert(key, schema);
        }
        let discovered: BTreeSet<(String, String)> = by_key.keys().cloned().collect();

        let existing = load_data_sources(&tx, silo_definition_id)?
            .into_iter()
            .map(|ds| {
                let key = (ds.group.unwrap_or_default(), ds.name);
                (key, ds.id, ds.tentative)
            })
            .collect();

        let mut changes = DiscoveryChanges::default();
        let plan = reconcile_level(existing, &discovered, &mut changes.data_sources);

        set_tentative(&tx, "data_sources", &plan.restore, None)?;
        set_tentative(
            &tx,
            "data_sources",
            &plan.mark_deleted,
            Some(TentativeStatus::Deleted),
        )?;
        delete_data_sources(&tx, &plan.remove)?;

        let mut to_reconcile: Vec<(String, &Schema)> = Vec::new();
        for (key, id) in &plan.present {
            if let Some(schema) = by_key.get(key) {
                to_reconcile.push((id.clone(), *schema));
            }
        }
        for key in &plan.create {
            let id = new_id();
            tx.execute(
                "INSERT INTO data_sources (id, silo_definition_id, group_name, name, tentative)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    silo_definition_id,
                    key.0,
                    key.1,
                    TentativeStatus::Created.as_str()
                ],
            )?;
            if let Some(schema) = by_key.get(key) {
                to_reconcile.push((id, *schema));
            }
        }

        for (data_source_id, schema) in to_reconcile {
            reconcile_properties(&tx, &data_source_id, schema, &mut changes.properties)?;
        }

        tx.commit()?;
        if changes.is_empty() {
            debug!("Discovery for silo {} changed nothing", silo_definition_id);
        } else {
            info!(
                "Discovery for silo {}: data sources {:?}, properties {:?}",
                silo_definition_id, changes.data_sources, changes.properties
            );
        }
        Ok(changes)
    }

    pub async fn list_data_sources(&self, silo_definition_id: &str) -> StoreResult<Vec<DataSource>> {
        let db = self.db.lock().await;
        load_data_sources(&db, silo_definition_id)
    }

    pub async fn list_properties(&self, data_source_id: &str) -> StoreResult<Vec<Property>> {
        let db = self.db.lock().await;
        load_properties(&db, data_source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::NewSiloDefinition;
    use serde_json::json;

    async fn store_with_silo() -> (SiloStore, String) {
        let store = SiloStore::in_memory().unwrap();
        let spec = store
            .create_silo_specification("Postgres", None, "connectors/postgres")
            .await
            .unwrap();
        let def = store
            .create_silo_definition(&NewSiloDefinition {
                workspace_id: "ws1".to_string(),
                name: "db".to_string(),
                silo_specification_id: spec.id,
                config: json!({}),
            })
            .await
            .unwrap();
        (store, def.id)
    }

    fn schema(name: &str, props: &[&str]) -> Schema {
        let properties: serde_json::Map<String, serde_json::Value> =
            props.iter().map(|p| (p.to_string(), json!({}))).collect();
        Schema {
            name: name.to_string(),
            group: Some("public".to_string()),
            json_schema: json!({ "properties": properties }),
        }
    }

    async fn flags(store: &SiloStore, silo: &str) -> Vec<(String, Option<TentativeStatus>)> {
        let mut out = Vec::new();
        for ds in store.list_data_sources(silo).await.unwrap() {
            out.push((ds.name.clone(), ds.tentative));
            for p in store.list_properties(&ds.id).await.unwrap() {
                out.push((format!("{}.{}", ds.name, p.name), p.tentative));
            }
        }
        out
    }

    #[tokio::test]
    async fn new_entities_are_created_tentatively() {
        let (store, silo) = store_with_silo().await;
        let changes = store
            .reconcile_discovery(&silo, &[schema("users", &["email", "id"])])
            .await
            .unwrap();
        assert_eq!(changes.data_sources.created, 1);
        assert_eq!(changes.properties.created, 2);

        let created = Some(TentativeStatus::Created);
        assert_eq!(
            flags(&store, &silo).await,
            vec![
                ("users".to_string(), created),
                ("users.email".to_string(), created),
                ("users.id".to_string(), created),
            ]
        );
        let ds = &store.list_data_sources(&silo).await.unwrap()[0];
        assert_eq!(ds.group.as_deref(), Some("public"));
    }

    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let (store, silo) = store_with_silo().await;
        let schemas = [schema("users", &["email"]), schema("orders", &["total"])];
        store.reconcile_discovery(&silo, &schemas).await.unwrap();
        let before = flags(&store, &silo).await;
        let changes = store.reconcile_discovery(&silo, &schemas).await.unwrap();
        assert!(changes.is_empty());
        assert_eq!(flags(&store, &silo).await, before);
    }

    #[tokio::test]
    async fn vanished_entities_follow_their_flag() {
        let (store, silo) = store_with_silo().await;
        store
            .reconcile_discovery(&silo, &[schema("users", &["email", "id", "phone"])])
            .await
            .unwrap();

        // Commit email and id; phone stays CREATED.
        let db = store.db.lock().await;
        db.execute(
            "UPDATE properties SET tentative = NULL WHERE name IN ('email', 'id')",
            [],
        )
        .unwrap();
        db.execute("UPDATE data_sources SET tentative = NULL", []).unwrap();
        drop(db);

        let changes = store
            .reconcile_discovery(&silo, &[schema("users", &["id"])])
            .await
            .unwrap();
        assert_eq!(changes.properties.deleted, 1);
        assert_eq!(changes.properties.removed, 1);
        assert_eq!(
            flags(&store, &silo).await,
            vec![
                ("users".to_string(), None),
                ("users.email".to_string(), Some(TentativeStatus::Deleted)),
                ("users.id".to_string(), None),
            ]
        );

        // email comes back: the deletion proposal is withdrawn.
        let changes = store
            .reconcile_discovery(&silo, &[schema("users", &["id", "email"])])
            .await
            .unwrap();
        assert_eq!(changes.properties.restored, 1);
        assert_eq!(
            flags(&store, &silo).await,
            vec![
                ("users".to_string(), None),
                ("users.email".to_string(), None),
                ("users.id".to_string(), None),
            ]
        );
    }

    #[tokio::test]
    async fn vanished_uncommitted_source_is_removed_with_properties() {
        let (store, silo) = store_with_silo().await;
        store
            .reconcile_discovery(&silo, &[schema("users", &["email"]), schema("tmp", &["x"])])
            .await
            .unwrap();
        let changes = store
            .reconcile_discovery(&silo, &[schema("users", &["email"])])
            .await
            .unwrap();
        assert_eq!(changes.data_sources.removed, 1);
        let names: Vec<String> = store
            .list_data_sources(&silo)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["users"]);

        let db = store.db.lock().await;
        let orphans: i64 = db
            .query_row("SELECT COUNT(*) FROM properties WHERE name = 'x'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn unknown_silo_is_not_found() {
        let store = SiloStore::in_memory().unwrap();
        assert!(matches!(
            store.reconcile_discovery("ghost", &[]).await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
