use rusqlite::{OptionalExtension, params};
use tracing::info;

use super::types::{NewSiloDefinition, SiloDefinition, SiloSpecification};
use super::{SiloStore, StoreError, StoreResult, new_id};

impl SiloStore {
    pub async fn create_silo_specification(
        &self,
        name: &str,
        workspace_id: Option<&str>,
        docker_image: &str,
    ) -> StoreResult<SiloSpecification> {
        let spec = SiloSpecification {
            id: new_id(),
            name: name.to_string(),
            workspace_id: workspace_id.map(str::to_string),
            docker_image: docker_image.to_string(),
        };
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO silo_specifications (id, name, workspace_id, docker_image) VALUES (?1, ?2, ?3, ?4)",
            params![spec.id, spec.name, spec.workspace_id, spec.docker_image],
        )?;
        info!("Registered silo specification {} ({})", spec.name, spec.docker_image);
        Ok(spec)
    }

    pub async fn get_silo_specification(&self, id: &str) -> StoreResult<SiloSpecification> {
        let db = self.db.lock().await;
        db.query_row(
            "SELECT id, name, workspace_id, docker_image FROM silo_specifications WHERE id = ?1",
            params![id],
            |row| {
                Ok(SiloSpecification {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    workspace_id: row.get(2)?,
                    docker_image: row.get(3)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("silo specification", id))
    }

    /// Persist a silo definition. Callers only reach this after the connector
    /// validated the configuration.
    pub async fn create_silo_definition(
        &self,
        new: &NewSiloDefinition,
    ) -> StoreResult<SiloDefinition> {
        let specification = self
            .get_silo_specification(&new.silo_specification_id)
            .await?;
        let definition = SiloDefinition {
            id: new_id(),
            workspace_id: new.workspace_id.clone(),
            name: new.name.clone(),
            config: new.config.clone(),
            specification,
        };
        let config_json = serde_json::to_string(&definition.config)?;
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO silo_definitions (id, workspace_id, name, silo_specification_id, config_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                definition.id,
                definition.workspace_id,
                definition.name,
                definition.specification.id,
                config_json
            ],
        )?;
        info!(
            "Created silo definition {} ({}) in workspace {}",
            definition.name, definition.id, definition.workspace_id
        );
        Ok(definition)
    }

    pub async fn get_silo_definition(&self, id: &str) -> StoreResult<SiloDefinition> {
        let db = self.db.lock().await;
        let row = db
            .query_row(
                "SELECT d.id, d.workspace_id, d.name, d.config_json,
                        s.id, s.name, s.workspace_id, s.docker_image
                 FROM silo_definitions d
                 JOIN silo_specifications s ON s.id = d.silo_specification_id
                 WHERE d.id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        SiloSpecification {
                            id: row.get(4)?,
                            name: row.get(5)?,
                            workspace_id: row.get(6)?,
                            docker_image: row.get(7)?,
                        },
                    ))
                },
            )
            .optional()?;
        let Some((id, workspace_id, name, config_json, specification)) = row else {
            return Err(StoreError::not_found("silo definition", id));
        };
        Ok(SiloDefinition {
            id,
            workspace_id,
            name,
            config: serde_json::from_str(&config_json)?,
            specification,
        })
    }

    pub async fn count_silo_definitions(&self) -> StoreResult<usize> {
        let db = self.db.lock().await;
        let count: i64 = db.query_row("SELECT COUNT(*) FROM silo_definitions", [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn definition_round_trips_with_specification() {
        let store = SiloStore::in_memory().unwrap();
        let spec = store
            .create_silo_specification("Postgres", None, "connectors/postgres:1.2")
            .await
            .unwrap();
        let created = store
            .create_silo_definition(&NewSiloDefinition {
                workspace_id: "ws1".to_string(),
                name: "billing db".to_string(),
                silo_specification_id: spec.id.clone(),
                config: json!({"host": "db", "port": 5432}),
            })
            .await
            .unwrap();

        let loaded = store.get_silo_definition(&created.id).await.unwrap();
        assert_eq!(loaded, created);
        assert_eq!(loaded.specification.docker_image, "connectors/postgres:1.2");
        assert_eq!(loaded.config["port"], 5432);
        assert_eq!(store.count_silo_definitions().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_entities_are_not_found() {
        let store = SiloStore::in_memory().unwrap();
        assert!(matches!(
            store.get_silo_definition("nope").await,
            Err(StoreError::NotFound { entity: "silo definition", .. })
        ));
        let err = store
            .create_silo_definition(&NewSiloDefinition {
                workspace_id: "ws1".to_string(),
                name: "x".to_string(),
                silo_specification_id: "missing".to_string(),
                config: json!({}),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert_eq!(store.count_silo_definitions().await.unwrap(), 0);
    }
}
