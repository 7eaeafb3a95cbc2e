use tracing::{debug, info};

use super::{Activities, ActivityError, ConnectorCommand, DiscoveredSchema};
use crate::core::protocol::{MessageType, Schema};
use crate::core::store::SiloDefinition;

impl Activities {
    /// Run the connector's `discover`, then fold the reported schemas into
    /// the store as tentative data sources and properties.
    pub async fn detect_data_sources(
        &self,
        job_id: &str,
        definition: &SiloDefinition,
    ) -> Result<DiscoveredSchema, ActivityError> {
        let mut run = self
            .run(
                &definition.specification.docker_image,
                ConnectorCommand::Discover,
                &definition.config,
                None,
            )
            .await?;

        let mut schemas: Vec<Schema> = Vec::new();
        let mut catalogs = 0usize;
        while let Some(msg) = run.messages.recv().await {
            match msg.kind {
                MessageType::Catalog => {
                    if let Some(found) = msg.schemas() {
                        catalogs += 1;
                        schemas.extend_from_slice(found);
                    }
                }
                MessageType::Log => {
                    if let Some(log) = &msg.log {
                        debug!("connector: {}", log.message);
                    }
                }
                other => debug!("Ignoring {} message during discovery", other.as_str()),
            }
        }

        if run.exit_code != 0 {
            return Err(ActivityError::ConnectorExited {
                code: run.exit_code,
            });
        }
        if catalogs == 0 {
            return Err(ActivityError::MissingOutput("CATALOG"));
        }

        let changes = self
            .store
            .reconcile_discovery(&definition.id, &schemas)
            .await?;
        info!(
            "Job {} discovered {} schemas in silo {}",
            job_id,
            schemas.len(),
            definition.id
        );
        Ok(DiscoveredSchema { schemas, changes })
    }
}
