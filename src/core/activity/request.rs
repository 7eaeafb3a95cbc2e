use tracing::info;

use super::{Activities, ActivityError, ConnectorCommand, RequestSpec};
use crate::core::protocol::{Record, read_records};

impl Activities {
    /// Run the connector's `query` for a data-subject request and collect the
    /// records it returns.
    pub async fn execute_request(&self, request: &RequestSpec) -> Result<Vec<Record>, ActivityError> {
        let definition = self
            .store
            .get_silo_definition(&request.silo_definition_id)
            .await?;
        let run = self
            .run(
                &definition.specification.docker_image,
                ConnectorCommand::Query,
                &definition.config,
                Some(&request.query),
            )
            .await?;
        if run.exit_code != 0 {
            return Err(ActivityError::ConnectorExited {
                code: run.exit_code,
            });
        }

        let mut records_rx = read_records(run.messages);
        let mut records = Vec::new();
        while let Some(record) = records_rx.recv().await {
            records.push(record);
        }
        info!(
            "Request {} returned {} records from silo {}",
            request.request_id,
            records.len(),
            definition.id
        );
        Ok(records)
    }
}
