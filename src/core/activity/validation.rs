use tracing::{debug, info, warn};

use super::{Activities, ActivityError, ConnectorCommand, SiloCheck, ValidationResult};
use crate::core::protocol::{MessageType, ValidationStatus};

impl Activities {
    /// Run the connector's `check` against a proposed configuration.
    ///
    /// The first VALIDATE report decides. A connector that reports success
    /// but exits non-zero is treated as a failed validation; one that exits
    /// without reporting at all is an error the workflow retries.
    pub async fn validate_data_silo_def(
        &self,
        check: &SiloCheck,
    ) -> Result<ValidationResult, ActivityError> {
        let mut run = self
            .run(&check.docker_image, ConnectorCommand::Check, &check.config, None)
            .await?;

        let mut report = None;
        while let Some(msg) = run.messages.recv().await {
            match msg.kind {
                MessageType::Validate => {
                    if report.is_none() {
                        report = msg.validation();
                    }
                }
                MessageType::Log => {
                    if let Some(log) = &msg.log {
                        debug!("connector: {}", log.message);
                    }
                }
                other => debug!("Ignoring {} message during validation", other.as_str()),
            }
        }

        let Some(report) = report else {
            warn!(
                "Connector {} exited with {} without a validation report",
                check.docker_image, run.exit_code
            );
            return Err(if run.exit_code != 0 {
                ActivityError::ConnectorExited {
                    code: run.exit_code,
                }
            } else {
                ActivityError::MissingOutput("VALIDATE")
            });
        };

        let result = match (report.status, run.exit_code) {
            (ValidationStatus::Success, 0) => ValidationResult {
                status: ValidationStatus::Success,
                message: report.message,
            },
            (ValidationStatus::Success, code) => ValidationResult {
                status: ValidationStatus::Failure,
                message: Some(format!(
                    "connector reported success but exited with status {}",
                    code
                )),
            },
            (ValidationStatus::Failure, _) => ValidationResult {
                status: ValidationStatus::Failure,
                message: report.message,
            },
        };
        info!(
            "Validation of {} finished: {:?}",
            check.docker_image, result.status
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::container::testing::ScriptedRuntime;
    use crate::core::store::SiloStore;
    use serde_json::json;
    use std::sync::Arc;

    fn setup(runtime: ScriptedRuntime) -> (Activities, Arc<ScriptedRuntime>) {
        let runtime = Arc::new(runtime);
        let store = SiloStore::in_memory().unwrap();
        (Activities::new(runtime.clone(), store, 4), runtime)
    }

    fn check() -> SiloCheck {
        SiloCheck {
            docker_image: "connectors/pg".to_string(),
            config: json!({"password": "hunter2"}),
        }
    }

    #[tokio::test]
    async fn success_report_is_returned() {
        let (activities, runtime) = setup(ScriptedRuntime::new().with_json_lines(vec![
            json!({"type": "LOG", "log": {"message": "connecting"}}),
            json!({"type": "VALIDATE", "validate_msg": {"status": "SUCCESS"}}),
        ]));
        let result = activities.validate_data_silo_def(&check()).await.unwrap();
        assert!(result.is_success());
        assert_eq!(runtime.launched()[0].command[0], "check");
    }

    #[tokio::test]
    async fn failure_message_is_carried_verbatim() {
        let (activities, _) = setup(ScriptedRuntime::new().with_lines([
            "garbage line",
            r#"{"type":"VALIDATE","validate_msg":{"status":"FAILURE","message":"password authentication failed for user \"app\""}}"#,
        ]));
        let result = activities.validate_data_silo_def(&check()).await.unwrap();
        assert_eq!(result.status, ValidationStatus::Failure);
        assert_eq!(
            result.message.as_deref(),
            Some("password authentication failed for user \"app\"")
        );
    }

    #[tokio::test]
    async fn success_with_nonzero_exit_is_a_failure() {
        let (activities, _) = setup(
            ScriptedRuntime::new()
                .with_json_lines(vec![json!({"type": "VALIDATE", "status": "SUCCESS"})])
                .with_exit_code(2),
        );
        let result = activities.validate_data_silo_def(&check()).await.unwrap();
        assert_eq!(result.status, ValidationStatus::Failure);
        assert_eq!(
            result.message.as_deref(),
            Some("connector reported success but exited with status 2")
        );
    }

    #[tokio::test]
    async fn missing_report_is_retryable() {
        let (activities, _) = setup(ScriptedRuntime::new().with_exit_code(0));
        let err = activities.validate_data_silo_def(&check()).await.unwrap_err();
        assert!(matches!(err, ActivityError::MissingOutput("VALIDATE")));
        assert!(err.is_retryable());

        let (activities, _) = setup(ScriptedRuntime::new().with_exit_code(137));
        let err = activities.validate_data_silo_def(&check()).await.unwrap_err();
        assert!(matches!(err, ActivityError::ConnectorExited { code: 137 }));
    }
}
