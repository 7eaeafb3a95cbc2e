mod retry;

use std::sync::Arc;

use crate::core::activity::Activities;
use crate::core::container::testing::ScriptedRuntime;
use crate::core::store::{NewSiloDefinition, SiloDefinition, SiloStore};
use crate::core::workflow::{ActivityOptions, Registry, RetryPolicy, WorkflowEngine};

/// Short timeouts and no backoff, so paused-clock tests advance quickly.
pub(super) fn fast_options() -> ActivityOptions {
    ActivityOptions {
        start_to_close_timeout_secs: 5,
        retry: RetryPolicy {
            maximum_attempts: 3,
            initial_interval_ms: 10,
            backoff_coefficient: 1.0,
            maximum_interval_ms: 10,
        },
    }
}

pub(super) async fn engine_with(
    runtime: Arc<ScriptedRuntime>,
    options: ActivityOptions,
) -> (WorkflowEngine, SiloStore) {
    let store = SiloStore::in_memory().unwrap();
    let activities = Activities::new(runtime, store.clone(), 4);
    let engine = WorkflowEngine::connect(
        "sqlite::memory:",
        "docker-runner",
        Registry::standard(),
        activities,
        options,
    )
    .await
    .unwrap();
    (engine, store)
}

pub(super) async fn silo(store: &SiloStore) -> SiloDefinition {
    let spec = store
        .create_silo_specification("Postgres", None, "connectors/pg")
        .await
        .unwrap();
    store
        .create_silo_definition(&NewSiloDefinition {
            workspace_id: "ws1".to_string(),
            name: "db".to_string(),
            silo_specification_id: spec.id,
            config: serde_json::json!({"host": "db"}),
        })
        .await
        .unwrap()
}
