use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::json;

use super::super::AppState;
use super::{ApiResponse, bad_request, failure, ok};
use crate::core::service::ServiceError;
use crate::core::store::NewSiloDefinition;

#[derive(serde::Deserialize)]
pub struct CreateSpecificationRequest {
    name: String,
    #[serde(default)]
    workspace_id: Option<String>,
    docker_image: String,
}

pub async fn create_specification_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<CreateSpecificationRequest>,
) -> ApiResponse {
    let name = payload.name.trim();
    let image = payload.docker_image.trim();
    if name.is_empty() || image.is_empty() {
        return bad_request("name and docker_image are required");
    }
    match state
        .service
        .store()
        .create_silo_specification(name, payload.workspace_id.as_deref(), image)
        .await
    {
        Ok(spec) => ok(
            StatusCode::CREATED,
            json!({ "success": true, "specification": spec }),
        ),
        Err(e) => failure(&ServiceError::from(e)),
    }
}

/// Validates the configuration by running the connector, and saves the silo
/// only if the connector accepts it.
pub async fn create_silo_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<NewSiloDefinition>,
) -> ApiResponse {
    if payload.workspace_id.trim().is_empty() || payload.name.trim().is_empty() {
        return bad_request("workspace_id and name are required");
    }
    match state.service.create_silo_definition(&payload).await {
        Ok(silo) => ok(StatusCode::CREATED, json!({ "success": true, "silo": silo })),
        Err(e) => failure(&e),
    }
}

#[derive(serde::Deserialize)]
pub struct DetectRequest {
    workspace_id: String,
}

pub async fn detect_sources_endpoint(
    Path(silo_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<DetectRequest>,
) -> ApiResponse {
    match state
        .service
        .detect_silo_sources(&payload.workspace_id, &silo_id)
        .await
    {
        Ok(started) => ok(
            StatusCode::ACCEPTED,
            json!({
                "success": true,
                "job": started.job,
                "workflow": started.workflow
            }),
        ),
        Err(e) => failure(&e),
    }
}

pub async fn list_sources_endpoint(
    Path(silo_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResponse {
    let store = state.service.store();
    let sources = match store.list_data_sources(&silo_id).await {
        Ok(sources) => sources,
        Err(e) => return failure(&ServiceError::from(e)),
    };
    let mut listed = Vec::with_capacity(sources.len());
    for source in sources {
        let properties = match store.list_properties(&source.id).await {
            Ok(properties) => properties,
            Err(e) => return failure(&ServiceError::from(e)),
        };
        listed.push(json!({
            "data_source": source,
            "properties": properties
        }));
    }
    ok(
        StatusCode::OK,
        json!({ "success": true, "data_sources": listed }),
    )
}
