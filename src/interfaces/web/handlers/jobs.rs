use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::json;

use super::super::AppState;
use super::{ApiResponse, failure, ok};

pub async fn health_endpoint() -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "status": "ok"
    }))
}

pub async fn get_job_endpoint(
    Path(job_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResponse {
    match state.service.job(&job_id).await {
        Ok(job) => ok(StatusCode::OK, json!({ "success": true, "job": job })),
        Err(e) => failure(&e),
    }
}

pub async fn get_workflow_endpoint(
    Path(workflow_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResponse {
    match state.service.workflow(&workflow_id).await {
        Ok(execution) => ok(
            StatusCode::OK,
            json!({ "success": true, "workflow": execution }),
        ),
        Err(e) => failure(&e),
    }
}
