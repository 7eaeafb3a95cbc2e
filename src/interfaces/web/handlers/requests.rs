use axum::{Json, extract::State, http::StatusCode};
use serde_json::json;

use super::super::AppState;
use super::{ApiResponse, bad_request, failure, ok};
use crate::core::activity::RequestSpec;

pub async fn handle_request_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<RequestSpec>,
) -> ApiResponse {
    if payload.request_id.trim().is_empty() {
        return bad_request("request_id is required");
    }
    match state.service.handle_request(&payload).await {
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
