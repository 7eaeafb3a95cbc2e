use axum::{Json, extract::State, http::StatusCode};
use serde_json::json;

use super::super::AppState;
use super::{ApiResponse, bad_request, failure, ok};
use crate::core::review::{EntityKind, ReviewResult};

#[derive(serde::Deserialize)]
pub struct ReviewRequest {
    kind: EntityKind,
    ids: Vec<String>,
    result: ReviewResult,
}

pub async fn review_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<ReviewRequest>,
) -> ApiResponse {
    if payload.ids.is_empty() {
        return bad_request("ids must not be empty");
    }
    match state
        .service
        .review(payload.kind, &payload.ids, payload.result)
        .await
    {
        Ok(plan) => ok(
            StatusCode::OK,
            json!({
                "success": true,
                "committed": plan.commit,
                "deleted": plan.delete
            }),
        ),
        Err(e) => failure(&e),
    }
}
