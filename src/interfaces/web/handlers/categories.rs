use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::json;

use super::super::AppState;
use super::{ApiResponse, bad_request, failure, ok};

#[derive(serde::Deserialize)]
pub struct CreateCategoryRequest {
    name: String,
    #[serde(default)]
    workspace_id: Option<String>,
}

pub async fn create_category_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<CreateCategoryRequest>,
) -> ApiResponse {
    let name = payload.name.trim();
    if name.is_empty() {
        return bad_request("name is required");
    }
    match state
        .service
        .create_category(name, payload.workspace_id.as_deref())
        .await
    {
        Ok(category) => ok(
            StatusCode::CREATED,
            json!({ "success": true, "category": category }),
        ),
        Err(e) => failure(&e),
    }
}

pub async fn list_property_categories_endpoint(
    Path(property_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResponse {
    match state.service.property_categories(&property_id).await {
        Ok(categories) => ok(
            StatusCode::OK,
            json!({ "success": true, "categories": categories }),
        ),
        Err(e) => failure(&e),
    }
}

#[derive(serde::Deserialize)]
pub struct ReplaceCategoriesRequest {
    category_ids: Vec<String>,
}

/// Replaces the whole category set; an empty list clears it.
pub async fn replace_property_categories_endpoint(
    Path(property_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<ReplaceCategoriesRequest>,
) -> ApiResponse {
    match state
        .service
        .categorize_property(&property_id, &payload.category_ids)
        .await
    {
        Ok(categories) => ok(
            StatusCode::OK,
            json!({ "success": true, "categories": categories }),
        ),
        Err(e) => failure(&e),
    }
}
