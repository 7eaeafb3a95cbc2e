pub(crate) mod categories;
pub(crate) mod jobs;
pub(crate) mod requests;
pub(crate) mod review;
pub(crate) mod silos;

use axum::{Json, http::StatusCode};
use serde_json::{Value, json};

use crate::core::service::ServiceError;
use crate::core::store::StoreError;
use crate::core::workflow::WorkflowError;

pub(crate) type ApiResponse = (StatusCode, Json<Value>);

pub(crate) fn ok(status: StatusCode, body: Value) -> ApiResponse {
    (status, Json(body))
}

pub(crate) fn failure(err: &ServiceError) -> ApiResponse {
    let status = match err {
        ServiceError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::Store(StoreError::NotFound { .. })
        | ServiceError::Workflow(WorkflowError::NotFound(_)) => StatusCode::NOT_FOUND,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("Request failed: {}", err);
    }
    (
        status,
        Json(json!({
            "success": false,
            "error": err.to_string()
        })),
    )
}

pub(crate) fn bad_request(message: &str) -> ApiResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "success": false,
            "error": message
        })),
    )
}
