use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Request, header},
    middleware,
    middleware::Next,
    routing::{get, post},
};

use super::AppState;
use super::handlers::{categories, jobs, requests, review, silos};

pub fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(jobs::health_endpoint))
        .route("/api/jobs/{id}", get(jobs::get_job_endpoint))
        .route("/api/workflows/{id}", get(jobs::get_workflow_endpoint))
        .route(
            "/api/specifications",
            post(silos::create_specification_endpoint),
        )
        .route("/api/silos", post(silos::create_silo_endpoint))
        .route("/api/silos/{id}/detect", post(silos::detect_sources_endpoint))
        .route("/api/silos/{id}/sources", get(silos::list_sources_endpoint))
        .route("/api/requests", post(requests::handle_request_endpoint))
        .route("/api/review", post(review::review_endpoint))
        .route("/api/categories", post(categories::create_category_endpoint))
        .route(
            "/api/properties/{id}/categories",
            get(categories::list_property_categories_endpoint)
                .put(categories::replace_property_categories_endpoint),
        )
        .route("/api/logs", get(super::sse_logs_endpoint))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
