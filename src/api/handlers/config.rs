use crate::{
    api::error::{admin_failure, error_response, ErrorBody},
    backend::{Backend, BackendConfiguration, ConfigRequest},
};
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::sync::Arc;

#[utoipa::path(
    get,
    path = "/config",
    responses (
        (status = 200, description = "Current configuration", body = BackendConfiguration),
        (status = 404, description = "Backend is not configured", body = ErrorBody)
    ),
    security(("admin_token" = [])),
    tag = "config",
)]
pub async fn read_config(backend: Extension<Arc<Backend>>) -> impl IntoResponse {
    match backend.read_config().await {
        Ok(Some(config)) => (StatusCode::OK, Json(config)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "backend is not configured"),
        Err(err) => admin_failure(&err),
    }
}

#[utoipa::path(
    post,
    path = "/config",
    request_body = ConfigRequest,
    responses (
        (status = 204, description = "Configuration stored and trust material applied"),
        (status = 400, description = "Invalid configuration", body = ErrorBody)
    ),
    security(("admin_token" = [])),
    tag = "config",
)]
pub async fn write_config(
    backend: Extension<Arc<Backend>>,
    Json(request): Json<ConfigRequest>,
) -> impl IntoResponse {
    match backend.write_config(request).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => admin_failure(&err),
    }
}
