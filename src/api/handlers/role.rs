use crate::{
    api::error::{admin_failure, error_response, ErrorBody},
    backend::{Backend, RolePolicy, RoleRequest},
};
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Debug)]
pub struct RoleList {
    pub keys: Vec<String>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct RoleWriteResponse {
    pub role_id: String,
    pub created: bool,
    pub warnings: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/role",
    responses (
        (status = 200, description = "Registered role names", body = RoleList)
    ),
    security(("admin_token" = [])),
    tag = "role",
)]
pub async fn list_roles(backend: Extension<Arc<Backend>>) -> impl IntoResponse {
    match backend.list_roles().await {
        Ok(keys) => (StatusCode::OK, Json(RoleList { keys })).into_response(),
        Err(err) => admin_failure(&err),
    }
}

#[utoipa::path(
    get,
    path = "/role/{name}",
    params(("name" = String, Path, description = "Role name")),
    responses (
        (status = 200, description = "Role binding and token parameters", body = RolePolicy),
        (status = 404, description = "Role not found", body = ErrorBody)
    ),
    security(("admin_token" = [])),
    tag = "role",
)]
pub async fn read_role(
    backend: Extension<Arc<Backend>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match backend.read_role(&name).await {
        Ok(Some(role)) => (StatusCode::OK, Json(role)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "role not found"),
        Err(err) => admin_failure(&err),
    }
}

#[utoipa::path(
    post,
    path = "/role/{name}",
    params(("name" = String, Path, description = "Role name")),
    request_body = RoleRequest,
    responses (
        (status = 200, description = "Role created or updated", body = RoleWriteResponse),
        (status = 400, description = "Invalid role", body = ErrorBody)
    ),
    security(("admin_token" = [])),
    tag = "role",
)]
pub async fn write_role(
    backend: Extension<Arc<Backend>>,
    Path(name): Path<String>,
    Json(request): Json<RoleRequest>,
) -> impl IntoResponse {
    match backend.write_role(&name, &request).await {
        Ok(write) => (
            StatusCode::OK,
            Json(RoleWriteResponse {
                role_id: write.role.role_id,
                created: write.created,
                warnings: write.warnings,
            }),
        )
            .into_response(),
        Err(err) => admin_failure(&err),
    }
}

#[utoipa::path(
    delete,
    path = "/role/{name}",
    params(("name" = String, Path, description = "Role name")),
    responses (
        (status = 204, description = "Role deleted")
    ),
    security(("admin_token" = [])),
    tag = "role",
)]
pub async fn delete_role(
    backend: Extension<Arc<Backend>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match backend.delete_role(&name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => admin_failure(&err),
    }
}
