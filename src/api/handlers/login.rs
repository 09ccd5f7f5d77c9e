use crate::{
    api::error::{login_failure, ErrorBody},
    backend::{Alias, Backend, Credential, LoginRequest, LookaheadRequest},
    Error,
};
use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;

// Malformed bodies get the same answer as any other rejected login.
fn malformed(rejection: &JsonRejection) -> axum::response::Response {
    debug!("malformed login body: {}", rejection.body_text());
    login_failure(&Error::InvalidRequest(rejection.body_text()))
}

#[derive(ToSchema, Serialize, Debug)]
pub struct LoginResponse {
    pub auth: Credential,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct LookaheadResponse {
    pub alias: Alias,
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Credential minted", body = LoginResponse),
        (status = 400, description = "Login rejected", body = ErrorBody),
        (status = 500, description = "Login failed", body = ErrorBody)
    ),
    tag = "login",
)]
pub async fn login(
    backend: Extension<Arc<Backend>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return malformed(&rejection),
    };

    match backend.login(&request).await {
        Ok(auth) => (StatusCode::OK, Json(LoginResponse { auth })).into_response(),
        Err(err) => login_failure(&err),
    }
}

#[utoipa::path(
    post,
    path = "/login/lookahead",
    request_body = LookaheadRequest,
    responses (
        (status = 200, description = "Alias a login with this role would produce", body = LookaheadResponse),
        (status = 400, description = "Lookahead rejected", body = ErrorBody),
        (status = 500, description = "Lookahead failed", body = ErrorBody)
    ),
    tag = "login",
)]
pub async fn lookahead(
    backend: Extension<Arc<Backend>>,
    payload: Result<Json<LookaheadRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return malformed(&rejection),
    };

    match backend.login_lookahead(&request.role).await {
        Ok(alias) => (StatusCode::OK, Json(LookaheadResponse { alias })).into_response(),
        Err(err) => login_failure(&err),
    }
}
