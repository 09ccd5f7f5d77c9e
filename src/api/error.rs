use crate::{Disposition, Error};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

pub const PERMISSION_DENIED: &str = "permission denied";
pub const INTERNAL_ERROR: &str = "internal error";

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub errors: Vec<String>,
}

pub fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            errors: vec![message.to_string()],
        }),
    )
        .into_response()
}

/// Login errors never reveal which stage failed.
pub fn login_failure(err: &Error) -> Response {
    match err.disposition() {
        Disposition::Rejected => error_response(StatusCode::BAD_REQUEST, PERMISSION_DENIED),
        Disposition::Failed => error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR),
    }
}

pub fn admin_failure(err: &Error) -> Response {
    match err {
        Error::InvalidRequest(message) => error_response(StatusCode::BAD_REQUEST, message),
        Error::RoleNotFound | Error::NotConfigured => {
            error_response(StatusCode::NOT_FOUND, &err.to_string())
        }
        _ => {
            error!("administrative request failed: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}
