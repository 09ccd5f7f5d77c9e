//! HTTP routing for the backend.

use crate::backend::Backend;
use anyhow::Result;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{Json, Response},
    routing::get,
    Extension, Router,
};
use secrecy::{ExposeSecret, SecretString};
use std::{future::Future, sync::Arc};
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug_span, info, warn, Span};
use ulid::Ulid;

pub mod error;
pub mod handlers;
mod openapi;

pub use openapi::openapi;

const REQUEST_ID: &str = "x-request-id";

/// Bearer token required on administrative routes. `None` leaves them open.
#[derive(Clone, Default)]
pub struct AdminToken(Option<SecretString>);

impl AdminToken {
    #[must_use]
    pub fn new(token: Option<SecretString>) -> Self {
        Self(token.filter(|t| !t.expose_secret().is_empty()))
    }
}

async fn require_admin(State(token): State<AdminToken>, request: Request, next: Next) -> Response {
    let Some(expected) = &token.0 else {
        return next.run(request).await;
    };

    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|presented| {
            bool::from(
                presented
                    .as_bytes()
                    .ct_eq(expected.expose_secret().as_bytes()),
            )
        });

    if authorized {
        next.run(request).await
    } else {
        warn!(path = %request.uri().path(), "rejected administrative request");
        error::error_response(StatusCode::UNAUTHORIZED, error::PERMISSION_DENIED)
    }
}

/// Build the application router around `backend`.
#[must_use]
pub fn router(backend: Arc<Backend>, admin_token: AdminToken) -> Router {
    let (public, public_doc) = openapi::public_router().split_for_parts();
    let (admin, admin_doc) = openapi::admin_router().split_for_parts();
    let doc = openapi::merge(public_doc, admin_doc);

    let admin = admin.route_layer(middleware::from_fn_with_state(admin_token, require_admin));

    public
        .merge(admin)
        .route(
            "/openapi.json",
            get(move || {
                let doc = doc.clone();
                async move { Json(doc) }
            }),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(backend)),
        )
}

/// Serve until `shutdown` resolves.
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve<F>(
    port: u16,
    backend: Arc<Backend>,
    admin_token: AdminToken,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(backend, admin_token);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let path = request.uri().path();
    let method = request.method().as_str();
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", method, path, request_id)
}
