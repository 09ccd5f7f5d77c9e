use crate::api::handlers::{config, health, login, role};
use utoipa::openapi::{
    security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    InfoBuilder, License, OpenApi, OpenApiBuilder, Tag,
};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> OpenApi {
    let (_router, public) = public_router().split_for_parts();
    let (_router, admin) = admin_router().split_for_parts();
    merge(public, admin)
}

pub(crate) fn merge(mut public: OpenApi, admin: OpenApi) -> OpenApi {
    public.merge(admin);
    public
        .components
        .get_or_insert_with(Default::default)
        .add_security_scheme(
            "admin_token",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    public.tags = Some(
        [
            ("health", "Service status"),
            ("login", "Authenticate with a leader-issued secret"),
            ("config", "Leader cluster configuration"),
            ("role", "Role bindings"),
        ]
        .into_iter()
        .map(|(name, description)| {
            let mut tag = Tag::new(name);
            tag.description = Some(description.to_string());
            tag
        })
        .collect(),
    );
    public
}

/// Routes open to any caller.
pub(crate) fn public_router() -> OpenApiRouter {
    OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(login::login))
        .routes(routes!(login::lookahead))
}

/// Routes that require the admin token when one is configured.
pub(crate) fn admin_router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(config::read_config, config::write_config))
        .routes(routes!(role::list_roles))
        .routes(routes!(role::read_role, role::write_role, role::delete_role))
}

fn cargo_openapi() -> OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(Some(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    let license = env!("CARGO_PKG_LICENSE");
    if !license.is_empty() {
        let mut spdx = License::new(license);
        spdx.identifier = Some(license.to_string());
        info.license = Some(spdx);
    }

    OpenApiBuilder::new().info(info).build()
}
