//! The login pipeline.
//!
//! `Received -> RoleResolved -> ConfigResolved -> SecretResolved -> LookedUp -> Matched -> Minted`.
//! Any step may end the attempt; the terminal log line names the last stage
//! reached and whether the attempt was rejected or failed. No credential is
//! produced unless every stage succeeds.

use crate::{
    backend::{
        mint::{self, Alias, Credential},
        policy, resolver, role, Backend, LoginMethod,
    },
    Disposition, Error, Result,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::fmt;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize, Debug, Clone, Default)]
pub struct LoginRequest {
    #[serde(default)]
    pub role: String,
    /// Response-wrapping token issued by the leader.
    #[serde(default, deserialize_with = "secret_string")]
    #[schema(value_type = String)]
    pub secret: SecretString,
    /// One of `full-token-wrap`, `token-only-wrap`, `accessor-only-wrap`.
    #[serde(default)]
    pub method: String,
}

fn secret_string<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

#[derive(ToSchema, Deserialize, Debug, Clone, Default)]
pub struct LookaheadRequest {
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    Received,
    RoleResolved,
    ConfigResolved,
    SecretResolved,
    LookedUp,
    Matched,
    Minted,
}

impl LoginStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LoginStage::Received => "received",
            LoginStage::RoleResolved => "role_resolved",
            LoginStage::ConfigResolved => "config_resolved",
            LoginStage::SecretResolved => "secret_resolved",
            LoginStage::LookedUp => "looked_up",
            LoginStage::Matched => "matched",
            LoginStage::Minted => "minted",
        }
    }
}

impl fmt::Display for LoginStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn required_role(role: &str) -> Result<String> {
    if role.is_empty() {
        return Err(Error::InvalidRequest("'role' field is mandatory".to_string()));
    }
    role::normalize_name(role)
}

impl Backend {
    /// Validate a leader-issued secret against `request.role` and mint a credential.
    /// # Errors
    /// Returns the error that ended the attempt; see [`Error::disposition`].
    #[instrument(skip(self, request), fields(role = %request.role, method = %request.method))]
    pub async fn login(&self, request: &LoginRequest) -> Result<Credential> {
        let mut stage = LoginStage::Received;
        let result = self.run_login(request, &mut stage).await;

        match &result {
            Ok(_) => info!(stage = %stage, "login succeeded"),
            Err(e) => match e.disposition() {
                Disposition::Rejected => {
                    warn!(stage = %stage, outcome = "rejected", error = %e, "login rejected");
                }
                Disposition::Failed => {
                    error!(stage = %stage, outcome = "failed", error = %e, "login failed");
                }
            },
        }

        result
    }

    async fn run_login(&self, request: &LoginRequest, stage: &mut LoginStage) -> Result<Credential> {
        let role_name = required_role(&request.role)?;
        if request.secret.expose_secret().is_empty() {
            return Err(Error::InvalidRequest(
                "'secret' field is mandatory".to_string(),
            ));
        }
        let method: LoginMethod = request.method.parse()?;

        let (role, config) = self.login_records(&role_name).await?;
        *stage = LoginStage::RoleResolved;

        let config = config.ok_or(Error::NotConfigured)?;
        *stage = LoginStage::ConfigResolved;

        let client = self.leader_client(&config)?;
        let secret = resolver::resolve(method, &request.secret, &client).await?;
        *stage = LoginStage::SecretResolved;

        let identity = client.lookup(&secret).await?;
        *stage = LoginStage::LookedUp;
        debug!(entity_id = %identity.entity_id, "leader identity resolved");

        if !policy::matches(&role, &identity.entity_id, &identity.metadata) {
            return Err(Error::PolicyMismatch);
        }
        *stage = LoginStage::Matched;

        let credential = mint::mint(&role_name, &role);
        *stage = LoginStage::Minted;
        Ok(credential)
    }

    /// Resolve the alias a login with `role` would produce, without contacting the leader.
    /// # Errors
    /// Returns `Error::InvalidRequest` for a missing role name, `Error::RoleNotFound`
    /// if it does not exist, or `Error::Storage` on read failure.
    #[instrument(skip(self))]
    pub async fn login_lookahead(&self, role: &str) -> Result<Alias> {
        let role_name = required_role(role)?;
        let (role, _config) = self.login_records(&role_name).await?;
        Ok(mint::alias_for(&role_name, &role))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::{BackendSettings, InmemStorage, RoleRequest};
    use serde_json::json;
    use std::sync::Arc;

    async fn backend_with_role() -> Backend {
        let backend =
            Backend::new(Arc::new(InmemStorage::new()), BackendSettings::default()).unwrap();
        let request: RoleRequest = serde_json::from_value(json!({"entity_id": "E1"})).unwrap();
        backend.write_role("sample", &request).await.unwrap();
        backend
    }

    fn login(role: &str, secret: &str, method: &str) -> LoginRequest {
        LoginRequest {
            role: role.to_string(),
            secret: SecretString::from(secret.to_string()),
            method: method.to_string(),
        }
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let backend = backend_with_role().await;

        let no_role = backend.login(&login("", "s.x", "token-only-wrap")).await;
        assert!(matches!(no_role, Err(Error::InvalidRequest(ref m)) if m.contains("'role'")));

        let no_secret = backend.login(&login("sample", "", "token-only-wrap")).await;
        assert!(matches!(no_secret, Err(Error::InvalidRequest(ref m)) if m.contains("'secret'")));
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let backend = backend_with_role().await;
        let result = backend.login(&login("sample", "s.x", "plain")).await;
        assert!(matches!(result, Err(Error::UnknownMethod(_))));
    }

    #[tokio::test]
    async fn unknown_role_is_rejected() {
        let backend = backend_with_role().await;
        let err = backend
            .login(&login("missing", "s.x", "token-only-wrap"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::RoleNotFound));
        assert_eq!(err.disposition(), Disposition::Rejected);
    }

    #[tokio::test]
    async fn unconfigured_backend_is_rejected() {
        let backend = backend_with_role().await;
        let result = backend.login(&login("Sample", "s.x", "token-only-wrap")).await;
        assert!(matches!(result, Err(Error::NotConfigured)));
    }

    #[tokio::test]
    async fn lookahead_returns_alias() {
        let backend = backend_with_role().await;
        let role = backend.read_role("sample").await.unwrap().unwrap();

        let alias = backend.login_lookahead("SAMPLE").await.unwrap();
        assert_eq!(alias.name, role.role_id);
        assert_eq!(alias.metadata.get("role").map(String::as_str), Some("sample"));

        assert!(matches!(
            backend.login_lookahead("missing").await,
            Err(Error::RoleNotFound)
        ));
    }

    #[test]
    fn stage_names() {
        assert_eq!(LoginStage::Received.to_string(), "received");
        assert_eq!(LoginStage::LookedUp.to_string(), "looked_up");
    }
}
