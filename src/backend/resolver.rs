use crate::{
    vault::{LeaderClient, RawSecret},
    Error, Result,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr};
use tracing::debug;
use utoipa::ToSchema;

/// How the caller wrapped the secret presented at login.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LoginMethod {
    /// A wrapped login response; the token is `auth.client_token`.
    FullTokenWrap,
    /// A wrapped `{"secret": <token>}` payload.
    TokenOnlyWrap,
    /// A wrapped `{"secret": <accessor>}` payload.
    AccessorOnlyWrap,
}

impl LoginMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LoginMethod::FullTokenWrap => "full-token-wrap",
            LoginMethod::TokenOnlyWrap => "token-only-wrap",
            LoginMethod::AccessorOnlyWrap => "accessor-only-wrap",
        }
    }
}

impl fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoginMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full-token-wrap" => Ok(LoginMethod::FullTokenWrap),
            "token-only-wrap" => Ok(LoginMethod::TokenOnlyWrap),
            "accessor-only-wrap" => Ok(LoginMethod::AccessorOnlyWrap),
            other => Err(Error::UnknownMethod(other.to_string())),
        }
    }
}

fn non_empty_str<'a>(value: &'a Value, section: &str, key: &str) -> Option<&'a str> {
    value
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Turn an unwrapped response into the raw secret `method` expects.
/// # Errors
/// Returns `Error::MissingField` if the payload lacks the expected key.
pub fn extract(method: LoginMethod, unwrapped: &Value) -> Result<RawSecret> {
    match method {
        LoginMethod::FullTokenWrap => non_empty_str(unwrapped, "auth", "client_token")
            .map(|token| RawSecret::Token(SecretString::from(token.to_string())))
            .ok_or(Error::MissingField("client_token")),
        LoginMethod::TokenOnlyWrap => non_empty_str(unwrapped, "data", "secret")
            .map(|token| RawSecret::Token(SecretString::from(token.to_string())))
            .ok_or(Error::MissingField("secret")),
        LoginMethod::AccessorOnlyWrap => non_empty_str(unwrapped, "data", "secret")
            .map(|accessor| RawSecret::Accessor(accessor.to_string()))
            .ok_or(Error::MissingField("secret")),
    }
}

/// Unwrap `wrapped` at the leader and extract the raw secret. Performs exactly one remote call.
/// # Errors
/// Returns `Error::Unwrap` if the unwrap call fails, `Error::MissingField` if the payload is incomplete.
pub async fn resolve(
    method: LoginMethod,
    wrapped: &SecretString,
    client: &LeaderClient,
) -> Result<RawSecret> {
    let unwrapped = client.unwrap(wrapped).await?;
    let secret = extract(method, &unwrapped)?;
    debug!(method = %method, "secret resolved");
    Ok(secret)
}
