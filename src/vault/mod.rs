//! Client for the leader Vault cluster.
//!
//! Only the three calls the login pipeline needs are implemented: unwrapping a
//! response-wrapped secret, looking up a token, and looking up an accessor.
//! The HTTP client (and therefore the TLS trust) comes from the shared
//! [`RemoteConnectionMaterial`]; this type only adds the address, namespace,
//! credentials and the request timeout.

pub mod connection;

pub use connection::{RemoteConnectionMaterial, TlsTrust, TrustPool};

use crate::{Error, Result};
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::{collections::BTreeMap, time::Duration};
use tracing::{debug, info_span, Instrument};
use url::Url;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const ROOT_NAMESPACE: &str = "root";

const UNWRAP_PATH: &str = "/v1/sys/wrapping/unwrap";
const TOKEN_LOOKUP_PATH: &str = "/v1/auth/token/lookup";
const ACCESSOR_LOOKUP_PATH: &str = "/v1/auth/token/lookup-accessor";

/// A resolved secret, ready to be looked up at the leader.
#[derive(Debug, Clone)]
pub enum RawSecret {
    Token(SecretString),
    Accessor(String),
}

impl RawSecret {
    fn lookup_path(&self) -> &'static str {
        match self {
            RawSecret::Token(_) => TOKEN_LOOKUP_PATH,
            RawSecret::Accessor(_) => ACCESSOR_LOOKUP_PATH,
        }
    }

    fn lookup_payload(&self) -> Value {
        match self {
            RawSecret::Token(token) => json!({ "token": token.expose_secret() }),
            RawSecret::Accessor(accessor) => json!({ "accessor": accessor }),
        }
    }
}

/// Identity the leader reports for a token or accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResult {
    pub entity_id: String,
    pub metadata: BTreeMap<String, String>,
}

pub(crate) fn vault_error_message(json_response: &Value) -> &str {
    json_response
        .get("errors")
        .and_then(|v| v.get(0))
        .and_then(Value::as_str)
        .unwrap_or("")
}

/// # Errors
/// Returns an error if `url` cannot be parsed, has no host, or uses an unsupported scheme.
pub fn endpoint_url(url: &str, path: &str) -> Result<String> {
    let parsed =
        Url::parse(url).map_err(|e| Error::InvalidRequest(format!("Error parsing URL: {e}")))?;

    let scheme = parsed.scheme();

    let host = parsed
        .host()
        .ok_or_else(|| Error::InvalidRequest("Error parsing URL: no host specified".to_string()))?
        .to_owned();

    let port = match parsed.port() {
        Some(p) => p,
        None => match scheme {
            "http" => 80,
            "https" => 443,
            _ => {
                return Err(Error::InvalidRequest(format!(
                    "Error parsing URL: unsupported scheme {scheme}"
                )))
            }
        },
    };

    let endpoint_url = format!("{scheme}://{host}:{port}{path}");

    debug!("endpoint URL: {}", endpoint_url);

    Ok(endpoint_url)
}

struct VaultResponse {
    url: String,
    status: StatusCode,
    body: Value,
}

#[derive(Clone)]
pub struct LeaderClient {
    http: Client,
    address: String,
    namespace: Option<String>,
    token: Option<SecretString>,
    timeout: Duration,
}

impl LeaderClient {
    /// Build a client for `address` that reuses the shared HTTP client.
    ///
    /// `namespace` is sent as `X-Vault-Namespace` unless it is the root namespace.
    #[must_use]
    pub fn new(http: Client, address: &str, namespace: &str) -> Self {
        let namespace = match namespace.trim_matches('/') {
            "" | ROOT_NAMESPACE => None,
            ns => Some(ns.to_string()),
        };

        Self {
            http,
            address: address.to_string(),
            namespace,
            token: None,
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// Token presented to the leader on lookup calls.
    #[must_use]
    pub fn with_token(mut self, token: Option<SecretString>) -> Self {
        self.token = token.filter(|t| !t.expose_secret().is_empty());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn request_json(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> std::result::Result<VaultResponse, String> {
        let url = endpoint_url(&self.address, path).map_err(|e| e.to_string())?;
        debug!("vault request: {} {}", method, url);

        let mut request = self
            .http
            .request(method, &url)
            .timeout(self.timeout)
            .header("Accept", "application/json");
        if let Some(token) = token {
            request = request.header("X-Vault-Token", token);
        }
        if let Some(namespace) = &self.namespace {
            request = request.header("X-Vault-Namespace", namespace);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                format!("{url} - request timed out")
            } else {
                format!("{url} - {e}")
            }
        })?;
        let status = response.status();
        let body = if status == StatusCode::NO_CONTENT {
            Value::Null
        } else {
            response
                .json()
                .await
                .map_err(|e| format!("{url} - invalid JSON response: {e}"))?
        };

        Ok(VaultResponse { url, status, body })
    }

    /// Unwrap a response-wrapped secret and return the whole unwrapped response.
    ///
    /// The wrapping token is single use: a second unwrap of the same value fails.
    /// # Errors
    /// Returns `Error::Unwrap` on transport failures or a non-success status.
    pub async fn unwrap(&self, wrapped: &SecretString) -> Result<Value> {
        let span = info_span!(
            "vault.unwrap",
            http.method = "POST",
            url = %self.address
        );

        let response = self
            .request_json(
                Method::POST,
                UNWRAP_PATH,
                Some(wrapped.expose_secret()),
                None,
            )
            .instrument(span)
            .await
            .map_err(Error::Unwrap)?;

        if !response.status.is_success() {
            return Err(Error::Unwrap(format!(
                "{} - {}, {}",
                response.url,
                response.status,
                vault_error_message(&response.body)
            )));
        }

        Ok(response.body)
    }

    /// Resolve a token or accessor into the entity it is bound to.
    /// # Errors
    /// Returns `Error::RemoteLookup` on transport failures, timeouts, a non-success
    /// status, or a response without an entity.
    pub async fn lookup(&self, secret: &RawSecret) -> Result<LookupResult> {
        let path = secret.lookup_path();
        let span = info_span!(
            "vault.lookup",
            http.method = "POST",
            url = %self.address,
            path
        );

        let payload = secret.lookup_payload();
        let response = self
            .request_json(
                Method::POST,
                path,
                self.token.as_ref().map(|t| t.expose_secret()),
                Some(&payload),
            )
            .instrument(span)
            .await
            .map_err(Error::RemoteLookup)?;

        if !response.status.is_success() {
            return Err(Error::RemoteLookup(format!(
                "{} - {}, {}",
                response.url,
                response.status,
                vault_error_message(&response.body)
            )));
        }

        parse_lookup(&response.body)
    }
}

impl std::fmt::Debug for LeaderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderClient")
            .field("address", &self.address)
            .field("namespace", &self.namespace)
            .field("token_set", &self.token.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn parse_lookup(body: &Value) -> Result<LookupResult> {
    let data = body
        .get("data")
        .ok_or_else(|| Error::RemoteLookup("Error parsing JSON response: no data found".to_string()))?;

    let entity_id = data
        .get("entity_id")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::RemoteLookup("Error parsing JSON response: no entity_id found".to_string())
        })?;

    let metadata = match data.get("meta") {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(meta) => serde_json::from_value(meta.clone()).map_err(|e| {
            Error::RemoteLookup(format!("Error parsing JSON response: invalid meta: {e}"))
        })?,
    };

    Ok(LookupResult {
        entity_id: entity_id.to_string(),
        metadata,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use std::net::TcpListener;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn client(address: &str) -> LeaderClient {
        LeaderClient::new(Client::new(), address, ROOT_NAMESPACE)
    }

    #[test]
    fn endpoint_url_defaults_http_port() {
        let url = endpoint_url("http://example.com", "/v1/test").unwrap();
        assert_eq!(url, "http://example.com:80/v1/test");
    }

    #[test]
    fn endpoint_url_defaults_https_port() {
        let url = endpoint_url("https://example.com", "/v1/test").unwrap();
        assert_eq!(url, "https://example.com:443/v1/test");
    }

    #[test]
    fn endpoint_url_rejects_unsupported_scheme() {
        let err = endpoint_url("ftp://example.com", "/v1/test").err().unwrap();
        assert!(err.to_string().contains("unsupported scheme"));
    }

    #[test]
    fn root_namespace_is_not_sent() {
        assert!(client("http://127.0.0.1:8200").namespace.is_none());
        let scoped = LeaderClient::new(Client::new(), "http://127.0.0.1:8200", "team-a/");
        assert_eq!(scoped.namespace.as_deref(), Some("team-a"));
    }

    #[test]
    fn parse_lookup_treats_null_meta_as_empty() {
        let result = parse_lookup(&json!({
            "data": {"entity_id": "e1", "meta": null}
        }))
        .unwrap();
        assert_eq!(result.entity_id, "e1");
        assert!(result.metadata.is_empty());
    }

    #[test]
    fn parse_lookup_rejects_nested_meta() {
        let err = parse_lookup(&json!({
            "data": {"entity_id": "e1", "meta": {"env": {"nested": true}}}
        }))
        .err()
        .unwrap();
        assert!(matches!(err, Error::RemoteLookup(_)));
    }

    #[tokio::test]
    async fn unwrap_sends_wrapping_token() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(UNWRAP_PATH))
            .and(header("X-Vault-Token", "wrapped-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"secret": "s.abc"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let body = client(&server.uri())
            .unwrap(&SecretString::from("wrapped-token".to_string()))
            .await
            .unwrap();
        assert_eq!(body["data"]["secret"], "s.abc");
    }

    #[tokio::test]
    async fn unwrap_errors_on_failure_status() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(UNWRAP_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "errors": ["wrapping token is not valid or does not exist"]
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .unwrap(&SecretString::from("used".to_string()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Unwrap(_)));
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn token_lookup_uses_token_path_and_payload() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_LOOKUP_PATH))
            .and(header("X-Vault-Token", "follower-token"))
            .and(body_json(json!({"token": "s.abc"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"entity_id": "e1", "meta": {"env": "prod"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server.uri())
            .with_token(Some(SecretString::from("follower-token".to_string())))
            .lookup(&RawSecret::Token(SecretString::from("s.abc".to_string())))
            .await
            .unwrap();
        assert_eq!(result.entity_id, "e1");
        assert_eq!(result.metadata.get("env").map(String::as_str), Some("prod"));
    }

    #[tokio::test]
    async fn accessor_lookup_uses_accessor_path_and_payload() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(ACCESSOR_LOOKUP_PATH))
            .and(body_json(json!({"accessor": "acc-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"entity_id": "e2", "meta": null}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server.uri())
            .lookup(&RawSecret::Accessor("acc-1".to_string()))
            .await
            .unwrap();
        assert_eq!(result.entity_id, "e2");
        assert!(result.metadata.is_empty());
    }

    #[tokio::test]
    async fn lookup_sends_namespace_header() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_LOOKUP_PATH))
            .and(header("X-Vault-Namespace", "team-a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"entity_id": "e1"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = LeaderClient::new(Client::new(), &server.uri(), "team-a")
            .lookup(&RawSecret::Token(SecretString::from("s.abc".to_string())))
            .await
            .unwrap();
        assert_eq!(result.entity_id, "e1");
    }

    #[tokio::test]
    async fn lookup_times_out() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_LOOKUP_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": {"entity_id": "e1"}}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .with_timeout(Duration::from_millis(100))
            .lookup(&RawSecret::Token(SecretString::from("s.abc".to_string())))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::RemoteLookup(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn lookup_errors_on_permission_denied() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_LOOKUP_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "errors": ["permission denied"]
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .lookup(&RawSecret::Token(SecretString::from("s.abc".to_string())))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("permission denied"));
    }
}
