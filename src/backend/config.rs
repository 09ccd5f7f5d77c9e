use crate::{backend::storage::Storage, vault::ROOT_NAMESPACE, Error, Result};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

pub const CONFIG_KEY: &str = "config";

fn default_namespace() -> String {
    ROOT_NAMESPACE.to_string()
}

/// Where the leader cluster lives and how to trust it.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BackendConfiguration {
    /// Address of the leader Vault cluster.
    pub cluster: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// PEM encoded CA bundle used to verify the leader's certificate.
    #[serde(default)]
    pub ca_cert: String,
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

#[derive(ToSchema, Deserialize, Debug, Default, Clone)]
pub struct ConfigRequest {
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub ca_cert: Option<String>,
    #[serde(default)]
    pub insecure_skip_verify: Option<bool>,
}

impl BackendConfiguration {
    /// Validate a write request. The whole record is replaced, so omitted
    /// optional fields fall back to their defaults.
    /// # Errors
    /// Returns `Error::InvalidRequest` if `cluster` is missing or is not an http(s) URL.
    pub fn from_request(request: ConfigRequest) -> Result<Self> {
        let cluster = request
            .cluster
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::InvalidRequest("cluster must be provided".to_string()))?;

        let url = Url::parse(&cluster)
            .map_err(|e| Error::InvalidRequest(format!("cluster is not a valid URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
            return Err(Error::InvalidRequest(
                "cluster must be an http(s) URL with a host".to_string(),
            ));
        }

        let namespace = request
            .namespace
            .map(|ns| ns.trim().trim_matches('/').to_string())
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(default_namespace);

        Ok(Self {
            cluster,
            namespace,
            ca_cert: request.ca_cert.unwrap_or_default(),
            insecure_skip_verify: request.insecure_skip_verify.unwrap_or(false),
        })
    }
}

/// # Errors
/// Returns `Error::Storage` if the record cannot be read or decoded.
pub async fn load(storage: &dyn Storage) -> Result<Option<BackendConfiguration>> {
    match storage.get(CONFIG_KEY).await? {
        Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        None => Ok(None),
    }
}

/// # Errors
/// Returns `Error::Storage` if the record cannot be written.
pub async fn store(storage: &dyn Storage, config: &BackendConfiguration) -> Result<()> {
    storage.put(CONFIG_KEY, serde_json::to_vec(config)?).await
}
