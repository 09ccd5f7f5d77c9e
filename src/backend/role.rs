//! Role records: the identity binding a login must satisfy plus the token
//! parameters copied into every credential the role mints.

use crate::{backend::storage::Storage, Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    net::IpAddr,
    time::Duration,
};
use utoipa::ToSchema;
use uuid::Uuid;

pub const ROLE_PREFIX: &str = "role/";

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TokenType {
    #[default]
    Default,
    Service,
    Batch,
    DefaultService,
    DefaultBatch,
}

impl TokenType {
    fn is_batch(self) -> bool {
        matches!(self, TokenType::Batch | TokenType::DefaultBatch)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenParameters {
    #[serde(default, with = "duration_secs")]
    #[schema(value_type = u64)]
    pub token_ttl: Duration,
    #[serde(default, with = "duration_secs")]
    #[schema(value_type = u64)]
    pub token_max_ttl: Duration,
    #[serde(default, with = "duration_secs")]
    #[schema(value_type = u64)]
    pub token_explicit_max_ttl: Duration,
    #[serde(default, with = "duration_secs")]
    #[schema(value_type = u64)]
    pub token_period: Duration,
    #[serde(default)]
    pub token_policies: Vec<String>,
    #[serde(default)]
    pub token_bound_cidrs: Vec<String>,
    #[serde(default)]
    pub token_num_uses: u64,
    #[serde(default)]
    pub token_type: TokenType,
    #[serde(default)]
    pub token_no_default_policy: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RolePolicy {
    /// Generated on creation; used as the alias name of minted credentials.
    pub role_id: String,
    /// Entity the leader must report for the presented secret.
    pub entity_id: String,
    #[serde(default)]
    pub entity_meta: BTreeMap<String, String>,
    /// Require `entity_meta` to equal the entity's metadata instead of being a subset of it.
    #[serde(default)]
    pub strict_meta_verify: bool,
    #[serde(flatten)]
    pub token: TokenParameters,
}

/// Integer seconds or a humantime string such as `"10m"`.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum DurationInput {
    Seconds(u64),
    Text(String),
}

impl DurationInput {
    fn parse(&self, field: &str) -> Result<Duration> {
        match self {
            DurationInput::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            DurationInput::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Ok(Duration::ZERO);
                }
                if let Ok(secs) = text.parse::<u64>() {
                    return Ok(Duration::from_secs(secs));
                }
                humantime::parse_duration(text)
                    .map_err(|e| Error::InvalidRequest(format!("invalid {field}: {e}")))
            }
        }
    }
}

/// A list or a comma separated string.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum ListInput {
    List(Vec<String>),
    Text(String),
}

impl ListInput {
    fn items(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            ListInput::List(items) => items.iter().map(String::as_str).collect(),
            ListInput::Text(text) => text.split(',').collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// A map, a list of `k=v` strings, or a `k=v,k=v` string.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum KeyValueInput {
    Map(BTreeMap<String, String>),
    List(Vec<String>),
    Text(String),
}

impl KeyValueInput {
    fn pairs(&self, field: &str) -> Result<BTreeMap<String, String>> {
        let raw: Vec<&str> = match self {
            KeyValueInput::Map(map) => return Ok(map.clone()),
            KeyValueInput::List(items) => items.iter().map(String::as_str).collect(),
            KeyValueInput::Text(text) => text.split(',').collect(),
        };

        let mut pairs = BTreeMap::new();
        for item in raw.into_iter().map(str::trim).filter(|i| !i.is_empty()) {
            let (key, value) = item.split_once('=').ok_or_else(|| {
                Error::InvalidRequest(format!("invalid {field} entry {item:?}: expected key=value"))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::InvalidRequest(format!(
                    "invalid {field} entry {item:?}: empty key"
                )));
            }
            pairs.insert(key.to_string(), value.trim().to_string());
        }
        Ok(pairs)
    }
}

/// Fields accepted when creating or updating a role. Omitted fields keep
/// their current value on update.
#[derive(ToSchema, Deserialize, Debug, Default, Clone)]
pub struct RoleRequest {
    pub entity_id: Option<String>,
    #[schema(value_type = Object)]
    pub entity_meta: Option<KeyValueInput>,
    pub strict_meta_verify: Option<bool>,
    #[schema(value_type = String)]
    pub token_ttl: Option<DurationInput>,
    #[schema(value_type = String)]
    pub token_max_ttl: Option<DurationInput>,
    #[schema(value_type = String)]
    pub token_explicit_max_ttl: Option<DurationInput>,
    #[schema(value_type = String)]
    pub token_period: Option<DurationInput>,
    #[schema(value_type = Vec<String>)]
    pub token_policies: Option<ListInput>,
    #[schema(value_type = Vec<String>)]
    pub token_bound_cidrs: Option<ListInput>,
    pub token_num_uses: Option<u64>,
    pub token_type: Option<TokenType>,
    pub token_no_default_policy: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct RoleWrite {
    pub role: RolePolicy,
    pub created: bool,
    pub warnings: Vec<String>,
}

#[must_use]
pub fn valid_role_name(name: &str) -> bool {
    Regex::new(r"^\w(([\w.-]+)?\w)?$").is_ok_and(|re| re.is_match(name))
}

/// Normalize a role name for storage.
/// # Errors
/// Returns `Error::InvalidRequest` if the name is empty or contains invalid characters.
pub fn normalize_name(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(Error::InvalidRequest(
            "role name must be specified".to_string(),
        ));
    }
    if !valid_role_name(name) {
        return Err(Error::InvalidRequest(format!("invalid role name: {name:?}")));
    }
    Ok(name.to_lowercase())
}

fn sanitize_policies(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|p| p.to_lowercase())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn validate_cidr(raw: &str) -> Result<String> {
    let invalid = || Error::InvalidRequest(format!("invalid CIDR block: {raw:?}"));
    let (addr, prefix) = match raw.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (raw, None),
    };
    let ip: IpAddr = addr.parse().map_err(|_| invalid())?;
    if let Some(prefix) = prefix {
        let bits: u8 = prefix.parse().map_err(|_| invalid())?;
        let max = if ip.is_ipv4() { 32 } else { 128 };
        if bits > max {
            return Err(invalid());
        }
    }
    Ok(raw.to_string())
}

impl TokenParameters {
    fn merge(&mut self, request: &RoleRequest) -> Result<()> {
        if let Some(ttl) = &request.token_ttl {
            self.token_ttl = ttl.parse("token_ttl")?;
        }
        if let Some(ttl) = &request.token_max_ttl {
            self.token_max_ttl = ttl.parse("token_max_ttl")?;
        }
        if let Some(ttl) = &request.token_explicit_max_ttl {
            self.token_explicit_max_ttl = ttl.parse("token_explicit_max_ttl")?;
        }
        if let Some(period) = &request.token_period {
            self.token_period = period.parse("token_period")?;
        }
        if let Some(policies) = &request.token_policies {
            self.token_policies = sanitize_policies(policies.items());
        }
        if let Some(cidrs) = &request.token_bound_cidrs {
            self.token_bound_cidrs = cidrs
                .items()
                .iter()
                .map(|cidr| validate_cidr(cidr))
                .collect::<Result<_>>()?;
        }
        if let Some(num_uses) = request.token_num_uses {
            self.token_num_uses = num_uses;
        }
        if let Some(token_type) = request.token_type {
            self.token_type = token_type;
        }
        if let Some(no_default) = request.token_no_default_policy {
            self.token_no_default_policy = no_default;
        }
        Ok(())
    }

    fn validate(&self, max_lease_ttl: Duration) -> Result<Vec<String>> {
        if self.token_type.is_batch() {
            if !self.token_period.is_zero() {
                return Err(Error::InvalidRequest(
                    "'token_type' cannot be 'batch' or 'default-batch' when set to generate periodic tokens"
                        .to_string(),
                ));
            }
            if self.token_num_uses > 0 {
                return Err(Error::InvalidRequest(
                    "'token_type' cannot be 'batch' or 'default-batch' when set to generate tokens with limited use count"
                        .to_string(),
                ));
            }
        }

        if !self.token_max_ttl.is_zero() && self.token_ttl > self.token_max_ttl {
            return Err(Error::InvalidRequest(
                "token_max_ttl must be greater than token_ttl".to_string(),
            ));
        }

        let mut warnings = Vec::new();
        if self.token_max_ttl > max_lease_ttl {
            warnings.push(
                "token_max_ttl is greater than the backend's max lease TTL, issued tokens' TTL will be truncated"
                    .to_string(),
            );
        }
        Ok(warnings)
    }
}

/// Create a role from `request`, or merge `request` into `existing`.
/// # Errors
/// Returns `Error::InvalidRequest` if a field cannot be parsed or the result is inconsistent.
pub fn apply(
    existing: Option<RolePolicy>,
    request: &RoleRequest,
    max_lease_ttl: Duration,
) -> Result<RoleWrite> {
    let created = existing.is_none();
    let mut role = match existing {
        Some(role) => role,
        None => RolePolicy {
            role_id: Uuid::new_v4().to_string(),
            entity_id: request
                .entity_id
                .clone()
                .ok_or_else(|| Error::InvalidRequest("entity_id must be provided".to_string()))?,
            entity_meta: BTreeMap::new(),
            strict_meta_verify: false,
            token: TokenParameters::default(),
        },
    };

    if let Some(entity_id) = &request.entity_id {
        role.entity_id = entity_id.trim().to_string();
    }
    if role.entity_id.is_empty() {
        return Err(Error::InvalidRequest(
            "entity_id must not be empty".to_string(),
        ));
    }
    if let Some(meta) = &request.entity_meta {
        role.entity_meta = meta.pairs("entity_meta")?;
    }
    if let Some(strict) = request.strict_meta_verify {
        role.strict_meta_verify = strict;
    }

    role.token.merge(request)?;
    let warnings = role.token.validate(max_lease_ttl)?;

    Ok(RoleWrite {
        role,
        created,
        warnings,
    })
}

fn role_key(name: &str) -> String {
    format!("{ROLE_PREFIX}{}", name.to_lowercase())
}

/// # Errors
/// Returns `Error::Storage` if the record cannot be read or decoded.
pub async fn load(storage: &dyn Storage, name: &str) -> Result<Option<RolePolicy>> {
    match storage.get(&role_key(name)).await? {
        Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        None => Ok(None),
    }
}

/// # Errors
/// Returns `Error::Storage` if the record cannot be written.
pub async fn store(storage: &dyn Storage, name: &str, role: &RolePolicy) -> Result<()> {
    storage.put(&role_key(name), serde_json::to_vec(role)?).await
}

/// # Errors
/// Returns `Error::Storage` if the record cannot be removed.
pub async fn delete(storage: &dyn Storage, name: &str) -> Result<()> {
    storage.delete(&role_key(name)).await
}

/// # Errors
/// Returns `Error::Storage` if the listing fails.
pub async fn list(storage: &dyn Storage) -> Result<Vec<String>> {
    let mut names: Vec<String> = storage
        .list(ROLE_PREFIX)
        .await?
        .into_iter()
        .filter(|name| !name.ends_with('/'))
        .collect();
    names.sort();
    Ok(names)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::storage::InmemStorage;
    use serde_json::json;

    const ENTITY: &str = "11112222-3333-4444-5555-666677778888";
    const MAX_LEASE: Duration = Duration::from_secs(768 * 3600);

    fn request(value: serde_json::Value) -> RoleRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn create_with_defaults() {
        let write = apply(None, &request(json!({"entity_id": ENTITY})), MAX_LEASE).unwrap();

        assert!(write.created);
        assert!(write.warnings.is_empty());
        assert!(Uuid::parse_str(&write.role.role_id).is_ok());
        assert_eq!(write.role.entity_id, ENTITY);
        assert!(write.role.entity_meta.is_empty());
        assert!(!write.role.strict_meta_verify);
        assert_eq!(write.role.token, TokenParameters::default());
    }

    #[test]
    fn create_requires_entity_id() {
        let err = apply(
            None,
            &request(json!({"token_ttl": "10m", "token_policies": "test,sample"})),
            MAX_LEASE,
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("entity_id must be provided"));
    }

    #[test]
    fn token_fields_accept_strings() {
        let write = apply(
            None,
            &request(json!({
                "entity_id": ENTITY,
                "token_ttl": "10m",
                "token_max_ttl": 3600,
                "token_policies": " Test, sample,test ",
                "token_bound_cidrs": ["10.0.0.0/8", "192.168.1.1"],
            })),
            MAX_LEASE,
        )
        .unwrap();

        let token = &write.role.token;
        assert_eq!(token.token_ttl, Duration::from_secs(600));
        assert_eq!(token.token_max_ttl, Duration::from_secs(3600));
        assert_eq!(token.token_policies, vec!["sample", "test"]);
        assert_eq!(token.token_bound_cidrs, vec!["10.0.0.0/8", "192.168.1.1"]);
    }

    #[test]
    fn entity_meta_accepts_every_shape() {
        let expected: BTreeMap<String, String> =
            [("env".to_string(), "prod".to_string()), ("team".to_string(), "a".to_string())]
                .into_iter()
                .collect();

        for meta in [
            json!("env=prod,team=a"),
            json!(["env=prod", "team=a"]),
            json!({"env": "prod", "team": "a"}),
        ] {
            let write = apply(
                None,
                &request(json!({"entity_id": ENTITY, "entity_meta": meta})),
                MAX_LEASE,
            )
            .unwrap();
            assert_eq!(write.role.entity_meta, expected);
        }

        let bad = apply(
            None,
            &request(json!({"entity_id": ENTITY, "entity_meta": "env"})),
            MAX_LEASE,
        );
        assert!(matches!(bad, Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn update_merges_and_keeps_role_id() {
        let created = apply(
            None,
            &request(json!({"entity_id": ENTITY, "entity_meta": "env=prod", "token_ttl": 60})),
            MAX_LEASE,
        )
        .unwrap()
        .role;

        let updated = apply(
            Some(created.clone()),
            &request(json!({"strict_meta_verify": true})),
            MAX_LEASE,
        )
        .unwrap();

        assert!(!updated.created);
        assert_eq!(updated.role.role_id, created.role_id);
        assert_eq!(updated.role.entity_id, ENTITY);
        assert_eq!(updated.role.entity_meta, created.entity_meta);
        assert_eq!(updated.role.token.token_ttl, Duration::from_secs(60));
        assert!(updated.role.strict_meta_verify);
    }

    #[test]
    fn max_ttl_must_cover_ttl() {
        let err = apply(
            None,
            &request(json!({"entity_id": ENTITY, "token_ttl": "2h", "token_max_ttl": "1h"})),
            MAX_LEASE,
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("token_max_ttl must be greater than token_ttl"));
    }

    #[test]
    fn batch_tokens_cannot_be_periodic_or_limited() {
        let periodic = apply(
            None,
            &request(json!({"entity_id": ENTITY, "token_type": "batch", "token_period": "1h"})),
            MAX_LEASE,
        );
        assert!(matches!(periodic, Err(Error::InvalidRequest(_))));

        let limited = apply(
            None,
            &request(json!({"entity_id": ENTITY, "token_type": "default-batch", "token_num_uses": 3})),
            MAX_LEASE,
        );
        assert!(matches!(limited, Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn max_ttl_above_lease_limit_warns() {
        let write = apply(
            None,
            &request(json!({"entity_id": ENTITY, "token_max_ttl": "1000h"})),
            MAX_LEASE,
        )
        .unwrap();
        assert_eq!(write.warnings.len(), 1);
        assert!(write.warnings[0].contains("truncated"));
    }

    #[test]
    fn invalid_cidr_is_rejected() {
        for cidr in ["10.0.0.0/33", "not-an-ip", "::1/129"] {
            let result = apply(
                None,
                &request(json!({"entity_id": ENTITY, "token_bound_cidrs": cidr})),
                MAX_LEASE,
            );
            assert!(result.is_err(), "{cidr} should be rejected");
        }
    }

    #[test]
    fn role_names() {
        assert!(valid_role_name("sample"));
        assert!(valid_role_name("a"));
        assert!(valid_role_name("team-a.web_1"));
        assert!(!valid_role_name("-leading"));
        assert!(!valid_role_name("trailing."));
        assert!(!valid_role_name("with/slash"));
        assert_eq!(normalize_name("Sample").unwrap(), "sample");
        assert!(normalize_name("").is_err());
    }

    #[test]
    fn read_shape_reports_token_fields_in_seconds() {
        let role = apply(
            None,
            &request(json!({"entity_id": ENTITY, "token_ttl": "10m"})),
            MAX_LEASE,
        )
        .unwrap()
        .role;

        let value = serde_json::to_value(&role).unwrap();
        assert_eq!(value["entity_id"], ENTITY);
        assert_eq!(value["token_ttl"], 600);
        assert_eq!(value["token_type"], "default");
        assert_eq!(value["token_policies"], json!([]));
        assert_eq!(value["strict_meta_verify"], false);
    }

    #[tokio::test]
    async fn storage_is_case_insensitive_and_lists_sorted() {
        let storage = InmemStorage::new();
        let role = apply(None, &request(json!({"entity_id": ENTITY})), MAX_LEASE)
            .unwrap()
            .role;

        store(&storage, "Web", &role).await.unwrap();
        store(&storage, "api", &role).await.unwrap();

        assert_eq!(load(&storage, "WEB").await.unwrap(), Some(role));
        assert_eq!(list(&storage).await.unwrap(), vec!["api", "web"]);

        delete(&storage, "web").await.unwrap();
        delete(&storage, "web").await.unwrap();
        assert!(load(&storage, "web").await.unwrap().is_none());
        assert_eq!(list(&storage).await.unwrap(), vec!["api"]);
    }
}
