use crate::backend::role::{RolePolicy, TokenType};
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Stable identity-linking key for credentials minted by a role.
#[derive(ToSchema, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub name: String,
    pub metadata: BTreeMap<String, String>,
}

/// Descriptor of the credential issued after a successful login.
#[derive(ToSchema, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub display_name: String,
    pub policies: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub alias: Alias,
    pub internal_data: BTreeMap<String, String>,
    /// Seconds.
    pub lease_duration: u64,
    pub max_ttl: u64,
    pub explicit_max_ttl: u64,
    pub period: u64,
    pub num_uses: u64,
    pub bound_cidrs: Vec<String>,
    pub token_type: TokenType,
    pub no_default_policy: bool,
    pub renewable: bool,
    pub orphan: bool,
}

fn role_metadata(role_name: &str, role: &RolePolicy) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("role".to_string(), role_name.to_string()),
        ("mapped_entity_id".to_string(), role.entity_id.clone()),
    ])
}

#[must_use]
pub fn alias_for(role_name: &str, role: &RolePolicy) -> Alias {
    Alias {
        name: role.role_id.clone(),
        metadata: role_metadata(role_name, role),
    }
}

/// Copy the role's token parameters into a non-renewable orphan credential.
#[must_use]
pub fn mint(role_name: &str, role: &RolePolicy) -> Credential {
    let token = &role.token;
    Credential {
        display_name: format!("{role_name}-{}", role.entity_id),
        policies: token.token_policies.clone(),
        metadata: role_metadata(role_name, role),
        alias: alias_for(role_name, role),
        internal_data: BTreeMap::from([("role".to_string(), role_name.to_string())]),
        lease_duration: token.token_ttl.as_secs(),
        max_ttl: token.token_max_ttl.as_secs(),
        explicit_max_ttl: token.token_explicit_max_ttl.as_secs(),
        period: token.token_period.as_secs(),
        num_uses: token.token_num_uses,
        bound_cidrs: token.token_bound_cidrs.clone(),
        token_type: token.token_type,
        no_default_policy: token.token_no_default_policy,
        renewable: false,
        orphan: true,
    }
}
