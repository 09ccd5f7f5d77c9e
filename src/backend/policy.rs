use crate::backend::role::RolePolicy;
use std::collections::BTreeMap;

/// Decide whether the identity reported by the leader satisfies `role`.
///
/// The entity id must match exactly. With `strict_meta_verify` the metadata
/// must be equal to the role's; otherwise every key the role names must be
/// present with the same value and extra keys are ignored.
#[must_use]
pub fn matches(role: &RolePolicy, entity_id: &str, metadata: &BTreeMap<String, String>) -> bool {
    if entity_id != role.entity_id {
        return false;
    }

    if role.strict_meta_verify {
        return *metadata == role.entity_meta;
    }

    role.entity_meta
        .iter()
        .all(|(key, value)| metadata.get(key) == Some(value))
}
