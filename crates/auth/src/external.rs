//! Adapter for external identity providers that nest role membership
//! (`realm_access.roles`, `resource_access.{client}.roles`).
//!
//! Malformed groups are logged and skipped; they never fail the request.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::roles::Role;

pub const REALM_ACCESS: &str = "realm_access";
pub const RESOURCE_ACCESS: &str = "resource_access";

/// Role names found in the provider's nested role claims.
///
/// Realm roles are taken as-is; client roles are qualified as `client:role`.
/// Each group may be a JSON object or a JSON-encoded string.
pub fn expand_external_roles(claims: &Map<String, Value>) -> BTreeSet<Role> {
    let mut roles = BTreeSet::new();

    if let Some(group) = claims.get(REALM_ACCESS).and_then(|v| parse_group(REALM_ACCESS, v)) {
        match group.get("roles") {
            Some(Value::Array(items)) => roles.extend(role_names(items).map(Role::from)),
            Some(_) => tracing::warn!(claim = REALM_ACCESS, "ignoring malformed roles list"),
            None => {}
        }
    }

    if let Some(group) = claims
        .get(RESOURCE_ACCESS)
        .and_then(|v| parse_group(RESOURCE_ACCESS, v))
    {
        for (client, access) in &group {
            match access.get("roles") {
                Some(Value::Array(items)) => {
                    let client_roles = role_names(items).map(|role| format!("{client}:{role}"));
                    roles.extend(client_roles.map(Role::from));
                }
                Some(_) => {
                    tracing::warn!(
                        claim = RESOURCE_ACCESS,
                        %client,
                        "ignoring malformed client roles"
                    );
                }
                None => {}
            }
        }
    }

    roles
}

/// Values of a claim that may be a single string or an array of strings.
pub(crate) fn string_values(value: Option<&Value>) -> impl Iterator<Item = String> + '_ {
    let items: &[Value] = match value {
        Some(Value::Array(items)) => items,
        Some(single) => std::slice::from_ref(single),
        None => &[],
    };
    items
        .iter()
        .filter_map(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_group(claim: &str, value: &Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map.clone()),
        Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
            Ok(Value::Object(map)) => Some(map),
            Ok(_) => {
                tracing::warn!(%claim, "ignoring non-object role claim");
                None
            }
            Err(e) => {
                tracing::warn!(%claim, error = %e, "ignoring malformed role claim");
                None
            }
        },
        _ => {
            tracing::warn!(%claim, "ignoring non-object role claim");
            None
        }
    }
}

fn role_names(items: &[Value]) -> impl Iterator<Item = &str> {
    items.iter().filter_map(|v| v.as_str()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(roles: &BTreeSet<Role>) -> Vec<&str> {
        roles.iter().map(|r| r.as_str()).collect()
    }

    #[test]
    fn realm_and_client_roles_are_expanded() {
        let claims = json!({
            "realm_access": { "roles": ["admin", "user"] },
            "resource_access": {
                "forge-api": { "roles": ["reader"] },
                "account": { "roles": ["manage-account"] }
            }
        });
        let roles = expand_external_roles(claims.as_object().unwrap());
        assert_eq!(
            names(&roles),
            vec!["account:manage-account", "admin", "forge-api:reader", "user"]
        );
    }

    #[test]
    fn json_encoded_groups_are_accepted() {
        let claims = json!({ "realm_access": "{\"roles\":[\"user\"]}" });
        let roles = expand_external_roles(claims.as_object().unwrap());
        assert_eq!(names(&roles), vec!["user"]);
    }

    #[test]
    fn malformed_group_is_ignored_without_affecting_others() {
        let claims = json!({
            "realm_access": "{not json",
            "resource_access": { "forge-api": { "roles": ["reader", "", 7] } }
        });
        let roles = expand_external_roles(claims.as_object().unwrap());
        assert_eq!(names(&roles), vec!["forge-api:reader"]);
    }

    #[test]
    fn malformed_roles_list_is_ignored() {
        let claims = json!({ "realm_access": { "roles": "admin" } });
        assert!(expand_external_roles(claims.as_object().unwrap()).is_empty());
    }

    #[test]
    fn duplicates_collapse() {
        let claims = json!({ "realm_access": { "roles": ["user", "user"] } });
        assert_eq!(expand_external_roles(claims.as_object().unwrap()).len(), 1);
    }
}
