use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::capability::Capability;
use crate::claims::{TokenClaims, claim_types};
use crate::external;
use crate::roles::Role;

/// The validated identity behind one request.
///
/// Built from signed token claims by the token service (or from an external
/// identity provider's claims) and dropped at the end of the request.
/// Capabilities are taken from the token as issued; they are never
/// re-resolved against the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Principal {
    pub user_id: String,
    pub name: Option<String>,
    pub preferred_username: Option<String>,
    pub email: Option<String>,
    pub email_verified: bool,
    pub roles: BTreeSet<Role>,
    pub capabilities: BTreeSet<Capability>,
    pub scopes: Vec<String>,
    pub additional: BTreeMap<String, serde_json::Value>,
}

impl Principal {
    pub fn from_claims(claims: TokenClaims) -> Self {
        let scopes = claims.scopes().map(str::to_string).collect();
        Self {
            user_id: claims.sub,
            name: claims.name,
            preferred_username: claims.preferred_username,
            email: claims.email,
            email_verified: claims.email_verified.unwrap_or(false),
            roles: claims.roles.into_iter().map(Role::from).collect(),
            capabilities: claims.capabilities.into_iter().map(Capability::new).collect(),
            scopes,
            additional: claims.additional,
        }
    }

    /// Build a principal from an external identity provider's (already
    /// validated) claims, flattening its nested role structures.
    ///
    /// Returns `None` when the claims carry no subject.
    pub fn from_external_claims(raw: &serde_json::Map<String, serde_json::Value>) -> Option<Self> {
        let text = |key: &str| raw.get(key).and_then(|v| v.as_str()).map(str::to_string);

        let user_id = text(claim_types::SUBJECT).filter(|s| !s.is_empty())?;

        let mut roles: BTreeSet<Role> = external::string_values(raw.get(claim_types::ROLE))
            .chain(external::string_values(raw.get("roles")))
            .map(Role::from)
            .collect();
        roles.extend(external::expand_external_roles(raw));

        let capabilities = external::string_values(raw.get(claim_types::CAPABILITY))
            .map(Capability::new)
            .collect();

        let known = [
            claim_types::SUBJECT,
            claim_types::NAME,
            claim_types::PREFERRED_USERNAME,
            claim_types::EMAIL,
            claim_types::EMAIL_VERIFIED,
            claim_types::ROLE,
            claim_types::CAPABILITY,
            claim_types::SCOPE,
            "roles",
            external::REALM_ACCESS,
            external::RESOURCE_ACCESS,
        ];
        let additional = raw
            .iter()
            .filter(|(k, _)| !known.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Some(Self {
            user_id,
            name: text(claim_types::NAME),
            preferred_username: text(claim_types::PREFERRED_USERNAME),
            email: text(claim_types::EMAIL),
            email_verified: raw
                .get(claim_types::EMAIL_VERIFIED)
                .and_then(|v| v.as_bool().or_else(|| v.as_str().map(|s| s == "true")))
                .unwrap_or(false),
            roles,
            capabilities,
            scopes: text(claim_types::SCOPE)
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            additional,
        })
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// Display name: `preferred_username`, falling back to `name`.
    pub fn user_name(&self) -> Option<&str> {
        self.preferred_username
            .as_deref()
            .or(self.name.as_deref())
            .filter(|n| !n.is_empty())
    }

    /// First value of a single-valued claim, by wire name.
    pub fn claim(&self, kind: &str) -> Option<String> {
        match kind {
            claim_types::SUBJECT => Some(self.user_id.clone()),
            claim_types::NAME => self.name.clone(),
            claim_types::PREFERRED_USERNAME => self.preferred_username.clone(),
            claim_types::EMAIL => self.email.clone(),
            claim_types::EMAIL_VERIFIED => Some(self.email_verified.to_string()),
            claim_types::ROLE => self.roles.iter().next().map(|r| r.to_string()),
            claim_types::CAPABILITY => self.capabilities.iter().next().map(|c| c.to_string()),
            other => self.additional.get(other).and_then(|v| match v {
                serde_json::Value::Array(values) => values.first().map(claim_text),
                value => Some(claim_text(value)),
            }),
        }
    }
}

fn claim_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
