//! Token claims builder.
//!
//! Computes the full claim set for a user at token issuance. Capabilities are
//! resolved here, once, and embedded in the token so that request-time
//! evaluation never has to consult the registry.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::claims::{Claim, Destination, claim_types};
use crate::registry::RoleCapabilityMap;

/// Scopes the token endpoint can grant.
pub const SUPPORTED_SCOPES: [&str; 5] = ["openid", "email", "profile", "roles", "offline_access"];

/// Split a space-separated OAuth2 `scope` parameter.
pub fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Identity facts about the user being issued a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: String,
    pub user_name: String,
    pub email: Option<String>,
    pub email_verified: bool,

    /// Additional claims stored for the user (e.g. `department`).
    pub additional_claims: Vec<(String, String)>,
}

/// Claim set computed for one issuance, plus the granted scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedClaims {
    pub claims: Vec<Claim>,
    pub scopes: Vec<String>,
}

impl IssuedClaims {
    /// Value of the `sub` claim.
    pub fn subject(&self) -> &str {
        self.first(claim_types::SUBJECT).unwrap_or_default()
    }

    pub fn first(&self, kind: &str) -> Option<&str> {
        self.values(kind).next()
    }

    pub fn values<'a>(&'a self, kind: &str) -> impl Iterator<Item = &'a str> {
        self.claims
            .iter()
            .filter(move |c| c.kind == kind)
            .map(|c| c.value.as_str())
    }

    /// Claims allowed in the token for `destination`.
    pub fn for_destination(&self, destination: Destination) -> impl Iterator<Item = &Claim> {
        self.claims.iter().filter(move |c| c.goes_to(destination))
    }

    pub fn capabilities(&self) -> BTreeSet<&str> {
        self.values(claim_types::CAPABILITY).collect()
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Builds claim sets from identity, role membership and requested scopes.
#[derive(Debug, Clone)]
pub struct TokenClaimsBuilder {
    registry: Arc<RoleCapabilityMap>,
}

impl TokenClaimsBuilder {
    pub fn new(registry: Arc<RoleCapabilityMap>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RoleCapabilityMap {
        &self.registry
    }

    /// Compute the claims for `user` holding `roles`.
    ///
    /// Pure: the same user/role state always yields the same claim set.
    pub fn build<'a, R>(
        &self,
        user: &UserIdentity,
        roles: R,
        requested_scopes: &[String],
    ) -> IssuedClaims
    where
        R: IntoIterator<Item = &'a str>,
    {
        let mut claims = vec![
            Claim::new(claim_types::SUBJECT, user.id.clone()),
            Claim::new(claim_types::NAME, user.user_name.clone()),
            Claim::new(claim_types::PREFERRED_USERNAME, user.user_name.clone()),
        ];

        if let Some(email) = user.email.as_deref().filter(|e| !e.is_empty()) {
            claims.push(Claim::new(claim_types::EMAIL, email));
            claims.push(Claim::new(claim_types::EMAIL_VERIFIED, user.email_verified.to_string()));
        }

        let mut held: Vec<&str> = Vec::new();
        for role in roles {
            if !held.contains(&role) {
                held.push(role);
            }
        }
        for role in &held {
            claims.push(Claim::new(claim_types::ROLE, *role));
        }

        for capability in self.registry.capabilities_for_roles(held.iter().copied()) {
            claims.push(Claim::new(claim_types::CAPABILITY, capability.as_str()));
        }

        for (kind, value) in &user.additional_claims {
            if claim_types::RESERVED.contains(&kind.as_str()) {
                tracing::warn!(
                    claim = %kind,
                    user_id = %user.id,
                    "ignoring additional claim with a reserved name"
                );
                continue;
            }
            claims.push(Claim::new(kind.clone(), value.clone()));
        }

        IssuedClaims {
            claims,
            scopes: allowed_scopes(requested_scopes),
        }
    }
}

/// Requested scopes intersected with [`SUPPORTED_SCOPES`], in request order.
pub fn allowed_scopes(requested: &[String]) -> Vec<String> {
    let mut allowed: Vec<String> = Vec::new();
    for scope in requested {
        if SUPPORTED_SCOPES.contains(&scope.as_str()) && !allowed.contains(scope) {
            allowed.push(scope.clone());
        }
    }
    allowed
}
