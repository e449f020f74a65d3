//! Named authorization policies and their evaluation.
//!
//! One policy exists per declared capability and one per configured role.
//! The set is fixed at startup; evaluation is a pure check of the principal's
//! claims and never touches the registry.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::capability::{Capability, CapabilityCatalog};
use crate::principal::Principal;
use crate::registry::RoleCapabilityMap;
use crate::roles::Role;

/// The single claim a policy requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Role(Role),
    Capability(Capability),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationPolicy {
    pub name: String,
    pub requirement: Requirement,
}

impl AuthorizationPolicy {
    /// Policy named after `role`, requiring a `role` claim with that value.
    pub fn role(role: impl Into<Role>) -> Self {
        let role = role.into();
        Self {
            name: role.to_string(),
            requirement: Requirement::Role(role),
        }
    }

    /// Policy named after `capability`, requiring a `capability` claim with that value.
    pub fn capability(capability: Capability) -> Self {
        Self {
            name: capability.to_string(),
            requirement: Requirement::Capability(capability),
        }
    }

    pub fn evaluate(&self, principal: Option<&Principal>) -> Decision {
        let Some(principal) = principal else {
            return Decision::Deny(DenyReason::Unauthenticated);
        };
        let satisfied = match &self.requirement {
            Requirement::Role(role) => principal.has_role(role.as_str()),
            Requirement::Capability(capability) => principal.has_capability(capability.as_str()),
        };
        if satisfied {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::Forbidden)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// No valid principal on the request.
    #[error("authentication required")]
    Unauthenticated,

    /// Authenticated, but the required claim is absent.
    #[error("insufficient privilege")]
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> Result<(), DenyReason> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(reason),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("policy '{0}' is registered more than once")]
    Duplicate(String),

    #[error("no policy registered for '{0}'")]
    Missing(String),

    #[error("unknown policy '{0}'")]
    Unknown(String),
}

/// Immutable set of named policies.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: BTreeMap<String, AuthorizationPolicy>,
}

#[derive(Debug, Default)]
pub struct PolicyRegistryBuilder {
    policies: BTreeMap<String, AuthorizationPolicy>,
}

impl PolicyRegistryBuilder {
    pub fn register(mut self, policy: AuthorizationPolicy) -> Result<Self, PolicyError> {
        if self.policies.contains_key(&policy.name) {
            return Err(PolicyError::Duplicate(policy.name));
        }
        self.policies.insert(policy.name.clone(), policy);
        Ok(self)
    }

    /// One capability policy per catalog entry.
    pub fn register_catalog(self, catalog: &CapabilityCatalog) -> Result<Self, PolicyError> {
        catalog
            .iter()
            .try_fold(self, |b, c| b.register(AuthorizationPolicy::capability(c.clone())))
    }

    /// One role policy per configured role.
    pub fn register_roles(self, map: &RoleCapabilityMap) -> Result<Self, PolicyError> {
        map.roles()
            .try_fold(self, |b, r| b.register(AuthorizationPolicy::role(r.clone())))
    }

    /// Finish, checking that every capability and every role has its policy.
    pub fn build(
        self,
        catalog: &CapabilityCatalog,
        map: &RoleCapabilityMap,
    ) -> Result<PolicyRegistry, PolicyError> {
        let expected = catalog
            .iter()
            .map(|c| (c.as_str(), Requirement::Capability(c.clone())))
            .chain(map.roles().map(|r| (r.as_str(), Requirement::Role(r.clone()))));

        for (name, requirement) in expected {
            match self.policies.get(name) {
                Some(policy) if policy.requirement == requirement => {}
                _ => return Err(PolicyError::Missing(name.to_string())),
            }
        }

        Ok(PolicyRegistry {
            policies: self.policies,
        })
    }
}

impl PolicyRegistry {
    pub fn builder() -> PolicyRegistryBuilder {
        PolicyRegistryBuilder::default()
    }

    /// The standard policy set: one per capability, one per role.
    pub fn from_registry(
        catalog: &CapabilityCatalog,
        map: &RoleCapabilityMap,
    ) -> Result<Self, PolicyError> {
        let registry = Self::builder()
            .register_catalog(catalog)?
            .register_roles(map)?
            .build(catalog, map)?;
        tracing::debug!(policies = registry.len(), "authorization policies registered");
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&AuthorizationPolicy> {
        self.policies.get(name)
    }

    /// Like [`get`](Self::get), failing with [`PolicyError::Unknown`].
    pub fn require(&self, name: &str) -> Result<&AuthorizationPolicy, PolicyError> {
        self.get(name)
            .ok_or_else(|| PolicyError::Unknown(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn evaluate(
        &self,
        name: &str,
        principal: Option<&Principal>,
    ) -> Result<Decision, PolicyError> {
        Ok(self.require(name)?.evaluate(principal))
    }
}

/// Check for routes that accept any authenticated user.
pub fn require_authenticated(principal: Option<&Principal>) -> Decision {
    match principal {
        Some(_) => Decision::Allow,
        None => Decision::Deny(DenyReason::Unauthenticated),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{TokenClaimsBuilder, UserIdentity};
    use crate::claims::claim_types;
    use crate::error::ConfigError;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    const ALL: [&str; 4] = ["ReadResX", "WriteResX", "ReadResY", "WriteResY"];

    fn catalog() -> CapabilityCatalog {
        CapabilityCatalog::new(ALL).unwrap()
    }

    fn map(pairs: Vec<(&str, Vec<&str>)>) -> RoleCapabilityMap {
        let config: BTreeMap<String, Vec<String>> = pairs
            .into_iter()
            .map(|(r, caps)| (r.to_string(), caps.into_iter().map(str::to_string).collect()))
            .collect();
        RoleCapabilityMap::load(&config, &catalog()).unwrap()
    }

    fn scenario_map() -> RoleCapabilityMap {
        map(vec![
            ("admin", vec!["ReadResX", "WriteResX"]),
            ("user", vec!["ReadResX"]),
        ])
    }

    fn principal_with(roles: &[&str], capabilities: &[&str]) -> Principal {
        Principal {
            user_id: "u-1".into(),
            name: None,
            preferred_username: Some("someone".into()),
            email: None,
            email_verified: false,
            roles: roles.iter().map(|r| Role::from(*r)).collect(),
            capabilities: capabilities.iter().map(|c| Capability::new(c.to_string())).collect(),
            scopes: Vec::new(),
            additional: BTreeMap::new(),
        }
    }

    /// Principal as it would come out of a token issued for `roles`.
    fn issued_principal(map: RoleCapabilityMap, roles: &[&str]) -> Principal {
        let builder = TokenClaimsBuilder::new(Arc::new(map));
        let user = UserIdentity {
            id: "u-1".into(),
            user_name: "someone".into(),
            email: None,
            email_verified: false,
            additional_claims: Vec::new(),
        };
        let issued = builder.build(&user, roles.iter().copied(), &[]);
        principal_with(
            &issued.values(claim_types::ROLE).collect::<Vec<_>>(),
            &issued.values(claim_types::CAPABILITY).collect::<Vec<_>>(),
        )
    }

    fn policies() -> PolicyRegistry {
        PolicyRegistry::from_registry(&catalog(), &scenario_map()).unwrap()
    }

    #[test]
    fn one_policy_per_capability_and_role() {
        let registry = policies();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(
            names,
            vec!["ReadResX", "ReadResY", "WriteResX", "WriteResY", "admin", "user"]
        );
        assert_eq!(
            registry.get("admin").map(|p| &p.requirement),
            Some(&Requirement::Role(Role::from("admin")))
        );
    }

    #[test]
    fn user_is_forbidden_to_write() {
        let user = issued_principal(scenario_map(), &["user"]);
        assert_eq!(
            policies().evaluate("WriteResX", Some(&user)),
            Ok(Decision::Deny(DenyReason::Forbidden))
        );
    }

    #[test]
    fn admin_may_write() {
        let admin = issued_principal(scenario_map(), &["admin"]);
        assert_eq!(policies().evaluate("WriteResX", Some(&admin)), Ok(Decision::Allow));
    }

    #[test]
    fn anonymous_is_unauthenticated() {
        assert_eq!(
            policies().evaluate("ReadResX", None),
            Ok(Decision::Deny(DenyReason::Unauthenticated))
        );
    }

    #[test]
    fn authenticated_without_roles_is_forbidden_not_unauthenticated() {
        let nobody = issued_principal(scenario_map(), &[]);
        assert_eq!(
            policies().evaluate("ReadResX", Some(&nobody)),
            Ok(Decision::Deny(DenyReason::Forbidden))
        );
    }

    #[test]
    fn role_policies_check_role_claims() {
        let registry = policies();
        let user = issued_principal(scenario_map(), &["user"]);
        assert_eq!(registry.evaluate("user", Some(&user)), Ok(Decision::Allow));
        assert_eq!(
            registry.evaluate("admin", Some(&user)),
            Ok(Decision::Deny(DenyReason::Forbidden))
        );
    }

    #[test]
    fn unknown_policy_is_an_error() {
        assert_eq!(
            policies().evaluate("DeleteResZ", None),
            Err(PolicyError::Unknown("DeleteResZ".into()))
        );
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let result = PolicyRegistry::builder()
            .register(AuthorizationPolicy::role("admin"))
            .and_then(|b| b.register(AuthorizationPolicy::role("admin")));
        assert_eq!(result.err(), Some(PolicyError::Duplicate("admin".into())));
    }

    #[test]
    fn role_named_like_a_capability_collides() {
        let clashing = map(vec![("ReadResX", vec!["ReadResX"])]);
        assert_eq!(
            PolicyRegistry::from_registry(&catalog(), &clashing).err(),
            Some(PolicyError::Duplicate("ReadResX".into()))
        );
    }

    #[test]
    fn incomplete_registration_is_rejected() {
        let result = PolicyRegistry::builder()
            .register_catalog(&catalog())
            .and_then(|b| b.build(&catalog(), &scenario_map()));
        assert_eq!(result.err(), Some(PolicyError::Missing("admin".into())));
    }

    #[test]
    fn policy_with_wrong_requirement_counts_as_missing() {
        let wrong = AuthorizationPolicy {
            name: "admin".into(),
            requirement: Requirement::Capability(Capability::new("WriteResX")),
        };
        let result = PolicyRegistry::builder()
            .register_catalog(&catalog())
            .and_then(|b| b.register(wrong))
            .and_then(|b| b.register(AuthorizationPolicy::role("user")))
            .and_then(|b| b.build(&catalog(), &scenario_map()));
        assert_eq!(result.err(), Some(PolicyError::Missing("admin".into())));
    }

    #[test]
    fn unknown_capability_fails_before_policies_exist() {
        let mut config = BTreeMap::new();
        config.insert("admin".to_string(), vec!["DeleteResZ".to_string()]);
        assert_eq!(
            RoleCapabilityMap::load(&config, &catalog()).err(),
            Some(ConfigError::UnknownCapability {
                role: "admin".into(),
                capability: "DeleteResZ".into(),
            })
        );
    }

    #[test]
    fn require_authenticated_only_checks_presence() {
        assert_eq!(
            require_authenticated(None),
            Decision::Deny(DenyReason::Unauthenticated)
        );
        assert!(require_authenticated(Some(&principal_with(&[], &[]))).is_allowed());
    }

    #[test]
    fn deny_reasons_are_distinguishable() {
        assert_eq!(DenyReason::Unauthenticated.to_string(), "authentication required");
        assert_eq!(DenyReason::Forbidden.to_string(), "insufficient privilege");
        assert_eq!(
            Decision::Deny(DenyReason::Forbidden).into_result(),
            Err(DenyReason::Forbidden)
        );
    }

    fn capability_subset() -> impl Strategy<Value = BTreeSet<&'static str>> {
        proptest::sample::subsequence(ALL.to_vec(), 0..=ALL.len())
            .prop_map(|v| v.into_iter().collect())
    }

    proptest! {
        #[test]
        fn single_role_grants_exactly_its_capabilities(granted in capability_subset()) {
            let role_map = map(vec![("r", granted.iter().copied().collect())]);
            let registry = PolicyRegistry::from_registry(&catalog(), &role_map).unwrap();
            let principal = issued_principal(role_map, &["r"]);

            for capability in ALL {
                let expected = if granted.contains(capability) {
                    Decision::Allow
                } else {
                    Decision::Deny(DenyReason::Forbidden)
                };
                prop_assert_eq!(registry.evaluate(capability, Some(&principal)), Ok(expected));
            }
        }
    }
}
