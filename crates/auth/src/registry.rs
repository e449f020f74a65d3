//! Role → capability registry.
//!
//! Built once at startup from configuration and read-only afterwards, so it
//! can be shared (`Arc`) by any number of concurrent requests without locks.

use std::collections::{BTreeMap, BTreeSet};

use crate::capability::{Capability, CapabilityCatalog};
use crate::config::SecuritySettings;
use crate::error::ConfigError;
use crate::roles::Role;

static NO_CAPABILITIES: BTreeSet<Capability> = BTreeSet::new();

/// Immutable mapping of role name to granted capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleCapabilityMap {
    roles: BTreeMap<Role, BTreeSet<Capability>>,
}

impl RoleCapabilityMap {
    /// Parse `role -> [capability]` against the closed catalog.
    ///
    /// Fails on the first unknown capability; there is no partial load.
    /// A capability listed twice under one role is kept once.
    pub fn load(
        config: &BTreeMap<String, Vec<String>>,
        catalog: &CapabilityCatalog,
    ) -> Result<Self, ConfigError> {
        let mut roles = BTreeMap::new();

        for (role, names) in config {
            if role.trim().is_empty() {
                return Err(ConfigError::EmptyRole);
            }

            let mut granted = BTreeSet::new();
            for name in names {
                let capability =
                    catalog
                        .get(name)
                        .ok_or_else(|| ConfigError::UnknownCapability {
                            role: role.clone(),
                            capability: name.clone(),
                        })?;
                granted.insert(capability.clone());
            }

            roles.insert(Role::from(role.as_str()), granted);
        }

        tracing::debug!(roles = roles.len(), "role capability map loaded");
        Ok(Self { roles })
    }

    /// Load from the `security.role_capabilities` section (required).
    pub fn from_settings(
        settings: &SecuritySettings,
        catalog: &CapabilityCatalog,
    ) -> Result<Self, ConfigError> {
        let section = settings
            .role_capabilities
            .as_ref()
            .ok_or(ConfigError::MissingSection("security.role_capabilities"))?;
        Self::load(section, catalog)
    }

    /// Capabilities granted by `role`. An unknown role grants nothing.
    pub fn capabilities_for(&self, role: &str) -> &BTreeSet<Capability> {
        self.roles.get(role).unwrap_or(&NO_CAPABILITIES)
    }

    /// Union of the capabilities granted by every role in `roles`.
    pub fn capabilities_for_roles<'a, I>(&self, roles: I) -> BTreeSet<Capability>
    where
        I: IntoIterator<Item = &'a str>,
    {
        roles
            .into_iter()
            .flat_map(|role| self.capabilities_for(role).iter().cloned())
            .collect()
    }

    /// Configured role names.
    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.keys()
    }

    pub fn contains_role(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }
}
