//! Capabilities and the closed set they are drawn from.

use std::borrow::{Borrow, Cow};
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::SecuritySettings;
use crate::error::ConfigError;

/// Capability identifier (fine-grained permission, e.g. `WriteResX`).
///
/// Capabilities are opaque: two capabilities are the same iff their names
/// match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(Cow<'static, str>);

impl Capability {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Capability {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The closed, application-defined set of capabilities.
///
/// Every capability referenced by the role map and every capability policy
/// must be a member of this set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityCatalog {
    capabilities: BTreeSet<Capability>,
}

impl CapabilityCatalog {
    /// Build the catalog. Empty and duplicate names are configuration errors.
    pub fn new<I, S>(names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Cow<'static, str>>,
    {
        let mut capabilities = BTreeSet::new();
        for name in names {
            let capability = Capability::new(name);
            if capability.as_str().trim().is_empty() {
                return Err(ConfigError::EmptyCapability);
            }
            if let Some(dup) = capabilities.replace(capability) {
                return Err(ConfigError::DuplicateCapability(dup.as_str().to_string()));
            }
        }
        Ok(Self { capabilities })
    }

    /// The catalog declared in the `security.capabilities` settings.
    pub fn from_settings(settings: &SecuritySettings) -> Result<Self, ConfigError> {
        Self::new(settings.capabilities.iter().cloned())
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.capabilities.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}
