//! Service identity settings shared by every Forge service.

use serde::{Deserialize, Serialize};

/// Environment name used when none is configured.
pub const DEVELOPMENT: &str = "Development";

/// Identity of the running service, bound from the `forge` settings section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeSettings {
    /// Name of the service, typically `application-service` (e.g. `app-backend`).
    pub service_name: String,

    /// Team responsible for the service (optional).
    pub team_name: String,

    /// Tenant/organization name (optional).
    pub tenant: String,

    /// Deployment environment (Development, Staging, Production, ...).
    ///
    /// When empty the loader fills it from `FORGE_ENVIRONMENT`.
    pub environment: String,

    /// System name; an application usually consists of a few services.
    pub application: String,
}

impl ForgeSettings {
    pub fn is_development(&self) -> bool {
        self.environment == DEVELOPMENT
    }
}

impl core::fmt::Display for ForgeSettings {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} :: {} ({}, {})",
            self.application, self.service_name, self.environment, self.tenant
        )
    }
}

/// Implemented by application settings types that embed [`ForgeSettings`].
pub trait ForgeSettingsProvider {
    fn forge(&self) -> &ForgeSettings;

    fn forge_mut(&mut self) -> &mut ForgeSettings;
}

impl ForgeSettingsProvider for ForgeSettings {
    fn forge(&self) -> &ForgeSettings {
        self
    }

    fn forge_mut(&mut self) -> &mut ForgeSettings {
        self
    }
}
