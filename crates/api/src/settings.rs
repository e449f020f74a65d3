//! Typed settings of the API service (`appsettings*.json`).

use forge_auth::SecuritySettings;
use forge_core::{ForgeSettings, ForgeSettingsProvider};
use forge_observability::LoggingSettings;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub forge: ForgeSettings,
    pub security: SecuritySettings,
    pub logging: LoggingSettings,
    pub hosting: HostingSettings,
}

impl ForgeSettingsProvider for AppSettings {
    fn forge(&self) -> &ForgeSettings {
        &self.forge
    }

    fn forge_mut(&mut self) -> &mut ForgeSettings {
        &mut self.forge
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostingSettings {
    pub bind_address: String,

    /// Allowed CORS origins. Empty disables CORS.
    pub cors_origins: Vec<String>,

    /// Create the `admin`/`user` accounts at startup (Development only).
    pub seed_development_users: bool,
}

impl Default for HostingSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            cors_origins: Vec::new(),
            seed_development_users: true,
        }
    }
}
