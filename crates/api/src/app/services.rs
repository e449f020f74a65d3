//! Startup wiring of the authorization model and its collaborators.

use std::sync::Arc;

use thiserror::Error;

use forge_auth::{
    CapabilityCatalog, ConfigError, Hs256TokenService, IdentityError, IdentityStore, PolicyError,
    PolicyRegistry, RoleCapabilityMap, TokenClaimsBuilder, TokenService,
};

use crate::settings::AppSettings;

/// Fatal startup failure.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Shared, immutable services used by request handlers.
pub struct AppServices {
    pub policies: Arc<PolicyRegistry>,
    pub claims: TokenClaimsBuilder,
    pub tokens: Arc<dyn TokenService>,
    pub identities: Arc<dyn IdentityStore>,
    pub client_id: String,
    pub development: bool,
}

impl AppServices {
    /// Build and validate everything derived from settings. Any
    /// configuration error aborts startup; nothing is partially loaded.
    pub fn from_settings(
        settings: &AppSettings,
        identities: Arc<dyn IdentityStore>,
    ) -> Result<Self, StartupError> {
        let catalog = CapabilityCatalog::from_settings(&settings.security)?;
        let registry = Arc::new(RoleCapabilityMap::from_settings(&settings.security, &catalog)?);
        let policies = Arc::new(PolicyRegistry::from_registry(&catalog, &registry)?);
        let tokens: Arc<dyn TokenService> =
            Arc::new(Hs256TokenService::from_settings(&settings.security)?);

        tracing::info!(
            capabilities = catalog.len(),
            roles = registry.roles().count(),
            policies = policies.len(),
            "authorization model loaded"
        );

        Ok(Self {
            claims: TokenClaimsBuilder::new(registry),
            policies,
            tokens,
            identities,
            client_id: settings.security.client_id.clone(),
            development: settings.forge.is_development(),
        })
    }
}
