use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use forge_api::AppSettings;
use forge_auth::{IdentityStore, InMemoryIdentityStore, seed_development_users};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_dir = std::env::var_os("FORGE_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let settings: AppSettings = forge_settings::load_from_env(&config_dir)
        .with_context(|| format!("failed to load settings from {}", config_dir.display()))?;
    let settings = forge_settings::install(settings).context("failed to install settings")?;

    forge_observability::init(&settings.logging);
    tracing::info!(service = %settings.forge, "starting");

    let identities = Arc::new(InMemoryIdentityStore::new());
    if settings.forge.is_development() && settings.hosting.seed_development_users {
        seed_development_users(identities.as_ref())
            .await
            .context("failed to seed development users")?;
        tracing::warn!("development users seeded");
    }
    let identities: Arc<dyn IdentityStore> = identities;

    let app = forge_api::build_app(settings, identities).inspect_err(|e| {
        tracing::error!(error = %e, "invalid configuration");
    })?;

    let listener = tokio::net::TcpListener::bind(&settings.hosting.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", settings.hosting.bind_address))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
