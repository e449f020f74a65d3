#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use argon2::{Algorithm, Argon2, Params, Version};
use axum::Router;

use forge_api::AppSettings;
use forge_auth::{IdentityStore, InMemoryIdentityStore, seed_development_users};

pub const SIGNING_KEY: &str = "integration-test-signing-key";

pub fn settings(environment: &str) -> AppSettings {
    let mut settings = AppSettings::default();
    settings.forge.service_name = "forge-api".into();
    settings.forge.application = "Forge".into();
    settings.forge.environment = environment.into();
    settings.security.signing_key = SIGNING_KEY.into();
    settings.security.capabilities = ["ReadResX", "WriteResX", "ReadResY", "WriteResY"]
        .map(String::from)
        .to_vec();
    settings.security.role_capabilities = Some(BTreeMap::from([
        ("admin".to_string(), vec!["ReadResX".to_string(), "WriteResX".to_string()]),
        ("user".to_string(), vec!["ReadResX".to_string()]),
    ]));
    settings
}

/// Identity store with the development users and cheap hashing parameters.
pub async fn seeded_store() -> Arc<InMemoryIdentityStore> {
    let params = Params::new(1024, 1, 1, None).unwrap();
    let store = Arc::new(InMemoryIdentityStore::with_hasher(Argon2::new(
        Algorithm::Argon2id,
        Version::V0x13,
        params,
    )));
    seed_development_users(store.as_ref()).await.unwrap();
    store
}

pub async fn app(environment: &str) -> (Router, Arc<InMemoryIdentityStore>) {
    let store = seeded_store().await;
    let identities: Arc<dyn IdentityStore> = store.clone();
    let app = forge_api::build_app(&settings(environment), identities).unwrap();
    (app, store)
}
