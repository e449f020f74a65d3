//! Security settings (`security` section of the application settings).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Security configuration bound from the `security` settings section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    /// `iss` claim of issued tokens; also the only accepted issuer.
    pub issuer: String,

    /// `aud` claim of issued tokens; also the only accepted audience.
    pub audience: String,

    /// HMAC secret used to sign tokens.
    pub signing_key: String,

    /// Client id accepted at the token endpoint.
    pub client_id: String,

    pub access_token_lifetime_minutes: i64,

    pub refresh_token_lifetime_days: i64,

    /// The closed set of capability names.
    pub capabilities: Vec<String>,

    /// Role name -> capability names. Required.
    pub role_capabilities: Option<BTreeMap<String, Vec<String>>>,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            issuer: "forge".to_string(),
            audience: "forge-api".to_string(),
            signing_key: String::new(),
            client_id: "forge-spa".to_string(),
            access_token_lifetime_minutes: 60,
            refresh_token_lifetime_days: 14,
            capabilities: Vec::new(),
            role_capabilities: None,
        }
    }
}
