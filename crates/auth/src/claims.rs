//! Claim model and JWT wire format.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Wire-level claim names.
pub mod claim_types {
    pub const SUBJECT: &str = "sub";
    pub const NAME: &str = "name";
    pub const PREFERRED_USERNAME: &str = "preferred_username";
    pub const EMAIL: &str = "email";
    pub const EMAIL_VERIFIED: &str = "email_verified";
    pub const ROLE: &str = "role";
    pub const CAPABILITY: &str = "capability";
    pub const SCOPE: &str = "scope";

    /// Claim names the builder and token service own. Additional user claims
    /// may not reuse them.
    pub const RESERVED: &[&str] = &[
        SUBJECT,
        NAME,
        PREFERRED_USERNAME,
        EMAIL,
        EMAIL_VERIFIED,
        ROLE,
        CAPABILITY,
        SCOPE,
        "iss",
        "aud",
        "iat",
        "exp",
        "nbf",
        "token_use",
    ];
}

/// Token a claim is allowed to travel in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    AccessToken,
    IdentityToken,
}

const ACCESS_AND_IDENTITY: &[Destination] = &[Destination::AccessToken, Destination::IdentityToken];
const ACCESS_ONLY: &[Destination] = &[Destination::AccessToken];

/// Destinations for a claim type.
///
/// Identity claims and roles go to both tokens; capabilities authorize API
/// calls and stay in the access token, as does anything unrecognized.
pub fn destinations_for(kind: &str) -> &'static [Destination] {
    match kind {
        claim_types::NAME | claim_types::PREFERRED_USERNAME => ACCESS_AND_IDENTITY,
        claim_types::EMAIL => ACCESS_AND_IDENTITY,
        claim_types::ROLE => ACCESS_AND_IDENTITY,
        _ => ACCESS_ONLY,
    }
}

/// A single claim with its allowed destinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Claim {
    pub kind: String,
    pub value: String,
    pub destinations: &'static [Destination],
}

impl Claim {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        let kind = kind.into();
        let destinations = destinations_for(&kind);
        Self {
            kind,
            value: value.into(),
            destinations,
        }
    }

    pub fn goes_to(&self, destination: Destination) -> bool {
        self.destinations.contains(&destination)
    }
}

/// Purpose of a signed token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenUse {
    #[default]
    Access,
    Id,
    Refresh,
}

impl core::fmt::Display for TokenUse {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TokenUse::Access => f.write_str("access"),
            TokenUse::Id => f.write_str("id"),
            TokenUse::Refresh => f.write_str("refresh"),
        }
    }
}

/// JWT payload carried by Forge tokens.
///
/// `role` and `capability` are repeatable claims: they serialize as arrays
/// and accept either a single string or an array on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject / user identifier.
    pub sub: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,

    #[serde(
        rename = "role",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub roles: Vec<String>,

    #[serde(
        rename = "capability",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub capabilities: Vec<String>,

    /// Space-separated granted scopes.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope: String,

    pub iss: String,

    pub aud: String,

    /// Issued-at timestamp.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub iat: DateTime<Utc>,

    /// Expiration timestamp.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub exp: DateTime<Utc>,

    #[serde(default)]
    pub token_use: TokenUse,

    /// Any other claims (e.g. `department`).
    #[serde(flatten)]
    pub additional: BTreeMap<String, serde_json::Value>,
}

impl TokenClaims {
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.split_whitespace()
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Deterministically validate the time window of token claims.
///
/// Signature verification happens in the token service before this runs.
pub fn validate_claims(
    claims: &TokenClaims,
    now: DateTime<Utc>,
) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
