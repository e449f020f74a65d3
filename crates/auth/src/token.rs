//! Signed token issuance and validation (HS256 JWTs).

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::builder::IssuedClaims;
use crate::claims::{
    Destination, TokenClaims, TokenUse, TokenValidationError, claim_types, validate_claims,
};
use crate::config::SecuritySettings;
use crate::error::ConfigError;
use crate::principal::Principal;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    #[error(transparent)]
    TimeWindow(#[from] TokenValidationError),

    #[error("expected a {expected} token, got a {actual} token")]
    WrongUse { expected: TokenUse, actual: TokenUse },

    #[error("token has no subject")]
    MissingSubject,

    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("token expiry is out of range")]
    ExpiryOutOfRange,
}

/// OAuth2 token endpoint response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// What a valid refresh token entitles its bearer to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshGrant {
    pub subject: String,
    pub scopes: Vec<String>,
}

pub trait TokenService: Send + Sync {
    /// Sign the tokens for an issued claim set.
    ///
    /// An identity token is added when `openid` was granted, a refresh token
    /// when `offline_access` was granted.
    fn issue(&self, claims: &IssuedClaims, now: DateTime<Utc>) -> Result<TokenResponse, TokenError>;

    /// Validate a bearer access token and build the request principal.
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<Principal, TokenError>;

    fn validate_refresh(&self, token: &str, now: DateTime<Utc>) -> Result<RefreshGrant, TokenError>;
}

pub struct Hs256TokenService {
    issuer: String,
    audience: String,
    client_id: String,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl core::fmt::Debug for Hs256TokenService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256TokenService")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("client_id", &self.client_id)
            .field("access_lifetime", &self.access_lifetime)
            .field("refresh_lifetime", &self.refresh_lifetime)
            .finish_non_exhaustive()
    }
}

impl Hs256TokenService {
    pub fn from_settings(settings: &SecuritySettings) -> Result<Self, ConfigError> {
        if settings.signing_key.is_empty() {
            return Err(ConfigError::Invalid {
                field: "security.signing_key",
                message: "must not be empty".into(),
            });
        }
        let access_lifetime = lifetime(
            "security.access_token_lifetime_minutes",
            Duration::try_minutes(settings.access_token_lifetime_minutes),
        )?;
        let refresh_lifetime = lifetime(
            "security.refresh_token_lifetime_days",
            Duration::try_days(settings.refresh_token_lifetime_days),
        )?;

        let secret = settings.signing_key.as_bytes();
        Ok(Self {
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            client_id: settings.client_id.clone(),
            access_lifetime,
            refresh_lifetime,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    fn sign(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(TokenError::Signing)
    }

    fn decode(
        &self,
        token: &str,
        audience: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time window is checked by `validate_claims` against the caller's clock.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[audience]);

        let claims = jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &validation)
            .map_err(TokenError::Invalid)?
            .claims;
        validate_claims(&claims, now)?;
        if claims.sub.is_empty() {
            return Err(TokenError::MissingSubject);
        }
        Ok(claims)
    }

    fn payload(
        &self,
        issued: &IssuedClaims,
        destination: Destination,
        audience: &str,
        now: DateTime<Utc>,
        lifetime: Duration,
        token_use: TokenUse,
    ) -> Result<TokenClaims, TokenError> {
        let mut claims = TokenClaims {
            sub: issued.subject().to_string(),
            name: None,
            preferred_username: None,
            email: None,
            email_verified: None,
            roles: Vec::new(),
            capabilities: Vec::new(),
            scope: issued.scopes.join(" "),
            iss: self.issuer.clone(),
            aud: audience.to_string(),
            iat: now,
            exp: expiry(now, lifetime)?,
            token_use,
            additional: Default::default(),
        };

        for claim in issued.for_destination(destination) {
            let value = claim.value.clone();
            match claim.kind.as_str() {
                claim_types::SUBJECT => {}
                claim_types::NAME => claims.name = Some(value),
                claim_types::PREFERRED_USERNAME => claims.preferred_username = Some(value),
                claim_types::EMAIL => claims.email = Some(value),
                claim_types::EMAIL_VERIFIED => claims.email_verified = Some(value == "true"),
                claim_types::ROLE => claims.roles.push(value),
                claim_types::CAPABILITY => claims.capabilities.push(value),
                other => add_claim(&mut claims.additional, other, value),
            }
        }
        Ok(claims)
    }
}

/// A repeated claim kind becomes an array of its values.
fn add_claim(additional: &mut BTreeMap<String, Value>, kind: &str, value: String) {
    match additional.get_mut(kind) {
        None => {
            additional.insert(kind.to_string(), Value::String(value));
        }
        Some(Value::Array(values)) => values.push(Value::String(value)),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, Value::String(value)]);
        }
    }
}

fn expiry(now: DateTime<Utc>, lifetime: Duration) -> Result<DateTime<Utc>, TokenError> {
    now.checked_add_signed(lifetime).ok_or(TokenError::ExpiryOutOfRange)
}

/// Lifetimes must be positive and leave a representable expiry.
fn lifetime(field: &'static str, lifetime: Option<Duration>) -> Result<Duration, ConfigError> {
    match lifetime {
        Some(d) if d > Duration::zero() && Utc::now().checked_add_signed(d).is_some() => Ok(d),
        Some(d) if d > Duration::zero() => Err(ConfigError::Invalid {
            field,
            message: "is too large".into(),
        }),
        _ => Err(ConfigError::Invalid {
            field,
            message: "must be a positive duration".into(),
        }),
    }
}

impl TokenService for Hs256TokenService {
    fn issue(
        &self,
        issued: &IssuedClaims,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, TokenError> {
        if issued.subject().is_empty() {
            return Err(TokenError::MissingSubject);
        }

        let access = self.payload(
            issued,
            Destination::AccessToken,
            &self.audience,
            now,
            self.access_lifetime,
            TokenUse::Access,
        )?;
        let access_token = self.sign(&access)?;

        let id_token = if issued.has_scope("openid") {
            let id = self.payload(
                issued,
                Destination::IdentityToken,
                &self.client_id,
                now,
                self.access_lifetime,
                TokenUse::Id,
            )?;
            Some(self.sign(&id)?)
        } else {
            None
        };

        let refresh_token = if issued.has_scope("offline_access") {
            let mut refresh = access.clone();
            refresh.name = None;
            refresh.preferred_username = None;
            refresh.email = None;
            refresh.email_verified = None;
            refresh.roles.clear();
            refresh.capabilities.clear();
            refresh.additional.clear();
            refresh.exp = expiry(now, self.refresh_lifetime)?;
            refresh.token_use = TokenUse::Refresh;
            Some(self.sign(&refresh)?)
        } else {
            None
        };

        tracing::debug!(
            sub = %access.sub,
            scope = %access.scope,
            id_token = id_token.is_some(),
            refresh_token = refresh_token.is_some(),
            "tokens issued"
        );

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_lifetime.num_seconds(),
            scope: access.scope,
            id_token,
            refresh_token,
        })
    }

    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<Principal, TokenError> {
        let claims = self.decode(token, &self.audience, now)?;
        if claims.token_use != TokenUse::Access {
            return Err(TokenError::WrongUse {
                expected: TokenUse::Access,
                actual: claims.token_use,
            });
        }
        Ok(Principal::from_claims(claims))
    }

    fn validate_refresh(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshGrant, TokenError> {
        let claims = self.decode(token, &self.audience, now)?;
        if claims.token_use != TokenUse::Refresh {
            return Err(TokenError::WrongUse {
                expected: TokenUse::Refresh,
                actual: claims.token_use,
            });
        }
        let scopes = claims.scopes().map(str::to_string).collect();
        Ok(RefreshGrant {
            subject: claims.sub,
            scopes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{TokenClaimsBuilder, UserIdentity, parse_scopes};
    use crate::capability::CapabilityCatalog;
    use crate::registry::RoleCapabilityMap;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn settings() -> SecuritySettings {
        SecuritySettings {
            signing_key: "test-signing-key-with-enough-entropy".into(),
            ..SecuritySettings::default()
        }
    }

    fn service() -> Hs256TokenService {
        Hs256TokenService::from_settings(&settings()).unwrap()
    }

    fn issued(scope: &str) -> IssuedClaims {
        let catalog = CapabilityCatalog::new(["ReadResX", "WriteResX"]).unwrap();
        let mut config = BTreeMap::new();
        config.insert("admin".to_string(), vec!["ReadResX".to_string(), "WriteResX".to_string()]);
        let map = RoleCapabilityMap::load(&config, &catalog).unwrap();
        let user = UserIdentity {
            id: "0192-admin".into(),
            user_name: "admin".into(),
            email: Some("admin@test.local".into()),
            email_verified: true,
            additional_claims: vec![("department".into(), "IT".into())],
        };
        TokenClaimsBuilder::new(Arc::new(map)).build(&user, ["admin"], &parse_scopes(scope))
    }

    #[test]
    fn access_token_round_trips_into_a_principal() {
        let now = Utc::now();
        let response = service().issue(&issued("openid profile"), now).unwrap();

        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.expires_in, 3600);
        assert_eq!(response.scope, "openid profile");

        let principal = service().validate(&response.access_token, now).unwrap();
        assert_eq!(principal.user_id, "0192-admin");
        assert_eq!(principal.user_name(), Some("admin"));
        assert!(principal.has_role("admin"));
        assert!(principal.has_capability("WriteResX"));
        assert_eq!(principal.claim("department").as_deref(), Some("IT"));
    }

    #[test]
    fn identity_token_only_with_openid_and_without_capabilities() {
        let now = Utc::now();
        let svc = service();

        let without = svc.issue(&issued("profile"), now).unwrap();
        assert!(without.id_token.is_none());

        let with = svc.issue(&issued("openid"), now).unwrap();
        let id_token = with.id_token.unwrap();
        let claims = svc.decode(&id_token, "forge-spa", now).unwrap();

        assert_eq!(claims.token_use, TokenUse::Id);
        assert_eq!(claims.sub, "0192-admin");
        assert_eq!(claims.roles, vec!["admin"]);
        assert_eq!(claims.email.as_deref(), Some("admin@test.local"));
        assert!(claims.capabilities.is_empty());
        assert!(!claims.additional.contains_key("department"));
    }

    #[test]
    fn id_token_is_not_a_bearer_token() {
        let now = Utc::now();
        let svc = service();
        let id_token = svc.issue(&issued("openid"), now).unwrap().id_token.unwrap();
        assert!(matches!(svc.validate(&id_token, now), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn refresh_token_only_with_offline_access() {
        let now = Utc::now();
        let svc = service();

        assert!(svc.issue(&issued("openid"), now).unwrap().refresh_token.is_none());

        let response = svc.issue(&issued("openid offline_access"), now).unwrap();
        let refresh = response.refresh_token.unwrap();
        let grant = svc.validate_refresh(&refresh, now).unwrap();
        assert_eq!(grant.subject, "0192-admin");
        assert_eq!(grant.scopes, vec!["openid", "offline_access"]);

        assert!(matches!(
            svc.validate(&refresh, now),
            Err(TokenError::WrongUse { expected: TokenUse::Access, actual: TokenUse::Refresh })
        ));
        assert!(matches!(
            svc.validate_refresh(&response.access_token, now),
            Err(TokenError::WrongUse { expected: TokenUse::Refresh, actual: TokenUse::Access })
        ));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let issued_at = Utc::now() - Duration::hours(2);
        let svc = service();
        let token = svc.issue(&issued(""), issued_at).unwrap().access_token;
        assert!(matches!(
            svc.validate(&token, Utc::now()),
            Err(TokenError::TimeWindow(TokenValidationError::Expired))
        ));
    }

    #[test]
    fn foreign_signatures_and_issuers_are_rejected() {
        let now = Utc::now();
        let token = service().issue(&issued(""), now).unwrap().access_token;

        let other_key = Hs256TokenService::from_settings(&SecuritySettings {
            signing_key: "a-different-key".into(),
            ..SecuritySettings::default()
        })
        .unwrap();
        assert!(matches!(other_key.validate(&token, now), Err(TokenError::Invalid(_))));

        let other_issuer = Hs256TokenService::from_settings(&SecuritySettings {
            issuer: "someone-else".into(),
            ..settings()
        })
        .unwrap();
        assert!(matches!(other_issuer.validate(&token, now), Err(TokenError::Invalid(_))));

        assert!(matches!(service().validate("not.a.jwt", now), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn lifetimes_past_the_representable_range_fail_at_startup() {
        let huge = Hs256TokenService::from_settings(&SecuritySettings {
            refresh_token_lifetime_days: 100_000_000,
            ..settings()
        });
        assert!(matches!(
            huge,
            Err(ConfigError::Invalid { field: "security.refresh_token_lifetime_days", .. })
        ));
    }

    #[test]
    fn expiry_overflow_is_an_error_not_a_panic() {
        let svc = service();
        let result = svc.issue(&issued("offline_access"), DateTime::<Utc>::MAX_UTC);
        assert!(matches!(result, Err(TokenError::ExpiryOutOfRange)));
    }

    #[test]
    fn repeated_additional_claims_keep_every_value() {
        let catalog = CapabilityCatalog::new(["ReadResX"]).unwrap();
        let map = RoleCapabilityMap::load(&BTreeMap::new(), &catalog).unwrap();
        let user = UserIdentity {
            id: "0192-user".into(),
            user_name: "user".into(),
            email: None,
            email_verified: false,
            additional_claims: vec![
                ("department".into(), "Sales".into()),
                ("department".into(), "Support".into()),
            ],
        };
        let no_roles = std::iter::empty::<&str>();
        let builder = TokenClaimsBuilder::new(Arc::new(map));
        let issued = builder.build(&user, no_roles, &parse_scopes(""));

        let now = Utc::now();
        let token = service().issue(&issued, now).unwrap().access_token;
        let claims = service().decode(&token, "forge-api", now).unwrap();
        assert_eq!(claims.additional["department"], serde_json::json!(["Sales", "Support"]));

        let principal = service().validate(&token, now).unwrap();
        assert_eq!(principal.claim("department").as_deref(), Some("Sales"));
    }

    #[test]
    fn settings_are_checked() {
        let empty_key = Hs256TokenService::from_settings(&SecuritySettings::default());
        assert!(matches!(
            empty_key,
            Err(ConfigError::Invalid { field: "security.signing_key", .. })
        ));

        let zero_lifetime = Hs256TokenService::from_settings(&SecuritySettings {
            access_token_lifetime_minutes: 0,
            ..settings()
        });
        assert!(matches!(
            zero_lifetime,
            Err(ConfigError::Invalid { field: "security.access_token_lifetime_minutes", .. })
        ));
    }
}
