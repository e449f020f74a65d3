//! `forge-auth`: capability-based authorization.
//!
//! Roles map to capabilities once, at startup. Capabilities are embedded in
//! the access token at issuance, and each request is authorized by checking
//! the claims of its principal against a named policy. Nothing here knows
//! about HTTP.

pub mod builder;
pub mod capability;
pub mod claims;
pub mod config;
pub mod current_user;
pub mod error;
pub mod external;
pub mod identity;
pub mod policy;
pub mod principal;
pub mod registry;
pub mod roles;
pub mod token;

pub use builder::{
    IssuedClaims, SUPPORTED_SCOPES, TokenClaimsBuilder, UserIdentity, allowed_scopes, parse_scopes,
};
pub use capability::{Capability, CapabilityCatalog};
pub use claims::{
    Claim, Destination, TokenClaims, TokenUse, TokenValidationError, claim_types, validate_claims,
};
pub use config::SecuritySettings;
pub use current_user::CurrentUser;
pub use error::ConfigError;
pub use external::expand_external_roles;
pub use identity::{
    IdentityError, IdentityStore, InMemoryIdentityStore, NewUser, UserAccount,
    seed_development_users, validate_password,
};
pub use policy::{
    AuthorizationPolicy, Decision, DenyReason, PolicyError, PolicyRegistry, PolicyRegistryBuilder,
    Requirement, require_authenticated,
};
pub use principal::Principal;
pub use registry::RoleCapabilityMap;
pub use roles::Role;
pub use token::{Hs256TokenService, RefreshGrant, TokenError, TokenResponse, TokenService};
