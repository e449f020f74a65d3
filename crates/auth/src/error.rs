use thiserror::Error;

/// Startup configuration failure of the authorization model.
///
/// These are fatal: a process whose role/capability configuration does not
/// validate must not start.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration section '{0}'")]
    MissingSection(&'static str),

    #[error("capability names must not be empty")]
    EmptyCapability,

    #[error("capability '{0}' is declared more than once")]
    DuplicateCapability(String),

    #[error("role names must not be empty")]
    EmptyRole,

    #[error("role '{role}' references unknown capability '{capability}'")]
    UnknownCapability { role: String, capability: String },

    #[error("invalid setting '{field}': {message}")]
    Invalid { field: &'static str, message: String },
}
