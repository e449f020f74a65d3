use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to produce the process settings. Always fatal at startup.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("required settings file {} is missing", path.display())]
    MissingFile { path: PathBuf },

    #[error("failed to read settings file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse settings file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to bind settings: {source}")]
    Bind {
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "Environments from ${var} ({requested}) and appsettings.{requested}.json \
         ({configured}) do not match"
    )]
    EnvironmentMismatch {
        var: &'static str,
        requested: String,
        configured: String,
    },

    #[error("process settings were already installed")]
    AlreadyInstalled,
}

pub type SettingsResult<T> = Result<T, SettingsError>;
