//! Layered settings loading.

use std::fs;
use std::io;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::Value;

use forge_core::{DEVELOPMENT, ForgeSettingsProvider};

use crate::error::{SettingsError, SettingsResult};
use crate::merge::deep_merge;

/// Name of the required base settings file.
pub const BASE_FILE: &str = "appsettings.json";

/// Environment variable selecting the settings overlay.
pub const ENVIRONMENT_VAR: &str = "FORGE_ENVIRONMENT";

/// File name of the overlay for `environment`.
pub fn overlay_file(environment: &str) -> String {
    format!("appsettings.{environment}.json")
}

/// The environment requested by the process (`FORGE_ENVIRONMENT`, default `Development`).
pub fn environment_from_env() -> String {
    std::env::var(ENVIRONMENT_VAR)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEVELOPMENT.to_string())
}

/// Load settings from `dir` for the environment named by `FORGE_ENVIRONMENT`.
pub fn load_from_env<T>(dir: impl AsRef<Path>) -> SettingsResult<T>
where
    T: DeserializeOwned + ForgeSettingsProvider,
{
    load(dir, &environment_from_env())
}

/// Load `appsettings.json` and the optional `appsettings.{environment}.json`
/// overlay from `dir`, bind them to `T` and reconcile the environment.
///
/// An empty `forge.environment` is filled with `environment`; a non-empty one
/// that disagrees with `environment` is an error.
pub fn load<T>(dir: impl AsRef<Path>, environment: &str) -> SettingsResult<T>
where
    T: DeserializeOwned + ForgeSettingsProvider,
{
    let dir = dir.as_ref();

    let base_path = dir.join(BASE_FILE);
    let mut merged = read_json(&base_path)?.ok_or_else(|| SettingsError::MissingFile {
        path: base_path.clone(),
    })?;

    if !environment.is_empty() {
        let overlay_path = dir.join(overlay_file(environment));
        match read_json(&overlay_path)? {
            Some(overlay) => {
                tracing::debug!(path = %overlay_path.display(), "applying settings overlay");
                deep_merge(&mut merged, &overlay);
            }
            None => {
                tracing::debug!(path = %overlay_path.display(), "no settings overlay");
            }
        }
    }

    let mut settings: T =
        serde_json::from_value(merged).map_err(|source| SettingsError::Bind { source })?;

    let forge = settings.forge_mut();
    if forge.environment.trim().is_empty() {
        forge.environment = environment.to_string();
    } else if forge.environment != environment {
        return Err(SettingsError::EnvironmentMismatch {
            var: ENVIRONMENT_VAR,
            requested: environment.to_string(),
            configured: forge.environment.clone(),
        });
    }

    Ok(settings)
}

fn read_json(path: &Path) -> SettingsResult<Option<Value>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
}
