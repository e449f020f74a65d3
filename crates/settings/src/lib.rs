//! `forge-settings`: layered JSON settings for Forge services.
//!
//! Settings are read from `appsettings.json` plus an optional
//! `appsettings.{environment}.json` overlay, bound to a typed settings object
//! and checked for environment consistency.

pub mod error;
pub mod global;
pub mod loader;
pub mod merge;

pub use error::{SettingsError, SettingsResult};
pub use global::{current, install};
pub use loader::{
    BASE_FILE, ENVIRONMENT_VAR, environment_from_env, load, load_from_env, overlay_file,
};
pub use merge::deep_merge;
