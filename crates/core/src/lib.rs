//! `forge-core`: shared building blocks for Forge services.
//!
//! This crate contains no HTTP, storage or logging concerns.

pub mod error;
pub mod id;
pub mod settings;

pub use error::{ForgeError, ForgeResult};
pub use id::UserId;
pub use settings::{ForgeSettings, ForgeSettingsProvider, DEVELOPMENT};
