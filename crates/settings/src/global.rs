//! Process-wide settings, installed once at startup.

use std::any::Any;
use std::sync::OnceLock;

use crate::error::{SettingsError, SettingsResult};

static INSTALLED: OnceLock<Box<dyn Any + Send + Sync>> = OnceLock::new();

/// Install the process settings. Only the first call succeeds.
pub fn install<T>(settings: T) -> SettingsResult<&'static T>
where
    T: Any + Send + Sync,
{
    INSTALLED
        .set(Box::new(settings))
        .map_err(|_| SettingsError::AlreadyInstalled)?;
    current::<T>().ok_or(SettingsError::AlreadyInstalled)
}

/// The installed settings, if they were installed with type `T`.
pub fn current<T>() -> Option<&'static T>
where
    T: Any + Send + Sync,
{
    INSTALLED.get()?.downcast_ref::<T>()
}
