//! Reference backends.
//!
//! Two concrete, innermost handles the factory can put at the bottom of a
//! chain:
//!
//! - [`MemoryBackend`] (`kind = "memory"`) keeps a sorted map per location in
//!   a shared [`MemoryRegistry`], so a second handle opened at the same
//!   location sees what the first one wrote.
//! - [`LogBackend`] (`kind = "log"`) persists every mutation to an
//!   append-only, checksummed record log and replays it on open.
//!
//! Both refuse storage operations until opened and honor [`OpenPolicy`].

#[cfg(test)]
mod tests;

mod log;
mod memory;

pub use log::{LogBackend, LogError, LogHeader, LogRecord};
pub use memory::{MemoryBackend, MemoryRegistry};

use crate::StoreError;

/// What to do when the target location does or does not already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenPolicy {
    /// Create the store if the location holds none. Default: `true`.
    pub create_if_missing: bool,

    /// Fail if the location already holds a store. Default: `false`.
    pub error_if_exists: bool,
}

impl Default for OpenPolicy {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
        }
    }
}

impl OpenPolicy {
    /// Checks the policy against whether `location` already exists.
    pub(crate) fn check(&self, location: &str, exists: bool) -> Result<(), StoreError> {
        if exists && self.error_if_exists {
            return Err(StoreError::AlreadyExists(location.to_string()));
        }
        if !exists && !self.create_if_missing {
            return Err(StoreError::Missing(location.to_string()));
        }
        Ok(())
    }
}

/// Rejects empty keys, as both backends do.
pub(crate) fn check_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidArgument("key must not be empty".into()));
    }
    Ok(())
}

pub(crate) fn poisoned<T>(_: T) -> StoreError {
    StoreError::Internal("lock poisoned".into())
}
