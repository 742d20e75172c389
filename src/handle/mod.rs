//! Handle contract.
//!
//! A [`Handle`] is an open or openable key-value store exposing the
//! operations listed in [`CAPABILITY_SET`]. Wrapper layers are handles too:
//! each one may expose the handle it wraps through [`Handle::inner`], which
//! is what the [resolver](crate::resolver) walks.
//!
//! ## Structural conformance
//!
//! The trait fixes the *shape* of a handle, but an implementation may still
//! stub operations out (a read-only view, a codec shim that never opens on
//! its own, ...). [`Handle::supports`] reports which operations are actually
//! invocable, and [`conforms`] checks that every public capability is. The
//! check is purely structural: no type identity or downcasting is involved.

#[cfg(test)]
pub(crate) mod tests;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::StoreError;

/// Shared, type-erased handle reference. Wrapping chains are built from these.
pub type HandleRef = Arc<dyn Handle>;

/// A single key-value pair returned by [`Handle::iterate`].
pub type Entry = (String, Value);

/// Canonical capability set.
///
/// Names starting with `_` are private hooks. They are part of the set but
/// are not required for conformance.
pub const CAPABILITY_SET: &[&str] = &[
    "open",
    "close",
    "is_open",
    "get",
    "put",
    "del",
    "iterate",
    "_serialize_key",
    "_serialize_value",
];

/// Range and ordering options for [`Handle::iterate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterateOptions {
    /// Inclusive lower bound.
    pub gte: Option<String>,

    /// Exclusive upper bound.
    pub lt: Option<String>,

    /// Yield keys in descending order.
    pub reverse: bool,

    /// Maximum number of entries to return.
    pub limit: Option<usize>,
}

impl IterateOptions {
    /// Returns `true` if `key` falls inside `[gte, lt)`.
    pub fn contains(&self, key: &str) -> bool {
        if let Some(gte) = &self.gte {
            if key < gte.as_str() {
                return false;
            }
        }
        if let Some(lt) = &self.lt {
            if key >= lt.as_str() {
                return false;
            }
        }
        true
    }

    /// Applies bounds, ordering and limit to entries already sorted by key.
    pub fn apply(&self, entries: impl DoubleEndedIterator<Item = Entry>) -> Vec<Entry> {
        let limit = self.limit.unwrap_or(usize::MAX);
        let in_range = |(k, _): &Entry| self.contains(k);
        if self.reverse {
            entries.rev().filter(in_range).take(limit).collect()
        } else {
            entries.filter(in_range).take(limit).collect()
        }
    }
}

/// The storage capability set.
///
/// All storage operations are asynchronous. Reads of a key that holds no
/// value fail with [`StoreError::NotFound`].
#[async_trait]
pub trait Handle: Send + Sync {
    /// Opens the handle (and, for wrappers, everything beneath it).
    async fn open(&self) -> Result<(), StoreError>;

    /// Closes the handle. Closing a closed handle is harmless.
    async fn close(&self) -> Result<(), StoreError>;

    /// Whether the handle currently reports itself open.
    fn is_open(&self) -> bool;

    /// Reads the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Value, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Removes `key`. Removing an absent key succeeds.
    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// Returns the live entries selected by `options`, sorted by key.
    async fn iterate(&self, options: IterateOptions) -> Result<Vec<Entry>, StoreError>;

    /// The open signal: resolves once the handle reports open.
    ///
    /// Handles without deferred opening report their current status.
    async fn opened(&self) -> Result<(), StoreError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StoreError::NotOpen)
        }
    }

    /// Tag naming the concrete backend type, if this handle declares one.
    fn kind(&self) -> Option<&str> {
        None
    }

    /// The handle this one wraps, if any.
    fn inner(&self) -> Option<HandleRef> {
        None
    }

    /// Explicit chain resolution.
    ///
    /// Returning `Some(result)` makes the resolver use `result` as-is instead
    /// of walking the chain structurally. The default defers to the walk.
    fn down(&self, _kind: Option<&str>) -> Option<Option<HandleRef>> {
        None
    }

    /// Whether `operation` is invocable on this handle.
    fn supports(&self, operation: &str) -> bool {
        CAPABILITY_SET.contains(&operation)
    }
}

/// Returns `true` if every public operation of [`CAPABILITY_SET`] is
/// invocable on `candidate`.
pub fn conforms(candidate: &dyn Handle) -> bool {
    CAPABILITY_SET
        .iter()
        .filter(|name| !name.starts_with('_'))
        .all(|name| candidate.supports(name))
}
