//! # storecheck
//!
//! A conformance harness for **factories** that produce key-value store
//! handles. A factory may hand back a bare backend or a chain of wrapper
//! layers (encoding, caching, deferred open); the harness checks that the
//! outermost handle behaves correctly and that the chain can be walked down
//! to a backend of a requested kind.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use storecheck::{Collector, FactoryConfig, StoreFactory, suite};
//!
//! # async fn run() -> Result<(), storecheck::StoreError> {
//! let factory = StoreFactory::new(FactoryConfig::default())?;
//!
//! let mut sink = Collector::default();
//! let summary = suite::run_all(&factory, "memory", &mut sink).await;
//!
//! assert!(summary.all_passed());
//! # Ok(())
//! # }
//! ```
//!
//! ## Layout
//!
//! - [`handle`]: the [`Handle`] capability set and the structural
//!   [`conforms`] check.
//! - [`resolver`]: [`down`], the wrapping-chain resolver.
//! - [`suite`]: the scenario battery and the reporting sink.
//! - [`factory`], [`store`], [`encoding`], [`cache`], [`backend`]: a small
//!   reference stack the harness certifies in its own tests.

pub mod backend;
pub mod cache;
pub mod encoding;
pub mod factory;
pub mod handle;
pub mod resolver;
pub mod store;
pub mod suite;

use thiserror::Error;

pub use backend::{LogBackend, LogError, MemoryBackend, MemoryRegistry};
pub use cache::CacheLayer;
pub use encoding::{EncodingLayer, ObjectCoercion, ValueEncoding};
pub use factory::{BackendConfig, Factory, FactoryConfig, Options, StoreFactory, WithDefaults};
pub use handle::{CAPABILITY_SET, Entry, Handle, HandleRef, IterateOptions, conforms};
pub use resolver::down;
pub use store::{Status, Store};
pub use suite::{Assert, Collector, Outcome, Report, Sink, Summary, TracingSink};

/// Values travelling through a handle.
pub use serde_json::Value;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors returned by handle and factory operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key has no value. Expected on reads of never-written keys.
    #[error("key not found: {0}")]
    NotFound(String),

    /// The handle has not finished opening, or failed to open.
    #[error("handle is not open")]
    NotOpen,

    /// The handle has been closed.
    #[error("handle is closed")]
    Closed,

    /// Opening the handle failed; carries the original error message.
    #[error("open failed: {0}")]
    OpenFailed(String),

    /// Invalid configuration parameter.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Key or option constraint violated.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `error_if_exists` was set and the location already holds a store.
    #[error("store already exists at {0}")]
    AlreadyExists(String),

    /// `create_if_missing` was unset and the location holds no store.
    #[error("no store exists at {0}")]
    Missing(String),

    /// A value could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Error from the log backend.
    #[error("{0}")]
    Log(#[from] LogError),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal invariant violation (poisoned lock, failed task, etc.).
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Returns `true` for the "key has no value" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
