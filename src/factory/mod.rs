//! Factories: options in, handles out.
//!
//! A [`Factory`] accepts every calling convention the harness probes:
//!
//! | Convention             | Call                                   |
//! |------------------------|----------------------------------------|
//! | no arguments           | `factory.create(None)`                 |
//! | options only           | `factory.create(Some(options))`        |
//! | callback only          | `factory.open(None).await`             |
//! | options and callback   | `factory.open(Some(options)).await`    |
//!
//! `create` returns immediately with a handle that is still opening; the
//! open signal ([`Handle::opened`]) reports when it is ready. `open`
//! completes only once the handle is open, which is the callback form.
//!
//! [`StoreFactory`] is the reference implementation. It assembles
//! `Store → EncodingLayer → [CacheLayer] → backend` from a validated
//! [`FactoryConfig`] and per-call [`Options`].


use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::StoreError;
use crate::backend::{LogBackend, LogHeader, MemoryBackend, MemoryRegistry, OpenPolicy};
use crate::cache::CacheLayer;
use crate::encoding::{EncodingLayer, ObjectCoercion, ValueEncoding};
use crate::handle::HandleRef;
use crate::store::{Prepare, Store};

// ------------------------------------------------------------------------------------------------
// Per-call options
// ------------------------------------------------------------------------------------------------

/// Options accepted by [`Factory::create`] and [`Factory::open`].
///
/// Every field is optional; unset fields fall back to factory-level
/// defaults (see [`Factory::with_defaults`]) and then to the factory's own
/// configuration. Field names deserialize in camelCase, so
/// `{"valueEncoding": "json", "clean": true}` is a valid options object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Options {
    /// Discard any state persisted at the location before opening.
    pub clean: Option<bool>,

    /// Codec applied to stored values. Default: `utf8`.
    pub value_encoding: Option<ValueEncoding>,

    /// Storage identity. Default: [`FactoryConfig::default_location`].
    pub location: Option<String>,

    /// Put a read-through cache between the encoding layer and the backend.
    pub cache: Option<bool>,

    /// See [`OpenPolicy::create_if_missing`].
    pub create_if_missing: Option<bool>,

    /// See [`OpenPolicy::error_if_exists`].
    pub error_if_exists: Option<bool>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clean(mut self, clean: bool) -> Self {
        self.clean = Some(clean);
        self
    }

    pub fn value_encoding(mut self, encoding: ValueEncoding) -> Self {
        self.value_encoding = Some(encoding);
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Parses an options object from JSON text.
    pub fn from_json(text: &str) -> Result<Self, StoreError> {
        serde_json::from_str(text).map_err(|e| StoreError::InvalidConfig(e.to_string()))
    }

    /// Layers `self` over `defaults`: fields set here win, unset fields
    /// are taken from `defaults`.
    pub fn merge(self, defaults: &Options) -> Options {
        Options {
            clean: self.clean.or(defaults.clean),
            value_encoding: self.value_encoding.or(defaults.value_encoding),
            location: self.location.or_else(|| defaults.location.clone()),
            cache: self.cache.or(defaults.cache),
            create_if_missing: self.create_if_missing.or(defaults.create_if_missing),
            error_if_exists: self.error_if_exists.or(defaults.error_if_exists),
        }
    }

    fn policy(&self) -> OpenPolicy {
        let default = OpenPolicy::default();
        OpenPolicy {
            create_if_missing: self.create_if_missing.unwrap_or(default.create_if_missing),
            error_if_exists: self.error_if_exists.unwrap_or(default.error_if_exists),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Factory trait
// ------------------------------------------------------------------------------------------------

/// Produces handles from optional per-call options.
#[async_trait]
pub trait Factory: Send + Sync {
    /// Returns a handle immediately. It opens in the background and may be
    /// used right away; operations wait for the open to finish.
    fn create(&self, options: Option<Options>) -> HandleRef;

    /// Returns a handle once it is open. A handle that fails to open is
    /// closed before the error is returned.
    async fn open(&self, options: Option<Options>) -> Result<HandleRef, StoreError> {
        let db = self.create(options);
        if let Err(e) = db.opened().await {
            if let Err(close) = db.close().await {
                warn!("closing handle after failed open: {close}");
            }
            return Err(e);
        }
        Ok(db)
    }

    /// A factory applying `defaults` beneath every per-call option set.
    fn with_defaults(&self, defaults: Options) -> Arc<dyn Factory>;
}

/// Factory adapter layering default options under per-call options.
#[derive(Clone)]
pub struct WithDefaults<F> {
    inner: F,
    defaults: Options,
}

impl<F: Factory + Clone + 'static> WithDefaults<F> {
    pub fn new(inner: F, defaults: Options) -> Self {
        Self { inner, defaults }
    }

    pub fn defaults(&self) -> &Options {
        &self.defaults
    }
}

#[async_trait]
impl<F: Factory + Clone + 'static> Factory for WithDefaults<F> {
    fn create(&self, options: Option<Options>) -> HandleRef {
        let merged = options.unwrap_or_default().merge(&self.defaults);
        debug!(?merged, "options merged over defaults");
        self.inner.create(Some(merged))
    }

    fn with_defaults(&self, defaults: Options) -> Arc<dyn Factory> {
        Arc::new(WithDefaults::new(
            self.inner.clone(),
            defaults.merge(&self.defaults),
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// Reference factory
// ------------------------------------------------------------------------------------------------

/// Backend placed at the bottom of every chain a [`StoreFactory`] builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// [`MemoryBackend`]s sharing one registry per factory.
    Memory,

    /// [`LogBackend`]s under `root`.
    Log { root: PathBuf },
}

/// Configuration for a [`StoreFactory`].
///
/// All fields have sensible defaults via [`FactoryConfig::default()`].
/// The configuration is validated when passed to [`StoreFactory::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryConfig {
    /// Which backend to build.
    ///
    /// Default: [`BackendConfig::Memory`].
    pub backend: BackendConfig,

    /// Location used when options do not name one.
    ///
    /// Default: `"storecheck"`. Must be a single path component.
    pub default_location: String,

    /// Entries held by the cache layer when `cache` is requested.
    ///
    /// Default: 1024. Must be ≥ 1.
    pub cache_capacity: usize,

    /// How `utf8` renders objects.
    pub object_coercion: ObjectCoercion,

    /// Maximum encoded record size for the log backend.
    ///
    /// Default: 1 MiB. Must be ≥ 64.
    pub max_record_size: u32,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::Memory,
            default_location: "storecheck".to_string(),
            cache_capacity: 1024,
            object_coercion: ObjectCoercion::default(),
            max_record_size: LogHeader::DEFAULT_MAX_RECORD_SIZE,
        }
    }
}

impl FactoryConfig {
    /// Log-backed configuration rooted at `root`.
    pub fn log(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendConfig::Log { root: root.into() },
            ..Self::default()
        }
    }

    /// Validates all configuration parameters.
    fn validate(&self) -> Result<(), StoreError> {
        LogBackend::location_dir(PathBuf::new().as_path(), &self.default_location).map_err(
            |_| {
                StoreError::InvalidConfig(format!(
                    "default_location {:?} must be a single path component",
                    self.default_location
                ))
            },
        )?;
        if self.cache_capacity < 1 {
            return Err(StoreError::InvalidConfig(
                "cache_capacity must be >= 1".into(),
            ));
        }
        if self.max_record_size < 64 {
            return Err(StoreError::InvalidConfig(
                "max_record_size must be >= 64".into(),
            ));
        }
        Ok(())
    }
}

/// Reference factory building [`Store`] chains.
#[derive(Debug, Clone)]
pub struct StoreFactory {
    config: Arc<FactoryConfig>,
    registry: MemoryRegistry,
}

impl StoreFactory {
    /// Creates a factory from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] if any parameter is out of range.
    pub fn new(config: FactoryConfig) -> Result<Self, StoreError> {
        config.validate()?;
        info!(backend = ?config.backend, location = %config.default_location, "factory ready");
        Ok(Self {
            config: Arc::new(config),
            registry: MemoryRegistry::new(),
        })
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// The memory registry shared by every memory-backed handle of this
    /// factory.
    pub fn registry(&self) -> &MemoryRegistry {
        &self.registry
    }

    /// Kind declared by the backends this factory builds.
    pub fn backend_kind(&self) -> &'static str {
        match self.config.backend {
            BackendConfig::Memory => MemoryBackend::KIND,
            BackendConfig::Log { .. } => LogBackend::KIND,
        }
    }

    fn backend(&self, location: &str, policy: OpenPolicy) -> HandleRef {
        match &self.config.backend {
            BackendConfig::Memory => {
                Arc::new(MemoryBackend::new(self.registry.clone(), location, policy))
            }
            BackendConfig::Log { root } => Arc::new(
                LogBackend::new(root.clone(), location, policy)
                    .with_max_record_size(self.config.max_record_size),
            ),
        }
    }

    fn layers(&self, backend: HandleRef, options: &Options) -> Result<HandleRef, StoreError> {
        let mut chain = backend;
        if options.cache.unwrap_or(false) {
            chain = Arc::new(CacheLayer::new(chain, self.config.cache_capacity)?);
        }
        let encoding = options.value_encoding.unwrap_or_default();
        Ok(Arc::new(
            EncodingLayer::new(chain, encoding).with_coercion(self.config.object_coercion.clone()),
        ))
    }

    /// Wipes `location` before the chain opens.
    fn wipe(&self, location: String) -> Prepare {
        match &self.config.backend {
            BackendConfig::Memory => {
                let registry = self.registry.clone();
                Box::pin(async move {
                    registry.destroy(&location)?;
                    Ok(())
                })
            }
            BackendConfig::Log { root } => {
                let root = root.clone();
                Box::pin(async move {
                    tokio::task::spawn_blocking(move || LogBackend::destroy(&root, &location))
                        .await
                        .map_err(|e| StoreError::Internal(format!("blocking task failed: {e}")))??;
                    Ok(())
                })
            }
        }
    }
}

#[async_trait]
impl Factory for StoreFactory {
    fn create(&self, options: Option<Options>) -> HandleRef {
        let options = options.unwrap_or_default();
        let location = options
            .location
            .clone()
            .unwrap_or_else(|| self.config.default_location.clone());

        let backend = self.backend(&location, options.policy());
        let (chain, prepare) = match self.layers(Arc::clone(&backend), &options) {
            Ok(chain) => {
                let prepare = options
                    .clean
                    .unwrap_or(false)
                    .then(|| self.wipe(location.clone()));
                (chain, prepare)
            }
            Err(e) => {
                let fail: Prepare = Box::pin(async move { Err(e) });
                (backend, Some(fail))
            }
        };

        debug!(
            location = %location,
            encoding = %options.value_encoding.unwrap_or_default(),
            clean = options.clean.unwrap_or(false),
            "creating store"
        );
        Store::new(chain, prepare)
    }

    fn with_defaults(&self, defaults: Options) -> Arc<dyn Factory> {
        Arc::new(WithDefaults::new(self.clone(), defaults))
    }
}
