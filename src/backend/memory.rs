//! In-memory backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use super::{OpenPolicy, check_key, poisoned};
use crate::StoreError;
use crate::handle::{Entry, Handle, IterateOptions};

type SharedMap = Arc<RwLock<BTreeMap<String, Value>>>;

/// Process-local storage shared by every [`MemoryBackend`] created from it.
///
/// A location is the storage identity: two handles at the same location
/// read and write the same map until it is destroyed.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    stores: Arc<Mutex<HashMap<String, SharedMap>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `location` currently holds a store.
    pub fn contains(&self, location: &str) -> bool {
        self.stores
            .lock()
            .map(|stores| stores.contains_key(location))
            .unwrap_or(false)
    }

    /// Discards everything stored at `location`.
    ///
    /// Handles still attached keep their (now detached) map until closed.
    /// Returns `true` if something was removed.
    pub fn destroy(&self, location: &str) -> Result<bool, StoreError> {
        let removed = self.stores.lock().map_err(poisoned)?.remove(location);
        if removed.is_some() {
            info!(location, "memory store destroyed");
        }
        Ok(removed.is_some())
    }

    fn attach(&self, location: &str, policy: OpenPolicy) -> Result<SharedMap, StoreError> {
        let mut stores = self.stores.lock().map_err(poisoned)?;
        policy.check(location, stores.contains_key(location))?;
        Ok(Arc::clone(stores.entry(location.to_string()).or_default()))
    }
}

/// Innermost handle backed by a [`MemoryRegistry`] location.
#[derive(Debug)]
pub struct MemoryBackend {
    location: String,
    registry: MemoryRegistry,
    policy: OpenPolicy,
    map: RwLock<Option<SharedMap>>,
}

impl MemoryBackend {
    pub const KIND: &'static str = "memory";

    pub fn new(registry: MemoryRegistry, location: impl Into<String>, policy: OpenPolicy) -> Self {
        Self {
            location: location.into(),
            registry,
            policy,
            map: RwLock::new(None),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn map(&self) -> Result<SharedMap, StoreError> {
        self.map
            .read()
            .map_err(poisoned)?
            .as_ref()
            .map(Arc::clone)
            .ok_or(StoreError::NotOpen)
    }
}

#[async_trait]
impl Handle for MemoryBackend {
    async fn open(&self) -> Result<(), StoreError> {
        let mut slot = self.map.write().map_err(poisoned)?;
        if slot.is_some() {
            return Ok(());
        }
        *slot = Some(self.registry.attach(&self.location, self.policy)?);
        info!(location = %self.location, "memory backend opened");
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.map.write().map_err(poisoned)?.take().is_some() {
            info!(location = %self.location, "memory backend closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.map.read().map(|m| m.is_some()).unwrap_or(false)
    }

    async fn get(&self, key: &str) -> Result<Value, StoreError> {
        check_key(key)?;
        let map = self.map()?;
        let guard = map.read().map_err(poisoned)?;
        guard
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        check_key(key)?;
        let map = self.map()?;
        map.write().map_err(poisoned)?.insert(key.to_string(), value);
        debug!(key, "memory put");
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        check_key(key)?;
        let map = self.map()?;
        map.write().map_err(poisoned)?.remove(key);
        Ok(())
    }

    async fn iterate(&self, options: IterateOptions) -> Result<Vec<Entry>, StoreError> {
        let map = self.map()?;
        let guard = map.read().map_err(poisoned)?;
        let entries = guard.iter().map(|(k, v)| (k.clone(), v.clone()));
        Ok(options.apply(entries))
    }

    fn kind(&self) -> Option<&str> {
        Some(Self::KIND)
    }
}
