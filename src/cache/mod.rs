//! Read-through cache layer.
//!
//! Sits between the encoding layer and the backend, so it caches values in
//! their stored form. Writes go through to the inner handle first and are
//! cached only once the inner write succeeded. When full, the oldest
//! inserted entry is evicted.


use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, trace};

use crate::StoreError;
use crate::backend::poisoned;
use crate::handle::{Entry, Handle, HandleRef, IterateOptions};

#[derive(Debug, Default)]
struct Entries {
    values: HashMap<String, Value>,
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

impl Entries {
    fn insert(&mut self, key: &str, value: Value, capacity: usize) {
        if self.values.insert(key.to_string(), value).is_none() {
            self.order.push_back(key.to_string());
        }
        while self.values.len() > capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.values.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn remove(&mut self, key: &str) {
        if self.values.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
    }

    fn clear(&mut self) {
        self.values.clear();
        self.order.clear();
    }
}

/// Hit/miss counters of a [`CacheLayer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
}

/// Bounded read-through, write-through cache over an inner handle.
pub struct CacheLayer {
    inner: HandleRef,
    capacity: usize,
    entries: Mutex<Entries>,
}

impl CacheLayer {
    pub const KIND: &'static str = "cache";

    /// Wraps `inner` with a cache holding at most `capacity` entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] if `capacity` is zero.
    pub fn new(inner: HandleRef, capacity: usize) -> Result<Self, StoreError> {
        if capacity == 0 {
            return Err(StoreError::InvalidConfig(
                "cache capacity must be >= 1".into(),
            ));
        }
        Ok(Self {
            inner,
            capacity,
            entries: Mutex::new(Entries::default()),
        })
    }

    pub fn stats(&self) -> CacheStats {
        self.entries
            .lock()
            .map(|e| CacheStats {
                hits: e.hits,
                misses: e.misses,
                len: e.values.len(),
            })
            .unwrap_or_default()
    }

    fn cached(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        let found = entries.values.get(key).cloned();
        if found.is_some() {
            entries.hits += 1;
        } else {
            entries.misses += 1;
        }
        Ok(found)
    }

    fn remember(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        entries.insert(key, value, self.capacity);
        Ok(())
    }
}

#[async_trait]
impl Handle for CacheLayer {
    async fn open(&self) -> Result<(), StoreError> {
        self.inner.open().await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.entries.lock().map_err(poisoned)?.clear();
        debug!("cache cleared on close");
        self.inner.close().await
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    async fn get(&self, key: &str) -> Result<Value, StoreError> {
        if !self.inner.is_open() {
            return Err(StoreError::NotOpen);
        }
        if let Some(value) = self.cached(key)? {
            trace!(key, "cache hit");
            return Ok(value);
        }
        let value = self.inner.get(key).await?;
        self.remember(key, value.clone())?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.inner.put(key, value.clone()).await?;
        self.remember(key, value)
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.inner.del(key).await?;
        self.entries.lock().map_err(poisoned)?.remove(key);
        Ok(())
    }

    async fn iterate(&self, options: IterateOptions) -> Result<Vec<Entry>, StoreError> {
        self.inner.iterate(options).await
    }

    fn kind(&self) -> Option<&str> {
        Some(Self::KIND)
    }

    fn inner(&self) -> Option<HandleRef> {
        Some(self.inner.clone())
    }
}
