use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use crate::StoreError;
use crate::handle::{Entry, Handle, HandleRef, IterateOptions};

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times; only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Configurable in-memory handle used to build wrapping chains by hand.
#[derive(Default)]
pub struct Node {
    kind: Option<&'static str>,
    inner: Option<HandleRef>,
    missing: Vec<&'static str>,
    shortcut: Option<Option<HandleRef>>,
    open: AtomicBool,
    data: Mutex<BTreeMap<String, Value>>,
}

impl Node {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: &'static str) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn wrapping(mut self, inner: HandleRef) -> Self {
        self.inner = Some(inner);
        self
    }

    /// Reports `operation` as not invocable.
    pub fn without(mut self, operation: &'static str) -> Self {
        self.missing.push(operation);
        self
    }

    /// Answers every resolution with `result`, bypassing the structural walk.
    pub fn resolving_to(mut self, result: Option<HandleRef>) -> Self {
        self.shortcut = Some(result);
        self
    }

    pub fn build(self) -> HandleRef {
        Arc::new(self)
    }
}

#[async_trait]
impl Handle for Node {
    async fn open(&self) -> Result<(), StoreError> {
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn get(&self, key: &str) -> Result<Value, StoreError> {
        let data = self.data.lock().unwrap();
        data.get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.data.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.data.lock().unwrap().remove(key);
        Ok(())
    }

    async fn iterate(&self, options: IterateOptions) -> Result<Vec<Entry>, StoreError> {
        let data = self.data.lock().unwrap();
        Ok(options.apply(data.clone().into_iter()))
    }

    fn kind(&self) -> Option<&str> {
        self.kind
    }

    fn inner(&self) -> Option<HandleRef> {
        self.inner.clone()
    }

    fn down(&self, _kind: Option<&str>) -> Option<Option<HandleRef>> {
        self.shortcut.clone()
    }

    fn supports(&self, operation: &str) -> bool {
        crate::handle::CAPABILITY_SET.contains(&operation) && !self.missing.contains(&operation)
    }
}

/// Builds a chain from declared kinds, outermost first.
pub fn chain(kinds: &[Option<&'static str>]) -> HandleRef {
    let mut current: Option<HandleRef> = None;
    for kind in kinds.iter().rev() {
        let mut node = Node::new();
        if let Some(kind) = *kind {
            node = node.kind(kind);
        }
        if let Some(inner) = current.take() {
            node = node.wrapping(inner);
        }
        current = Some(node.build());
    }
    current.expect("chain needs at least one link")
}

/// Identity check between two handle references.
pub fn same(a: &HandleRef, b: &HandleRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
