//! The outermost, deferred-open handle.
//!
//! A [`Store`] is what factories return. It wraps a fully assembled chain
//! (encoding → cache → backend) and owns its lifecycle:
//!
//! ```text
//!   New ──► Opening ──► Open ──► Closed
//!                 └───► Failed
//! ```
//!
//! Opening starts as soon as the store is created when a tokio runtime is
//! available, or on first use otherwise. Operations issued while the store
//! is still opening wait for it, so callers may write to a store they have
//! just created without waiting for the open signal.
//!
//! The open signal is observable two ways: awaiting [`Handle::opened`], or
//! watching the status channel from [`Store::subscribe`].

#[cfg(test)]
mod tests;

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::StoreError;
use crate::backend::poisoned;
use crate::handle::{Entry, Handle, HandleRef, IterateOptions};

/// Work run once before the chain is first opened (e.g. wiping the location
/// for `clean`).
pub type Prepare = Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'static>>;

/// Lifecycle state of a [`Store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    New,
    Opening,
    Open,
    Failed,
    Closed,
}

impl Status {
    fn is_settled(&self) -> bool {
        !matches!(self, Status::New | Status::Opening)
    }
}

/// Deferred-open handle over an inner chain.
///
/// The status channel is the single source of truth for the lifecycle:
/// every transition is a compare-and-set on the channel value, so an open
/// and a close racing on different threads cannot both win.
pub struct Store {
    inner: HandleRef,
    prepare: Mutex<Option<Prepare>>,
    status: watch::Sender<Status>,
    failure: Mutex<Option<String>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Wraps `inner` and starts opening it in the background when called
    /// from within a tokio runtime.
    pub fn new(inner: HandleRef, prepare: Option<Prepare>) -> Arc<Self> {
        let (status, _) = watch::channel(Status::New);
        let store = Arc::new(Self {
            inner,
            prepare: Mutex::new(prepare),
            status,
            failure: Mutex::new(None),
        });

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let opening = Arc::clone(&store);
            runtime.spawn(async move {
                match opening.opened().await {
                    Ok(()) | Err(StoreError::Closed) => {}
                    Err(e) => error!("deferred open failed: {e}"),
                }
            });
        } else {
            debug!("no runtime, store opens on first use");
        }

        store
    }

    /// Current lifecycle state.
    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    /// Subscribes to lifecycle changes.
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    fn failure(&self) -> StoreError {
        let message = self
            .failure
            .lock()
            .ok()
            .and_then(|f| f.clone())
            .unwrap_or_else(|| "unknown error".to_string());
        StoreError::OpenFailed(message)
    }

    /// Waits until the store is usable for storage operations.
    async fn ready(&self) -> Result<(), StoreError> {
        match self.status() {
            Status::Open => Ok(()),
            Status::Closed => Err(StoreError::Closed),
            _ => self.opened().await,
        }
    }

    /// Moves to `to` if the current status is one of `from`.
    fn transition(&self, from: &[Status], to: Status) -> bool {
        self.status.send_if_modified(|status| {
            if from.contains(status) {
                *status = to;
                true
            } else {
                false
            }
        })
    }

    /// Waits for the status to leave `New` / `Opening`.
    async fn settled(&self) -> Result<Status, StoreError> {
        let mut rx = self.status.subscribe();
        let settled = rx
            .wait_for(Status::is_settled)
            .await
            .map_err(|_| StoreError::Internal("status channel closed".into()))?;
        Ok(*settled)
    }

    fn take_prepare(&self) -> Result<Option<Prepare>, StoreError> {
        Ok(self.prepare.lock().map_err(poisoned)?.take())
    }

    fn record_failure(&self, error: &StoreError) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(error.to_string());
        }
    }

    async fn open_chain(&self) -> Result<(), StoreError> {
        if let Some(prepare) = self.take_prepare()? {
            prepare.await?;
        }
        self.inner.open().await
    }

    /// Runs an open this caller won the `Opening` transition for.
    async fn run_open(&self) -> Result<(), StoreError> {
        match self.open_chain().await {
            Ok(()) => {
                if self.transition(&[Status::Opening], Status::Open) {
                    info!("store opened");
                    Ok(())
                } else {
                    self.inner.close().await?;
                    Err(StoreError::Closed)
                }
            }
            Err(e) => {
                self.record_failure(&e);
                self.transition(&[Status::Opening], Status::Failed);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Handle for Store {
    async fn open(&self) -> Result<(), StoreError> {
        if self.transition(&[Status::New, Status::Closed], Status::Opening) {
            return self.run_open().await;
        }
        self.opened().await
    }

    async fn close(&self) -> Result<(), StoreError> {
        let mut previous = Status::Closed;
        loop {
            if self.status() == Status::Opening {
                let _ = self.settled().await;
            }
            let closed = self.status.send_if_modified(|status| {
                if *status == Status::Opening {
                    return false;
                }
                previous = *status;
                *status = Status::Closed;
                true
            });
            if closed {
                break;
            }
        }

        if previous == Status::Open {
            self.inner.close().await?;
            info!("store closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.status() == Status::Open
    }

    async fn opened(&self) -> Result<(), StoreError> {
        if self.transition(&[Status::New], Status::Opening) {
            return self.run_open().await.map_err(|e| match e {
                StoreError::Closed | StoreError::OpenFailed(_) => e,
                _ => self.failure(),
            });
        }

        match self.settled().await? {
            Status::Open => Ok(()),
            Status::Failed => Err(self.failure()),
            _ => Err(StoreError::Closed),
        }
    }

    async fn get(&self, key: &str) -> Result<Value, StoreError> {
        self.ready().await?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.ready().await?;
        self.inner.put(key, value).await
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.ready().await?;
        self.inner.del(key).await
    }

    async fn iterate(&self, options: IterateOptions) -> Result<Vec<Entry>, StoreError> {
        self.ready().await?;
        self.inner.iterate(options).await
    }

    fn inner(&self) -> Option<HandleRef> {
        Some(self.inner.clone())
    }
}
