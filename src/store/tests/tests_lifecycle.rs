//! Store lifecycle tests: deferred open, open signal, failure and close.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::StoreError;
    use crate::backend::{MemoryBackend, MemoryRegistry, OpenPolicy};
    use crate::handle::tests::helpers::init_tracing;
    use crate::handle::{Handle, HandleRef};
    use crate::resolver::down;
    use crate::store::{Prepare, Status, Store};
    use serde_json::json;

    fn backend(registry: &MemoryRegistry, policy: OpenPolicy) -> HandleRef {
        Arc::new(MemoryBackend::new(registry.clone(), "db", policy))
    }

    /// # Scenario
    /// Writing to a store immediately after creating it.
    ///
    /// # Actions
    /// 1. Create the store.
    /// 2. Without waiting for the open signal, put and then get a key.
    ///
    /// # Expected behavior
    /// Both operations wait for the open and succeed.
    #[tokio::test]
    async fn operations_wait_for_open() {
        init_tracing();
        let store = Store::new(backend(&MemoryRegistry::new(), OpenPolicy::default()), None);

        store.put("foo", json!("bar")).await.unwrap();
        assert_eq!(store.get("foo").await.unwrap(), json!("bar"));
        assert!(store.is_open());
        assert_eq!(store.status(), Status::Open);
    }

    /// # Scenario
    /// Observing the open signal concurrently with a deferred write.
    #[tokio::test]
    async fn open_signal_and_write_race() {
        init_tracing();
        let store = Store::new(backend(&MemoryRegistry::new(), OpenPolicy::default()), None);
        let (opened, put) = tokio::join!(store.opened(), store.put("k", json!(1)));
        opened.unwrap();
        put.unwrap();
    }

    /// # Scenario
    /// The status channel reports `Open` to subscribers.
    #[tokio::test]
    async fn subscribers_see_open() {
        let store = Store::new(backend(&MemoryRegistry::new(), OpenPolicy::default()), None);
        let mut rx = store.subscribe();
        let status = *rx.wait_for(|s| *s == Status::Open).await.unwrap();
        assert_eq!(status, Status::Open);
    }

    /// # Scenario
    /// The chain fails to open (`create_if_missing = false` on an empty
    /// registry).
    ///
    /// # Expected behavior
    /// The open signal and every later operation report `OpenFailed`
    /// carrying the original error text.
    #[tokio::test]
    async fn open_failure_is_reported() {
        init_tracing();
        let policy = OpenPolicy {
            create_if_missing: false,
            error_if_exists: false,
        };
        let store = Store::new(backend(&MemoryRegistry::new(), policy), None);

        match store.opened().await {
            Err(StoreError::OpenFailed(msg)) => assert!(msg.contains("no store exists")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            store.put("k", json!(1)).await,
            Err(StoreError::OpenFailed(_))
        ));
        assert_eq!(store.status(), Status::Failed);
        store.close().await.unwrap();
    }

    /// # Scenario
    /// The prepare step runs once, before the chain opens.
    ///
    /// # Actions
    /// 1. Create a store whose prepare step bumps a counter.
    /// 2. Open explicitly, close, reopen.
    ///
    /// # Expected behavior
    /// The counter is 1 after both opens.
    #[tokio::test]
    async fn prepare_runs_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let prepare: Prepare = Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let store = Store::new(
            backend(&MemoryRegistry::new(), OpenPolicy::default()),
            Some(prepare),
        );
        store.open().await.unwrap();
        store.close().await.unwrap();
        store.open().await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(store.is_open());
    }

    /// # Scenario
    /// A failing prepare step fails the open without touching the chain.
    #[tokio::test]
    async fn failing_prepare_fails_open() {
        let registry = MemoryRegistry::new();
        let prepare: Prepare =
            Box::pin(async { Err(StoreError::Internal("wipe failed".into())) });
        let store = Store::new(backend(&registry, OpenPolicy::default()), Some(prepare));

        assert!(matches!(store.opened().await, Err(StoreError::OpenFailed(_))));
        assert!(!registry.contains("db"));
    }

    /// # Scenario
    /// Close, then use.
    ///
    /// # Expected behavior
    /// Close is idempotent, closes the chain, and later operations fail
    /// with `Closed` until the store is explicitly reopened.
    #[tokio::test]
    async fn close_then_use() {
        let registry = MemoryRegistry::new();
        let inner = backend(&registry, OpenPolicy::default());
        let store = Store::new(inner.clone(), None);

        store.put("k", json!("v")).await.unwrap();
        store.close().await.unwrap();
        store.close().await.unwrap();

        assert!(!inner.is_open());
        assert!(matches!(store.get("k").await, Err(StoreError::Closed)));
        assert!(matches!(store.opened().await, Err(StoreError::Closed)));

        store.open().await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), json!("v"));
    }

    /// # Scenario
    /// Close issued while the open is still in flight.
    ///
    /// # Starting environment
    /// A store whose prepare step blocks until released.
    ///
    /// # Actions
    /// 1. Let the background open start and block.
    /// 2. Issue `close` from another task.
    /// 3. Release the prepare step.
    ///
    /// # Expected behavior
    /// `close` waits for the open to settle, then closes the chain. The
    /// store ends `Closed` and never reports `Open` afterwards.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn close_during_open_wins() {
        init_tracing();
        let (release, gate) = tokio::sync::oneshot::channel::<()>();
        let prepare: Prepare = Box::pin(async move {
            let _ = gate.await;
            Ok(())
        });
        let inner = backend(&MemoryRegistry::new(), OpenPolicy::default());
        let store = Store::new(inner.clone(), Some(prepare));

        let mut rx = store.subscribe();
        rx.wait_for(|s| *s == Status::Opening).await.unwrap();

        let closing = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.close().await })
        };
        tokio::task::yield_now().await;
        assert!(!closing.is_finished());

        release.send(()).unwrap();
        closing.await.unwrap().unwrap();

        assert_eq!(store.status(), Status::Closed);
        assert!(!inner.is_open());
        assert!(matches!(store.opened().await, Err(StoreError::Closed)));
        assert!(matches!(store.get("k").await, Err(StoreError::Closed)));
    }

    /// # Scenario
    /// Close before the background open task has run.
    ///
    /// # Expected behavior
    /// The background task finds the store closed and does not reopen it.
    #[tokio::test]
    async fn close_before_background_open_sticks() {
        let inner = backend(&MemoryRegistry::new(), OpenPolicy::default());
        let store = Store::new(inner.clone(), None);
        assert_eq!(store.status(), Status::New);

        store.close().await.unwrap();
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        assert_eq!(store.status(), Status::Closed);
        assert!(!inner.is_open());
    }

    /// # Scenario
    /// A store created outside any runtime.
    ///
    /// # Expected behavior
    /// It stays `New` until first used, then opens on demand.
    #[test]
    fn opens_on_first_use_without_runtime() {
        let store = Store::new(backend(&MemoryRegistry::new(), OpenPolicy::default()), None);
        assert_eq!(store.status(), Status::New);

        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(async {
            store.put("k", json!(true)).await.unwrap();
            assert!(store.is_open());
        });
    }

    /// # Scenario
    /// The store declares no kind and resolves to its backend.
    #[tokio::test]
    async fn resolves_to_backend() {
        let store: HandleRef =
            Store::new(backend(&MemoryRegistry::new(), OpenPolicy::default()), None);
        assert_eq!(store.kind(), None);
        assert_eq!(down(&store, None).unwrap().kind(), Some("memory"));
        assert!(down(&store, Some("log")).is_none());
    }
}
