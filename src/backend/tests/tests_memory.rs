//! Memory backend tests: registry identity, lifecycle and CRUD.

#[cfg(test)]
mod tests {
    use crate::StoreError;
    use crate::backend::{MemoryBackend, MemoryRegistry, OpenPolicy};
    use crate::handle::tests::helpers::init_tracing;
    use crate::handle::{Handle, IterateOptions, conforms};
    use serde_json::json;

    async fn open_at(registry: &MemoryRegistry, location: &str) -> MemoryBackend {
        init_tracing();
        let db = MemoryBackend::new(registry.clone(), location, OpenPolicy::default());
        db.open().await.unwrap();
        db
    }

    /// # Scenario
    /// Operations before `open` and after `close`.
    ///
    /// # Expected behavior
    /// Both fail with `NotOpen`; `is_open` tracks the lifecycle.
    #[tokio::test]
    async fn operations_require_open() {
        let db = MemoryBackend::new(MemoryRegistry::new(), "db", OpenPolicy::default());
        assert!(!db.is_open());
        assert!(matches!(db.get("k").await, Err(StoreError::NotOpen)));

        db.open().await.unwrap();
        assert!(db.is_open());
        db.close().await.unwrap();
        db.close().await.unwrap();
        assert!(!db.is_open());
        assert!(matches!(db.put("k", json!("v")).await, Err(StoreError::NotOpen)));
    }

    /// # Scenario
    /// Basic put/get/del round-trip, including a structured value.
    #[tokio::test]
    async fn put_get_del() {
        let db = open_at(&MemoryRegistry::new(), "db").await;

        assert!(db.get("foo").await.unwrap_err().is_not_found());
        db.put("foo", json!("bar")).await.unwrap();
        assert_eq!(db.get("foo").await.unwrap(), json!("bar"));

        db.put("obj", json!({"a": [1, 2]})).await.unwrap();
        assert_eq!(db.get("obj").await.unwrap(), json!({"a": [1, 2]}));

        db.del("foo").await.unwrap();
        db.del("never-written").await.unwrap();
        assert!(db.get("foo").await.unwrap_err().is_not_found());
    }

    /// # Scenario
    /// Two backends at the same location share state; different locations
    /// do not.
    #[tokio::test]
    async fn location_is_the_storage_identity() {
        let registry = MemoryRegistry::new();
        let a = open_at(&registry, "shared").await;
        let b = open_at(&registry, "shared").await;
        let c = open_at(&registry, "other").await;

        a.put("k", json!(1)).await.unwrap();
        assert_eq!(b.get("k").await.unwrap(), json!(1));
        assert!(c.get("k").await.unwrap_err().is_not_found());
    }

    /// # Scenario
    /// State survives close → reopen, and is discarded by `destroy`.
    #[tokio::test]
    async fn reopen_then_destroy() {
        let registry = MemoryRegistry::new();
        let db = open_at(&registry, "db").await;
        db.put("k", json!("v")).await.unwrap();
        db.close().await.unwrap();

        let db = open_at(&registry, "db").await;
        assert_eq!(db.get("k").await.unwrap(), json!("v"));
        db.close().await.unwrap();

        assert!(registry.destroy("db").unwrap());
        assert!(!registry.destroy("db").unwrap());
        assert!(!registry.contains("db"));

        let db = open_at(&registry, "db").await;
        assert!(db.get("k").await.unwrap_err().is_not_found());
    }

    /// # Scenario
    /// Empty keys are rejected.
    #[tokio::test]
    async fn empty_key_rejected() {
        let db = open_at(&MemoryRegistry::new(), "db").await;
        assert!(matches!(
            db.put("", json!(1)).await,
            Err(StoreError::InvalidArgument(_))
        ));
    }

    /// # Scenario
    /// Iteration is sorted and honors the options.
    #[tokio::test]
    async fn iterate_sorted() {
        let db = open_at(&MemoryRegistry::new(), "db").await;
        for k in ["c", "a", "b"] {
            db.put(k, json!(k)).await.unwrap();
        }
        let all = db.iterate(IterateOptions::default()).await.unwrap();
        let keys: Vec<_> = all.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    /// # Scenario
    /// The backend declares its kind and conforms.
    #[test]
    fn declares_kind() {
        let db = MemoryBackend::new(MemoryRegistry::new(), "db", OpenPolicy::default());
        assert_eq!(db.kind(), Some("memory"));
        assert!(db.inner().is_none());
        assert!(conforms(&db));
    }
}
