//! Persistence reset.

use serde_json::json;

use super::report::{Assert, Report};
use crate::factory::{Factory, Options};

/// A store opened with `clean` starts empty, even at a storage identity
/// that held data before.
///
/// Five assertions: the fresh store misses `foo`, `put` succeeds, `get`
/// hits, `close` succeeds, and a second `clean` store misses `foo` again.
/// Later steps run even when earlier ones fail.
pub async fn clean(factory: &dyn Factory) -> Report {
    let mut t = Assert::new("clean", 5);

    let db = factory.create(Some(Options::new().clean(true)));
    t.conforming(&db);

    let miss = db.get("foo").await;
    t.ok(miss.is_err(), "fresh store has no foo");

    let put = db.put("foo", json!("bar")).await;
    t.error(&put, "put foo");

    let hit = db.get("foo").await;
    t.not_ok(hit.is_err(), "get foo after put");

    let closed = db.close().await;
    t.error(&closed, "close");

    let db2 = factory.create(Some(Options::new().clean(true)));
    t.conforming(&db2);
    let miss = db2.get("foo").await;
    t.ok(miss.is_err(), "clean store has no foo after reopen");
    t.close(&db2).await;

    t.finish()
}
