//! Calling conventions.
//!
//! One scenario per convention. Each checks that the handle works and
//! that [`down`] finds a backend of the expected kind beneath it.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};

use super::report::{Assert, Report};
use crate::encoding::ValueEncoding;
use crate::factory::{Factory, Options};
use crate::handle::HandleRef;
use crate::resolver::down;

const EXPECTED_DOWN: &str = "got expected down";

/// Runs all four calling-convention scenarios in order.
pub async fn args(factory: &dyn Factory, expected_kind: &str) -> Vec<Report> {
    vec![
        without_arguments(factory, expected_kind).await,
        with_options_and_callback(factory, expected_kind).await,
        with_options(factory, expected_kind).await,
        with_callback(factory, expected_kind).await,
    ]
}

fn random_key() -> String {
    rand::random::<f64>().to_string()
}

fn stamped_value() -> Value {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    json!({ "test_key": now.to_string() })
}

fn json_options() -> Options {
    Options::new().value_encoding(ValueEncoding::Json)
}

/// `create(None)`, writing before the open signal arrives.
pub async fn without_arguments(factory: &dyn Factory, expected_kind: &str) -> Report {
    let mut t = Assert::new("without arguments", 3);

    let db = factory.create(None);
    t.conforming(&db);

    let (opened, put) = tokio::join!(db.opened(), db.put("foo", json!("bar")));
    match opened {
        Ok(()) => t.ok(down(&db, Some(expected_kind)).is_some(), EXPECTED_DOWN),
        Err(e) => t.unexpected("open", e),
    }

    t.error(&put, "put foo");
    t.not_ok(put.is_err(), "put foo reports no error");

    t.close(&db).await;
    t.finish()
}

/// `open(Some({valueEncoding: json}))`, then a structured round trip.
pub async fn with_options_and_callback(factory: &dyn Factory, expected_kind: &str) -> Report {
    let mut t = Assert::new("with options and callback", 6);

    let opened = factory.open(Some(json_options())).await;
    t.error(&opened, "open with options");
    let Ok(db) = opened else {
        return t.finish();
    };
    t.conforming(&db);
    t.ok(db.is_open(), "handle is open");
    t.ok(down(&db, Some(expected_kind)).is_some(), EXPECTED_DOWN);

    let key = random_key();
    let value = stamped_value();
    let put = db.put(&key, value.clone()).await;
    t.not_ok(put.is_err(), "put structured value");

    let got = db.get(&key).await;
    t.error(&got, "get structured value");
    t.deep_equal(&got, &value, "structured value round-trips");

    t.close(&db).await;
    t.finish()
}

/// `create(Some({valueEncoding: json}))`, writing before the open signal.
pub async fn with_options(factory: &dyn Factory, expected_kind: &str) -> Report {
    let mut t = Assert::new("with options", 4);

    let db: HandleRef = factory.create(Some(json_options()));
    t.conforming(&db);

    let key = random_key();
    let value = stamped_value();
    let (opened, (put, got)) = tokio::join!(db.opened(), async {
        let put = db.put(&key, value.clone()).await;
        let got = db.get(&key).await;
        (put, got)
    });

    match opened {
        Ok(()) => t.ok(down(&db, Some(expected_kind)).is_some(), EXPECTED_DOWN),
        Err(e) => t.unexpected("open", e),
    }
    t.not_ok(put.is_err(), "put structured value");
    t.error(&got, "get structured value");
    t.deep_equal(&got, &value, "structured value round-trips");

    t.close(&db).await;
    t.finish()
}

/// `open(None)`, then a plain text round trip.
pub async fn with_callback(factory: &dyn Factory, expected_kind: &str) -> Report {
    let mut t = Assert::new("with callback", 6);

    let opened = factory.open(None).await;
    t.error(&opened, "open");
    let Ok(db) = opened else {
        return t.finish();
    };
    t.conforming(&db);
    t.ok(db.is_open(), "handle is open");
    t.ok(down(&db, Some(expected_kind)).is_some(), EXPECTED_DOWN);

    let put = db.put("key", json!("value")).await;
    t.not_ok(put.is_err(), "put key");

    let got = db.get("key").await;
    t.error(&got, "get key");
    t.is(&got, &json!("value"), "value reads back exactly");

    t.close(&db).await;
    t.finish()
}
