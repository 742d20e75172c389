//! Option precedence.

use serde_json::json;

use super::report::{Assert, Report};
use crate::encoding::{ObjectCoercion, ValueEncoding, coerce_text};
use crate::factory::{Factory, Options};

/// Per-call options override factory defaults.
///
/// A factory with default `valueEncoding: utf8` writes `{test: true}`
/// through two handles: one without overrides, which must read back the
/// text `"[object Object]"`, and one with `valueEncoding: json`, which must
/// read back the original object. The handles run one after the other.
pub async fn options(factory: &dyn Factory) -> Report {
    options_with(factory, &ObjectCoercion::default()).await
}

/// [`options`] for factories whose `utf8` codec renders objects with
/// `coercion` instead of the default placeholder.
pub async fn options_with(factory: &dyn Factory, coercion: &ObjectCoercion) -> Report {
    let mut t = Assert::new("opts precedence", 6);
    let level = factory.with_defaults(Options::new().value_encoding(ValueEncoding::Utf8));
    let value = json!({ "test": true });
    let fallback = json!(coerce_text(&value, coercion));

    let db1 = level.create(None);
    t.conforming(&db1);
    let put = db1.put("key", value.clone()).await;
    t.error(&put, "put through default encoding");
    let got = db1.get("key").await;
    t.error(&got, "get through default encoding");
    t.is(&got, &fallback, "object stored as text");
    t.close(&db1).await;

    let db2 = level.create(Some(Options::new().value_encoding(ValueEncoding::Json)));
    t.conforming(&db2);
    let put = db2.put("key", value.clone()).await;
    t.error(&put, "put through json encoding");
    let got = db2.get("key").await;
    t.error(&got, "get through json encoding");
    t.deep_equal(&got, &value, "object survives json encoding");
    t.close(&db2).await;

    t.finish()
}
