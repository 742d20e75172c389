//! Value encodings and the encoding layer.
//!
//! Callers hand a handle structured [`Value`]s; what the backend underneath
//! actually stores depends on the configured [`ValueEncoding`]:
//!
//! | Encoding | Stored form                                   | Read back as        |
//! |----------|-----------------------------------------------|---------------------|
//! | `utf8`   | text coercion of the value                    | the stored string   |
//! | `json`   | JSON text of the value                        | the parsed value    |
//! | `id`     | the value itself                              | the value itself    |
//!
//! `utf8` is lossy for structured values: objects become a placeholder
//! string by default (see [`ObjectCoercion`]), which is what lets the
//! option-precedence scenario tell a defaulted handle from an overridden one.


use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::StoreError;
use crate::handle::{Entry, Handle, HandleRef, IterateOptions};

// ------------------------------------------------------------------------------------------------
// Encodings
// ------------------------------------------------------------------------------------------------

/// Codec applied to stored values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueEncoding {
    /// Values are coerced to text.
    #[default]
    Utf8,

    /// Values are stored as JSON text and parsed on read.
    Json,

    /// Values pass through untouched.
    Id,
}

impl ValueEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            ValueEncoding::Utf8 => "utf8",
            ValueEncoding::Json => "json",
            ValueEncoding::Id => "id",
        }
    }

    /// Converts a caller value into its stored form.
    pub fn encode(&self, value: Value, coercion: &ObjectCoercion) -> Result<Value, StoreError> {
        Ok(match self {
            ValueEncoding::Utf8 => Value::String(coerce_text(&value, coercion)),
            ValueEncoding::Json => Value::String(serde_json::to_string(&value)?),
            ValueEncoding::Id => value,
        })
    }

    /// Converts a stored value back into what the caller reads.
    ///
    /// Under `utf8`, stored values that are not text (written by another
    /// codec at the same location) are rendered with `coercion`.
    pub fn decode(&self, stored: Value, coercion: &ObjectCoercion) -> Result<Value, StoreError> {
        match (self, stored) {
            (ValueEncoding::Json, Value::String(text)) => Ok(serde_json::from_str(&text)?),
            (ValueEncoding::Json, other) => Err(StoreError::InvalidArgument(format!(
                "json-encoded value is not text: {other}"
            ))),
            (ValueEncoding::Utf8, Value::String(text)) => Ok(Value::String(text)),
            (ValueEncoding::Utf8, other) => Ok(Value::String(coerce_text(&other, coercion))),
            (ValueEncoding::Id, stored) => Ok(stored),
        }
    }
}

impl fmt::Display for ValueEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueEncoding {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "utf8" | "utf-8" => Ok(ValueEncoding::Utf8),
            "json" => Ok(ValueEncoding::Json),
            "id" => Ok(ValueEncoding::Id),
            other => Err(StoreError::InvalidConfig(format!(
                "unknown value encoding {other:?}"
            ))),
        }
    }
}

/// How `utf8` renders objects.
///
/// The default mirrors the classic "string coercion" of a plain object.
/// Callers who need the text to remain meaningful can pick [`Json`](Self::Json).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectCoercion {
    /// Every object becomes this fixed text.
    Placeholder(String),

    /// Objects are rendered as JSON text.
    Json,
}

impl ObjectCoercion {
    pub const DEFAULT_PLACEHOLDER: &'static str = "[object Object]";
}

impl Default for ObjectCoercion {
    fn default() -> Self {
        ObjectCoercion::Placeholder(Self::DEFAULT_PLACEHOLDER.to_string())
    }
}

/// Text coercion used by `utf8`.
///
/// Strings are kept verbatim, scalars use their literal text, arrays join
/// their coerced elements with `,` (nulls contribute nothing), and objects
/// follow `coercion`.
pub fn coerce_text(value: &Value, coercion: &ObjectCoercion) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => coerce_text(other, coercion),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => match coercion {
            ObjectCoercion::Placeholder(text) => text.clone(),
            ObjectCoercion::Json => value.to_string(),
        },
    }
}

// ------------------------------------------------------------------------------------------------
// Encoding layer
// ------------------------------------------------------------------------------------------------

/// Wrapper applying a [`ValueEncoding`] to everything written to and read
/// from its inner handle.
pub struct EncodingLayer {
    inner: HandleRef,
    encoding: ValueEncoding,
    coercion: ObjectCoercion,
}

impl EncodingLayer {
    pub const KIND: &'static str = "encoding";

    pub fn new(inner: HandleRef, encoding: ValueEncoding) -> Self {
        Self {
            inner,
            encoding,
            coercion: ObjectCoercion::default(),
        }
    }

    pub fn with_coercion(mut self, coercion: ObjectCoercion) -> Self {
        self.coercion = coercion;
        self
    }

    pub fn encoding(&self) -> ValueEncoding {
        self.encoding
    }
}

#[async_trait]
impl Handle for EncodingLayer {
    async fn open(&self) -> Result<(), StoreError> {
        self.inner.open().await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.inner.close().await
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    async fn get(&self, key: &str) -> Result<Value, StoreError> {
        let stored = self.inner.get(key).await?;
        self.encoding.decode(stored, &self.coercion)
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let stored = self.encoding.encode(value, &self.coercion)?;
        trace!(key, encoding = %self.encoding, "encoded value");
        self.inner.put(key, stored).await
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.inner.del(key).await
    }

    async fn iterate(&self, options: IterateOptions) -> Result<Vec<Entry>, StoreError> {
        self.inner
            .iterate(options)
            .await?
            .into_iter()
            .map(|(k, v)| self.encoding.decode(v, &self.coercion).map(|v| (k, v)))
            .collect()
    }

    fn kind(&self) -> Option<&str> {
        Some(Self::KIND)
    }

    fn inner(&self) -> Option<HandleRef> {
        Some(self.inner.clone())
    }
}
