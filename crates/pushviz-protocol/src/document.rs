//! Visualization documents and their wire codec.
//!
//! A [`Document`] is an arbitrary JSON value, usually a Vega-Lite chart
//! specification. Nothing here checks its shape: a malformed chart is
//! transmitted as-is and only fails inside the browser renderer.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CodecError;

/// A visualization document pushed to the browser.
///
/// Encoding is deterministic: object keys are emitted in sorted order,
/// so equal documents always produce identical wire text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Value);

impl Document {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Build a document from any serializable value.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, CodecError> {
        serde_json::to_value(value)
            .map(Self)
            .map_err(CodecError::Encode)
    }

    /// Encode into the text frame payload sent to the browser.
    pub fn encode(&self) -> Result<String, CodecError> {
        serde_json::to_string(&self.0).map_err(CodecError::Encode)
    }

    /// Decode a text frame payload.
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        serde_json::from_str(text)
            .map(Self)
            .map_err(CodecError::Decode)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// The Vega-Lite `mark` type, when present. Used for log context only.
    pub fn mark(&self) -> Option<&str> {
        match self.0.get("mark")? {
            Value::String(s) => Some(s),
            Value::Object(obj) => obj.get("type").and_then(Value::as_str),
            _ => None,
        }
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.0
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
