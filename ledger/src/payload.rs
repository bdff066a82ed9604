//! # Block Payloads
//!
//! A payload is whatever JSON value a client posted. The ledger stores it
//! verbatim and never looks inside: there is no schema, only the guarantee
//! that the bytes parsed as JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque JSON value carried by a block.
///
/// Serializes transparently, so a payload round-trips through the API
/// exactly as the client sent it (modulo whitespace and key order).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Value);

impl Payload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Parse a request body. Anything that is not exactly one syntactically
    /// valid JSON value (empty input, trailing garbage) is rejected.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes).map(Self)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Deterministic byte encoding used for hashing.
    ///
    /// `serde_json` keeps object keys sorted, so two payloads that compare
    /// equal always produce the same bytes.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        self.0.to_string().into_bytes()
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
