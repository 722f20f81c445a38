//! Structured-data interchange codec.

use rhai::Dynamic;
use thiserror::Error;

/// Content type of encoded payloads.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode value: {0}")]
    Encode(String),

    #[error("failed to decode payload: {0}")]
    Decode(String),
}

/// JSON encoding of script values.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn content_type(&self) -> &'static str {
        JSON_CONTENT_TYPE
    }

    pub fn encode(&self, value: &Dynamic) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Dynamic, CodecError> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
        rhai::serde::to_dynamic(value).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
