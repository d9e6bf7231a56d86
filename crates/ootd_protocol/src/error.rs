//! Error types for protocol values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building or merging protocol values.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Params failed validation before reaching the network.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// A value that must be a JSON object was something else.
    #[error("expected a JSON object for {0}")]
    NotAnObject(&'static str),

    /// A patch tried to change the identity of an entity.
    #[error("patch changed entity id from {from} to {to}")]
    IdChanged {
        /// Id before the patch.
        from: String,
        /// Id after the patch.
        to: String,
    },

    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Structured error body returned by the API on non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Server-side exception class name.
    #[serde(default)]
    pub exception_name: String,
    /// Human readable message.
    #[serde(default)]
    pub message: String,
    /// Optional per-field details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, String>>,
}
