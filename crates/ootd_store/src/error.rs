//! Error types for store operations.

use ootd_protocol::ProtocolError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by stores.
///
/// Errors are `Clone` because the last one is kept on the store for the UI
/// to render next to stale data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The request failed on the wire or the server refused it.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// Params or a patch were rejected before reaching the network.
    #[error("validation error: {0}")]
    Validation(String),

    /// A registry lookup found a store of another type under the same name.
    #[error("store `{name}` is registered with a different type")]
    Registry {
        /// Registry key.
        name: String,
    },
}

/// Network-level failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    /// The client-side timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// The server could not be reached.
    #[error("connectivity: {0}")]
    Connectivity(String),

    /// The server answered with a non-2xx status.
    #[error("status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message from the structured error body.
        message: String,
        /// Server exception name, if any.
        exception: Option<String>,
    },

    /// The response body did not decode.
    #[error("decode: {0}")]
    Decode(String),
}

impl StoreError {
    /// Returns true if repeating the same request could succeed.
    ///
    /// Stores never retry on their own; this is for callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Network(NetworkError::Timeout)
            | StoreError::Network(NetworkError::Connectivity(_)) => true,
            StoreError::Network(NetworkError::Status { status, .. }) => *status >= 500,
            _ => false,
        }
    }
}

impl From<ProtocolError> for StoreError {
    fn from(err: ProtocolError) -> Self {
        StoreError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(StoreError::from(NetworkError::Timeout).is_retryable());
        assert!(StoreError::from(NetworkError::Connectivity("reset".into())).is_retryable());
        assert!(StoreError::from(NetworkError::Status {
            status: 503,
            message: "busy".into(),
            exception: None,
        })
        .is_retryable());
        assert!(!StoreError::from(NetworkError::Status {
            status: 404,
            message: "missing".into(),
            exception: None,
        })
        .is_retryable());
        assert!(!StoreError::Validation("bad".into()).is_retryable());
    }

    #[test]
    fn protocol_errors_become_validation() {
        let err: StoreError = ProtocolError::InvalidParams("limit".into()).into();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn error_display() {
        let err = StoreError::from(NetworkError::Timeout);
        assert_eq!(err.to_string(), "network error: request timed out");
    }
}
