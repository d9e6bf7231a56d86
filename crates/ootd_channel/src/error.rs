//! Error types for push channels.

use thiserror::Error;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors that can occur on a push channel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether reconnecting could help.
        retryable: bool,
    },

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// The operation needs an open connection.
    #[error("channel is not connected")]
    NotConnected,

    /// No session to authenticate the connection with.
    #[error("not authenticated")]
    NotAuthenticated,

    /// A frame or payload failed to encode or decode.
    #[error("codec error: {0}")]
    Codec(String),

    /// Reconnection gave up.
    #[error("reconnect gave up after {attempts} attempts")]
    ReconnectExhausted {
        /// Attempts made.
        attempts: u32,
    },
}

impl ChannelError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if reconnecting could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChannelError::Transport { retryable: true, .. })
    }
}

impl From<serde_json::Error> for ChannelError {
    fn from(err: serde_json::Error) -> Self {
        ChannelError::Codec(err.to_string())
    }
}
