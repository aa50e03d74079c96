//! Session error types

use asciichat_core::TransportError;

/// Errors starting or running a session
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Could not connect to {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: TransportError,
    },
    #[error("Could not listen on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: TransportError,
    },
    #[error("No peer connected within {waited_secs}s")]
    AcceptTimeout { waited_secs: u64 },
    #[error("Identity handshake failed: {reason}")]
    Handshake { reason: String },
    #[error("Session was stopped")]
    Stopped,
    #[error("Session already started")]
    AlreadyStarted,
    #[error("Invalid session configuration: {reason}")]
    InvalidConfiguration { reason: String },
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
