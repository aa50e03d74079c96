//! Error types for the ASCII chat core
//!
//! This module contains the error types used throughout the core crate:
//! protocol errors (fatal to the connection that produced them), payload
//! errors (fatal only to the frame they came from) and transport errors
//! (surfaced to the caller of `connect` and `bind`).

use std::io;

// ----------------------------------------------------------------------------
// Protocol Errors
// ----------------------------------------------------------------------------

/// Framing-level errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Frame header too short (expected {expected} bytes, got {actual})")]
    IncompleteHeader { expected: usize, actual: usize },
    #[error("Unknown message type: 0x{message_type:02x}")]
    UnknownMessageType { message_type: u8 },
    #[error("Payload too large (max {max}, got {actual})")]
    PayloadTooLarge { max: usize, actual: usize },
}

// ----------------------------------------------------------------------------
// Payload Errors
// ----------------------------------------------------------------------------

/// Errors converting between frame payloads and typed messages
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("Invalid UTF-8 payload: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("Compression failed: {0}")]
    Compression(String),
    #[error("Decompression failed: {0}")]
    Decompression(String),
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),
    #[error("Unknown color: {0}")]
    UnknownColor(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

// ----------------------------------------------------------------------------
// Transport Errors
// ----------------------------------------------------------------------------

/// Connection and listener errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection to {address} failed: {source}")]
    Dial {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("Connection to {address} timed out after {duration_ms}ms")]
    DialTimeout { address: String, duration_ms: u64 },
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("Invalid transport configuration: {reason}")]
    InvalidConfiguration { reason: String },
    #[error("Invalid connection state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;
