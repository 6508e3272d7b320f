//! The `error` module defines the error types used across the transport.
//!
//! Errors are split by origin: malformed wire data (`FramingError`), failures
//! reported by the broker (`BrokerError`), and the transport-level
//! `TransportError` that wraps both and is what public operations return.

use thiserror::Error;

/// Malformed wire data. Fatal to the decode call and never retried.
#[derive(Error, Debug)]
pub enum FramingError {
    /// A record marker that is neither "message follows" nor end-of-stream
    #[error("Malformed data stream: unexpected marker {0}")]
    InvalidMarker(i32),

    /// A field length below the null sentinel
    #[error("Invalid field length {0}: must not be smaller than -1")]
    InvalidLength(i32),

    /// A field length at or above the per-field ceiling
    #[error("Field length {0} exceeds the maximum of {max} bytes", max = crate::codec::MAX_FIELD_SIZE)]
    FieldTooLarge(i32),

    /// A flag field that does not hold a boolean text value
    #[error("Invalid boolean value: {0:?}")]
    InvalidBool(Option<String>),

    /// Field bytes that are not valid UTF-8
    #[error("Field is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// The stream ended early or could not be read
    #[error("IO error while reading stream: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a broker namespace or receiver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker is throttling this client; back off before retrying
    #[error("Broker is too busy")]
    ServerBusy,

    /// The receiver or subscription was closed while an operation was pending
    #[error("Operation cancelled")]
    Cancelled,

    /// A topic or subscription does not exist
    #[error("Messaging entity not found: {0}")]
    EntityNotFound(String),

    /// A topic or subscription already exists
    #[error("Messaging entity already exists: {0}")]
    EntityExists(String),

    /// The namespace connection has been closed
    #[error("Connection closed")]
    Closed,

    /// Any other broker-side or network failure
    #[error("Communication error: {0}")]
    Communication(String),
}

/// Errors surfaced by the transport's public operations.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// The connection endpoint could not be parsed or is not supported
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A receive pump stopped on a non-recoverable broker error
    #[error("Receive pump for topic '{topic}' failed: {source}")]
    Pump { topic: String, source: BrokerError },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;
