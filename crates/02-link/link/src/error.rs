//! Error surface of the link layer.

use thiserror::Error;

/// Reasons an outbound payload is refused at the submit boundary.
///
/// Every rejection releases the caller's buffer; there is no partial
/// hand-off.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// Zero-length payloads never go on the wire.
    #[error("payload is empty")]
    Empty,

    /// Payload exceeds the configured maximum.
    #[error("payload length {len} exceeds maximum {max}")]
    TooLarge { len: usize, max: usize },

    /// The peer has not announced itself yet, or the link is shutting down.
    #[error("transport is not ready")]
    TransportDown,

    /// The lane stayed full for the whole bounded wait; transient, retry
    /// later.
    #[error("lane queue full after {waited_ms} ms")]
    QueueFull { waited_ms: u64 },
}

/// Fatal construction failures; the transport does not start.
#[derive(Debug, Error)]
pub enum InitError {
    /// A configuration value the engine cannot run with.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread `{name}`")]
    Thread {
        /// Thread name that failed to start.
        name: &'static str,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The bus rejected its initial configuration.
    #[error("bus initialisation failed: {0}")]
    Bus(String),
}
