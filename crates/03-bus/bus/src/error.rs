//! Bus-level error surface.

use thiserror::Error;

/// Failures surfaced by bus transactions and the transfer engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    /// A single transaction failed; the transfer engine may retry.
    #[error("bus i/o fault: {0}")]
    Io(&'static str),

    /// A whole logical write was abandoned after exhausting retries.
    #[error("block write failed after {attempts} attempts")]
    WriteFailed {
        /// Chunk attempts made before giving up.
        attempts: u32,
    },

    /// A logical read was abandoned; the partially filled buffer must be
    /// discarded.
    #[error("block read failed")]
    ReadFailed,

    /// No event arrived within the caller's bound.
    #[error("timed out waiting on the bus")]
    Timeout,

    /// The other end of the bus is gone.
    #[error("bus is closed")]
    Closed,
}
