//! Ownership-tagged payload buffers.
//!
//! The transport either copies a payload into its own storage or holds a
//! reference-counted view of caller-owned bytes; release happens through
//! `Drop` in both cases, so no exit path can leak or double-free a buffer.

use std::sync::Arc;

use wire::InterfaceType;

use crate::pool::PooledBuf;

/// A payload together with how it is owned.
pub enum PayloadBuf {
    /// Transport-owned copy.
    Owned(Vec<u8>),
    /// Block checked out of the frame pool.
    Pooled(PooledBuf),
    /// Caller-owned bytes submitted zero-copy; releasing is a refcount
    /// decrement, the caller keeps its clone for reuse.
    Shared(Arc<[u8]>),
}

impl PayloadBuf {
    /// The payload bytes.
    pub fn as_slice(&self) -> &[u8] {
        match self {
            PayloadBuf::Owned(bytes) => bytes,
            PayloadBuf::Pooled(buf) => buf.as_slice(),
            PayloadBuf::Shared(bytes) => bytes,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// True for zero-length payloads.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the transport does not own the bytes exclusively.
    pub fn is_zero_copy(&self) -> bool {
        matches!(self, PayloadBuf::Shared(_))
    }
}

impl From<Vec<u8>> for PayloadBuf {
    fn from(bytes: Vec<u8>) -> Self {
        PayloadBuf::Owned(bytes)
    }
}

impl From<&[u8]> for PayloadBuf {
    fn from(bytes: &[u8]) -> Self {
        PayloadBuf::Owned(bytes.to_vec())
    }
}

impl From<Arc<[u8]>> for PayloadBuf {
    fn from(bytes: Arc<[u8]>) -> Self {
        PayloadBuf::Shared(bytes)
    }
}

impl From<PooledBuf> for PayloadBuf {
    fn from(buf: PooledBuf) -> Self {
        PayloadBuf::Pooled(buf)
    }
}

impl std::fmt::Debug for PayloadBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            PayloadBuf::Owned(_) => "Owned",
            PayloadBuf::Pooled(_) => "Pooled",
            PayloadBuf::Shared(_) => "Shared",
        };
        write!(f, "PayloadBuf::{tag}({} bytes)", self.len())
    }
}

/// A validated inbound frame on its way to a consumer.
///
/// Dropping the frame releases its backing storage; a consumer that wants to
/// keep the payload takes the whole frame (or its [`PayloadBuf`]) by value.
#[derive(Debug)]
pub struct RxFrame {
    /// Logical channel the frame arrived on.
    pub if_type: InterfaceType,
    /// Sub-interface index.
    pub if_num: u8,
    /// Sender-assigned sequence number.
    pub seq: u16,
    /// Header flag bits.
    pub flags: u8,
    payload: PayloadBuf,
}

impl RxFrame {
    /// Wraps a validated payload.
    pub fn new(if_type: InterfaceType, if_num: u8, seq: u16, flags: u8, payload: PayloadBuf) -> Self {
        Self { if_type, if_num, seq, flags, payload }
    }

    /// The payload bytes.
    pub fn payload(&self) -> &[u8] {
        self.payload.as_slice()
    }

    /// Takes ownership of the payload, e.g. to park it beyond the callback.
    pub fn into_payload(self) -> PayloadBuf {
        self.payload
    }
}
