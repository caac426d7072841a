//! Control-plane startup event.
//!
//! The only payload the transport interprets on its own: the peer announces
//! itself on the private-control interface with a tag-length-value list of
//! capabilities. All other interfaces carry fully opaque payloads.

use std::fmt;

/// Event type byte opening a control payload.
pub const EVENT_TYPE_INIT: u8 = 0x22;

/// TLV tags carried by the startup event. All current values are one byte.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tlv {
    /// Peer chip identifier.
    ChipId = 0x01,
    /// Capability bitmap.
    Capabilities = 0x02,
    /// Whether the peer supports the raw-throughput test channel.
    TestThroughputCap = 0x03,
    /// Depth of the peer's receive queue, for sizing expectations.
    RxQueueSize = 0x04,
}

/// Decoded startup ("hello") event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StartupEvent {
    /// Peer chip identifier.
    pub chip_id: u8,
    /// Capability bitmap.
    pub capabilities: u8,
    /// Raw-throughput test capability flag.
    pub test_throughput: u8,
    /// Peer receive-queue depth.
    pub rx_queue_size: u8,
}

/// Reasons a control payload fails to decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventError {
    /// Payload shorter than the two-byte event preamble, or a TLV runs past
    /// the declared event length.
    Truncated,
    /// First byte is not a known event type.
    UnknownEventType { raw: u8 },
    /// A required TLV was absent.
    MissingTlv { tag: u8 },
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventError::Truncated => write!(f, "control event truncated"),
            EventError::UnknownEventType { raw } => {
                write!(f, "unknown control event type {raw:#04x}")
            }
            EventError::MissingTlv { tag } => {
                write!(f, "startup event missing required TLV {tag:#04x}")
            }
        }
    }
}

impl std::error::Error for EventError {}

impl StartupEvent {
    /// Encodes the event payload: type byte, TLV length byte, TLV triplets.
    pub fn encode(&self) -> Vec<u8> {
        let entries = [
            (Tlv::ChipId, self.chip_id),
            (Tlv::Capabilities, self.capabilities),
            (Tlv::TestThroughputCap, self.test_throughput),
            (Tlv::RxQueueSize, self.rx_queue_size),
        ];

        let mut out = Vec::with_capacity(2 + entries.len() * 3);
        out.push(EVENT_TYPE_INIT);
        out.push((entries.len() * 3) as u8);
        for (tag, value) in entries {
            out.push(tag as u8);
            out.push(1); // value length
            out.push(value);
        }
        out
    }

    /// Decodes a control payload.
    ///
    /// Unknown tags inside the declared event length are skipped so newer
    /// peers can extend the hello without breaking older hosts.
    pub fn decode(payload: &[u8]) -> Result<Self, EventError> {
        if payload.len() < 2 {
            return Err(EventError::Truncated);
        }
        if payload[0] != EVENT_TYPE_INIT {
            return Err(EventError::UnknownEventType { raw: payload[0] });
        }

        let event_len = payload[1] as usize;
        let body = payload
            .get(2..2 + event_len)
            .ok_or(EventError::Truncated)?;

        let mut chip_id = None;
        let mut capabilities = None;
        let mut test_throughput = None;
        let mut rx_queue_size = None;

        let mut pos = 0usize;
        while pos < body.len() {
            if pos + 2 > body.len() {
                return Err(EventError::Truncated);
            }
            let tag = body[pos];
            let len = body[pos + 1] as usize;
            let value = body
                .get(pos + 2..pos + 2 + len)
                .ok_or(EventError::Truncated)?;
            pos += 2 + len;

            let first = value.first().copied();
            match tag {
                t if t == Tlv::ChipId as u8 => chip_id = first,
                t if t == Tlv::Capabilities as u8 => capabilities = first,
                t if t == Tlv::TestThroughputCap as u8 => test_throughput = first,
                t if t == Tlv::RxQueueSize as u8 => rx_queue_size = first,
                _ => {} // forward compatibility
            }
        }

        Ok(Self {
            chip_id: chip_id.ok_or(EventError::MissingTlv { tag: Tlv::ChipId as u8 })?,
            capabilities: capabilities
                .ok_or(EventError::MissingTlv { tag: Tlv::Capabilities as u8 })?,
            test_throughput: test_throughput
                .ok_or(EventError::MissingTlv { tag: Tlv::TestThroughputCap as u8 })?,
            rx_queue_size: rx_queue_size
                .ok_or(EventError::MissingTlv { tag: Tlv::RxQueueSize as u8 })?,
        })
    }
}
