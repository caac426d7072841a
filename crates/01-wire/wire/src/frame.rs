//! Frame header encoding, decoding and the acceptance gate.
//!
//! Layout (little-endian, 12 bytes):
//!
//! ```text
//! ┌────────┬────────┬─────────┬────────┬───────┬──────────┬──────────┬────────┐
//! │ len    │ offset │ if_type │ if_num │ flags │ reserved │ checksum │ seq    │
//! │ u16    │ u16    │ u8      │ u8     │ u8    │ u8       │ u16      │ u16    │
//! └────────┴────────┴─────────┴────────┴───────┴──────────┴──────────┴────────┘
//! ```
//!
//! `offset` always carries [`HEADER_LEN`]; a frame whose offset disagrees was
//! produced by an incompatible peer and is dropped, not repaired.

use std::fmt;

/// Size of the wire header in bytes. Payload starts at this offset.
pub const HEADER_LEN: usize = 12;

const CHECKSUM_RANGE: std::ops::Range<usize> = 8..10;

/// Logical channel a frame belongs to.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InterfaceType {
    /// Wi-Fi station data path.
    WifiSta = 0,
    /// Wi-Fi soft-AP data path.
    WifiAp = 1,
    /// Serial console / RPC channel.
    SerialConsole = 2,
    /// Bluetooth HCI channel.
    BtHci = 3,
    /// Transport-internal control plane.
    PrivateControl = 4,
    /// Raw-throughput test channel.
    Test = 5,
}

/// Number of interface types, for handler tables indexed by type.
pub const INTERFACE_COUNT: usize = 6;

impl InterfaceType {
    /// Decodes the on-wire interface byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(InterfaceType::WifiSta),
            1 => Some(InterfaceType::WifiAp),
            2 => Some(InterfaceType::SerialConsole),
            3 => Some(InterfaceType::BtHci),
            4 => Some(InterfaceType::PrivateControl),
            5 => Some(InterfaceType::Test),
            _ => None,
        }
    }

    /// Index into per-interface tables.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Header flag bits.
pub mod flags {
    /// More fragments of the same logical packet follow.
    pub const MORE_FRAGMENTS: u8 = 1 << 0;
}

/// Decoded frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload length in bytes, excluding the header.
    pub len: u16,
    /// Offset of the payload from the frame base; always [`HEADER_LEN`] on
    /// frames we produce.
    pub offset: u16,
    /// Logical channel.
    pub if_type: InterfaceType,
    /// Sub-interface index within the channel.
    pub if_num: u8,
    /// Flag bits, see [`flags`].
    pub flags: u8,
    /// Frame checksum; zero while the checksum is being computed or when the
    /// link runs with checksums disabled.
    pub checksum: u16,
    /// Per-direction monotonic sequence number, wrapping.
    pub seq: u16,
}

/// Reasons a received frame fails the acceptance gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes than a header were available.
    Truncated { have: usize },
    /// `len == 0`; nothing to deliver.
    ZeroLength,
    /// `len` exceeds the link's configured maximum payload.
    LengthExceedsMax { len: u16, max: u16 },
    /// `offset` disagrees with the header size; wrong peer or bit packing.
    BadOffset { offset: u16 },
    /// Unknown interface byte.
    BadInterfaceType { raw: u8 },
    /// Recomputed checksum disagrees with the received one.
    ChecksumMismatch { expected: u16, computed: u16 },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Truncated { have } => {
                write!(f, "frame truncated: {have} bytes, header needs {HEADER_LEN}")
            }
            FrameError::ZeroLength => write!(f, "frame carries zero-length payload"),
            FrameError::LengthExceedsMax { len, max } => {
                write!(f, "payload length {len} exceeds configured maximum {max}")
            }
            FrameError::BadOffset { offset } => {
                write!(f, "payload offset {offset} != header size {HEADER_LEN}")
            }
            FrameError::BadInterfaceType { raw } => {
                write!(f, "unknown interface type byte {raw:#04x}")
            }
            FrameError::ChecksumMismatch { expected, computed } => {
                write!(f, "checksum mismatch: frame carries {expected:#06x}, computed {computed:#06x}")
            }
        }
    }
}

impl std::error::Error for FrameError {}

impl FrameHeader {
    /// Creates a header for an outbound frame. `offset` is fixed to the
    /// header size and `checksum` starts at zero; [`seal`](crate::checksum::seal)
    /// fills it in after the payload is in place.
    pub fn new(len: u16, if_type: InterfaceType, if_num: u8, seq: u16, flags: u8) -> Self {
        Self {
            len,
            offset: HEADER_LEN as u16,
            if_type,
            if_num,
            flags,
            checksum: 0,
            seq,
        }
    }

    /// Total on-wire size of the frame this header describes.
    pub fn frame_len(&self) -> usize {
        self.len as usize + self.offset as usize
    }

    /// Encodes the header into the first [`HEADER_LEN`] bytes of `buf`.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than [`HEADER_LEN`].
    pub fn encode_into(&self, buf: &mut [u8]) {
        assert!(buf.len() >= HEADER_LEN, "header buffer too small");
        buf[0..2].copy_from_slice(&self.len.to_le_bytes());
        buf[2..4].copy_from_slice(&self.offset.to_le_bytes());
        buf[4] = self.if_type as u8;
        buf[5] = self.if_num;
        buf[6] = self.flags;
        buf[7] = 0;
        buf[CHECKSUM_RANGE].copy_from_slice(&self.checksum.to_le_bytes());
        buf[10..12].copy_from_slice(&self.seq.to_le_bytes());
    }

    /// Encodes the header into a fresh array.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        self.encode_into(&mut buf);
        buf
    }

    /// Decodes and gates a received header.
    ///
    /// The acceptance gate rejects zero-length frames, frames longer than
    /// `max_payload` and frames whose offset disagrees with the header size.
    /// Rejection means "drop this frame", never "tear down the link".
    pub fn decode(buf: &[u8], max_payload: u16) -> Result<Self, FrameError> {
        if buf.len() < HEADER_LEN {
            return Err(FrameError::Truncated { have: buf.len() });
        }

        let len = u16::from_le_bytes([buf[0], buf[1]]);
        let offset = u16::from_le_bytes([buf[2], buf[3]]);
        let if_type = InterfaceType::from_u8(buf[4])
            .ok_or(FrameError::BadInterfaceType { raw: buf[4] })?;

        if len == 0 {
            return Err(FrameError::ZeroLength);
        }
        if len > max_payload {
            return Err(FrameError::LengthExceedsMax { len, max: max_payload });
        }
        if offset as usize != HEADER_LEN {
            return Err(FrameError::BadOffset { offset });
        }

        Ok(Self {
            len,
            offset,
            if_type,
            if_num: buf[5],
            flags: buf[6],
            checksum: u16::from_le_bytes([buf[8], buf[9]]),
            seq: u16::from_le_bytes([buf[10], buf[11]]),
        })
    }
}

/// Zeroes the checksum field inside an encoded frame, returning the previous
/// value. Used by both checksum computation and verification.
pub(crate) fn take_checksum_field(frame: &mut [u8]) -> u16 {
    let previous = u16::from_le_bytes([frame[8], frame[9]]);
    frame[CHECKSUM_RANGE].fill(0);
    previous
}

/// Writes `value` into the checksum field of an encoded frame.
pub(crate) fn put_checksum_field(frame: &mut [u8], value: u16) {
    frame[CHECKSUM_RANGE].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MAX_PAYLOAD: u16 = 2036;

    #[test]
    fn roundtrip_recovers_fields() {
        let header = FrameHeader::new(1500, InterfaceType::WifiSta, 0, 7, flags::MORE_FRAGMENTS);
        let bytes = header.encode();
        let decoded = FrameHeader::decode(&bytes, MAX_PAYLOAD).expect("decode header");
        assert_eq!(decoded, header);
    }

    #[test]
    fn little_endian_byte_order() {
        let mut header = FrameHeader::new(0x0102, InterfaceType::BtHci, 9, 0x0304, 0);
        header.checksum = 0xBEEF;
        let bytes = header.encode();

        assert_eq!(bytes[0], 0x02);
        assert_eq!(bytes[1], 0x01);
        assert_eq!(bytes[2], HEADER_LEN as u8);
        assert_eq!(bytes[3], 0x00);
        assert_eq!(bytes[4], InterfaceType::BtHci as u8);
        assert_eq!(bytes[5], 9);
        assert_eq!(bytes[7], 0, "reserved byte stays zero");
        assert_eq!(bytes[8], 0xEF);
        assert_eq!(bytes[9], 0xBE);
        assert_eq!(bytes[10], 0x04);
        assert_eq!(bytes[11], 0x03);
    }

    #[test]
    fn zero_length_always_rejected() {
        for if_type in [
            InterfaceType::WifiSta,
            InterfaceType::SerialConsole,
            InterfaceType::PrivateControl,
        ] {
            let mut bytes = FrameHeader::new(1, if_type, 0, 0, 0).encode();
            bytes[0] = 0;
            bytes[1] = 0;
            assert_eq!(
                FrameHeader::decode(&bytes, MAX_PAYLOAD),
                Err(FrameError::ZeroLength)
            );
        }
    }

    #[test]
    fn oversized_length_rejected() {
        let header = FrameHeader::new(MAX_PAYLOAD + 1, InterfaceType::WifiAp, 0, 0, 0);
        assert_eq!(
            FrameHeader::decode(&header.encode(), MAX_PAYLOAD),
            Err(FrameError::LengthExceedsMax {
                len: MAX_PAYLOAD + 1,
                max: MAX_PAYLOAD
            })
        );
    }

    #[test]
    fn wrong_offset_rejected() {
        let mut bytes = FrameHeader::new(64, InterfaceType::Test, 0, 0, 0).encode();
        bytes[2] = 8;
        bytes[3] = 0;
        assert_eq!(
            FrameHeader::decode(&bytes, MAX_PAYLOAD),
            Err(FrameError::BadOffset { offset: 8 })
        );
    }

    #[test]
    fn unknown_interface_rejected() {
        let mut bytes = FrameHeader::new(64, InterfaceType::Test, 0, 0, 0).encode();
        bytes[4] = 0x7F;
        assert_eq!(
            FrameHeader::decode(&bytes, MAX_PAYLOAD),
            Err(FrameError::BadInterfaceType { raw: 0x7F })
        );
    }

    #[test]
    fn short_buffer_rejected() {
        let bytes = [0u8; HEADER_LEN - 1];
        assert_eq!(
            FrameHeader::decode(&bytes, MAX_PAYLOAD),
            Err(FrameError::Truncated { have: HEADER_LEN - 1 })
        );
    }

    proptest! {
        #[test]
        fn roundtrip_property(
            len in 1u16..=MAX_PAYLOAD,
            if_raw in 0u8..6,
            if_num in 0u8..16,
            seq in 0u16..=u16::MAX,
            frame_flags in 0u8..=1,
        ) {
            let if_type = InterfaceType::from_u8(if_raw).unwrap();
            let header = FrameHeader::new(len, if_type, if_num, seq, frame_flags);
            let decoded = FrameHeader::decode(&header.encode(), MAX_PAYLOAD).unwrap();
            prop_assert_eq!(decoded, header);
        }
    }
}
