//! Additive 16-bit frame checksum.
//!
//! The checksum covers header plus payload (`len + offset` bytes) with the
//! checksum field itself zeroed during computation. Whether frames carry a
//! checksum at all is a link-wide configuration choice, not a per-frame one;
//! both ends must agree.

use crate::frame::{put_checksum_field, take_checksum_field};
use crate::{FrameError, FrameHeader, HEADER_LEN};
use serde::{Deserialize, Serialize};

/// Link-wide checksum policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumMode {
    /// No integrity check; every gated frame is accepted.
    Disabled,
    /// Additive 16-bit sum over header and payload.
    #[default]
    Additive,
}

/// Computes the additive checksum over `bytes`.
///
/// Wrapping 16-bit sum of all bytes; cheap enough for per-frame use on a
/// microcontroller-class host, and matching on both ends of the link is all
/// that is required of it.
pub fn compute(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |sum, &b| sum.wrapping_add(b as u16))
}

/// Computes and stores the checksum of an assembled frame.
///
/// `frame` must hold at least `header.frame_len()` bytes with the header
/// already encoded at the front. In [`ChecksumMode::Disabled`] the field is
/// left at zero.
pub fn seal(frame: &mut [u8], header: &FrameHeader, mode: ChecksumMode) {
    if mode == ChecksumMode::Disabled {
        return;
    }
    let total = header.frame_len();
    debug_assert!(frame.len() >= total && total >= HEADER_LEN);
    take_checksum_field(frame);
    let value = compute(&frame[..total]);
    put_checksum_field(frame, value);
}

/// Verifies the checksum of a received frame.
///
/// The additive sum is linear, so instead of zeroing the field in place the
/// two field bytes are subtracted back out; the caller's buffer is left
/// untouched. [`ChecksumMode::Disabled`] accepts unconditionally.
pub fn verify(frame: &[u8], header: &FrameHeader, mode: ChecksumMode) -> Result<(), FrameError> {
    if mode == ChecksumMode::Disabled {
        return Ok(());
    }
    let total = header.frame_len();
    if frame.len() < total {
        return Err(FrameError::Truncated { have: frame.len() });
    }

    let computed = compute(&frame[..total])
        .wrapping_sub(frame[8] as u16)
        .wrapping_sub(frame[9] as u16);

    if computed != header.checksum {
        return Err(FrameError::ChecksumMismatch { expected: header.checksum, computed });
    }
    Ok(())
}
