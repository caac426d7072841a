//! Chunked transfer engine.
//!
//! Logical transfers move `length` bytes split into bus-transaction-sized
//! chunks. In block-only mode every chunk is padded up to the block boundary;
//! the peer discards the excess, so the source buffer must have capacity for
//! the padding. Writes retry failed chunks up to a bound and then abort the
//! whole transfer; reads abort on the first failed chunk because a partially
//! filled receive buffer is unusable.

use crate::{BusError, HostBus};

/// Modulus of the peer's cumulative byte counter.
pub const RX_BYTE_MOD: u32 = 0x10_0000;
/// Mask applied to the raw counter register.
pub const RX_LEN_MASK: u32 = RX_BYTE_MOD - 1;

/// Shape of chunked transfers on one link.
#[derive(Clone, Copy, Debug)]
pub struct XferLimits {
    /// Largest single bus transaction.
    pub max_transaction: usize,
    /// Bus block size.
    pub block_size: usize,
    /// Pad every chunk to a whole number of blocks.
    pub block_only: bool,
    /// Chunk attempts before a write is abandoned.
    pub write_retry_limit: u32,
}

/// Rounds `len` up to a whole number of blocks.
pub fn padded_len(len: usize, block_size: usize) -> usize {
    len.div_ceil(block_size) * block_size
}

/// Bytes the peer has queued that we have not read yet.
///
/// `register` is the peer's cumulative byte counter, `consumed` our own
/// running total of bytes read; both wrap at [`RX_BYTE_MOD`].
pub fn pending_len(register: u32, consumed: u32) -> u32 {
    let total = register & RX_LEN_MASK;
    (total + RX_BYTE_MOD - (consumed % RX_BYTE_MOD)) % RX_BYTE_MOD
}

/// Writes `len` bytes of `buf` towards the peer.
///
/// In block-only mode chunks are extended to the block boundary, so `buf`
/// must hold at least `padded_len(len, block_size)` bytes; the bytes past
/// `len` travel on the bus but are discarded by the peer.
pub fn write_frame(
    bus: &dyn HostBus,
    buf: &[u8],
    len: usize,
    limits: &XferLimits,
) -> Result<(), BusError> {
    debug_assert!(buf.len() >= wire_len(len, limits));

    let mut pos = 0usize;
    let mut attempts = 0u32;
    while pos < len {
        let chunk_len = (len - pos).min(limits.max_transaction);
        let send_len = if limits.block_only {
            padded_len(chunk_len, limits.block_size)
        } else {
            chunk_len
        };

        match bus.write_block(&buf[pos..pos + send_len]) {
            Ok(()) => {
                pos += chunk_len;
            }
            Err(err) => {
                attempts += 1;
                log::warn!("chunk write fault at {pos}/{len}: {err}");
                if attempts >= limits.write_retry_limit {
                    return Err(BusError::WriteFailed { attempts });
                }
            }
        }
    }
    Ok(())
}

/// Reads `len` bytes from the peer into `buf`.
///
/// In block-only mode each chunk read is extended to the block boundary and
/// the peer zero-pads, so `buf` must hold `padded_len(len, block_size)`
/// bytes. Any chunk failure aborts the transfer; the caller must not use the
/// partially filled buffer.
pub fn read_frame(
    bus: &dyn HostBus,
    buf: &mut [u8],
    len: usize,
    limits: &XferLimits,
) -> Result<(), BusError> {
    debug_assert!(buf.len() >= wire_len(len, limits));

    let mut pos = 0usize;
    while pos < len {
        let chunk_len = (len - pos).min(limits.max_transaction);
        let read_len = if limits.block_only {
            padded_len(chunk_len, limits.block_size)
        } else {
            chunk_len
        };

        if let Err(err) = bus.read_block(&mut buf[pos..pos + read_len]) {
            log::warn!("chunk read fault at {pos}/{len}: {err}");
            return Err(BusError::ReadFailed);
        }
        pos += chunk_len;
    }
    Ok(())
}

/// Buffer capacity a transfer of `len` bytes needs under `limits`.
pub fn wire_len(len: usize, limits: &XferLimits) -> usize {
    if limits.block_only {
        // The final chunk's padding can reach past `len`.
        let last_chunk_start = if len == 0 {
            0
        } else {
            (len - 1) / limits.max_transaction * limits.max_transaction
        };
        let last_chunk = len - last_chunk_start;
        last_chunk_start + padded_len(last_chunk, limits.block_size)
    } else {
        len
    }
}
