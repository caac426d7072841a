//! Per-link configuration.

use serde::{Deserialize, Serialize};
use wire::{ChecksumMode, HEADER_LEN};

use crate::error::InitError;
use crate::throttle::Watermarks;

/// How the receive side discovers frame boundaries on the bus.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RxMode {
    /// One frame per bus transfer; the pending length is read from the
    /// peer's byte counter before each transfer.
    #[default]
    Packet,
    /// The peer streams back-to-back frames and zero-pads; the host always
    /// reads the maximum transfer size and walks the frames out of it.
    Streaming,
}

/// Sizing, retry and policy knobs for one link instance.
///
/// The defaults mirror the transport this engine was built against: 2 KiB
/// peer buffers, 512-byte bus blocks, queue depth 20.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Largest payload accepted by `submit` and the receive gate.
    pub max_payload: u16,
    /// Size of one peer receive buffer; the unit of credit accounting.
    pub rx_buffer_size: usize,
    /// Bus block size; block-only transfers pad up to a multiple of this.
    pub block_size: usize,
    /// Largest single bus transaction; longer frames are chunked.
    pub max_transaction: usize,
    /// Whether transfers must always be whole blocks.
    pub block_only: bool,
    /// Depth of each priority lane, both directions.
    pub queue_depth: usize,
    /// Link-wide checksum policy; both ends must agree.
    pub checksum: ChecksumMode,
    /// Receive framing mode; both ends must agree.
    pub rx_mode: RxMode,
    /// Chunk retries before a whole write is aborted.
    pub tx_retry_limit: u32,
    /// Credit-register polls before a send attempt is dropped.
    pub credit_poll_limit: u32,
    /// Receive-queue watermarks driving throttle signalling.
    pub watermarks: Watermarks,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_payload: 2048 - HEADER_LEN as u16,
            rx_buffer_size: 2048,
            block_size: 512,
            max_transaction: 2048,
            block_only: false,
            queue_depth: 20,
            checksum: ChecksumMode::Additive,
            rx_mode: RxMode::Packet,
            tx_retry_limit: 2,
            credit_poll_limit: 50,
            watermarks: Watermarks { high_pct: 80, low_pct: 60 },
        }
    }
}

impl LinkConfig {
    /// Largest on-wire frame this link produces or accepts.
    pub fn frame_capacity(&self) -> usize {
        self.max_payload as usize + HEADER_LEN
    }

    /// Peer receive buffers consumed by a frame with `payload_len` bytes.
    pub fn buffers_needed(&self, payload_len: usize) -> u32 {
        let total = payload_len + HEADER_LEN;
        ((total + self.rx_buffer_size - 1) / self.rx_buffer_size) as u32
    }

    /// Rejects configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), InitError> {
        if self.max_payload == 0 {
            return Err(InitError::InvalidConfig("max_payload must be non-zero"));
        }
        if self.rx_buffer_size < self.frame_capacity() && self.rx_mode == RxMode::Packet {
            // Packet mode lands one whole frame in one peer buffer.
            return Err(InitError::InvalidConfig(
                "rx_buffer_size smaller than frame capacity in packet mode",
            ));
        }
        if self.block_size == 0 || self.max_transaction == 0 {
            return Err(InitError::InvalidConfig("bus sizes must be non-zero"));
        }
        if self.queue_depth == 0 {
            return Err(InitError::InvalidConfig("queue_depth must be non-zero"));
        }
        self.watermarks.validate()?;
        Ok(())
    }
}
