//! Block-oriented bus abstraction and transfer engine.
//!
//! * [`HostBus`] / [`SlaveBus`] – the two ends of a block-addressed duplex
//!   bus, expressed at the transaction level (registers, block transfers,
//!   latched interrupts).
//! * [`xfer`] – the chunked read/write engine with bounded retry.
//! * [`MemBus`] – a connected in-memory bus pair with fault injection, used
//!   by the integration tests and the load generator.
//!
//! Vendor register maps are out of scope; the registers here are the minimal
//! set the transport contract needs (pending-byte counter, buffer-token
//! counter) plus a latched interrupt word.

mod error;
mod mem;
pub mod xfer;

use std::time::Duration;

pub use error::BusError;
pub use mem::{MemBus, MemBusProfile, MemHostBus, MemSlaveBus};

/// Registers a host can read from its peer.
pub mod reg {
    /// Cumulative bytes the peer has queued towards the host, wrapping at
    /// [`crate::xfer::RX_BYTE_MOD`].
    pub const PACKET_LEN: u32 = 0x00;
    /// Cumulative receive buffers the peer has made available, wrapping at
    /// the credit modulus.
    pub const TOKEN_COUNT: u32 = 0x04;
}

/// Latched slave-to-host interrupt bits.
pub mod int_bits {
    /// New data is pending on the peer.
    pub const NEW_PACKET: u32 = 1 << 0;
    /// The peer's receive queue crossed its high watermark.
    pub const START_THROTTLE: u32 = 1 << 7;
    /// The peer's receive queue fell below its low watermark.
    pub const STOP_THROTTLE: u32 = 1 << 6;
}

/// Host-to-slave control signals.
pub mod ctrl_bits {
    /// The host is up and ready to receive.
    pub const OPEN_DATA_PATH: u32 = 1 << 0;
    /// The host asks the peer to reset the link.
    pub const RESET: u32 = 1 << 1;
}

/// Host end of the bus. One call is one bus transaction; chunking a logical
/// transfer across transactions is [`xfer`]'s job, and serialising whole
/// logical transfers is the driver's (bus lock).
pub trait HostBus: Send + Sync {
    /// Reads a peer register.
    fn read_reg(&self, reg: u32) -> Result<u32, BusError>;

    /// Reads one transaction's worth of pending peer data into `buf`.
    fn read_block(&self, buf: &mut [u8]) -> Result<(), BusError>;

    /// Writes one transaction towards the peer.
    fn write_block(&self, data: &[u8]) -> Result<(), BusError>;

    /// Blocks until any interrupt bit is latched, returning the current
    /// word without clearing it.
    fn wait_interrupt(&self, timeout: Duration) -> Result<u32, BusError>;

    /// Clears the given latched bits.
    fn ack_interrupt(&self, bits: u32) -> Result<(), BusError>;

    /// Raises a control signal towards the peer.
    fn signal_peer(&self, bits: u32) -> Result<(), BusError>;
}

/// A frame handed to the slave driver by its bus, together with the number
/// of receive-buffer units it occupies. The driver must return the units via
/// [`SlaveBus::reload_rx`] once the frame has been consumed or rejected.
#[derive(Debug)]
pub struct SlaveRxBuf {
    /// Raw frame bytes as received.
    pub bytes: Vec<u8>,
    /// Receive-buffer units to reload after processing.
    pub units: u32,
}

/// What a slave receives from its bus.
#[derive(Debug)]
pub enum SlaveEvent {
    /// An inbound frame from the host.
    Frame(SlaveRxBuf),
    /// A host control signal, see [`ctrl_bits`].
    Ctrl(u32),
}

/// Slave end of the bus.
pub trait SlaveBus: Send + Sync {
    /// Queues a frame towards the host, blocking while the send queue is
    /// full.
    fn send(&self, frame: &[u8], timeout: Duration) -> Result<(), BusError>;

    /// Waits for the next inbound frame or control signal.
    fn recv(&self, timeout: Duration) -> Result<SlaveEvent, BusError>;

    /// Returns `units` receive buffers to the pool the host draws credit
    /// from.
    fn reload_rx(&self, units: u32);

    /// Latches interrupt bits towards the host.
    fn raise_interrupt(&self, bits: u32) -> Result<(), BusError>;

    /// Reset support: discards frames still queued towards the host and
    /// frees their send-queue slots, returning how many were reclaimed.
    fn drain_finished(&self) -> usize;
}
