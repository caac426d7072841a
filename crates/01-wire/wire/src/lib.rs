//! Wire format shared by both ends of a link.
//!
//! This crate holds the pure, allocation-light pieces of the transport:
//! * [`FrameHeader`] – the fixed 12-byte header wrapped around every payload.
//! * [`checksum`] – the additive 16-bit frame checksum and its link-wide toggle.
//! * [`event`] – the startup ("hello") control event, the only structured
//!   payload the transport itself interprets.
//!
//! Everything here is a deterministic transform over caller-provided buffers;
//! queueing, buffering and bus access live in the upper crates.

pub mod checksum;
pub mod event;
mod frame;

pub use checksum::ChecksumMode;
pub use frame::{flags, FrameError, FrameHeader, InterfaceType, HEADER_LEN, INTERFACE_COUNT};
