//! Host-side link driver.
//!
//! Owns the submit/deliver surface of the transport: producers hand payloads
//! to [`HostDriver::submit`], consumers register per-interface callbacks,
//! and four worker threads move frames across the bus:
//!
//! * `link-tx` drains the priority lanes, assembles frames and writes them
//!   under credit control;
//! * `link-rx` waits on peer interrupts and reads pending data into the
//!   staging double buffer;
//! * `link-stage` validates staged frames and queues them by priority;
//! * `link-deliver` routes validated frames to registered consumers.
//!
//! The peer gates everything: until its startup event arrives, `submit`
//! refuses all traffic except the private control channel.

mod driver;
mod workers;

pub use driver::HostDriver;
