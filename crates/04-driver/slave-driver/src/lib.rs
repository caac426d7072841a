//! Slave-side link driver.
//!
//! The co-processor end of the transport: it announces itself with a startup
//! event, frames and queues outbound data towards the host, and feeds
//! received frames through the same priority lanes the host uses. It also
//! owns the receive-queue watermark logic that asks the host to throttle
//! when the consumer falls behind.
//!
//! Unlike the host, the slave's upper layers pull frames with
//! [`SlaveDriver::read`] instead of registering callbacks; that is the shape
//! the co-processor firmware expects.

mod driver;

pub use driver::SlaveDriver;
