//! Link-level state machines shared by the host and slave drivers.
//!
//! * [`LinkConfig`] – sizing, retry and policy knobs for one link instance.
//! * [`FramePool`] / [`PayloadBuf`] – block pool and ownership-tagged buffers.
//! * [`LaneSet`] – strict-priority bounded queues feeding one physical bus.
//! * [`CreditCounter`] – peer receive-buffer accounting for transmit gating.
//! * [`DoubleBuffer`] – two-slot receive staging between bus and dispatcher.
//! * [`ThrottleMonitor`] – queue-depth watermarks with hysteresis.
//!
//! Nothing in this crate touches a bus; it is all queueing and bookkeeping,
//! which keeps every invariant unit-testable without hardware.

mod buffer;
mod config;
mod credit;
mod error;
mod lane;
mod pool;
mod staging;
mod stats;
mod throttle;

pub use buffer::{PayloadBuf, RxFrame};
pub use config::{LinkConfig, RxMode};
pub use credit::{CreditCounter, CreditStatus, TOKEN_MASK, TOKEN_MOD};
pub use error::{InitError, SubmitError};
pub use lane::{Lane, LaneSet, PushError};
pub use pool::{FramePool, PooledBuf};
pub use staging::{DoubleBuffer, Publish};
pub use stats::{LinkStats, StatsSnapshot};
pub use throttle::{ThrottleFlag, ThrottleMonitor, ThrottleSignal, Watermarks};
