//! Link traffic and drop counters.
//!
//! Cheap relaxed atomics bumped from the worker threads; a [`snapshot`]
//! gives embedders and tests a coherent-enough view without stopping the
//! link. Every drop path increments exactly one counter, so
//! `submitted == sent + dropped` style reconciliation holds in tests.
//!
//! [`snapshot`]: LinkStats::snapshot

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by a driver.
#[derive(Debug, Default)]
pub struct LinkStats {
    /// Payloads accepted by `submit`/`send`.
    pub submitted: AtomicU64,
    /// Frames fully written to the bus.
    pub tx_frames: AtomicU64,
    /// Bytes written to the bus, padding excluded.
    pub tx_bytes: AtomicU64,
    /// Frames dropped after write retries were exhausted.
    pub tx_io_drops: AtomicU64,
    /// Frames dropped because the peer advertised no buffers.
    pub tx_no_credit: AtomicU64,
    /// Frames that passed the receive gate.
    pub rx_frames: AtomicU64,
    /// Frames dropped by the gate or checksum.
    pub rx_invalid: AtomicU64,
    /// Logical reads abandoned on bus faults.
    pub rx_io_errors: AtomicU64,
    /// Receive intervals skipped because the dispatcher still owned the
    /// staging slot.
    pub rx_contention_drops: AtomicU64,
    /// Valid frames dropped on a full receive lane.
    pub rx_queue_drops: AtomicU64,
    /// Frames handed to a registered consumer.
    pub delivered: AtomicU64,
    /// Valid frames with no registered consumer.
    pub unrouted: AtomicU64,
}

impl LinkStats {
    /// Increments a counter by one.
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds `n` to a counter.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Copies the counters out.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            tx_frames: self.tx_frames.load(Ordering::Relaxed),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            tx_io_drops: self.tx_io_drops.load(Ordering::Relaxed),
            tx_no_credit: self.tx_no_credit.load(Ordering::Relaxed),
            rx_frames: self.rx_frames.load(Ordering::Relaxed),
            rx_invalid: self.rx_invalid.load(Ordering::Relaxed),
            rx_io_errors: self.rx_io_errors.load(Ordering::Relaxed),
            rx_contention_drops: self.rx_contention_drops.load(Ordering::Relaxed),
            rx_queue_drops: self.rx_queue_drops.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`LinkStats`].
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub tx_frames: u64,
    pub tx_bytes: u64,
    pub tx_io_drops: u64,
    pub tx_no_credit: u64,
    pub rx_frames: u64,
    pub rx_invalid: u64,
    pub rx_io_errors: u64,
    pub rx_contention_drops: u64,
    pub rx_queue_drops: u64,
    pub delivered: u64,
    pub unrouted: u64,
}
