//! Receive-queue watermarks and the host-visible throttle flag.
//!
//! The receiving side watches its bulk-queue depth as a percentage of
//! capacity. Crossing the high mark raises one start-throttle signal;
//! falling below the low mark raises one stop-throttle signal. The gap
//! between the marks is the hysteresis band: oscillation inside it produces
//! nothing.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::InitError;

/// High/low queue-load marks in percent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermarks {
    /// Load percentage above which throttling starts. Zero disables
    /// throttling entirely.
    pub high_pct: u8,
    /// Load percentage below which throttling stops.
    pub low_pct: u8,
}

impl Watermarks {
    /// Rejects marks without a hysteresis band.
    pub fn validate(&self) -> Result<(), InitError> {
        if self.high_pct > 100 {
            return Err(InitError::InvalidConfig("high watermark above 100%"));
        }
        if self.high_pct > 0 && self.low_pct >= self.high_pct {
            return Err(InitError::InvalidConfig(
                "low watermark must sit below high watermark",
            ));
        }
        Ok(())
    }
}

/// Edge signal emitted on a watermark crossing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThrottleSignal {
    /// Ask the peer to pause transmission.
    Start,
    /// Ask the peer to resume.
    Stop,
}

/// Tracks queue load against the watermarks and reports crossings.
#[derive(Debug)]
pub struct ThrottleMonitor {
    marks: Watermarks,
    throttling: bool,
}

impl ThrottleMonitor {
    /// Creates a monitor in the not-throttling state.
    pub fn new(marks: Watermarks) -> Self {
        Self { marks, throttling: false }
    }

    /// True while the peer has been asked to pause.
    pub fn throttling(&self) -> bool {
        self.throttling
    }

    /// Feeds the current queue depth; returns a signal only on a crossing.
    pub fn update(&mut self, depth: usize, capacity: usize) -> Option<ThrottleSignal> {
        if self.marks.high_pct == 0 || capacity == 0 {
            return None;
        }
        let load_pct = depth * 100 / capacity;

        if !self.throttling {
            if load_pct > self.marks.high_pct as usize {
                self.throttling = true;
                return Some(ThrottleSignal::Start);
            }
        } else if load_pct < self.marks.low_pct as usize {
            self.throttling = false;
            return Some(ThrottleSignal::Stop);
        }
        None
    }

    /// Clears throttling state without signalling, e.g. across a reset.
    pub fn reset(&mut self) {
        self.throttling = false;
    }
}

/// Host-side flag set and cleared by the peer's throttle interrupts.
///
/// The minimal contract is observability: the transmit path reads it and the
/// embedder may pause bulk submissions on it.
#[derive(Debug, Default)]
pub struct ThrottleFlag(AtomicBool);

impl ThrottleFlag {
    /// Marks the peer as overloaded.
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Marks the peer as recovered.
    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Current state.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
