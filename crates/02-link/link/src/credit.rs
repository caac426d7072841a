//! Peer receive-buffer accounting.
//!
//! The peer exposes a wrapping counter of every receive buffer it has ever
//! made available. The transmitter keeps its own wrapping count of buffers
//! consumed; the difference, mod the counter width, is the credit available
//! for the next send. A send is only issued when credits cover the buffers
//! it will occupy.

use std::thread;
use std::time::Duration;

/// Modulus of the peer's buffer counter.
pub const TOKEN_MOD: u32 = 0x1000;
/// Mask applied to the raw register value.
pub const TOKEN_MASK: u32 = TOKEN_MOD - 1;

/// Outcome of a credit reservation attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreditStatus {
    /// Credits were debited; the send may proceed.
    Available,
    /// The peer advertised too few buffers for the whole retry budget; the
    /// caller drops this attempt and retries later.
    Unavailable,
}

/// Transmit-side credit state. Mutated only under the bus lock.
#[derive(Debug)]
pub struct CreditCounter {
    available: u32,
    consumed: u32,
    poll_limit: u32,
}

impl CreditCounter {
    /// Creates a counter with no credits and a poll retry budget.
    pub fn new(poll_limit: u32) -> Self {
        Self { available: 0, consumed: 0, poll_limit }
    }

    /// Credits currently believed available.
    pub fn available(&self) -> u32 {
        self.available
    }

    /// Recomputes available credit from a fresh register read.
    ///
    /// `register` is the peer's masked cumulative buffer count; local
    /// consumption is subtracted with wrap-around so a counter rollover does
    /// not produce phantom credit.
    pub fn sync(&mut self, register: u32) {
        let total = register & TOKEN_MASK;
        self.available = (total + TOKEN_MOD - self.consumed) % TOKEN_MOD;
    }

    /// Debits `needed` credits, polling the peer register while short.
    ///
    /// `poll` reads the peer's counter register; `None` means the read itself
    /// failed and only burns a retry. The back half of the retry budget
    /// sleeps 1 ms per attempt so a busy peer gets bus time to catch up.
    pub fn reserve(&mut self, needed: u32, mut poll: impl FnMut() -> Option<u32>) -> CreditStatus {
        if self.available < needed {
            let mut retry = self.poll_limit;
            while retry > 0 {
                if let Some(register) = poll() {
                    self.sync(register);
                }
                if self.available >= needed {
                    break;
                }
                log::trace!("retry credit poll, {retry} attempts left");
                retry -= 1;
                if retry < self.poll_limit / 2 {
                    thread::sleep(Duration::from_millis(1));
                }
            }
            if retry == 0 {
                return CreditStatus::Unavailable;
            }
        }

        debug_assert!(self.available >= needed);
        self.available -= needed;
        CreditStatus::Available
    }

    /// Records `n` buffers as consumed after a successful send.
    pub fn commit(&mut self, n: u32) {
        self.consumed = (self.consumed + n) % TOKEN_MOD;
    }

    /// Forgets all local state, e.g. across a bus reset.
    pub fn reset(&mut self) {
        self.available = 0;
        self.consumed = 0;
    }
}
