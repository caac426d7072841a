//! Connected in-memory bus pair.
//!
//! Behaves like a block bus at the transaction level: a latched interrupt
//! word, a cumulative pending-byte register that exposes one frame at a
//! time, a cumulative buffer-token register for credit, per-frame reads with
//! zero padding past the real data, and a bounded slave send queue. Fault
//! injection flips individual transactions into errors so the retry paths
//! can be exercised.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::xfer::RX_BYTE_MOD;
use crate::{int_bits, reg, BusError, HostBus, SlaveBus, SlaveEvent, SlaveRxBuf};

const TOKEN_MOD: u32 = 0x1000;

/// Shape of an in-memory bus pair.
#[derive(Clone, Copy, Debug)]
pub struct MemBusProfile {
    /// Size of one slave receive buffer; the credit unit.
    pub rx_buffer_size: usize,
    /// Receive buffers loaded at start.
    pub rx_buffer_count: u32,
    /// Frames the slave may have in flight towards the host.
    pub send_queue_depth: usize,
    /// Pad slave frames to this block size, emulating a block-only peer.
    pub pad_to_block: Option<usize>,
}

impl Default for MemBusProfile {
    fn default() -> Self {
        Self {
            rx_buffer_size: 2048,
            rx_buffer_count: 20,
            send_queue_depth: 20,
            pad_to_block: None,
        }
    }
}

struct QueuedFrame {
    bytes: Vec<u8>,
    unpadded: usize,
    served: usize,
}

struct State {
    // slave -> host
    s2h: VecDeque<QueuedFrame>,
    len_register: u32,
    int_word: u32,
    send_queue_used: usize,
    // host -> slave
    h2s_partial: Vec<u8>,
    events: VecDeque<SlaveEvent>,
    token_register: u32,
    free_units: u32,
    // plumbing
    fail_reads: u32,
    fail_writes: u32,
    closed: bool,
}

struct Shared {
    state: Mutex<State>,
    host_wake: Condvar,
    slave_wake: Condvar,
    space_wake: Condvar,
    profile: MemBusProfile,
}

impl Shared {
    /// Folds the new front frame's length into the pending-byte register and
    /// latches a packet interrupt. Call with the lock held, after the front
    /// of `s2h` changed.
    fn expose_front(&self, state: &mut State) {
        if let Some(front) = state.s2h.front() {
            state.len_register = (state.len_register + front.unpadded as u32) % RX_BYTE_MOD;
            state.int_word |= int_bits::NEW_PACKET;
            self.host_wake.notify_all();
        }
    }
}

/// Factory for connected bus pairs.
pub struct MemBus;

impl MemBus {
    /// Creates a connected host/slave pair.
    pub fn pair(profile: MemBusProfile) -> (MemHostBus, MemSlaveBus) {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                s2h: VecDeque::new(),
                len_register: 0,
                int_word: 0,
                send_queue_used: 0,
                h2s_partial: Vec::new(),
                events: VecDeque::new(),
                token_register: profile.rx_buffer_count % TOKEN_MOD,
                free_units: profile.rx_buffer_count,
                fail_reads: 0,
                fail_writes: 0,
                closed: false,
            }),
            host_wake: Condvar::new(),
            slave_wake: Condvar::new(),
            space_wake: Condvar::new(),
            profile,
        });
        (
            MemHostBus { shared: Arc::clone(&shared) },
            MemSlaveBus { shared },
        )
    }
}

/// Host end of an in-memory pair.
#[derive(Clone)]
pub struct MemHostBus {
    shared: Arc<Shared>,
}

impl MemHostBus {
    /// Makes the next `n` block reads fail.
    pub fn fail_reads(&self, n: u32) {
        self.shared.state.lock().fail_reads = n;
    }

    /// Makes the next `n` block writes fail.
    pub fn fail_writes(&self, n: u32) {
        self.shared.state.lock().fail_writes = n;
    }

    /// Tears the bus down; both ends observe [`BusError::Closed`].
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        state.closed = true;
        drop(state);
        self.shared.host_wake.notify_all();
        self.shared.slave_wake.notify_all();
        self.shared.space_wake.notify_all();
    }
}

impl HostBus for MemHostBus {
    fn read_reg(&self, register: u32) -> Result<u32, BusError> {
        let state = self.shared.state.lock();
        if state.closed {
            return Err(BusError::Closed);
        }
        match register {
            reg::PACKET_LEN => Ok(state.len_register),
            reg::TOKEN_COUNT => Ok(state.token_register),
            _ => Err(BusError::Io("unknown register")),
        }
    }

    fn read_block(&self, buf: &mut [u8]) -> Result<(), BusError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(BusError::Closed);
        }
        if state.fail_reads > 0 {
            state.fail_reads -= 1;
            return Err(BusError::Io("injected read fault"));
        }

        let mut filled = 0usize;
        let mut drained_front = false;
        if let Some(front) = state.s2h.front_mut() {
            let n = (front.bytes.len() - front.served).min(buf.len());
            buf[..n].copy_from_slice(&front.bytes[front.served..front.served + n]);
            front.served += n;
            filled = n;
            // The frame is spent once its real bytes are out; trailing block
            // padding may or may not be read depending on the host's mode.
            drained_front = front.served >= front.unpadded;
        }
        // A read never crosses a frame boundary; the tail is padding.
        buf[filled..].fill(0);

        if drained_front {
            state.s2h.pop_front();
            state.send_queue_used -= 1;
            self.shared.expose_front(&mut state);
            self.shared.space_wake.notify_all();
        }
        Ok(())
    }

    fn write_block(&self, data: &[u8]) -> Result<(), BusError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(BusError::Closed);
        }
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            return Err(BusError::Io("injected write fault"));
        }

        state.h2s_partial.extend_from_slice(data);

        // A frame is complete once the accumulated stream covers the length
        // its own header declares; anything past it is block padding.
        if state.h2s_partial.len() >= 4 {
            let len = u16::from_le_bytes([state.h2s_partial[0], state.h2s_partial[1]]) as usize;
            let offset = u16::from_le_bytes([state.h2s_partial[2], state.h2s_partial[3]]) as usize;
            let total = len + offset;
            if total == 0 {
                state.h2s_partial.clear();
            } else if state.h2s_partial.len() >= total {
                let bytes = state.h2s_partial[..total].to_vec();
                state.h2s_partial.clear();
                let units = total.div_ceil(self.shared.profile.rx_buffer_size) as u32;
                state.free_units = state.free_units.saturating_sub(units);
                state.events.push_back(SlaveEvent::Frame(SlaveRxBuf { bytes, units }));
                self.shared.slave_wake.notify_all();
            }
        }
        Ok(())
    }

    fn wait_interrupt(&self, timeout: Duration) -> Result<u32, BusError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            // Pending data keeps the packet interrupt asserted even after an
            // ack, the way a level-triggered data line would; a host whose
            // read attempt failed sees the data again on its next wait.
            let mut word = state.int_word;
            if !state.s2h.is_empty() {
                word |= int_bits::NEW_PACKET;
            }
            if word != 0 {
                return Ok(word);
            }
            if state.closed {
                return Err(BusError::Closed);
            }
            if self
                .shared
                .host_wake
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return Err(BusError::Timeout);
            }
        }
    }

    fn ack_interrupt(&self, bits: u32) -> Result<(), BusError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(BusError::Closed);
        }
        state.int_word &= !bits;
        Ok(())
    }

    fn signal_peer(&self, bits: u32) -> Result<(), BusError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(BusError::Closed);
        }
        state.events.push_back(SlaveEvent::Ctrl(bits));
        drop(state);
        self.shared.slave_wake.notify_all();
        Ok(())
    }
}

/// Slave end of an in-memory pair.
#[derive(Clone)]
pub struct MemSlaveBus {
    shared: Arc<Shared>,
}

impl SlaveBus for MemSlaveBus {
    fn send(&self, frame: &[u8], timeout: Duration) -> Result<(), BusError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if state.closed {
                return Err(BusError::Closed);
            }
            if state.send_queue_used < self.shared.profile.send_queue_depth {
                break;
            }
            if self
                .shared
                .space_wake
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return Err(BusError::Timeout);
            }
        }

        let mut bytes = frame.to_vec();
        if let Some(block) = self.shared.profile.pad_to_block {
            let padded = bytes.len().div_ceil(block) * block;
            bytes.resize(padded, 0);
        }
        state.s2h.push_back(QueuedFrame {
            bytes,
            unpadded: frame.len(),
            served: 0,
        });
        state.send_queue_used += 1;
        if state.s2h.len() == 1 {
            self.shared.expose_front(&mut state);
        }
        Ok(())
    }

    fn recv(&self, timeout: Duration) -> Result<SlaveEvent, BusError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if let Some(event) = state.events.pop_front() {
                return Ok(event);
            }
            if state.closed {
                return Err(BusError::Closed);
            }
            if self
                .shared
                .slave_wake
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return Err(BusError::Timeout);
            }
        }
    }

    fn reload_rx(&self, units: u32) {
        let mut state = self.shared.state.lock();
        state.free_units += units;
        state.token_register = (state.token_register + units) % TOKEN_MOD;
    }

    fn raise_interrupt(&self, bits: u32) -> Result<(), BusError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(BusError::Closed);
        }
        state.int_word |= bits;
        drop(state);
        self.shared.host_wake.notify_all();
        Ok(())
    }

    fn drain_finished(&self) -> usize {
        let mut state = self.shared.state.lock();
        let reclaimed = state.s2h.len();
        state.s2h.clear();
        state.send_queue_used = 0;
        drop(state);
        self.shared.space_wake.notify_all();
        reclaimed
    }
}
