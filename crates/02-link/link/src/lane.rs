//! Strict-priority bounded lanes.
//!
//! Three FIFO queues share one physical bus per direction. Dequeue always
//! drains `Control` before `Realtime` before `Bulk`; a lower lane is only
//! serviced when every higher lane is empty. FIFO order holds within a lane,
//! no ordering holds across lanes.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use wire::InterfaceType;

/// Priority lane identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lane {
    /// Serial console and private control traffic.
    Control,
    /// Bluetooth HCI traffic.
    Realtime,
    /// Everything else, chiefly Wi-Fi data.
    Bulk,
}

impl Lane {
    /// Number of lanes.
    pub const COUNT: usize = 3;

    /// All lanes in dequeue priority order.
    pub const PRIORITY_ORDER: [Lane; Lane::COUNT] = [Lane::Control, Lane::Realtime, Lane::Bulk];

    /// Index into per-lane arrays.
    pub fn index(self) -> usize {
        match self {
            Lane::Control => 0,
            Lane::Realtime => 1,
            Lane::Bulk => 2,
        }
    }

    /// Lane an interface's traffic travels on.
    pub fn for_interface(if_type: InterfaceType) -> Lane {
        match if_type {
            InterfaceType::SerialConsole | InterfaceType::PrivateControl => Lane::Control,
            InterfaceType::BtHci => Lane::Realtime,
            InterfaceType::WifiSta | InterfaceType::WifiAp | InterfaceType::Test => Lane::Bulk,
        }
    }
}

/// Why a push did not take effect. The item comes back to the caller so its
/// buffer can be released (or retried) by the owner.
#[derive(Debug)]
pub enum PushError<T> {
    /// The lane stayed full for the whole bounded wait.
    Timeout(T),
    /// The lane set is closed; the link is resetting or shutting down.
    Closed(T),
}

struct LaneState<T> {
    queues: [VecDeque<T>; Lane::COUNT],
    closed: bool,
}

/// One direction's worth of priority queues.
pub struct LaneSet<T> {
    state: Mutex<LaneState<T>>,
    ready: Condvar,
    space: Condvar,
    depth: usize,
}

impl<T> LaneSet<T> {
    /// Creates a lane set where each lane holds at most `depth` items.
    pub fn new(depth: usize) -> Self {
        Self {
            state: Mutex::new(LaneState {
                queues: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
                closed: false,
            }),
            ready: Condvar::new(),
            space: Condvar::new(),
            depth,
        }
    }

    /// Enqueues `item` on `lane`, waiting up to `timeout` for space.
    pub fn push(&self, lane: Lane, item: T, timeout: Duration) -> Result<(), PushError<T>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(PushError::Closed(item));
            }
            if state.queues[lane.index()].len() < self.depth {
                state.queues[lane.index()].push_back(item);
                drop(state);
                self.ready.notify_one();
                return Ok(());
            }
            if self.space.wait_until(&mut state, deadline).timed_out() {
                return Err(PushError::Timeout(item));
            }
        }
    }

    /// Dequeues the next item by strict priority, waiting up to `timeout`
    /// for anything to arrive. Returns `None` on timeout, or immediately
    /// once the set is closed and drained.
    pub fn pop(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            for lane in Lane::PRIORITY_ORDER {
                if let Some(item) = state.queues[lane.index()].pop_front() {
                    drop(state);
                    self.space.notify_one();
                    return Some(item);
                }
            }
            if state.closed {
                return None;
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                return None;
            }
        }
    }

    /// Non-blocking variant of [`pop`](Self::pop).
    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        for lane in Lane::PRIORITY_ORDER {
            if let Some(item) = state.queues[lane.index()].pop_front() {
                drop(state);
                self.space.notify_one();
                return Some(item);
            }
        }
        None
    }

    /// Items currently queued on `lane`.
    pub fn len(&self, lane: Lane) -> usize {
        self.state.lock().queues[lane.index()].len()
    }

    /// True when every lane is empty.
    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.queues.iter().all(VecDeque::is_empty)
    }

    /// Per-lane capacity.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Empties every lane, returning the items for release.
    pub fn drain(&self) -> Vec<T> {
        let mut state = self.state.lock();
        let mut out = Vec::new();
        for lane in Lane::PRIORITY_ORDER {
            out.extend(state.queues[lane.index()].drain(..));
        }
        drop(state);
        self.space.notify_all();
        out
    }

    /// Closes the set: pushes fail, pops drain what is left then return
    /// `None`, and every waiter wakes up.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
        self.space.notify_all();
    }

    /// True once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
