//! Driver construction, public API and shared worker context.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::thread::{Builder, JoinHandle};
use std::time::Duration;

use bus::xfer::XferLimits;
use bus::{ctrl_bits, HostBus};
use crossbeam_channel::{Receiver, Sender};
use link::{
    CreditCounter, DoubleBuffer, FramePool, InitError, Lane, LaneSet, LinkConfig, LinkStats,
    PayloadBuf, PushError, RxFrame, StatsSnapshot, SubmitError, ThrottleFlag,
};
use parking_lot::{Mutex, RwLock};
use wire::event::StartupEvent;
use wire::{InterfaceType, INTERFACE_COUNT};

use crate::workers;

/// Bounded wait for a full submit lane before the caller is told to retry.
const SUBMIT_WAIT: Duration = Duration::from_millis(100);

pub(crate) type HandlerFn = dyn Fn(RxFrame) + Send + Sync;

/// One queued outbound payload.
pub(crate) struct TxEntry {
    pub if_type: InterfaceType,
    pub if_num: u8,
    pub seq: u16,
    pub flags: u8,
    pub payload: PayloadBuf,
}

/// State shared between the API surface and the worker threads.
pub(crate) struct Context {
    pub cfg: LinkConfig,
    pub limits: XferLimits,
    pub bus: Arc<dyn HostBus>,
    /// Serialises whole logical transfers; never held around lane
    /// bookkeeping.
    pub bus_lock: Mutex<()>,
    pub tx_lanes: LaneSet<TxEntry>,
    pub rx_lanes: LaneSet<RxFrame>,
    pub pool: FramePool,
    pub staging: Mutex<DoubleBuffer>,
    pub stage_tx: Sender<()>,
    pub stage_rx: Receiver<()>,
    pub credits: Mutex<CreditCounter>,
    pub seq: AtomicU16,
    pub peer_ready: AtomicBool,
    pub peer_info: Mutex<Option<StartupEvent>>,
    pub throttle: ThrottleFlag,
    pub running: AtomicBool,
    pub handlers: RwLock<[Option<Arc<HandlerFn>>; INTERFACE_COUNT]>,
    pub stats: LinkStats,
}

impl Context {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Host end of a link. Dropping the driver shuts the workers down.
pub struct HostDriver {
    ctx: Arc<Context>,
    workers: Vec<JoinHandle<()>>,
}

impl HostDriver {
    /// Brings the link up: allocates queues, pool and staging, spawns the
    /// worker threads and signals the peer that the data path is open.
    ///
    /// Any failure tears down whatever was already started; no threads or
    /// buffers outlive the error.
    pub fn start(bus: Arc<dyn HostBus>, cfg: LinkConfig) -> Result<Self, InitError> {
        cfg.validate()?;

        let limits = XferLimits {
            max_transaction: cfg.max_transaction,
            block_size: cfg.block_size,
            block_only: cfg.block_only,
            write_retry_limit: cfg.tx_retry_limit,
        };
        let block = bus::xfer::wire_len(cfg.frame_capacity(), &limits);
        let (stage_tx, stage_rx) = crossbeam_channel::bounded(2);

        let ctx = Arc::new(Context {
            limits,
            bus,
            bus_lock: Mutex::new(()),
            tx_lanes: LaneSet::new(cfg.queue_depth),
            rx_lanes: LaneSet::new(cfg.queue_depth),
            pool: FramePool::new(block, cfg.queue_depth * 2),
            staging: Mutex::new(DoubleBuffer::new(block)),
            stage_tx,
            stage_rx,
            credits: Mutex::new(CreditCounter::new(cfg.credit_poll_limit)),
            seq: AtomicU16::new(0),
            peer_ready: AtomicBool::new(false),
            peer_info: Mutex::new(None),
            throttle: ThrottleFlag::default(),
            running: AtomicBool::new(true),
            handlers: RwLock::new(std::array::from_fn(|_| None)),
            stats: LinkStats::default(),
            cfg,
        });

        let mut driver = Self { ctx, workers: Vec::with_capacity(4) };
        let spawn_plan: [(&'static str, fn(Arc<Context>)); 4] = [
            ("link-tx", workers::tx_worker),
            ("link-rx", workers::rx_worker),
            ("link-stage", workers::stage_worker),
            ("link-deliver", workers::deliver_worker),
        ];
        for (name, entry) in spawn_plan {
            let ctx = Arc::clone(&driver.ctx);
            match Builder::new().name(name.into()).spawn(move || entry(ctx)) {
                Ok(handle) => driver.workers.push(handle),
                Err(source) => {
                    driver.stop_workers();
                    return Err(InitError::Thread { name, source });
                }
            }
        }

        if let Err(err) = driver.ctx.bus.signal_peer(ctrl_bits::OPEN_DATA_PATH) {
            driver.stop_workers();
            return Err(InitError::Bus(err.to_string()));
        }

        Ok(driver)
    }

    /// Enqueues an outbound payload on the lane for its interface.
    ///
    /// Blocks up to a bounded wait when the lane is full. On any error the
    /// payload is released before returning.
    pub fn submit(
        &self,
        if_type: InterfaceType,
        if_num: u8,
        payload: impl Into<PayloadBuf>,
    ) -> Result<(), SubmitError> {
        let payload = payload.into();
        let len = payload.len();
        if len == 0 {
            return Err(SubmitError::Empty);
        }
        let max = self.ctx.cfg.max_payload as usize;
        if len > max {
            return Err(SubmitError::TooLarge { len, max });
        }
        if !self.ctx.is_running() {
            return Err(SubmitError::TransportDown);
        }
        // Only the control plane may talk before the peer announced itself.
        if if_type != InterfaceType::PrivateControl && !self.is_peer_ready() {
            return Err(SubmitError::TransportDown);
        }

        let entry = TxEntry {
            if_type,
            if_num,
            seq: self.ctx.seq.fetch_add(1, Ordering::Relaxed),
            flags: 0,
            payload,
        };
        match self
            .ctx
            .tx_lanes
            .push(Lane::for_interface(if_type), entry, SUBMIT_WAIT)
        {
            Ok(()) => {
                LinkStats::bump(&self.ctx.stats.submitted);
                Ok(())
            }
            Err(PushError::Timeout(_entry)) => Err(SubmitError::QueueFull {
                waited_ms: SUBMIT_WAIT.as_millis() as u64,
            }),
            Err(PushError::Closed(_entry)) => Err(SubmitError::TransportDown),
        }
    }

    /// Registers the consumer callback for one interface type, replacing any
    /// previous one. The callback owns each delivered frame; dropping the
    /// frame releases its buffer.
    pub fn register_handler<F>(&self, if_type: InterfaceType, handler: F)
    where
        F: Fn(RxFrame) + Send + Sync + 'static,
    {
        self.ctx.handlers.write()[if_type.index()] = Some(Arc::new(handler));
    }

    /// True once the peer's startup event has been received.
    pub fn is_peer_ready(&self) -> bool {
        self.ctx.peer_ready.load(Ordering::Acquire)
    }

    /// True while the peer asks us to hold off bulk transmission.
    pub fn is_throttled(&self) -> bool {
        self.ctx.throttle.is_set()
    }

    /// The peer's decoded startup event, once received.
    pub fn peer_info(&self) -> Option<StartupEvent> {
        *self.ctx.peer_info.lock()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// Frame-pool blocks currently checked out; zero when the link is idle
    /// and every consumer released its frames.
    pub fn pool_outstanding(&self) -> usize {
        self.ctx.pool.outstanding()
    }

    /// Stops the workers and drains the queues.
    pub fn shutdown(mut self) {
        self.stop_workers();
    }

    fn stop_workers(&mut self) {
        self.ctx.running.store(false, Ordering::Release);
        self.ctx.tx_lanes.close();
        self.ctx.rx_lanes.close();
        let _ = self.ctx.stage_tx.try_send(());
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        // Release whatever was still queued.
        self.ctx.tx_lanes.drain();
        self.ctx.rx_lanes.drain();
    }
}

impl Drop for HostDriver {
    fn drop(&mut self) {
        if self.ctx.is_running() {
            self.stop_workers();
        }
    }
}
