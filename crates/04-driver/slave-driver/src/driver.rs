//! Slave driver: send path, receive worker and watermark signalling.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::thread::{Builder, JoinHandle};
use std::time::Duration;

use bus::{ctrl_bits, int_bits, BusError, SlaveBus, SlaveEvent, SlaveRxBuf};
use link::{
    FramePool, InitError, Lane, LaneSet, LinkConfig, LinkStats, PayloadBuf, PushError, RxFrame,
    StatsSnapshot, SubmitError, ThrottleMonitor, ThrottleSignal,
};
use parking_lot::Mutex;
use wire::event::StartupEvent;
use wire::{checksum, FrameHeader, InterfaceType, HEADER_LEN};

/// Idle tick for the receive worker's blocking wait.
const WORKER_TICK: Duration = Duration::from_millis(200);

/// Bounded wait for a send-queue slot.
const SEND_WAIT: Duration = Duration::from_millis(500);

/// Bounded wait when queueing received frames for the consumer.
const RX_PUSH_WAIT: Duration = Duration::from_millis(100);

struct SlaveContext {
    cfg: LinkConfig,
    bus: Arc<dyn SlaveBus>,
    identity: StartupEvent,
    rx_lanes: LaneSet<RxFrame>,
    pool: FramePool,
    monitor: Mutex<ThrottleMonitor>,
    seq: AtomicU16,
    /// Cleared during reset; frames arriving then are discarded unprocessed.
    active: AtomicBool,
    running: AtomicBool,
    stats: LinkStats,
}

/// Slave end of a link. Dropping the driver shuts the worker down.
pub struct SlaveDriver {
    ctx: Arc<SlaveContext>,
    worker: Option<JoinHandle<()>>,
}

impl SlaveDriver {
    /// Brings the slave end up and starts its receive worker. The startup
    /// event is not sent until the host opens the data path (or
    /// [`announce`](Self::announce) is called explicitly).
    pub fn start(
        bus: Arc<dyn SlaveBus>,
        cfg: LinkConfig,
        identity: StartupEvent,
    ) -> Result<Self, InitError> {
        cfg.validate()?;

        let block = cfg.frame_capacity();
        let queue_depth = cfg.queue_depth;
        let watermarks = cfg.watermarks;
        let ctx = Arc::new(SlaveContext {
            bus,
            identity,
            rx_lanes: LaneSet::new(queue_depth),
            pool: FramePool::new(block, queue_depth * 2),
            monitor: Mutex::new(ThrottleMonitor::new(watermarks)),
            seq: AtomicU16::new(0),
            active: AtomicBool::new(true),
            running: AtomicBool::new(true),
            stats: LinkStats::default(),
            cfg,
        });

        let worker_ctx = Arc::clone(&ctx);
        let worker = Builder::new()
            .name("peer-rx".into())
            .spawn(move || rx_worker(worker_ctx))
            .map_err(|source| InitError::Thread { name: "peer-rx", source })?;

        Ok(Self { ctx, worker: Some(worker) })
    }

    /// Sends the startup ("hello") event announcing this peer's identity and
    /// capabilities.
    pub fn announce(&self) -> Result<(), SubmitError> {
        announce_internal(&self.ctx)
    }

    /// Frames and queues a payload towards the host, returning the payload
    /// length on success.
    pub fn send(
        &self,
        if_type: InterfaceType,
        if_num: u8,
        payload: &[u8],
    ) -> Result<usize, SubmitError> {
        if !self.ctx.active.load(Ordering::Acquire) || !self.ctx.running.load(Ordering::Acquire) {
            return Err(SubmitError::TransportDown);
        }
        if payload.is_empty() {
            return Err(SubmitError::Empty);
        }
        let max = self.ctx.cfg.max_payload as usize;
        if payload.len() > max {
            return Err(SubmitError::TooLarge { len: payload.len(), max });
        }
        send_frame(&self.ctx, if_type, if_num, payload)?;
        LinkStats::bump(&self.ctx.stats.submitted);
        Ok(payload.len())
    }

    /// Pulls the next received frame by strict priority, re-evaluating the
    /// stop watermark afterwards.
    pub fn read(&self, timeout: Duration) -> Option<RxFrame> {
        let frame = self.ctx.rx_lanes.pop(timeout)?;
        signal_watermark(&self.ctx);
        Some(frame)
    }

    /// Resets the link: stops intake, reclaims queued send buffers, drops
    /// undelivered receive frames and restarts.
    pub fn reset(&self) {
        reset_internal(&self.ctx);
    }

    /// Counter snapshot.
    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// Frame-pool blocks currently checked out.
    pub fn pool_outstanding(&self) -> usize {
        self.ctx.pool.outstanding()
    }

    /// Stops the worker and drains the queues.
    pub fn shutdown(mut self) {
        self.stop_worker();
    }

    fn stop_worker(&mut self) {
        self.ctx.running.store(false, Ordering::Release);
        self.ctx.rx_lanes.close();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        self.ctx.rx_lanes.drain();
    }
}

impl Drop for SlaveDriver {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop_worker();
        }
    }
}

/// Assembles and queues one frame towards the host.
fn send_frame(
    ctx: &SlaveContext,
    if_type: InterfaceType,
    if_num: u8,
    payload: &[u8],
) -> Result<(), SubmitError> {
    let header = FrameHeader::new(
        payload.len() as u16,
        if_type,
        if_num,
        ctx.seq.fetch_add(1, Ordering::Relaxed),
        0,
    );
    let total = header.frame_len();

    let mut frame = ctx.pool.acquire();
    {
        let bytes = frame.bytes_mut();
        header.encode_into(bytes);
        bytes[HEADER_LEN..total].copy_from_slice(payload);
        checksum::seal(bytes, &header, ctx.cfg.checksum);
    }
    frame.set_len(total);

    match ctx.bus.send(frame.as_slice(), SEND_WAIT) {
        Ok(()) => {
            LinkStats::bump(&ctx.stats.tx_frames);
            LinkStats::add(&ctx.stats.tx_bytes, total as u64);
            Ok(())
        }
        Err(BusError::Timeout) => {
            LinkStats::bump(&ctx.stats.tx_io_drops);
            Err(SubmitError::QueueFull { waited_ms: SEND_WAIT.as_millis() as u64 })
        }
        Err(err) => {
            tracing::warn!("send failed: {err}");
            LinkStats::bump(&ctx.stats.tx_io_drops);
            Err(SubmitError::TransportDown)
        }
    }
}

fn announce_internal(ctx: &SlaveContext) -> Result<(), SubmitError> {
    let payload = ctx.identity.encode();
    send_frame(ctx, InterfaceType::PrivateControl, 0, &payload)?;
    tracing::info!(chip_id = ctx.identity.chip_id, "startup event sent");
    Ok(())
}

fn reset_internal(ctx: &SlaveContext) {
    ctx.active.store(false, Ordering::Release);
    let reclaimed = ctx.bus.drain_finished();
    let dropped = ctx.rx_lanes.drain().len();
    ctx.monitor.lock().reset();
    ctx.active.store(true, Ordering::Release);
    tracing::info!(reclaimed, dropped, "link reset complete");
}

/// Checks the bulk backlog against the watermarks and raises the matching
/// host interrupt on a crossing.
fn signal_watermark(ctx: &SlaveContext) {
    let depth = ctx.rx_lanes.len(Lane::Bulk);
    let signal = ctx.monitor.lock().update(depth, ctx.cfg.queue_depth);
    match signal {
        Some(ThrottleSignal::Start) => {
            tracing::debug!(depth, "asking host to throttle");
            let _ = ctx.bus.raise_interrupt(int_bits::START_THROTTLE);
        }
        Some(ThrottleSignal::Stop) => {
            tracing::debug!(depth, "asking host to resume");
            let _ = ctx.bus.raise_interrupt(int_bits::STOP_THROTTLE);
        }
        None => {}
    }
}

/// Receive worker: bus events in, validated frames out.
fn rx_worker(ctx: Arc<SlaveContext>) {
    while ctx.running.load(Ordering::Acquire) {
        match ctx.bus.recv(WORKER_TICK) {
            Err(BusError::Timeout) => continue,
            Err(BusError::Closed) => {
                tracing::info!("bus closed, receive worker exiting");
                break;
            }
            Err(err) => {
                tracing::warn!("receive failed: {err}");
                continue;
            }
            Ok(SlaveEvent::Ctrl(bits)) => {
                if bits & ctrl_bits::OPEN_DATA_PATH != 0 {
                    tracing::info!("host opened the data path");
                    if let Err(err) = announce_internal(&ctx) {
                        tracing::warn!("announce failed: {err}");
                    }
                }
                if bits & ctrl_bits::RESET != 0 {
                    reset_internal(&ctx);
                }
            }
            Ok(SlaveEvent::Frame(rx)) => handle_frame(&ctx, rx),
        }
    }
}

fn handle_frame(ctx: &SlaveContext, rx: SlaveRxBuf) {
    let units = rx.units;
    if !ctx.active.load(Ordering::Acquire) {
        // Reset in progress; the frame is discarded unprocessed.
        ctx.bus.reload_rx(units);
        return;
    }

    let accepted = ingest(ctx, &rx.bytes);
    // The bus buffer is recycled either way; its credit goes back to the
    // host exactly once.
    ctx.bus.reload_rx(units);

    if accepted {
        signal_watermark(ctx);
    }
}

/// Gates, validates and queues one received frame.
fn ingest(ctx: &SlaveContext, bytes: &[u8]) -> bool {
    let header = match FrameHeader::decode(bytes, ctx.cfg.max_payload) {
        Ok(header) => header,
        Err(err) => {
            tracing::warn!("dropping frame: {err}");
            LinkStats::bump(&ctx.stats.rx_invalid);
            return false;
        }
    };
    let total = header.frame_len();
    if total > bytes.len() {
        tracing::warn!("frame of {total} bytes exceeds received {}", bytes.len());
        LinkStats::bump(&ctx.stats.rx_invalid);
        return false;
    }
    if let Err(err) = checksum::verify(&bytes[..total], &header, ctx.cfg.checksum) {
        tracing::warn!(iface = ?header.if_type, "dropping frame: {err}");
        LinkStats::bump(&ctx.stats.rx_invalid);
        return false;
    }

    let payload_len = header.len as usize;
    let mut buf = ctx.pool.acquire();
    buf.bytes_mut()[..payload_len].copy_from_slice(&bytes[HEADER_LEN..total]);
    buf.set_len(payload_len);
    let frame = RxFrame::new(
        header.if_type,
        header.if_num,
        header.seq,
        header.flags,
        PayloadBuf::Pooled(buf),
    );

    match ctx
        .rx_lanes
        .push(Lane::for_interface(header.if_type), frame, RX_PUSH_WAIT)
    {
        Ok(()) => {
            LinkStats::bump(&ctx.stats.rx_frames);
            true
        }
        Err(PushError::Timeout(_)) | Err(PushError::Closed(_)) => {
            tracing::warn!(iface = ?header.if_type, "receive lane full, dropping frame");
            LinkStats::bump(&ctx.stats.rx_queue_drops);
            false
        }
    }
}
