//! The four long-running worker loops.

use std::sync::Arc;
use std::time::Duration;

use bus::xfer;
use bus::{int_bits, reg, BusError, HostBus};
use link::{CreditStatus, Lane, LinkStats, PayloadBuf, Publish, PushError, RxFrame, RxMode};
use smallvec::SmallVec;
use wire::event::StartupEvent;
use wire::{checksum, FrameError, FrameHeader, InterfaceType, HEADER_LEN};

use crate::driver::Context;

/// Idle tick used by every blocking wait so shutdown is observed promptly.
const WORKER_TICK: Duration = Duration::from_millis(200);

/// Bounded wait when queueing validated frames towards the dispatcher.
const RX_PUSH_WAIT: Duration = Duration::from_millis(100);

/// Drains the submit lanes, assembles frames and writes them to the bus.
pub(crate) fn tx_worker(ctx: Arc<Context>) {
    while ctx.is_running() {
        let Some(entry) = ctx.tx_lanes.pop(WORKER_TICK) else {
            continue;
        };

        let payload = entry.payload.as_slice();
        let header = FrameHeader::new(
            payload.len() as u16,
            entry.if_type,
            entry.if_num,
            entry.seq,
            entry.flags,
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
        // The submitted payload is no longer needed; release it before
        // touching the bus.
        drop(entry.payload);

        let needed = ctx.cfg.buffers_needed(header.len as usize);
        let _bus = ctx.bus_lock.lock();

        let status = ctx
            .credits
            .lock()
            .reserve(needed, || ctx.bus.read_reg(reg::TOKEN_COUNT).ok());
        if status == CreditStatus::Unavailable {
            tracing::debug!(
                iface = ?header.if_type,
                len = header.len,
                "no peer buffers available, dropping frame"
            );
            LinkStats::bump(&ctx.stats.tx_no_credit);
            continue;
        }

        match xfer::write_frame(ctx.bus.as_ref(), frame.bytes(), total, &ctx.limits) {
            Ok(()) => {
                ctx.credits.lock().commit(needed);
                LinkStats::bump(&ctx.stats.tx_frames);
                LinkStats::add(&ctx.stats.tx_bytes, total as u64);
            }
            Err(err) => {
                tracing::warn!(
                    iface = ?header.if_type,
                    len = header.len,
                    "abandoning frame: {err}"
                );
                LinkStats::bump(&ctx.stats.tx_io_drops);
            }
        }
    }
}

/// Waits on peer interrupts and reads pending data into the staging buffer.
pub(crate) fn rx_worker(ctx: Arc<Context>) {
    // Running byte total for the modulo-wrapped pending-length computation.
    // Owned by this thread alone; advanced only after a fully successful
    // read, so a failed transfer is retried at the same counter position.
    let mut rx_byte_total: u32 = 0;

    while ctx.is_running() {
        let bits = match ctx.bus.wait_interrupt(WORKER_TICK) {
            Ok(bits) => bits,
            Err(BusError::Timeout) => continue,
            Err(err) => {
                tracing::warn!("interrupt wait failed: {err}");
                if matches!(err, BusError::Closed) {
                    break;
                }
                continue;
            }
        };
        if ctx.bus.ack_interrupt(bits).is_err() {
            continue;
        }

        if bits & int_bits::START_THROTTLE != 0 {
            tracing::debug!("peer raised throttle");
            ctx.throttle.set();
        }
        if bits & int_bits::STOP_THROTTLE != 0 {
            tracing::debug!("peer cleared throttle");
            ctx.throttle.clear();
        }
        if bits & int_bits::NEW_PACKET == 0 {
            continue;
        }

        let read_len = match ctx.cfg.rx_mode {
            RxMode::Packet => {
                let register = match ctx.bus.read_reg(reg::PACKET_LEN) {
                    Ok(value) => value,
                    Err(err) => {
                        tracing::warn!("length register read failed: {err}");
                        continue;
                    }
                };
                let pending = xfer::pending_len(register, rx_byte_total) as usize;
                if pending == 0 {
                    continue;
                }
                pending
            }
            // Streaming peers zero-pad up to the fixed maximum; no length
            // discovery round-trip.
            RxMode::Streaming => ctx.cfg.frame_capacity(),
        };
        let wire_len = xfer::wire_len(read_len, &ctx.limits);

        let mut slot = ctx.staging.lock().checkout(wire_len);
        let result = {
            let _bus = ctx.bus_lock.lock();
            xfer::read_frame(ctx.bus.as_ref(), &mut slot[..wire_len], read_len, &ctx.limits)
        };

        match result {
            Err(err) => {
                tracing::warn!("receive transfer failed: {err}");
                LinkStats::bump(&ctx.stats.rx_io_errors);
                // Hand the buffer back without publishing; the counter is
                // not advanced, the peer's data stays pending.
                ctx.staging.lock().restore(slot);
            }
            Ok(()) => {
                if ctx.cfg.rx_mode == RxMode::Packet {
                    rx_byte_total = (rx_byte_total + read_len as u32) % xfer::RX_BYTE_MOD;
                }
                match ctx.staging.lock().publish(slot, read_len) {
                    Publish::Ready => {
                        let _ = ctx.stage_tx.try_send(());
                    }
                    Publish::ReaderBusy => {
                        tracing::warn!("staging still draining, dropping receive interval");
                        LinkStats::bump(&ctx.stats.rx_contention_drops);
                    }
                }
            }
        }
    }
}

/// Validates staged data and queues frames towards the dispatcher.
pub(crate) fn stage_worker(ctx: Arc<Context>) {
    while ctx.is_running() {
        match ctx.stage_rx.recv_timeout(WORKER_TICK) {
            Ok(()) => {}
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }

        let frames = {
            let mut staging = ctx.staging.lock();
            let Some(data) = staging.take() else { continue };
            let frames = extract_frames(&ctx, data);
            staging.complete();
            frames
        };

        for frame in frames {
            let lane = Lane::for_interface(frame.if_type);
            match ctx.rx_lanes.push(lane, frame, RX_PUSH_WAIT) {
                Ok(()) => {}
                Err(PushError::Timeout(frame)) | Err(PushError::Closed(frame)) => {
                    tracing::warn!(iface = ?frame.if_type, "receive lane full, dropping frame");
                    LinkStats::bump(&ctx.stats.rx_queue_drops);
                }
            }
        }
    }
}

/// Walks frames out of one staged interval.
fn extract_frames(ctx: &Context, data: &[u8]) -> SmallVec<[RxFrame; 4]> {
    let mut out = SmallVec::new();
    let mut rest = data;

    while rest.len() >= HEADER_LEN {
        let header = match FrameHeader::decode(rest, ctx.cfg.max_payload) {
            Ok(header) => header,
            // An all-zero header is the peer's padding; end of data.
            Err(FrameError::ZeroLength) if rest[..HEADER_LEN].iter().all(|&b| b == 0) => break,
            Err(err) => {
                tracing::warn!("dropping staged data: {err}");
                LinkStats::bump(&ctx.stats.rx_invalid);
                break;
            }
        };
        let total = header.frame_len();
        if total > rest.len() {
            tracing::warn!("frame of {total} bytes overruns staged data");
            LinkStats::bump(&ctx.stats.rx_invalid);
            break;
        }

        match checksum::verify(&rest[..total], &header, ctx.cfg.checksum) {
            Err(err) => {
                tracing::warn!(iface = ?header.if_type, "dropping frame: {err}");
                LinkStats::bump(&ctx.stats.rx_invalid);
            }
            Ok(()) => {
                let payload_len = header.len as usize;
                let mut buf = ctx.pool.acquire();
                buf.bytes_mut()[..payload_len].copy_from_slice(&rest[HEADER_LEN..total]);
                buf.set_len(payload_len);
                out.push(RxFrame::new(
                    header.if_type,
                    header.if_num,
                    header.seq,
                    header.flags,
                    PayloadBuf::Pooled(buf),
                ));
                LinkStats::bump(&ctx.stats.rx_frames);
            }
        }
        rest = &rest[total..];
    }
    out
}

/// Routes validated frames to registered consumers.
pub(crate) fn deliver_worker(ctx: Arc<Context>) {
    while ctx.is_running() {
        let Some(frame) = ctx.rx_lanes.pop(WORKER_TICK) else {
            continue;
        };

        if frame.if_type == InterfaceType::PrivateControl {
            handle_control(&ctx, &frame);
        }

        let handler = ctx.handlers.read()[frame.if_type.index()].clone();
        match handler {
            Some(handler) => {
                handler(frame);
                LinkStats::bump(&ctx.stats.delivered);
            }
            None => {
                if frame.if_type != InterfaceType::PrivateControl {
                    tracing::debug!(iface = ?frame.if_type, "no consumer registered, dropping");
                    LinkStats::bump(&ctx.stats.unrouted);
                }
            }
        }
    }
}

/// Control-plane frames gate the rest of the link.
fn handle_control(ctx: &Context, frame: &RxFrame) {
    match StartupEvent::decode(frame.payload()) {
        Ok(event) => {
            *ctx.peer_info.lock() = Some(event);
            ctx.peer_ready
                .store(true, std::sync::atomic::Ordering::Release);
            tracing::info!(
                chip_id = event.chip_id,
                rx_queue = event.rx_queue_size,
                "peer startup event received, transport up"
            );
        }
        Err(err) => {
            tracing::warn!("undecodable control event: {err}");
        }
    }
}
