//! End-to-end scenarios across both drivers and the in-memory bus.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use bus::{MemBus, MemBusProfile};
use host_driver::HostDriver;
use link::{Lane, LinkConfig, RxMode, SubmitError};
use slave_driver::SlaveDriver;
use wire::InterfaceType;

use crate::support::{bring_up, identity, raw_frame, wait_until, HANDSHAKE_WAIT, SETTLE_WAIT};

#[test]
fn startup_handshake_gates_submit() {
    let (host_bus, slave_bus) = MemBus::pair(MemBusProfile::default());
    let cfg = LinkConfig::default();
    let host = HostDriver::start(Arc::new(host_bus), cfg.clone()).expect("start host");

    // No peer yet: data traffic is refused, the link is not up.
    assert_eq!(
        host.submit(InterfaceType::WifiSta, 0, b"too early".as_slice()),
        Err(SubmitError::TransportDown)
    );
    assert!(!host.is_peer_ready());

    // The slave comes up, sees the buffered open-data-path signal and
    // announces itself.
    let slave = SlaveDriver::start(Arc::new(slave_bus), cfg, identity()).expect("start slave");
    assert!(wait_until(HANDSHAKE_WAIT, || host.is_peer_ready()));

    let info = host.peer_info().expect("peer info recorded");
    assert_eq!(info.chip_id, identity().chip_id);
    assert_eq!(info.rx_queue_size, identity().rx_queue_size);

    host.submit(InterfaceType::WifiSta, 0, b"now it flows".as_slice())
        .expect("submit after handshake");
    drop(slave);
}

#[test]
fn bulk_payload_delivered_exactly_once() {
    let lb = bring_up(LinkConfig::default(), MemBusProfile::default());

    // 1500 bytes of a trivially incrementing 3-byte pattern.
    let payload: Vec<u8> = (0..1500).map(|i| (i % 3) as u8).collect();
    lb.host
        .submit(InterfaceType::WifiSta, 0, payload.as_slice())
        .expect("submit bulk payload");

    let frame = lb
        .slave
        .read(SETTLE_WAIT)
        .expect("slave receives the frame");
    assert_eq!(frame.if_type, InterfaceType::WifiSta);
    assert_eq!(frame.if_num, 0);
    assert_eq!(frame.seq, 0, "first submit carries sequence zero");
    assert_eq!(frame.payload().len(), 1500);
    assert_eq!(frame.payload(), &payload[..]);

    // Exactly once: nothing else arrives.
    assert!(lb.slave.read(Duration::from_millis(100)).is_none());

    drop(frame);
    assert!(
        wait_until(SETTLE_WAIT, || lb.host.pool_outstanding() == 0
            && lb.slave.pool_outstanding() == 0),
        "all pool blocks return after delivery"
    );
}

#[test]
fn slave_to_host_delivery_invokes_registered_handler() {
    let lb = bring_up(LinkConfig::default(), MemBusProfile::default());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    lb.host.register_handler(InterfaceType::SerialConsole, move |frame| {
        sink.lock().push((frame.seq, frame.payload().to_vec()));
    });

    lb.slave
        .send(InterfaceType::SerialConsole, 0, b"ok: version 1.2")
        .expect("slave send");

    assert!(wait_until(SETTLE_WAIT, || !seen.lock().is_empty()));
    let delivered = seen.lock();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].1, b"ok: version 1.2");
}

#[test]
fn reads_drain_in_strict_priority_order() {
    let lb = bring_up(LinkConfig::default(), MemBusProfile::default());

    // Interleave bulk, control and realtime traffic; the host transmits in
    // submit order, the slave's lanes re-prioritise on delivery.
    let plan = [
        (InterfaceType::WifiSta, Lane::Bulk),
        (InterfaceType::SerialConsole, Lane::Control),
        (InterfaceType::WifiSta, Lane::Bulk),
        (InterfaceType::BtHci, Lane::Realtime),
        (InterfaceType::SerialConsole, Lane::Control),
        (InterfaceType::BtHci, Lane::Realtime),
    ];
    for (if_type, _) in plan {
        lb.host
            .submit(if_type, 0, vec![0xEE; 32])
            .expect("submit");
    }
    assert!(
        wait_until(SETTLE_WAIT, || lb.slave.stats().rx_frames == plan.len() as u64),
        "slave queued all frames"
    );

    let mut drained = Vec::new();
    for _ in 0..plan.len() {
        let frame = lb.slave.read(SETTLE_WAIT).expect("read frame");
        drained.push((Lane::for_interface(frame.if_type), frame.seq));
    }

    // All control before any realtime, all realtime before any bulk.
    let lane_indices: Vec<usize> = drained.iter().map(|(lane, _)| lane.index()).collect();
    let mut sorted = lane_indices.clone();
    sorted.sort_unstable();
    assert_eq!(lane_indices, sorted, "strict lane priority violated: {drained:?}");
    assert_eq!(drained.iter().filter(|(l, _)| *l == Lane::Control).count(), 2);
    assert_eq!(drained.iter().filter(|(l, _)| *l == Lane::Realtime).count(), 2);

    // FIFO within each lane, visible through the submit sequence numbers.
    for lane in Lane::PRIORITY_ORDER {
        let seqs: Vec<u16> = drained
            .iter()
            .filter(|(l, _)| *l == lane)
            .map(|(_, seq)| *seq)
            .collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]), "lane {lane:?} reordered: {seqs:?}");
    }
}

#[test]
fn streaming_mode_carries_traffic_both_ways() {
    let cfg = LinkConfig { rx_mode: RxMode::Streaming, ..LinkConfig::default() };
    let lb = bring_up(cfg, MemBusProfile::default());

    let counted = Arc::new(AtomicU64::new(0));
    let sink = Arc::clone(&counted);
    lb.host.register_handler(InterfaceType::WifiAp, move |frame| {
        assert_eq!(frame.payload(), &[0xC3; 700][..]);
        sink.fetch_add(1, Ordering::Relaxed);
    });

    for _ in 0..5 {
        lb.slave
            .send(InterfaceType::WifiAp, 1, &[0xC3; 700])
            .expect("slave send");
    }
    assert!(wait_until(SETTLE_WAIT, || counted.load(Ordering::Relaxed) == 5));

    lb.host
        .submit(InterfaceType::WifiSta, 0, vec![0x11; 900])
        .expect("host submit");
    let frame = lb.slave.read(SETTLE_WAIT).expect("slave read");
    assert_eq!(frame.payload(), &[0x11; 900][..]);
}

#[test]
fn raw_control_frame_from_bus_brings_link_up() {
    // Drive the host's receive path with a hand-assembled startup frame, no
    // slave driver involved.
    let (host_bus, slave_bus) = MemBus::pair(MemBusProfile::default());
    let cfg = LinkConfig::default();
    let host = HostDriver::start(Arc::new(host_bus), cfg.clone()).expect("start host");

    let hello = raw_frame(&cfg, InterfaceType::PrivateControl, 0, &identity().encode());
    bus::SlaveBus::send(&slave_bus, &hello, SETTLE_WAIT).expect("raw send");

    assert!(wait_until(HANDSHAKE_WAIT, || host.is_peer_ready()));
    assert_eq!(host.peer_info().expect("info").chip_id, identity().chip_id);
}

#[test]
fn submit_validation_rejects_bad_payloads() {
    let lb = bring_up(LinkConfig::default(), MemBusProfile::default());
    let max = LinkConfig::default().max_payload as usize;

    assert_eq!(
        lb.host.submit(InterfaceType::WifiSta, 0, Vec::<u8>::new()),
        Err(SubmitError::Empty)
    );
    assert_eq!(
        lb.host.submit(InterfaceType::WifiSta, 0, vec![0; max + 1]),
        Err(SubmitError::TooLarge { len: max + 1, max })
    );
    assert_eq!(lb.slave.send(InterfaceType::WifiSta, 0, &[]), Err(SubmitError::Empty));
}
