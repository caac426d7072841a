//! Injected bus faults and corrupt frames: the link degrades, never wedges.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bus::{MemBusProfile, SlaveBus};
use link::LinkConfig;
use wire::InterfaceType;

use crate::support::{bring_up, raw_frame, wait_until, SETTLE_WAIT};

#[test]
fn transient_write_fault_is_retried_through() {
    let lb = bring_up(LinkConfig::default(), MemBusProfile::default());

    lb.host_bus.fail_writes(1);
    lb.host
        .submit(InterfaceType::WifiSta, 0, vec![0xAB; 400])
        .expect("submit");

    let frame = lb.slave.read(SETTLE_WAIT).expect("delivered despite one fault");
    assert_eq!(frame.payload(), &[0xAB; 400][..]);
    assert_eq!(lb.host.stats().tx_frames, 1);
    assert_eq!(lb.host.stats().tx_io_drops, 0);
}

#[test]
fn exhausted_write_retries_drop_the_frame_only() {
    let lb = bring_up(LinkConfig::default(), MemBusProfile::default());

    // Retry limit is two attempts; two injected faults exhaust it.
    lb.host_bus.fail_writes(2);
    lb.host
        .submit(InterfaceType::WifiSta, 0, vec![0x01; 200])
        .expect("submit");
    assert!(
        wait_until(SETTLE_WAIT, || lb.host.stats().tx_io_drops == 1),
        "the whole write is abandoned"
    );
    assert!(lb.slave.read(Duration::from_millis(150)).is_none());

    // The link carries the next frame as if nothing happened.
    lb.host
        .submit(InterfaceType::WifiSta, 0, vec![0x02; 200])
        .expect("submit after drop");
    let frame = lb.slave.read(SETTLE_WAIT).expect("next frame flows");
    assert_eq!(frame.payload(), &[0x02; 200][..]);
}

#[test]
fn failed_read_interval_is_retried_on_next_wait() {
    let lb = bring_up(LinkConfig::default(), MemBusProfile::default());

    let seen = Arc::new(AtomicU64::new(0));
    let sink = Arc::clone(&seen);
    lb.host.register_handler(InterfaceType::SerialConsole, move |frame| {
        assert_eq!(frame.payload(), b"still arrives");
        sink.fetch_add(1, Ordering::Relaxed);
    });

    lb.host_bus.fail_reads(1);
    lb.slave
        .send(InterfaceType::SerialConsole, 0, b"still arrives")
        .expect("slave send");

    assert!(
        wait_until(SETTLE_WAIT, || seen.load(Ordering::Relaxed) == 1),
        "the pending data is re-read after the failed interval"
    );
    assert!(lb.host.stats().rx_io_errors >= 1);
}

#[test]
fn corrupt_frame_is_dropped_without_delivery() {
    let lb = bring_up(LinkConfig::default(), MemBusProfile::default());

    let delivered = Arc::new(AtomicU64::new(0));
    let sink = Arc::clone(&delivered);
    lb.host.register_handler(InterfaceType::WifiSta, move |_| {
        sink.fetch_add(1, Ordering::Relaxed);
    });

    let cfg = LinkConfig::default();
    let mut corrupt = raw_frame(&cfg, InterfaceType::WifiSta, 0, &[0x44; 300]);
    corrupt[40] ^= 0x10; // payload bit flip after sealing
    lb.slave_bus.send(&corrupt, SETTLE_WAIT).expect("raw send");

    assert!(
        wait_until(SETTLE_WAIT, || lb.host.stats().rx_invalid == 1),
        "checksum mismatch counts as an invalid frame"
    );
    assert_eq!(delivered.load(Ordering::Relaxed), 0);

    // A clean frame right after still flows.
    let clean = raw_frame(&cfg, InterfaceType::WifiSta, 1, &[0x45; 300]);
    lb.slave_bus.send(&clean, SETTLE_WAIT).expect("raw send");
    assert!(wait_until(SETTLE_WAIT, || delivered.load(Ordering::Relaxed) == 1));
}

#[test]
fn zero_length_frame_from_peer_is_rejected() {
    let lb = bring_up(LinkConfig::default(), MemBusProfile::default());

    // Hand-build a header claiming zero payload bytes.
    let cfg = LinkConfig::default();
    let mut frame = raw_frame(&cfg, InterfaceType::WifiSta, 0, &[0x99; 8]);
    frame[0] = 0;
    frame[1] = 0;
    lb.slave_bus.send(&frame, SETTLE_WAIT).expect("raw send");

    assert!(
        wait_until(SETTLE_WAIT, || lb.host.stats().rx_invalid == 1),
        "zero-length frames never reach a consumer"
    );
    assert_eq!(lb.host.stats().delivered, 0);

    assert!(
        wait_until(SETTLE_WAIT, || lb.host.pool_outstanding() == 0),
        "rejected frames leak nothing"
    );
}
