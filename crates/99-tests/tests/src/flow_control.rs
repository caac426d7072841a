//! Credit accounting and throttle signalling across the pair.

use std::sync::Arc;

use bus::{ctrl_bits, MemBus, MemBusProfile, SlaveBus, SlaveEvent};
use host_driver::HostDriver;
use link::{LinkConfig, SubmitError};
use slave_driver::SlaveDriver;
use wire::InterfaceType;

use crate::support::{bring_up, identity, raw_frame, wait_until, HANDSHAKE_WAIT, SETTLE_WAIT};

#[test]
fn credit_starvation_drops_then_recovers() {
    // A peer that has loaded no receive buffers: every credit poll comes
    // back empty.
    let (host_bus, slave_bus) = MemBus::pair(MemBusProfile {
        rx_buffer_count: 0,
        ..MemBusProfile::default()
    });
    let cfg = LinkConfig::default();
    let host = HostDriver::start(Arc::new(host_bus), cfg.clone()).expect("start host");

    let hello = raw_frame(&cfg, InterfaceType::PrivateControl, 0, &identity().encode());
    slave_bus.send(&hello, SETTLE_WAIT).expect("hand announce");
    assert!(wait_until(HANDSHAKE_WAIT, || host.is_peer_ready()));

    host.submit(InterfaceType::WifiSta, 0, vec![0x77; 600])
        .expect("submit is accepted; the drop happens at the bus");
    assert!(
        wait_until(SETTLE_WAIT, || host.stats().tx_no_credit == 1),
        "bounded credit polling gives up and drops the frame"
    );

    // The peer loads buffers; the next attempt flows.
    slave_bus.reload_rx(4);
    host.submit(InterfaceType::WifiSta, 0, vec![0x78; 600])
        .expect("submit after reload");

    let frame = loop {
        match slave_bus.recv(SETTLE_WAIT).expect("slave event") {
            SlaveEvent::Frame(frame) => break frame,
            SlaveEvent::Ctrl(_) => continue,
        }
    };
    assert_eq!(frame.bytes[12..], vec![0x78u8; 600][..]);
    assert_eq!(host.stats().tx_frames, 1);
}

#[test]
fn slave_backlog_throttles_host_until_drained() {
    let lb = bring_up(LinkConfig::default(), MemBusProfile::default());
    let depth = LinkConfig::default().queue_depth as u64;

    // Fill the slave's bulk lane most of the way without anyone reading.
    let burst = depth - 2;
    for i in 0..burst {
        lb.host
            .submit(InterfaceType::WifiSta, 0, vec![i as u8; 256])
            .expect("submit burst");
    }

    assert!(
        wait_until(SETTLE_WAIT, || lb.host.is_throttled()),
        "crossing the high watermark raises the throttle flag on the host"
    );
    assert!(
        wait_until(SETTLE_WAIT, || lb.slave.stats().rx_frames == burst),
        "all burst frames were queued"
    );

    // Draining the backlog below the low watermark clears it.
    let mut read = 0;
    while read < burst {
        if lb.slave.read(SETTLE_WAIT).is_some() {
            read += 1;
        }
    }
    assert!(
        wait_until(SETTLE_WAIT, || !lb.host.is_throttled()),
        "falling below the low watermark clears the throttle flag"
    );
}

#[test]
fn reset_reclaims_the_send_queue() {
    // A host that never reads: the slave's send queue fills up.
    let (_host_bus, slave_bus) = MemBus::pair(MemBusProfile {
        send_queue_depth: 2,
        ..MemBusProfile::default()
    });
    let slave = SlaveDriver::start(Arc::new(slave_bus), LinkConfig::default(), identity())
        .expect("start slave");

    slave.send(InterfaceType::SerialConsole, 0, b"one").expect("first");
    slave.send(InterfaceType::SerialConsole, 0, b"two").expect("second");
    assert!(matches!(
        slave.send(InterfaceType::SerialConsole, 0, b"three"),
        Err(SubmitError::QueueFull { .. })
    ));

    slave.reset();
    slave
        .send(InterfaceType::SerialConsole, 0, b"after reset")
        .expect("queue reclaimed by reset");
}

#[test]
fn host_signal_triggers_slave_reset() {
    let (host_bus, slave_bus) = MemBus::pair(MemBusProfile {
        send_queue_depth: 2,
        ..MemBusProfile::default()
    });
    let slave = SlaveDriver::start(Arc::new(slave_bus), LinkConfig::default(), identity())
        .expect("start slave");

    slave.send(InterfaceType::SerialConsole, 0, b"one").expect("first");
    slave.send(InterfaceType::SerialConsole, 0, b"two").expect("second");

    bus::HostBus::signal_peer(&host_bus, ctrl_bits::RESET).expect("signal reset");
    assert!(
        wait_until(SETTLE_WAIT, || {
            slave.send(InterfaceType::SerialConsole, 0, b"again").is_ok()
        }),
        "peer-triggered reset reopens the send queue"
    );
}
