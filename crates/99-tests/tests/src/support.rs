//! Shared fixtures for the cross-driver tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bus::{MemBus, MemBusProfile, MemHostBus, MemSlaveBus};
use host_driver::HostDriver;
use link::LinkConfig;
use slave_driver::SlaveDriver;
use wire::event::StartupEvent;
use wire::{checksum, FrameHeader, InterfaceType, HEADER_LEN};

pub const HANDSHAKE_WAIT: Duration = Duration::from_secs(2);
pub const SETTLE_WAIT: Duration = Duration::from_secs(2);

pub fn identity() -> StartupEvent {
    StartupEvent {
        chip_id: 0x19,
        capabilities: 0b0000_0101,
        test_throughput: 0,
        rx_queue_size: 20,
    }
}

/// Polls `cond` until it holds or `limit` elapses.
pub fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// A fully connected host driver + slave driver over an in-memory bus pair,
/// with raw bus handles kept for fault injection.
pub struct Loopback {
    pub host: HostDriver,
    pub slave: SlaveDriver,
    pub host_bus: MemHostBus,
    pub slave_bus: MemSlaveBus,
}

pub fn bring_up(cfg: LinkConfig, profile: MemBusProfile) -> Loopback {
    let (host_bus, slave_bus) = MemBus::pair(profile);
    let slave = SlaveDriver::start(Arc::new(slave_bus.clone()), cfg.clone(), identity())
        .expect("start slave driver");
    let host = HostDriver::start(Arc::new(host_bus.clone()), cfg).expect("start host driver");
    assert!(
        wait_until(HANDSHAKE_WAIT, || host.is_peer_ready()),
        "startup handshake did not complete"
    );
    Loopback { host, slave, host_bus, slave_bus }
}

/// Hand-assembles a sealed frame, for driving a driver from a raw bus end.
pub fn raw_frame(cfg: &LinkConfig, if_type: InterfaceType, seq: u16, payload: &[u8]) -> Vec<u8> {
    let header = FrameHeader::new(payload.len() as u16, if_type, 0, seq, 0);
    let mut frame = vec![0u8; header.frame_len()];
    header.encode_into(&mut frame);
    frame[HEADER_LEN..].copy_from_slice(payload);
    checksum::seal(&mut frame, &header, cfg.checksum);
    frame
}
