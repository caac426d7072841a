//! Loopback load generator for the link transport.
//!
//! Brings a host and a slave driver up over the in-memory bus pair and
//! drives traffic through both directions, printing the drivers' counters at
//! the end. Useful for eyeballing throughput changes and for demonstrating
//! the handshake without hardware.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use bus::{MemBus, MemBusProfile};
use clap::{Parser, Subcommand};
use host_driver::HostDriver;
use link::{LinkConfig, StatsSnapshot, SubmitError};
use slave_driver::SlaveDriver;
use wire::event::StartupEvent;
use wire::InterfaceType;

const HANDSHAKE_WAIT: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "linkload", about = "Drive a loopback link and print stats")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Exchange the startup handshake and print the peer identity.
    Hello,
    /// Push frames through both directions of a loopback link.
    Flood {
        /// Frames to send each way.
        #[arg(long, default_value_t = 1_000)]
        frames: u64,
        /// Payload bytes per frame.
        #[arg(long, default_value_t = 1_500)]
        size: usize,
    },
}

fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Hello => hello(),
        Command::Flood { frames, size } => flood(frames, size),
    }
}

fn identity() -> StartupEvent {
    StartupEvent {
        chip_id: 0x19,
        capabilities: 0b0000_0111,
        test_throughput: 1,
        rx_queue_size: LinkConfig::default().queue_depth as u8,
    }
}

fn bring_up() -> Result<(HostDriver, SlaveDriver)> {
    let (host_bus, slave_bus) = MemBus::pair(MemBusProfile::default());
    let cfg = LinkConfig::default();

    let slave = SlaveDriver::start(Arc::new(slave_bus), cfg.clone(), identity())
        .context("starting slave driver")?;
    let host = HostDriver::start(Arc::new(host_bus), cfg).context("starting host driver")?;

    let deadline = Instant::now() + HANDSHAKE_WAIT;
    while !host.is_peer_ready() {
        if Instant::now() >= deadline {
            bail!("peer did not announce itself within {HANDSHAKE_WAIT:?}");
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    Ok((host, slave))
}

fn hello() -> Result<()> {
    let (host, _slave) = bring_up()?;
    let info = host.peer_info().context("handshake completed without peer info")?;
    println!("peer chip id:      {:#04x}", info.chip_id);
    println!("capabilities:      {:#010b}", info.capabilities);
    println!("raw throughput:    {}", if info.test_throughput != 0 { "yes" } else { "no" });
    println!("peer rx queue:     {}", info.rx_queue_size);
    Ok(())
}

fn flood(frames: u64, size: usize) -> Result<()> {
    let (host, slave) = bring_up()?;
    let cfg = LinkConfig::default();
    if size > cfg.max_payload as usize {
        bail!("payload size {size} exceeds link maximum {}", cfg.max_payload);
    }

    // Host -> slave, drained by a consumer thread.
    let to_slave_seen = Arc::new(AtomicU64::new(0));
    let stop = Arc::new(AtomicU64::new(0));
    let consumer_seen = Arc::clone(&to_slave_seen);
    let consumer_stop = Arc::clone(&stop);
    let slave = Arc::new(slave);
    let slave_consumer = Arc::clone(&slave);
    let consumer = std::thread::spawn(move || {
        while consumer_stop.load(Ordering::Relaxed) == 0 {
            if slave_consumer.read(Duration::from_millis(50)).is_some() {
                consumer_seen.fetch_add(1, Ordering::Relaxed);
            }
        }
    });

    let payload = vec![0x5Au8; size];
    let started = Instant::now();
    let mut sent = 0u64;
    while sent < frames {
        match host.submit(InterfaceType::WifiSta, 0, payload.as_slice()) {
            Ok(()) => sent += 1,
            Err(SubmitError::QueueFull { .. }) => std::thread::sleep(Duration::from_millis(1)),
            Err(err) => bail!("submit failed after {sent} frames: {err}"),
        }
    }
    let deadline = Instant::now() + Duration::from_secs(10);
    while to_slave_seen.load(Ordering::Relaxed) < frames && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    stop.store(1, Ordering::Relaxed);
    consumer.join().expect("consumer thread");
    let h2s_elapsed = started.elapsed();
    let seen = to_slave_seen.load(Ordering::Relaxed);
    if seen < frames {
        println!("note: slave consumer saw {seen} of {frames} frames (drops under overload are expected)");
    }

    // Slave -> host, counted by a registered handler.
    let to_host_seen = Arc::new(AtomicU64::new(0));
    let handler_seen = Arc::clone(&to_host_seen);
    host.register_handler(InterfaceType::WifiSta, move |_frame| {
        handler_seen.fetch_add(1, Ordering::Relaxed);
    });

    let started = Instant::now();
    let mut sent_back = 0u64;
    while sent_back < frames {
        match slave.send(InterfaceType::WifiSta, 0, &payload) {
            Ok(_) => sent_back += 1,
            Err(SubmitError::QueueFull { .. }) => std::thread::sleep(Duration::from_millis(1)),
            Err(err) => bail!("slave send failed after {sent_back} frames: {err}"),
        }
    }
    let deadline = Instant::now() + Duration::from_secs(10);
    while to_host_seen.load(Ordering::Relaxed) < frames && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    let s2h_elapsed = started.elapsed();
    let seen_back = to_host_seen.load(Ordering::Relaxed);
    if seen_back < frames {
        println!("note: host consumer saw {seen_back} of {frames} frames (drops under overload are expected)");
    }

    println!(
        "host -> slave: {frames} x {size} B in {:.1?} ({:.1} MiB/s)",
        h2s_elapsed,
        rate_mib(frames, size, h2s_elapsed)
    );
    println!(
        "slave -> host: {frames} x {size} B in {:.1?} ({:.1} MiB/s)",
        s2h_elapsed,
        rate_mib(frames, size, s2h_elapsed)
    );
    print_stats("host", host.stats());
    print_stats("slave", slave.stats());
    Ok(())
}

fn rate_mib(frames: u64, size: usize, elapsed: Duration) -> f64 {
    let bytes = frames as f64 * size as f64;
    bytes / (1024.0 * 1024.0) / elapsed.as_secs_f64().max(1e-9)
}

fn print_stats(side: &str, stats: StatsSnapshot) {
    println!("[{side}]");
    println!("  submitted:        {}", stats.submitted);
    println!("  tx frames/bytes:  {} / {}", stats.tx_frames, stats.tx_bytes);
    println!("  tx drops (io/credit): {} / {}", stats.tx_io_drops, stats.tx_no_credit);
    println!("  rx frames:        {}", stats.rx_frames);
    println!(
        "  rx drops (invalid/io/contention/queue): {} / {} / {} / {}",
        stats.rx_invalid, stats.rx_io_errors, stats.rx_contention_drops, stats.rx_queue_drops
    );
    println!("  delivered/unrouted: {} / {}", stats.delivered, stats.unrouted);
}
