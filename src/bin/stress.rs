//! slotlog stress binary
//!
//! Runs concurrent writers against a directory-backed slot ring and
//! reports tick statistics.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use slotlog::{Config, DirectoryLogfileManager, SlotError, Slots, Synchronizer};
use tracing_subscriber::{fmt, EnvFilter};

/// slotlog stress driver
#[derive(Parser, Debug)]
#[command(name = "slotlog-stress")]
#[command(about = "Drive concurrent writers through the WAL slot ring")]
#[command(version)]
struct Args {
    /// Logfile directory
    #[arg(short, long, default_value = "./slotlog_data")]
    log_dir: String,

    /// Number of writer threads
    #[arg(short, long, default_value = "4")]
    writers: usize,

    /// Records written by each writer
    #[arg(short, long, default_value = "10000")]
    records: usize,

    /// Payload size of each record in bytes
    #[arg(short = 's', long, default_value = "128")]
    record_size: u32,

    /// Number of slots in the ring
    #[arg(long, default_value = "4096")]
    slots: usize,

    /// Logfile size in MB
    #[arg(short = 'm', long, default_value = "4")]
    logfile_mb: u32,

    /// Wait for durability on every Nth record (0 = never)
    #[arg(long, default_value = "100")]
    sync_every: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,slotlog=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("slotlog stress v{}", slotlog::VERSION);
    tracing::info!("Log directory: {}", args.log_dir);

    if let Err(e) = run(&args) {
        tracing::error!("Stress run failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> slotlog::Result<()> {
    let config = Config::builder()
        .log_dir(&args.log_dir)
        .number_of_slots(args.slots)
        .logfile_size(logfile_size_bytes(args.logfile_mb)?)
        .build();
    config.validate()?;

    let manager = Arc::new(DirectoryLogfileManager::open(&config)?);
    let slots = Arc::new(Slots::from_config(manager.clone(), &config, 0)?);
    let synchronizer =
        Synchronizer::start(Arc::clone(&slots), manager.sync_listener(), config.sync_interval)?;

    let started = Instant::now();
    let handles: Vec<_> = (0..args.writers)
        .map(|writer| {
            let slots = Arc::clone(&slots);
            let records = args.records;
            let record_size = args.record_size;
            let sync_every = args.sync_every;
            thread::spawn(move || write_records(&slots, writer, records, record_size, sync_every))
        })
        .collect();

    for handle in handles {
        match handle.join() {
            Ok(result) => result?,
            Err(_) => return Err(SlotError::InvalidState("writer thread panicked".to_string())),
        }
    }

    slots.flush(true)?;
    let elapsed = started.elapsed();

    synchronizer.stop();
    slots.shutdown();

    let stats = slots.statistics();
    let total = args.writers * args.records;
    tracing::info!(
        records = total,
        elapsed_ms = elapsed.as_millis() as u64,
        last_assigned_tick = stats.last_assigned_tick,
        last_committed_tick = stats.last_committed_tick,
        last_committed_data_tick = stats.last_committed_data_tick,
        num_events = stats.num_events,
        "stress run complete"
    );
    println!(
        "{} records in {:?} ({:.0} records/s)",
        total,
        elapsed,
        total as f64 / elapsed.as_secs_f64()
    );
    Ok(())
}

/// Logfile size in bytes, rejecting sizes that do not fit a u32
fn logfile_size_bytes(mb: u32) -> slotlog::Result<u32> {
    mb.checked_mul(1024 * 1024).ok_or_else(|| {
        SlotError::Config(format!("Logfile size of {} MB exceeds {} bytes", mb, u32::MAX))
    })
}

fn write_records(
    slots: &Slots,
    writer: usize,
    records: usize,
    record_size: u32,
    sync_every: usize,
) -> slotlog::Result<()> {
    let mut backoff = Duration::from_millis(1);

    for i in 0..records {
        let mut info = loop {
            match slots.next_unused(record_size) {
                Ok(info) => break info,
                Err(e) if e.is_retryable() => {
                    tracing::warn!(writer, error = %e, "handout failed, retrying");
                    thread::sleep(backoff);
                    backoff = (backoff * 2).min(Duration::from_millis(100));
                }
                Err(e) => return Err(e),
            }
        };
        backoff = Duration::from_millis(1);

        let fill = (writer as u8).wrapping_add(i as u8);
        info.buffer_mut().fill(fill);

        let wait = sync_every > 0 && i % sync_every == 0;
        slots.return_used(info, wait)?;
    }
    Ok(())
}
