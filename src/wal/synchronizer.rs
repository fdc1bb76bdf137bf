//! Synchronizer
//!
//! Background thread that drains sync regions from the ring, writes them
//! to their logfiles and fsyncs them.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, error, info};

use crate::error::Result;

use super::Slots;

/// Handle to the running synchronizer thread
pub struct Synchronizer {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Synchronizer {
    /// Spawn the synchronizer
    ///
    /// It runs a sync pass whenever `signal` fires, and at least every
    /// `interval`.
    pub fn start(slots: Arc<Slots>, signal: Receiver<()>, interval: Duration) -> Result<Self> {
        let (stop_tx, stop_rx) = channel::bounded(1);

        let handle = thread::Builder::new()
            .name("slotlog-sync".to_string())
            .spawn(move || Self::run(&slots, signal, stop_rx, interval))?;

        info!(interval_ms = interval.as_millis() as u64, "synchronizer started");

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Write and sync every region that is ready right now
    ///
    /// Returns the number of slots recycled. On a failed write the region
    /// is abandoned and the error returned; committed ticks do not move.
    pub fn sync_pending(slots: &Slots) -> Result<usize> {
        let mut synced = 0;
        while let Some(region) = slots.get_sync_region() {
            if let Err(err) = region.write_to_disk() {
                slots.abandon_sync_region(region);
                return Err(err);
            }
            synced += region.slot_count();
            slots.return_sync_region(region);
        }
        Ok(synced)
    }

    /// Stop the thread after a final sync pass and wait for it
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("synchronizer thread panicked");
            }
        }
    }

    fn run(slots: &Slots, signal: Receiver<()>, stop: Receiver<()>, interval: Duration) {
        let mut signal = signal;

        loop {
            let mut disconnected = false;
            crossbeam::channel::select! {
                recv(stop) -> _ => break,
                recv(signal) -> msg => disconnected = msg.is_err(),
                default(interval) => {}
            }

            if disconnected {
                debug!("sync signal disconnected, falling back to interval");
                signal = channel::never();
            }

            match Self::sync_pending(slots) {
                Ok(0) => {}
                Ok(synced) => debug!(synced, "sync pass done"),
                Err(e) => error!(error = %e, "sync pass failed"),
            }
        }

        if let Err(e) = Self::sync_pending(slots) {
            error!(error = %e, "final sync pass failed");
        }
        info!("synchronizer stopped");
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
