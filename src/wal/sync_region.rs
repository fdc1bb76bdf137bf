//! Sync regions
//!
//! A contiguous run of returned slots inside one logfile, flushed with a
//! single write + fsync.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;
use crate::logfile::{Logfile, LogfileId};

use super::slot::Slot;
use super::{MarkerKind, Tick};

/// A span of slots ready to be written and synced
#[derive(Debug)]
pub struct SyncRegion {
    logfile: Arc<Logfile>,
    chunks: Vec<Bytes>,
    begin: u64,
    end: u64,
    first_slot_index: usize,
    last_slot_index: usize,
    slot_count: usize,
    min_tick: Tick,
    max_tick: Tick,
    pub(crate) check_more: bool,
    pub(crate) can_seal: bool,
    wait_for_sync: bool,
}

impl SyncRegion {
    /// Start a region at a returned slot
    pub(crate) fn start(index: usize, slot: &Slot, logfile: Arc<Logfile>) -> Self {
        let mut region = Self {
            logfile,
            chunks: Vec::new(),
            begin: slot.offset(),
            end: slot.offset(),
            first_slot_index: index,
            last_slot_index: index,
            slot_count: 0,
            min_tick: slot.tick(),
            max_tick: slot.tick(),
            check_more: false,
            can_seal: false,
            wait_for_sync: false,
        };
        region.extend(index, slot);
        region
    }

    /// Append the next slot of the same logfile
    pub(crate) fn extend(&mut self, index: usize, slot: &Slot) {
        debug_assert_eq!(slot.offset(), self.end, "slots of one logfile must be contiguous");
        if let Some(payload) = slot.payload() {
            self.chunks.push(payload.clone());
        }
        self.end = slot.offset() + slot.size() as u64;
        self.last_slot_index = index;
        self.slot_count += 1;
        self.max_tick = slot.tick();
        self.wait_for_sync |= slot.wait_for_sync();
        if slot.kind() == MarkerKind::Footer {
            // nothing can follow a footer in this logfile
            self.can_seal = true;
        }
    }

    /// Write the region at its file offset and fsync it
    pub fn write_to_disk(&self) -> Result<()> {
        self.logfile.write_and_sync(self.begin, &self.chunks)
    }

    pub fn logfile(&self) -> &Arc<Logfile> {
        &self.logfile
    }

    pub fn logfile_id(&self) -> LogfileId {
        self.logfile.id()
    }

    /// File range covered, `[begin, end)`
    pub fn file_range(&self) -> (u64, u64) {
        (self.begin, self.end)
    }

    /// Number of bytes to be written
    pub fn len(&self) -> u64 {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.slot_count == 0
    }

    /// Payload chunks in file order
    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    /// Ticks covered, inclusive
    pub fn tick_range(&self) -> (Tick, Tick) {
        (self.min_tick, self.max_tick)
    }

    pub fn first_slot_index(&self) -> usize {
        self.first_slot_index
    }

    pub fn last_slot_index(&self) -> usize {
        self.last_slot_index
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// More synced data is ready right behind this region (next logfile)
    pub fn check_more(&self) -> bool {
        self.check_more
    }

    /// No more handouts will land in this region's logfile
    pub fn can_seal(&self) -> bool {
        self.can_seal
    }

    /// Some writer in the region is blocked on its durability
    pub fn wait_for_sync(&self) -> bool {
        self.wait_for_sync
    }
}
