//! A single logfile
//!
//! Space is reserved under the ring lock; bytes are written later by the
//! synchronizer, outside of it.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{Result, SlotError};
use crate::wal::{MarkerKind, Tick};

/// Logfile identifier (never 0)
pub type LogfileId = u64;

/// Lifecycle of a logfile as seen by the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogfileStatus {
    /// Obtained but no header written yet
    Empty,

    /// Accepts new handouts
    Active,

    /// Sealed, slots pointing into it are still pending sync
    Closing,

    /// All referencing slots recycled, ready for reclamation
    Closed,
}

#[derive(Debug)]
struct LogfileState {
    status: LogfileStatus,
    used: u64,
    tick_min: Tick,
    tick_max: Tick,
    data_records: u64,
    outstanding_slots: usize,
}

/// A fixed-capacity append-only file
#[derive(Debug)]
pub struct Logfile {
    id: LogfileId,
    path: PathBuf,
    capacity: u32,
    file: Mutex<File>,
    state: Mutex<LogfileState>,
}

impl Logfile {
    /// Create (or truncate) the file for `id` inside `dir`
    ///
    /// The file is sized to `capacity` up front.
    pub fn create(dir: &Path, id: LogfileId, capacity: u32) -> Result<Self> {
        if id == 0 {
            return Err(SlotError::InvalidState("logfile id 0 is reserved".to_string()));
        }

        let path = Self::path_for(dir, id);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(capacity as u64)?;

        Ok(Self {
            id,
            path,
            capacity,
            file: Mutex::new(file),
            state: Mutex::new(LogfileState {
                status: LogfileStatus::Empty,
                used: 0,
                tick_min: 0,
                tick_max: 0,
                data_records: 0,
                outstanding_slots: 0,
            }),
        })
    }

    /// File path for a logfile id
    /// 42 → "{dir}/logfile-000042.db"
    pub fn path_for(dir: &Path, id: LogfileId) -> PathBuf {
        dir.join(format!("logfile-{:06}.db", id))
    }

    /// Parse the logfile id from a file name
    /// "logfile-000042.db" → Some(42)
    pub fn parse_id(path: &Path) -> Option<LogfileId> {
        if path.extension()? != "db" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        name.strip_prefix("logfile-")?.parse().ok()
    }

    pub fn id(&self) -> LogfileId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn status(&self) -> LogfileStatus {
        self.state.lock().status
    }

    pub fn set_status(&self, status: LogfileStatus) {
        self.state.lock().status = status;
    }

    /// Bytes already reserved
    pub fn used_size(&self) -> u64 {
        self.state.lock().used
    }

    /// Bytes still available for reservation
    pub fn free_size(&self) -> u64 {
        self.capacity as u64 - self.state.lock().used
    }

    /// Ticks of the first and last reservation, (0, 0) if none
    pub fn tick_range(&self) -> (Tick, Tick) {
        let state = self.state.lock();
        (state.tick_min, state.tick_max)
    }

    /// Whether any caller record was reserved in this file
    pub fn has_data(&self) -> bool {
        self.state.lock().data_records > 0
    }

    /// Slots in the ring still pointing into this file
    pub fn outstanding_slots(&self) -> usize {
        self.state.lock().outstanding_slots
    }

    /// Reserve `size` bytes at the end of the file for `tick`
    pub(crate) fn reserve(&self, size: u32, tick: Tick, kind: MarkerKind) -> Result<u64> {
        let mut state = self.state.lock();
        if state.used + size as u64 > self.capacity as u64 {
            return Err(SlotError::OutOfSpace { requested: size as u64 });
        }

        let offset = state.used;
        state.used += size as u64;
        if state.tick_min == 0 {
            state.tick_min = tick;
        }
        state.tick_max = tick;
        state.outstanding_slots += 1;
        if kind == MarkerKind::Data {
            state.data_records += 1;
        }
        Ok(offset)
    }

    /// A slot pointing into this file was recycled; returns how many remain
    pub(crate) fn slot_recycled(&self) -> usize {
        let mut state = self.state.lock();
        debug_assert!(state.outstanding_slots > 0);
        state.outstanding_slots = state.outstanding_slots.saturating_sub(1);
        state.outstanding_slots
    }

    /// Write `chunks` back to back starting at `offset`, then fsync
    pub fn write_and_sync(&self, offset: u64, chunks: &[Bytes]) -> Result<()> {
        let total: u64 = chunks.iter().map(|chunk| chunk.len() as u64).sum();
        if offset + total > self.capacity as u64 {
            return Err(SlotError::InvalidState(format!(
                "write of {} bytes at {} exceeds logfile {} capacity {}",
                total, offset, self.id, self.capacity
            )));
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        for chunk in chunks {
            file.write_all(chunk)?;
        }
        file.sync_data()?;
        Ok(())
    }
}
