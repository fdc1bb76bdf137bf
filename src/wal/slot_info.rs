//! Slot handles given to writers

use bytes::{Bytes, BytesMut};

use crate::error::{Result, SlotError};
use crate::logfile::LogfileId;

use super::Tick;

/// Exclusive write capability over one reserved slot
///
/// Obtained from `Slots::next_unused`. The writer fills the buffer and
/// hands the whole `SlotInfo` back through `Slots::return_used`, after
/// which the bytes belong to the synchronizer and are read-only.
#[derive(Debug)]
pub struct SlotInfo {
    index: usize,
    tick: Tick,
    logfile_id: LogfileId,
    offset: u64,
    size: u32,
    buffer: BytesMut,
}

impl SlotInfo {
    pub(crate) fn new(
        index: usize,
        tick: Tick,
        logfile_id: LogfileId,
        offset: u64,
        size: u32,
        aligned_size: u32,
    ) -> Self {
        Self {
            index,
            tick,
            logfile_id,
            offset,
            size,
            buffer: BytesMut::zeroed(aligned_size as usize),
        }
    }

    /// Tick assigned to this record
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Logfile the record will be written to
    pub fn logfile_id(&self) -> LogfileId {
        self.logfile_id
    }

    /// Byte offset of the record inside its logfile
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of writable bytes
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Index of the slot in the ring
    pub fn slot_index(&self) -> usize {
        self.index
    }

    /// The writable region, exactly `size()` bytes long
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[..self.size as usize]
    }

    /// Copy `payload` to the start of the writable region
    pub fn write(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.size as usize {
            return Err(SlotError::InvalidState(format!(
                "payload of {} bytes does not fit slot of {} bytes",
                payload.len(),
                self.size
            )));
        }
        self.buffer[..payload.len()].copy_from_slice(payload);
        Ok(())
    }

    /// Detach a plain copy that outlives the slot
    pub fn copy(&self) -> SlotInfoCopy {
        SlotInfoCopy {
            tick: self.tick,
            logfile_id: self.logfile_id,
            offset: self.offset,
            size: self.size,
        }
    }

    pub(crate) fn into_parts(self) -> (usize, Tick, Bytes) {
        (self.index, self.tick, self.buffer.freeze())
    }
}

impl AsMut<[u8]> for SlotInfo {
    fn as_mut(&mut self) -> &mut [u8] {
        self.buffer_mut()
    }
}

/// Snapshot of a handed-out slot
///
/// Stays valid after the slot itself has been recycled and reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfoCopy {
    pub tick: Tick,
    pub logfile_id: LogfileId,
    pub offset: u64,
    pub size: u32,
}
