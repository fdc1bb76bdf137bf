//! Slot bookkeeping record
//!
//! A slot lives at a fixed index in the ring for the lifetime of the ring.
//! It is reset on recycle, never freed.

use std::sync::Arc;

use bytes::Bytes;

use crate::logfile::{Logfile, LogfileId};

use super::MarkerKind;

/// Sequence number marking write order
pub type Tick = u64;

/// Lifecycle of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// Free for handout
    Unused,

    /// Handed out, the writer still owns the buffer
    UsedPending,

    /// Returned by the writer, waiting to be synced
    Used,
}

pub(crate) struct Slot {
    status: SlotStatus,
    tick: Tick,
    logfile: Option<Arc<Logfile>>,
    offset: u64,
    size: u32,
    kind: MarkerKind,
    wait_for_sync: bool,
    payload: Option<Bytes>,
}

impl Slot {
    pub(crate) fn new() -> Self {
        Self {
            status: SlotStatus::Unused,
            tick: 0,
            logfile: None,
            offset: 0,
            size: 0,
            kind: MarkerKind::Data,
            wait_for_sync: false,
            payload: None,
        }
    }

    pub(crate) fn status(&self) -> SlotStatus {
        self.status
    }

    pub(crate) fn is_unused(&self) -> bool {
        self.status == SlotStatus::Unused
    }

    pub(crate) fn is_returned(&self) -> bool {
        self.status == SlotStatus::Used
    }

    pub(crate) fn tick(&self) -> Tick {
        self.tick
    }

    pub(crate) fn logfile(&self) -> Option<&Arc<Logfile>> {
        self.logfile.as_ref()
    }

    pub(crate) fn logfile_id(&self) -> Option<LogfileId> {
        self.logfile.as_ref().map(|logfile| logfile.id())
    }

    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn size(&self) -> u32 {
        self.size
    }

    pub(crate) fn kind(&self) -> MarkerKind {
        self.kind
    }

    pub(crate) fn wait_for_sync(&self) -> bool {
        self.wait_for_sync
    }

    pub(crate) fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    /// Unused -> UsedPending
    pub(crate) fn set_used(
        &mut self,
        logfile: Arc<Logfile>,
        offset: u64,
        size: u32,
        tick: Tick,
        kind: MarkerKind,
    ) {
        debug_assert!(self.is_unused());
        self.status = SlotStatus::UsedPending;
        self.logfile = Some(logfile);
        self.offset = offset;
        self.size = size;
        self.tick = tick;
        self.kind = kind;
        self.wait_for_sync = false;
        self.payload = None;
    }

    /// UsedPending -> Used
    pub(crate) fn set_returned(&mut self, payload: Bytes, wait_for_sync: bool) {
        debug_assert_eq!(self.status, SlotStatus::UsedPending);
        debug_assert_eq!(payload.len(), self.size as usize);
        self.status = SlotStatus::Used;
        self.payload = Some(payload);
        self.wait_for_sync = wait_for_sync;
    }

    /// Used -> Unused, handing back the logfile the slot pointed into
    pub(crate) fn set_unused(&mut self) -> Option<Arc<Logfile>> {
        self.status = SlotStatus::Unused;
        self.tick = 0;
        self.offset = 0;
        self.size = 0;
        self.kind = MarkerKind::Data;
        self.wait_for_sync = false;
        self.payload = None;
        self.logfile.take()
    }
}
