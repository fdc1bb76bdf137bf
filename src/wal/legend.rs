//! Legend tracking for the legend-aware handout
//!
//! A legend is a schema blob shared by all records of one
//! (collection, shape) pair. It only needs to be embedded once per
//! logfile; later records in the same file point at the first copy.

use std::collections::HashMap;

use crate::logfile::LogfileId;

use super::SlotInfo;

pub type CollectionId = u64;
pub type ShapeId = u64;

/// Where an already embedded legend lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegendLocation {
    pub logfile_id: LogfileId,
    pub offset: u64,
    pub size: u32,
}

/// Result of `Slots::next_unused_with_legend`
#[derive(Debug)]
pub struct LegendSlot {
    slot: SlotInfo,
    existing_legend: Option<LegendLocation>,
}

impl LegendSlot {
    pub(crate) fn new(slot: SlotInfo, existing_legend: Option<LegendLocation>) -> Self {
        Self { slot, existing_legend }
    }

    /// Whether the caller must write the legend into this slot
    pub fn legend_included(&self) -> bool {
        self.existing_legend.is_none()
    }

    /// The legend already present in the logfile, if the write was elided
    pub fn existing_legend(&self) -> Option<LegendLocation> {
        self.existing_legend
    }

    pub fn slot_info(&mut self) -> &mut SlotInfo {
        &mut self.slot
    }

    pub fn into_slot_info(self) -> SlotInfo {
        self.slot
    }
}

/// Legends embedded in the active logfile
#[derive(Debug, Default)]
pub(crate) struct LegendCache {
    logfile_id: Option<LogfileId>,
    entries: HashMap<(CollectionId, ShapeId), LegendLocation>,
}

impl LegendCache {
    /// Forget everything; called whenever the active logfile changes
    pub(crate) fn reset(&mut self, logfile_id: Option<LogfileId>) {
        self.logfile_id = logfile_id;
        self.entries.clear();
    }

    pub(crate) fn lookup(
        &self,
        logfile_id: LogfileId,
        collection_id: CollectionId,
        shape_id: ShapeId,
    ) -> Option<LegendLocation> {
        if self.logfile_id != Some(logfile_id) {
            return None;
        }
        self.entries.get(&(collection_id, shape_id)).copied()
    }

    pub(crate) fn register(
        &mut self,
        collection_id: CollectionId,
        shape_id: ShapeId,
        location: LegendLocation,
    ) {
        if self.logfile_id != Some(location.logfile_id) {
            self.reset(Some(location.logfile_id));
        }
        self.entries.insert((collection_id, shape_id), location);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}
