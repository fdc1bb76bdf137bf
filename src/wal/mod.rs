//! Write-Ahead Log (WAL) Slot Module
//!
//! Hands out append-only regions of rotating logfiles to concurrent
//! writers and batches finished regions into fsync-sized sync regions.
//!
//! ## Responsibilities
//! - Reserve non-overlapping byte ranges inside the active logfile
//! - Mint strictly increasing ticks in handout order
//! - Rotate logfiles transparently when the active one runs out of room
//! - Collect contiguous returned slots into sync regions
//! - Track the durable tick watermark and wake durability waiters
//!
//! ## Ring Layout
//! ```text
//!            recycle_index                handout_index
//!                 │                            │
//!                 ▼                            ▼
//! ┌────────┬────────┬────────┬────────┬────────┬────────┬────────┐
//! │ Unused │  Used  │  Used  │Pending │  Used  │ Unused │ Unused │
//! └────────┴────────┴────────┴────────┴────────┴────────┴────────┘
//!                 └── sync region ──┘
//!                   (stops at the first slot still being written)
//! ```

mod legend;
mod marker;
mod slot;
mod slot_info;
mod slots;
mod sync_region;
mod synchronizer;

pub use legend::{CollectionId, LegendLocation, LegendSlot, ShapeId};
pub use marker::{Marker, MarkerKind, MARKER_MAGIC, MARKER_SIZE};
pub use slot::{SlotStatus, Tick};
pub use slot_info::{SlotInfo, SlotInfoCopy};
pub use slots::{Slots, Statistics};
pub use sync_region::SyncRegion;
pub use synchronizer::Synchronizer;

/// Alignment of every reservation inside a logfile
pub const SLOT_ALIGNMENT: u32 = 8;

/// Round a size up to the slot alignment
pub fn align_size(size: u32) -> u32 {
    (size + SLOT_ALIGNMENT - 1) & !(SLOT_ALIGNMENT - 1)
}
