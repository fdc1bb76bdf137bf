//! # slotlog
//!
//! A slot-based write-ahead log buffer manager with:
//! - Concurrent slot handout over rotating, fixed-size logfiles
//! - Strictly increasing ticks assigned in handout order
//! - Batched fsync of contiguous returned slots
//! - Durability waits on a committed-tick watermark
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Writers                              │
//! │        next_unused → fill buffer → return_used              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     Slot Ring                               │
//! │     (handout cursor / recycle cursor / tick counters)       │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │ rotation                         │ sync regions
//!            ▼                                  ▼
//!   ┌─────────────────┐                ┌─────────────────┐
//!   │ LogfileManager  │                │  Synchronizer   │
//!   │ request/reclaim │                │  write + fsync  │
//!   └────────┬────────┘                └────────┬────────┘
//!            │                                  │
//!            └──────────────┬───────────────────┘
//!                           ▼
//!                   ┌──────────────┐
//!                   │   Logfiles   │
//!                   └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod logfile;
pub mod wal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, SlotError};
pub use config::Config;
pub use logfile::{DirectoryLogfileManager, Logfile, LogfileId, LogfileManager, LogfileStatus};
pub use wal::{SlotInfo, SlotInfoCopy, Slots, Statistics, SyncRegion, Synchronizer, Tick};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of slotlog
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
