//! Logfile Module
//!
//! Physical append-only files backing the slot ring.
//!
//! ## Responsibilities
//! - Hold a fixed-capacity file and its write cursor
//! - Track the tick range and the slots still pointing into the file
//! - Write synced regions at their offsets and fsync them
//! - Supply and reclaim logfiles through the `LogfileManager` trait
//!
//! ## Status Transitions
//! ```text
//! ┌───────┐  header   ┌────────┐  sealed   ┌─────────┐ recycled ┌────────┐
//! │ Empty │──────────▶│ Active │──────────▶│ Closing │─────────▶│ Closed │
//! └───────┘           └────────┘           └─────────┘          └────────┘
//! ```

mod logfile;
mod manager;

pub use logfile::{Logfile, LogfileId, LogfileStatus};
pub use manager::{DirectoryLogfileManager, LogfileManager};
