//! Configuration for slotlog
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, SlotError};
use crate::wal::{MARKER_SIZE, SLOT_ALIGNMENT};

/// Main configuration for a slot ring and its logfiles
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the logfiles
    /// Internal structure:
    ///   {log_dir}/
    ///     ├── logfile-000001.db
    ///     └── logfile-000002.db
    pub log_dir: PathBuf,

    /// Capacity of each logfile (in bytes)
    pub logfile_size: u32,

    // -------------------------------------------------------------------------
    // Ring Configuration
    // -------------------------------------------------------------------------
    /// Number of slots in the ring (max records in flight)
    pub number_of_slots: usize,

    // -------------------------------------------------------------------------
    // Sync Configuration
    // -------------------------------------------------------------------------
    /// How often the synchronizer runs without being signalled
    pub sync_interval: Duration,

    /// How long `flush(true)` waits for its tick to become durable
    pub sync_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./slotlog_data"),
            logfile_size: 32 * 1024 * 1024, // 32 MB
            number_of_slots: 64 * 1024,
            sync_interval: Duration::from_millis(100),
            sync_timeout: Duration::from_secs(15),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Largest payload a single slot may carry
    ///
    /// A logfile must hold its header, the record, and a footer.
    pub fn max_payload_size(&self) -> u32 {
        max_payload_size(self.logfile_size)
    }

    /// Reject values the ring cannot work with
    pub fn validate(&self) -> Result<()> {
        // a rotation needs a footer, a header and the record itself
        if self.number_of_slots < 3 {
            return Err(SlotError::Config(format!(
                "number_of_slots must be at least 3, got {}",
                self.number_of_slots
            )));
        }
        if self.max_payload_size() == 0 {
            return Err(SlotError::Config(format!(
                "logfile_size {} cannot hold a header, a footer and a record",
                self.logfile_size
            )));
        }
        if self.sync_interval.is_zero() {
            return Err(SlotError::Config("sync_interval must be non-zero".to_string()));
        }
        Ok(())
    }
}

pub(crate) fn max_payload_size(logfile_size: u32) -> u32 {
    let usable = logfile_size.saturating_sub(2 * MARKER_SIZE);
    // round down so an aligned reservation still fits
    usable - usable % SLOT_ALIGNMENT
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the logfile directory
    pub fn log_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_dir = path.into();
        self
    }

    /// Set the capacity of each logfile (in bytes)
    pub fn logfile_size(mut self, size: u32) -> Self {
        self.config.logfile_size = size;
        self
    }

    /// Set the number of slots in the ring
    pub fn number_of_slots(mut self, count: usize) -> Self {
        self.config.number_of_slots = count;
        self
    }

    /// Set the synchronizer interval
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.config.sync_interval = interval;
        self
    }

    /// Set the sync timeout used by `flush(true)`
    pub fn sync_timeout(mut self, timeout: Duration) -> Self {
        self.config.sync_timeout = timeout;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
