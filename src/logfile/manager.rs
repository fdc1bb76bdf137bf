//! Logfile Manager
//!
//! Supplies logfiles to the ring and takes them back once closed.
//!
//! ## Responsibilities
//! - Hand out a logfile with at least the requested free space
//! - Receive status transitions reported by the ring
//! - Keep closed logfiles on disk as reclaimable until explicitly removed
//! - Forward sync solicitations to the synchronizer

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, SlotError};

use super::{Logfile, LogfileId, LogfileStatus};

/// Narrow interface the ring uses to obtain and give back logfiles
///
/// The ring calls `request_new_logfile`, `status_changed` and
/// `signal_sync` while holding its lock, so implementations must not call
/// back into the ring from them.
pub trait LogfileManager: Send + Sync {
    /// Obtain a logfile with at least `min_free_bytes` of free space
    fn request_new_logfile(&self, min_free_bytes: u32) -> Result<Arc<Logfile>>;

    /// Take back a closed logfile
    fn reclaim(&self, logfile_id: LogfileId);

    /// A logfile changed status
    fn status_changed(&self, logfile_id: LogfileId, status: LogfileStatus);

    /// Ask for a sync pass as soon as possible
    fn signal_sync(&self);
}

struct LogfileSet {
    /// Handed out to the ring, not yet reclaimed
    live: BTreeMap<LogfileId, Arc<Logfile>>,

    /// Closed and fully synced; kept until `remove_reclaimed`
    reclaimable: BTreeSet<LogfileId>,
}

impl LogfileSet {
    fn on_disk(&self) -> usize {
        self.live.len() + self.reclaimable.len()
    }
}

/// Directory-backed manager: one file per logfile id
///
/// ## Concurrency:
/// - `files`: live and reclaimable sets, protected by one Mutex (touched only on
///   rotation, reclaim and removal)
/// - `next_id`: Atomic counter (lock-free)
/// - Sync signals go through a bounded(1) channel; extra signals coalesce
pub struct DirectoryLogfileManager {
    /// Directory where logfiles live
    dir: PathBuf,

    /// Capacity of every created logfile
    logfile_size: u32,

    /// Upper bound on logfiles on disk at once (None = unlimited)
    max_logfiles: Option<usize>,

    /// Logfiles handed out and not yet reclaimed, plus closed ones on disk
    files: Mutex<LogfileSet>,

    /// Next id to create
    next_id: AtomicU64,

    sync_tx: Sender<()>,
    sync_rx: Receiver<()>,
}

impl DirectoryLogfileManager {
    /// Open the logfile directory described by `config`
    ///
    /// Existing logfiles are left in place and listed as reclaimable; new
    /// ids continue after the highest one found.
    pub fn open(config: &Config) -> Result<Self> {
        Self::open_dir(&config.log_dir, config.logfile_size)
    }

    /// Open a logfile directory directly
    pub fn open_dir(dir: &Path, logfile_size: u32) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let existing: BTreeSet<LogfileId> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| Logfile::parse_id(&entry.path()))
            .collect();
        let highest = existing.iter().next_back().copied().unwrap_or(0);

        if highest > 0 {
            info!(dir = %dir.display(), count = existing.len(), highest, "found existing logfiles");
        }

        let (sync_tx, sync_rx) = channel::bounded(1);

        Ok(Self {
            dir: dir.to_path_buf(),
            logfile_size,
            max_logfiles: None,
            files: Mutex::new(LogfileSet {
                live: BTreeMap::new(),
                reclaimable: existing,
            }),
            next_id: AtomicU64::new(highest + 1),
            sync_tx,
            sync_rx,
        })
    }

    /// Limit how many logfiles may exist on disk at once, reclaimable
    /// ones included
    pub fn with_max_logfiles(mut self, max: usize) -> Self {
        self.max_logfiles = Some(max);
        self
    }

    /// Receiver side of the sync signal, for the synchronizer
    pub fn sync_listener(&self) -> Receiver<()> {
        self.sync_rx.clone()
    }

    /// Get the logfile directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Look up a logfile that has not been reclaimed yet
    pub fn logfile(&self, id: LogfileId) -> Option<Arc<Logfile>> {
        self.files.lock().live.get(&id).cloned()
    }

    /// Ids of all logfiles not yet reclaimed, ascending
    pub fn logfile_ids(&self) -> Vec<LogfileId> {
        self.files.lock().live.keys().copied().collect()
    }

    /// Ids of closed logfiles still on disk, ascending
    pub fn reclaimable_ids(&self) -> Vec<LogfileId> {
        self.files.lock().reclaimable.iter().copied().collect()
    }

    /// Delete a reclaimable logfile once its records have been applied
    ///
    /// Returns false if `id` is not reclaimable (unknown, or still in use
    /// by the ring).
    pub fn remove_reclaimed(&self, id: LogfileId) -> Result<bool> {
        let mut files = self.files.lock();
        if !files.reclaimable.contains(&id) {
            return Ok(false);
        }

        match fs::remove_file(Logfile::path_for(&self.dir, id)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        files.reclaimable.remove(&id);

        debug!(logfile_id = id, "removed reclaimed logfile");
        Ok(true)
    }
}

impl LogfileManager for DirectoryLogfileManager {
    fn request_new_logfile(&self, min_free_bytes: u32) -> Result<Arc<Logfile>> {
        if min_free_bytes > self.logfile_size {
            return Err(SlotError::OutOfSpace { requested: min_free_bytes as u64 });
        }

        let mut files = self.files.lock();
        if let Some(max) = self.max_logfiles {
            if files.on_disk() >= max {
                warn!(
                    live = files.live.len(),
                    reclaimable = files.reclaimable.len(),
                    max,
                    "logfile limit reached"
                );
                return Err(SlotError::OutOfSpace { requested: min_free_bytes as u64 });
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let logfile = Logfile::create(&self.dir, id, self.logfile_size).map_err(|e| {
            SlotError::AllocationFailed(format!("cannot create logfile {}: {}", id, e))
        })?;
        let logfile = Arc::new(logfile);
        files.live.insert(id, Arc::clone(&logfile));

        debug!(logfile_id = id, size = self.logfile_size, "created logfile");
        Ok(logfile)
    }

    fn reclaim(&self, logfile_id: LogfileId) {
        let mut files = self.files.lock();
        if files.live.remove(&logfile_id).is_none() {
            warn!(logfile_id, "reclaim of unknown logfile");
            return;
        }
        files.reclaimable.insert(logfile_id);
        debug!(logfile_id, reclaimable = files.reclaimable.len(), "logfile reclaimable");
    }

    fn status_changed(&self, logfile_id: LogfileId, status: LogfileStatus) {
        debug!(logfile_id, ?status, "logfile status changed");
    }

    fn signal_sync(&self) {
        // a pending signal already covers this request
        let _ = self.sync_tx.try_send(());
    }
}
