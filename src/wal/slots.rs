//! The slot ring
//!
//! Hands out slots to writers, collects returned slots into sync regions,
//! and tracks the committed tick watermark.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::error::{Result, SlotError};
use crate::logfile::{Logfile, LogfileId, LogfileManager, LogfileStatus};

use super::legend::{CollectionId, LegendCache, LegendLocation, LegendSlot, ShapeId};
use super::slot::Slot;
use super::{align_size, Marker, MarkerKind, SlotInfo, SlotStatus, SyncRegion, Tick, MARKER_SIZE};

/// Tick counters and event count of a ring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub last_assigned_tick: Tick,
    pub last_committed_tick: Tick,
    pub last_committed_data_tick: Tick,
    pub num_events: u64,
}

/// Everything guarded by the ring lock
struct RingState {
    /// All slots, addressed by index
    slots: Vec<Slot>,

    /// Number of Unused slots
    free_slots: usize,

    /// Threads blocked on a tick or on a free slot
    waiting: u32,

    /// Index of the slot to hand out next
    handout_index: usize,

    /// Index of the oldest slot not yet recycled
    recycle_index: usize,

    /// The logfile accepting handouts
    logfile: Option<Arc<Logfile>>,

    /// Sealed logfiles whose slots are not all recycled yet
    closing: Vec<Arc<Logfile>>,

    /// Legends embedded in the active logfile
    legends: LegendCache,

    last_assigned_tick: Tick,
    last_committed_tick: Tick,
    last_committed_data_tick: Tick,

    /// Number of slots recycled
    num_events: u64,

    /// A sync region has been handed out and not yet returned
    region_outstanding: bool,

    shutdown: bool,
}

impl RingState {
    fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.slots.len()
    }

    /// Slots consumed by placing a record of `aligned` bytes
    ///
    /// Whether a new logfile needs a header is only known once the manager
    /// hands it out, so rotation always counts one. A manager returning an
    /// already Active logfile makes the handout wait for one slot too many.
    fn slots_needed(&self, aligned: u32) -> usize {
        match &self.logfile {
            Some(logfile) if fits(logfile, aligned) => 1,
            // footer, header, record
            Some(_) => 3,
            // header, record
            None => 2,
        }
    }

    /// Take the slot under the handout cursor for `tick`
    fn claim(&mut self, tick: Tick) -> usize {
        let index = self.handout_index;
        debug_assert!(self.slots[index].is_unused());
        debug_assert_eq!(tick, self.last_assigned_tick + 1);
        self.handout_index = self.next_index(index);
        self.last_assigned_tick = tick;
        self.free_slots -= 1;
        index
    }
}

/// Room for the record plus the footer that will eventually seal the file
fn fits(logfile: &Logfile, aligned: u32) -> bool {
    logfile.free_size() >= aligned as u64 + MARKER_SIZE as u64
}

fn shut_down_error() -> SlotError {
    SlotError::InvalidState("slot ring is shut down".to_string())
}

/// A data slot claimed under the lock, turned into a `SlotInfo` after
struct Reservation {
    index: usize,
    tick: Tick,
    logfile_id: LogfileId,
    offset: u64,
    size: u32,
    aligned: u32,
}

impl Reservation {
    fn into_slot_info(self) -> SlotInfo {
        SlotInfo::new(
            self.index,
            self.tick,
            self.logfile_id,
            self.offset,
            self.size,
            self.aligned,
        )
    }
}

/// Fixed-capacity ring of slots over rotating logfiles
///
/// ## Concurrency:
/// - `state`: one Mutex for cursors, ticks and slot status; never held
///   while payload is copied or while a region is written to disk
/// - `condition`: broadcast when slots are recycled or on shutdown; every
///   waiter re-checks its predicate in a loop
pub struct Slots {
    manager: Arc<dyn LogfileManager>,
    state: Mutex<RingState>,
    condition: Condvar,
    number_of_slots: usize,
    max_payload_size: u32,
    sync_timeout: Duration,
}

impl Slots {
    /// Create a ring with `number_of_slots` slots over logfiles of
    /// `logfile_size` bytes, continuing after `last_tick`
    pub fn new(
        manager: Arc<dyn LogfileManager>,
        number_of_slots: usize,
        logfile_size: u32,
        last_tick: Tick,
    ) -> Result<Self> {
        let config = Config::builder()
            .number_of_slots(number_of_slots)
            .logfile_size(logfile_size)
            .build();
        Self::from_config(manager, &config, last_tick)
    }

    /// Create a ring from a validated config
    pub fn from_config(
        manager: Arc<dyn LogfileManager>,
        config: &Config,
        last_tick: Tick,
    ) -> Result<Self> {
        config.validate()?;

        let number_of_slots = config.number_of_slots;
        let slots = (0..number_of_slots).map(|_| Slot::new()).collect();

        info!(
            number_of_slots,
            logfile_size = config.logfile_size,
            last_tick,
            "slot ring created"
        );

        Ok(Self {
            manager,
            state: Mutex::new(RingState {
                slots,
                free_slots: number_of_slots,
                waiting: 0,
                handout_index: 0,
                recycle_index: 0,
                logfile: None,
                closing: Vec::new(),
                legends: LegendCache::default(),
                last_assigned_tick: last_tick,
                last_committed_tick: last_tick,
                last_committed_data_tick: last_tick,
                num_events: 0,
                region_outstanding: false,
                shutdown: false,
            }),
            condition: Condvar::new(),
            number_of_slots,
            max_payload_size: config.max_payload_size(),
            sync_timeout: config.sync_timeout,
        })
    }

    // =========================================================================
    // Producer API
    // =========================================================================

    /// Reserve `size` bytes and a tick
    ///
    /// Blocks while the ring has no free slot. The returned `SlotInfo` is
    /// the only handle to the reserved bytes until `return_used`.
    pub fn next_unused(&self, size: u32) -> Result<SlotInfo> {
        let aligned = self.check_size(size)?;

        let reservation = {
            let mut state = self.state.lock();
            let logfile = self.prepare_handout(&mut state, aligned)?;
            Self::reserve_data(&mut state, &logfile, size, aligned)?
        };

        Ok(reservation.into_slot_info())
    }

    /// Reserve a record that embeds a shared legend of `legend_size` bytes
    ///
    /// `size` includes the legend, which goes at the tail of the record.
    /// Free space is checked for the full size; if the active logfile
    /// already holds this legend the reservation shrinks by `legend_size`
    /// and the existing location is returned instead.
    pub fn next_unused_with_legend(
        &self,
        size: u32,
        collection_id: CollectionId,
        shape_id: ShapeId,
        legend_size: u32,
    ) -> Result<LegendSlot> {
        if legend_size == 0 || legend_size >= size {
            return Err(SlotError::InvalidState(format!(
                "legend of {} bytes invalid for record of {} bytes",
                legend_size, size
            )));
        }
        let aligned = self.check_size(size)?;

        let (reservation, existing) = {
            let mut state = self.state.lock();
            let logfile = self.prepare_handout(&mut state, aligned)?;

            let existing = state.legends.lookup(logfile.id(), collection_id, shape_id);
            let record_size = match existing {
                Some(_) => size - legend_size,
                None => size,
            };
            let reservation =
                Self::reserve_data(&mut state, &logfile, record_size, align_size(record_size))?;

            if existing.is_none() {
                let location = LegendLocation {
                    logfile_id: logfile.id(),
                    offset: reservation.offset + (size - legend_size) as u64,
                    size: legend_size,
                };
                state.legends.register(collection_id, shape_id, location);
            }
            (reservation, existing)
        };

        Ok(LegendSlot::new(reservation.into_slot_info(), existing))
    }

    /// Hand a filled slot back for synchronization
    ///
    /// With `wait_for_sync`, solicits a sync pass and blocks until the
    /// slot's tick is durable.
    ///
    /// # Panics
    /// If the slot is not pending in this ring (returned twice, or handed
    /// out by another ring).
    pub fn return_used(&self, slot_info: SlotInfo, wait_for_sync: bool) -> Result<()> {
        let (index, tick, payload) = slot_info.into_parts();

        let solicit = {
            let mut state = self.state.lock();
            assert!(
                index < state.slots.len(),
                "returned slot index {} outside ring of {} slots",
                index,
                state.slots.len()
            );
            let slot = &mut state.slots[index];
            assert!(
                slot.status() == SlotStatus::UsedPending && slot.tick() == tick,
                "slot {} (tick {}) returned while not pending",
                index,
                tick
            );
            slot.set_returned(payload, wait_for_sync);
            wait_for_sync || state.waiting > 0
        };

        if solicit {
            self.manager.signal_sync();
        }

        if wait_for_sync && !self.wait_for_tick(tick) {
            return Err(SlotError::InvalidState(format!(
                "shut down before tick {} became durable",
                tick
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Synchronizer API
    // =========================================================================

    /// Collect the next contiguous run of returned slots
    ///
    /// Starts at the recycle cursor and stops at the first slot that is not
    /// returned yet or that belongs to another logfile. Returns `None` if
    /// nothing is ready or a region is already outstanding.
    pub fn get_sync_region(&self) -> Option<SyncRegion> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.region_outstanding {
            return None;
        }

        let mut index = state.recycle_index;
        let mut region: Option<SyncRegion> = None;

        loop {
            let slot = &state.slots[index];

            if !slot.is_returned() {
                // the writer of this slot moved on to another logfile
                if let (Some(current), Some(other)) = (region.as_mut(), slot.logfile_id()) {
                    if other != current.logfile_id() {
                        current.can_seal = true;
                    }
                }
                break;
            }

            let Some(logfile) = slot.logfile() else {
                break;
            };

            if let Some(current) = region.as_mut() {
                if current.logfile_id() != logfile.id() {
                    current.check_more = true;
                    current.can_seal = true;
                    break;
                }
                current.extend(index, slot);
            } else {
                region = Some(SyncRegion::start(index, slot, Arc::clone(logfile)));
            }

            index = state.next_index(index);
            if index == state.handout_index {
                break;
            }
        }

        if let Some(region) = &region {
            state.region_outstanding = true;
            let (min_tick, max_tick) = region.tick_range();
            trace!(
                logfile_id = region.logfile_id(),
                slots = region.slot_count(),
                bytes = region.len(),
                min_tick,
                max_tick,
                "sync region ready"
            );
        }
        region
    }

    /// Recycle the slots of a region that has been written and synced
    ///
    /// # Panics
    /// If `region` is not the outstanding region of this ring.
    pub fn return_sync_region(&self, region: SyncRegion) {
        let (notify, closed) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            assert!(
                state.region_outstanding && region.first_slot_index() == state.recycle_index,
                "sync region starting at slot {} returned out of order",
                region.first_slot_index()
            );

            let mut index = region.first_slot_index();
            loop {
                let slot = &mut state.slots[index];
                assert_eq!(slot.status(), SlotStatus::Used, "slot {} recycled while not used", index);

                let tick = slot.tick();
                debug_assert!(tick > state.last_committed_tick);
                state.last_committed_tick = tick;
                if slot.kind() == MarkerKind::Data {
                    state.last_committed_data_tick = tick;
                }

                if let Some(logfile) = slot.set_unused() {
                    logfile.slot_recycled();
                }
                state.free_slots += 1;
                state.num_events += 1;

                if index == region.last_slot_index() {
                    break;
                }
                index = state.next_index(index);
            }

            state.recycle_index = state.next_index(region.last_slot_index());
            state.region_outstanding = false;

            let closed = Self::collect_closed(state);

            debug!(
                logfile_id = region.logfile_id(),
                slots = region.slot_count(),
                last_committed_tick = state.last_committed_tick,
                free_slots = state.free_slots,
                "sync region recycled"
            );

            (state.waiting > 0 || region.wait_for_sync(), closed)
        };

        for logfile in closed {
            info!(logfile_id = logfile.id(), "logfile closed, reclaiming");
            self.manager.status_changed(logfile.id(), LogfileStatus::Closed);
            self.manager.reclaim(logfile.id());
        }

        if notify {
            self.condition.notify_all();
        }
    }

    /// Give back a region whose write failed
    ///
    /// Nothing is recycled and no tick advances; the same slots are offered
    /// again by the next `get_sync_region`.
    pub fn abandon_sync_region(&self, region: SyncRegion) {
        let mut state = self.state.lock();
        assert!(
            state.region_outstanding && region.first_slot_index() == state.recycle_index,
            "abandoned sync region starting at slot {} is not outstanding",
            region.first_slot_index()
        );
        state.region_outstanding = false;

        let (min_tick, max_tick) = region.tick_range();
        warn!(
            logfile_id = region.logfile_id(),
            min_tick, max_tick, "sync region abandoned, ticks not committed"
        );
    }

    // =========================================================================
    // Durability API
    // =========================================================================

    /// Seal the active logfile and solicit a sync pass
    ///
    /// With `wait_for_sync`, blocks until everything handed out so far is
    /// durable (bounded by the configured sync timeout).
    pub fn flush(&self, wait_for_sync: bool) -> Result<()> {
        let (last_tick, worked) = self.close_logfile()?;

        self.manager.signal_sync();

        if wait_for_sync {
            if !self.wait_for_tick_timeout(last_tick, self.sync_timeout) {
                if self.is_shut_down() {
                    return Err(shut_down_error());
                }
                return Err(SlotError::SyncTimeout);
            }
        } else if !worked {
            return Err(SlotError::LogfileEmpty);
        }
        Ok(())
    }

    /// Highest tick known to be on disk
    pub fn last_committed_tick(&self) -> Tick {
        self.state.lock().last_committed_tick
    }

    /// Block until `tick` is durable; false if the ring shut down first
    pub fn wait_for_tick(&self, tick: Tick) -> bool {
        self.wait_for_tick_until(tick, None)
    }

    /// Like `wait_for_tick`, but also gives up after `timeout`
    pub fn wait_for_tick_timeout(&self, tick: Tick, timeout: Duration) -> bool {
        self.wait_for_tick_until(tick, Some(Instant::now() + timeout))
    }

    /// Stop the ring: blocked and future calls fail instead of waiting
    pub fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            info!(
                waiting = state.waiting,
                last_assigned_tick = state.last_assigned_tick,
                last_committed_tick = state.last_committed_tick,
                "slot ring shutting down"
            );
        }
        self.condition.notify_all();
    }

    // =========================================================================
    // Monitoring API
    // =========================================================================

    pub fn statistics(&self) -> Statistics {
        let state = self.state.lock();
        Statistics {
            last_assigned_tick: state.last_assigned_tick,
            last_committed_tick: state.last_committed_tick,
            last_committed_data_tick: state.last_committed_data_tick,
            num_events: state.num_events,
        }
    }

    /// Byte range of `logfile` reserved so far, `[begin, end)`
    pub fn active_logfile_region(&self, logfile: &Logfile) -> (u64, u64) {
        let _state = self.state.lock();
        (0, logfile.used_size())
    }

    /// First and last tick reserved in `logfile`
    pub fn active_tick_range(&self, logfile: &Logfile) -> (Tick, Tick) {
        let _state = self.state.lock();
        logfile.tick_range()
    }

    /// The logfile currently accepting handouts
    pub fn active_logfile(&self) -> Option<Arc<Logfile>> {
        self.state.lock().logfile.clone()
    }

    pub fn number_of_slots(&self) -> usize {
        self.number_of_slots
    }

    pub fn free_slots(&self) -> usize {
        self.state.lock().free_slots
    }

    /// Threads currently blocked inside the ring
    pub fn waiting(&self) -> u32 {
        self.state.lock().waiting
    }

    pub fn max_payload_size(&self) -> u32 {
        self.max_payload_size
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shutdown
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_size(&self, size: u32) -> Result<u32> {
        if size == 0 {
            return Err(SlotError::InvalidState("cannot reserve an empty slot".to_string()));
        }
        if size > self.max_payload_size {
            return Err(SlotError::SizeTooLarge {
                size,
                max: self.max_payload_size,
            });
        }
        Ok(align_size(size))
    }

    /// Block until `needed(state)` slots are free
    fn wait_for_free_slots<F>(&self, state: &mut MutexGuard<'_, RingState>, needed: F) -> Result<()>
    where
        F: Fn(&RingState) -> usize,
    {
        let mut has_waited = false;
        let result = loop {
            if state.shutdown {
                break Err(shut_down_error());
            }
            if state.free_slots >= needed(&**state) {
                break Ok(());
            }
            if !has_waited {
                state.waiting += 1;
                has_waited = true;
                debug!(free_slots = state.free_slots, "slot ring full, waiting for recycle");
            }
            self.manager.signal_sync();
            self.condition.wait(state);
        };

        if has_waited {
            state.waiting -= 1;
        }
        result
    }

    /// Wait for slots and make sure the active logfile can take `aligned`
    fn prepare_handout(
        &self,
        state: &mut MutexGuard<'_, RingState>,
        aligned: u32,
    ) -> Result<Arc<Logfile>> {
        self.wait_for_free_slots(state, |s| s.slots_needed(aligned))?;

        if let Some(logfile) = state.logfile.as_ref().filter(|l| fits(l, aligned)) {
            return Ok(Arc::clone(logfile));
        }
        self.rotate(state, aligned)
    }

    /// Seal the active logfile (if any) and activate a fresh one
    fn rotate(&self, state: &mut RingState, aligned: u32) -> Result<Arc<Logfile>> {
        if let Some(old) = state.logfile.clone() {
            self.seal(state, &old)?;
        }

        let logfile = self
            .manager
            .request_new_logfile(aligned + 2 * MARKER_SIZE)
            .map_err(|err| {
                error!(
                    error = %err,
                    requested = aligned,
                    "no logfile available, handouts fail until space frees up"
                );
                err
            })?;

        match logfile.status() {
            LogfileStatus::Empty => {
                Self::write_marker(state, &logfile, MarkerKind::Header)?;
                logfile.set_status(LogfileStatus::Active);
                self.manager.status_changed(logfile.id(), LogfileStatus::Active);
            }
            LogfileStatus::Active => {}
            status => {
                return Err(SlotError::InvalidState(format!(
                    "logfile {} handed out in status {:?}",
                    logfile.id(),
                    status
                )));
            }
        }

        state.logfile = Some(Arc::clone(&logfile));
        state.legends.reset(Some(logfile.id()));

        if !fits(&logfile, aligned) {
            warn!(
                logfile_id = logfile.id(),
                free = logfile.free_size(),
                requested = aligned,
                "new logfile too small for record"
            );
            return Err(SlotError::OutOfSpace { requested: aligned as u64 });
        }

        info!(
            logfile_id = logfile.id(),
            free = logfile.free_size(),
            last_assigned_tick = state.last_assigned_tick,
            "switched to new logfile"
        );
        Ok(logfile)
    }

    /// Write a footer into `logfile` and move it to Closing
    fn seal(&self, state: &mut RingState, logfile: &Arc<Logfile>) -> Result<Tick> {
        let tick = Self::write_marker(state, logfile, MarkerKind::Footer)?;

        logfile.set_status(LogfileStatus::Closing);
        self.manager.status_changed(logfile.id(), LogfileStatus::Closing);

        state.logfile = None;
        state.legends.reset(None);
        state.closing.push(Arc::clone(logfile));

        debug!(logfile_id = logfile.id(), tick, "sealed logfile");
        Ok(tick)
    }

    /// Place a header or footer marker in the next slot, already returned
    fn write_marker(state: &mut RingState, logfile: &Arc<Logfile>, kind: MarkerKind) -> Result<Tick> {
        let tick = state.last_assigned_tick + 1;
        let frame = Marker { kind, logfile_id: logfile.id(), tick }.encode()?;
        let offset = logfile.reserve(MARKER_SIZE, tick, kind)?;

        let index = state.claim(tick);
        let slot = &mut state.slots[index];
        slot.set_used(Arc::clone(logfile), offset, MARKER_SIZE, tick, kind);
        slot.set_returned(Bytes::from(frame), false);
        Ok(tick)
    }

    fn reserve_data(
        state: &mut RingState,
        logfile: &Arc<Logfile>,
        size: u32,
        aligned: u32,
    ) -> Result<Reservation> {
        let tick = state.last_assigned_tick + 1;
        let offset = logfile.reserve(aligned, tick, MarkerKind::Data)?;

        let index = state.claim(tick);
        state.slots[index].set_used(Arc::clone(logfile), offset, aligned, tick, MarkerKind::Data);

        trace!(tick, index, offset, size, logfile_id = logfile.id(), "handed out slot");
        Ok(Reservation {
            index,
            tick,
            logfile_id: logfile.id(),
            offset,
            size,
            aligned,
        })
    }

    /// Seal the active logfile if it holds data; returns the tick to wait
    /// for and whether anything was sealed
    fn close_logfile(&self) -> Result<(Tick, bool)> {
        let mut state = self.state.lock();

        let has_data = state.logfile.as_ref().map_or(false, |l| l.has_data());
        if !has_data {
            return Ok((state.last_assigned_tick, false));
        }

        self.wait_for_free_slots(&mut state, |_| 1)?;

        // a writer may have rotated the logfile while we waited
        match state.logfile.clone().filter(|l| l.has_data()) {
            Some(logfile) => {
                let tick = self.seal(&mut state, &logfile)?;
                Ok((tick, true))
            }
            None => Ok((state.last_assigned_tick, true)),
        }
    }

    /// Move closing logfiles without outstanding slots to Closed
    fn collect_closed(state: &mut RingState) -> Vec<Arc<Logfile>> {
        let mut closed = Vec::new();
        state.closing.retain(|logfile| {
            if logfile.outstanding_slots() > 0 {
                return true;
            }
            logfile.set_status(LogfileStatus::Closed);
            closed.push(Arc::clone(logfile));
            false
        });
        closed
    }

    fn wait_for_tick_until(&self, tick: Tick, deadline: Option<Instant>) -> bool {
        let mut state = self.state.lock();
        if state.last_committed_tick >= tick {
            return true;
        }

        state.waiting += 1;
        self.manager.signal_sync();

        while state.last_committed_tick < tick && !state.shutdown {
            match deadline {
                Some(deadline) => {
                    if self.condition.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                None => self.condition.wait(&mut state),
            }
        }

        state.waiting -= 1;
        state.last_committed_tick >= tick
    }
}
