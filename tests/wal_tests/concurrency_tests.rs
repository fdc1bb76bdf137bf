//! Tests for concurrent use of the slot ring
//!
//! These tests verify:
//! - Durability waits wake exactly when their tick commits
//! - A full ring blocks handouts until a slot is recycled
//! - Concurrent writers get unique ticks and disjoint byte ranges
//! - Shutdown releases blocked threads

#[path = "../common/mod.rs"]
mod common;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{active_ring, sync_all};
use crossbeam::channel;
use slotlog::wal::align_size;
use slotlog::{Logfile, SlotInfoCopy, Synchronizer};

const BLOCKED: Duration = Duration::from_millis(100);
const PATIENCE: Duration = Duration::from_secs(10);

fn wait_until_waiting(slots: &slotlog::Slots, count: u32) {
    while slots.waiting() < count {
        thread::sleep(Duration::from_millis(1));
    }
}

// =============================================================================
// Durability Wait Tests
// =============================================================================

#[test]
fn test_wait_for_future_tick_blocks_until_synced() {
    let ring = active_ring(8, 4096);
    for _ in 0..3 {
        let info = ring.slots.next_unused(8).unwrap();
        ring.slots.return_used(info, false).unwrap();
    }
    sync_all(&ring.slots);
    assert_eq!(ring.slots.last_committed_tick(), 3);

    let (tx, rx) = channel::bounded(1);
    let slots = Arc::clone(&ring.slots);
    let waiter = thread::spawn(move || tx.send(slots.wait_for_tick(5)).unwrap());
    wait_until_waiting(&ring.slots, 1);

    let info = ring.slots.next_unused(8).unwrap();
    assert_eq!(info.tick(), 4);
    ring.slots.return_used(info, false).unwrap();
    sync_all(&ring.slots);
    assert!(rx.recv_timeout(BLOCKED).is_err(), "woke up at tick 4");

    let info = ring.slots.next_unused(8).unwrap();
    assert_eq!(info.tick(), 5);
    ring.slots.return_used(info, false).unwrap();
    sync_all(&ring.slots);

    assert!(rx.recv_timeout(PATIENCE).unwrap());
    waiter.join().unwrap();
}

#[test]
fn test_wait_for_committed_tick_returns_immediately() {
    let ring = active_ring(4, 4096);
    let info = ring.slots.next_unused(8).unwrap();
    ring.slots.return_used(info, false).unwrap();
    sync_all(&ring.slots);

    assert!(ring.slots.wait_for_tick(1));
    assert!(ring.slots.wait_for_tick(0));
}

#[test]
fn test_wait_for_tick_timeout_expires() {
    let ring = active_ring(4, 4096);

    assert!(!ring.slots.wait_for_tick_timeout(1, Duration::from_millis(20)));
    assert_eq!(ring.slots.waiting(), 0);
}

#[test]
fn test_shutdown_releases_tick_waiters() {
    let ring = active_ring(4, 4096);
    let slots = Arc::clone(&ring.slots);
    let waiter = thread::spawn(move || slots.wait_for_tick(10));
    wait_until_waiting(&ring.slots, 1);

    ring.slots.shutdown();

    assert!(!waiter.join().unwrap());
}

// =============================================================================
// Capacity Tests
// =============================================================================

#[test]
fn test_full_ring_unblocks_one_writer_per_recycled_slot() {
    let ring = active_ring(4, 4096);
    let mut infos: Vec<_> = (0..4).map(|_| ring.slots.next_unused(8).unwrap()).collect();
    assert_eq!(ring.slots.free_slots(), 0);

    let first = infos.remove(0);
    ring.slots.return_used(first, false).unwrap();

    let (tx, rx) = channel::unbounded();
    let writers: Vec<_> = (0..2)
        .map(|_| {
            let slots = Arc::clone(&ring.slots);
            let tx = tx.clone();
            thread::spawn(move || {
                let result = slots.next_unused(8).map(|info| info.tick());
                tx.send(result).unwrap();
            })
        })
        .collect();
    wait_until_waiting(&ring.slots, 2);
    assert!(rx.try_recv().is_err());

    // slot 1 is still pending, so only slot 0 can be recycled
    let region = ring.slots.get_sync_region().unwrap();
    assert_eq!(region.slot_count(), 1);
    region.write_to_disk().unwrap();
    ring.slots.return_sync_region(region);

    let tick = rx.recv_timeout(PATIENCE).unwrap().unwrap();
    assert_eq!(tick, 5);
    assert!(rx.recv_timeout(BLOCKED).is_err(), "second writer overran the ring");

    ring.slots.shutdown();
    assert!(rx.recv_timeout(PATIENCE).unwrap().is_err());
    for writer in writers {
        writer.join().unwrap();
    }
}

// =============================================================================
// Concurrent Writer Tests
// =============================================================================

#[test]
fn test_concurrent_writers_get_unique_ticks_and_disjoint_ranges() {
    let ring = active_ring(64, 16 * 1024);
    let synchronizer = Synchronizer::start(
        Arc::clone(&ring.slots),
        channel::never(),
        Duration::from_millis(1),
    )
    .unwrap();

    let writers: Vec<_> = (0..8u8)
        .map(|writer| {
            let slots = Arc::clone(&ring.slots);
            thread::spawn(move || {
                let mut written = Vec::new();
                for i in 0..200u32 {
                    let mut info = slots.next_unused(20 + (i % 7)).unwrap();
                    info.buffer_mut().fill(writer);
                    let copy = info.copy();
                    slots.return_used(info, i % 50 == 0).unwrap();
                    written.push((writer, copy));
                }
                written
            })
        })
        .collect();

    let mut all: Vec<(u8, SlotInfoCopy)> = Vec::new();
    for writer in writers {
        all.extend(writer.join().unwrap());
    }

    ring.slots.flush(true).unwrap();
    synchronizer.stop();

    // ticks: unique, and each writer saw its own ticks increase
    let ticks: HashSet<_> = all.iter().map(|(_, copy)| copy.tick).collect();
    assert_eq!(ticks.len(), all.len());
    for writer in 0..8u8 {
        let own: Vec<_> = all.iter().filter(|(w, _)| *w == writer).map(|(_, c)| c.tick).collect();
        assert!(own.windows(2).all(|pair| pair[0] < pair[1]));
    }

    // byte ranges: disjoint within each logfile
    let mut by_logfile: BTreeMap<u64, Vec<SlotInfoCopy>> = BTreeMap::new();
    for (_, copy) in &all {
        by_logfile.entry(copy.logfile_id).or_default().push(*copy);
    }
    assert!(by_logfile.len() > 1, "expected at least one rotation");
    for copies in by_logfile.values_mut() {
        copies.sort_by_key(|copy| copy.offset);
        for pair in copies.windows(2) {
            assert!(pair[0].offset + align_size(pair[0].size) as u64 <= pair[1].offset);
        }
    }

    // everything committed, and every record is on disk
    let stats = ring.slots.statistics();
    assert_eq!(stats.last_committed_tick, stats.last_assigned_tick);
    let writer_of: HashMap<_, _> = all.iter().map(|(w, c)| (c.tick, *w)).collect();
    for (logfile_id, copies) in &by_logfile {
        let bytes = fs::read(Logfile::path_for(ring.temp.path(), *logfile_id)).unwrap();
        for copy in copies {
            let start = copy.offset as usize;
            let record = &bytes[start..start + copy.size as usize];
            assert!(record.iter().all(|b| *b == writer_of[&copy.tick]));
        }
    }
}
