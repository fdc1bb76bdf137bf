//! Tests for sync region extraction and recycling
//!
//! These tests verify:
//! - Coalescing of contiguous returned slots
//! - Regions never span a slot that is still being written
//! - Boundaries at logfile changes
//! - Tick watermarks and statistics after recycling
//! - Region bytes land at the right file offsets

#[path = "../common/mod.rs"]
mod common;

use std::fs;

use common::{active_ring, empty_ring, sync_all};
use slotlog::wal::{Marker, MarkerKind, MARKER_SIZE};
use slotlog::Logfile;

// =============================================================================
// Coalescing Tests
// =============================================================================

#[test]
fn test_out_of_order_returns_form_one_region() {
    let ring = active_ring(4, 4096);

    let a = ring.slots.next_unused(10).unwrap();
    let b = ring.slots.next_unused(20).unwrap();
    let c = ring.slots.next_unused(30).unwrap();

    ring.slots.return_used(b, false).unwrap();
    assert!(ring.slots.get_sync_region().is_none());

    ring.slots.return_used(a, false).unwrap();
    ring.slots.return_used(c, false).unwrap();

    let region = ring.slots.get_sync_region().unwrap();
    assert_eq!(region.tick_range(), (1, 3));
    assert_eq!(region.slot_count(), 3);
    assert_eq!(region.file_range(), (0, 72));
    assert_eq!(region.chunks().len(), 3);
    assert!(!region.check_more());
}

#[test]
fn test_region_stops_at_pending_slot() {
    let ring = active_ring(8, 4096);

    let a = ring.slots.next_unused(8).unwrap();
    let b = ring.slots.next_unused(8).unwrap();
    let c = ring.slots.next_unused(8).unwrap();

    ring.slots.return_used(a, false).unwrap();
    ring.slots.return_used(c, false).unwrap();

    let region = ring.slots.get_sync_region().unwrap();
    assert_eq!(region.tick_range(), (1, 1));
    ring.slots.return_sync_region(region);
    assert_eq!(ring.slots.last_committed_tick(), 1);

    // tick 3 is returned but tick 2 is still being written
    assert!(ring.slots.get_sync_region().is_none());

    ring.slots.return_used(b, false).unwrap();
    let region = ring.slots.get_sync_region().unwrap();
    assert_eq!(region.tick_range(), (2, 3));
}

#[test]
fn test_nothing_ready_on_empty_ring() {
    let ring = active_ring(4, 4096);

    assert!(ring.slots.get_sync_region().is_none());
}

#[test]
fn test_only_one_region_outstanding() {
    let ring = active_ring(4, 4096);
    let info = ring.slots.next_unused(8).unwrap();
    ring.slots.return_used(info, false).unwrap();

    let region = ring.slots.get_sync_region().unwrap();
    assert!(ring.slots.get_sync_region().is_none());

    ring.slots.return_sync_region(region);
    assert!(ring.slots.get_sync_region().is_none());
}

#[test]
fn test_wait_for_sync_flag_carried_into_region() {
    let ring = active_ring(4, 4096);
    let info = ring.slots.next_unused(8).unwrap();
    let slots = ring.slots.clone();

    let handle = std::thread::spawn(move || slots.return_used(info, true));

    let region = loop {
        if let Some(region) = ring.slots.get_sync_region() {
            break region;
        }
        std::thread::yield_now();
    };
    assert!(region.wait_for_sync());
    region.write_to_disk().unwrap();
    ring.slots.return_sync_region(region);

    handle.join().unwrap().unwrap();
    assert_eq!(ring.slots.last_committed_tick(), 1);
}

// =============================================================================
// Logfile Boundary Tests
// =============================================================================

#[test]
fn test_region_breaks_at_logfile_change() {
    let ring = active_ring(8, 4096);

    let a = ring.slots.next_unused(100).unwrap();
    // forces rotation: footer lands in logfile 1, record in logfile 2
    let b = ring.slots.next_unused(4000).unwrap();
    assert_ne!(a.logfile_id(), b.logfile_id());

    ring.slots.return_used(a, false).unwrap();
    ring.slots.return_used(b, false).unwrap();

    let first = ring.slots.get_sync_region().unwrap();
    assert_eq!(first.logfile_id(), 1);
    assert_eq!(first.tick_range(), (1, 2));
    assert!(first.check_more());
    assert!(first.can_seal());
    ring.slots.return_sync_region(first);

    let second = ring.slots.get_sync_region().unwrap();
    assert_eq!(second.logfile_id(), 2);
    assert_eq!(second.tick_range(), (3, 3));
}

// =============================================================================
// Watermark Tests
// =============================================================================

#[test]
fn test_data_tick_ignores_markers() {
    let ring = empty_ring(8, 4096);
    let info = ring.slots.next_unused(8).unwrap();
    ring.slots.return_used(info, false).unwrap();
    ring.slots.flush(false).unwrap();

    sync_all(&ring.slots);

    let stats = ring.slots.statistics();
    // header = 1, record = 2, footer = 3
    assert_eq!(stats.last_assigned_tick, 3);
    assert_eq!(stats.last_committed_tick, 3);
    assert_eq!(stats.last_committed_data_tick, 2);
    assert_eq!(stats.num_events, 3);
}

#[test]
fn test_committed_tick_never_exceeds_assigned() {
    let ring = active_ring(8, 8192);

    for _ in 0..30 {
        let info = ring.slots.next_unused(64).unwrap();
        ring.slots.return_used(info, false).unwrap();
        sync_all(&ring.slots);

        let stats = ring.slots.statistics();
        assert!(stats.last_committed_tick <= stats.last_assigned_tick);
    }
}

#[test]
fn test_recycled_slots_become_free() {
    let ring = active_ring(4, 4096);
    for _ in 0..4 {
        let info = ring.slots.next_unused(8).unwrap();
        ring.slots.return_used(info, false).unwrap();
    }
    assert_eq!(ring.slots.free_slots(), 0);

    let recycled = sync_all(&ring.slots);

    assert_eq!(recycled, 4);
    assert_eq!(ring.slots.free_slots(), 4);
    assert_eq!(ring.slots.statistics().num_events, 4);
}

// =============================================================================
// On-Disk Tests
// =============================================================================

#[test]
fn test_region_bytes_written_at_offsets() {
    let ring = empty_ring(8, 4096);

    let mut a = ring.slots.next_unused(5).unwrap();
    a.write(b"hello").unwrap();
    let mut b = ring.slots.next_unused(5).unwrap();
    b.write(b"world").unwrap();
    let (a_offset, b_offset) = (a.offset() as usize, b.offset() as usize);

    ring.slots.return_used(a, false).unwrap();
    ring.slots.return_used(b, false).unwrap();
    sync_all(&ring.slots);

    let bytes = fs::read(Logfile::path_for(ring.temp.path(), 1)).unwrap();
    assert_eq!(&bytes[a_offset..a_offset + 5], b"hello");
    assert_eq!(&bytes[b_offset..b_offset + 5], b"world");
    // alignment padding stays zero
    assert_eq!(&bytes[a_offset + 5..a_offset + 8], &[0, 0, 0]);

    let header = Marker::decode(&bytes[..MARKER_SIZE as usize]).unwrap();
    assert_eq!(header.kind, MarkerKind::Header);
    assert_eq!(header.logfile_id, 1);
    assert_eq!(header.tick, 1);
}
