// Slot ownership state machine, checked value by value and through the
// compare-and-swap table.

use kring::KRing::Buffer::layout::DescriptorEntry;
use kring::KRing::Descriptor::{Descriptor, DescriptorState, DescriptorTable, Op, ReaderSet, DSC_SKIPPED, DSC_WRITER_OWNED};
use kring::{RingId, RingSetBuilder};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

fn entries(n: usize) -> Vec<DescriptorEntry> {
    (0..n)
        .map(|_| DescriptorEntry {
            desc: AtomicU32::new(0),
            _pad: 0,
            stamp: AtomicU64::new(0),
        })
        .collect()
}

#[test]
fn test_writer_claim_and_release() {
    let d = Descriptor::FREE;
    let owned = d.apply(Op::WriterClaim).unwrap();
    assert_eq!(owned.state(), DescriptorState::WriterOwned);
    assert!(owned.apply(Op::WriterClaim).is_none());
    assert!(owned.apply(Op::ReaderClaim(0)).is_none());
    assert!(owned.apply(Op::MarkSkipped).is_none());
    assert_eq!(owned.apply(Op::WriterRelease), Some(Descriptor::FREE));
    assert!(Descriptor::FREE.apply(Op::WriterRelease).is_none());
}

#[test]
fn test_readers_share_a_slot() {
    let d = Descriptor::FREE
        .apply(Op::ReaderClaim(0))
        .and_then(|d| d.apply(Op::ReaderClaim(5)))
        .unwrap();
    assert_eq!(d.state(), DescriptorState::ReaderOwned(ReaderSet::empty().with(0).with(5)));
    assert!(d.apply(Op::WriterClaim).is_none());
    assert!(d.apply(Op::ReaderRelease(3)).is_none());

    let d = d.apply(Op::ReaderRelease(0)).unwrap();
    assert_eq!(d.readers().iter().collect::<Vec<_>>(), vec![5]);
}

#[test]
fn test_skipped_cleared_by_last_holder() {
    let d = Descriptor::FREE
        .apply(Op::ReaderClaim(1))
        .and_then(|d| d.apply(Op::ReaderClaim(2)))
        .and_then(|d| d.apply(Op::MarkSkipped))
        .unwrap();
    assert!(d.skipped());

    let d = d.apply(Op::ReaderRelease(1)).unwrap();
    assert!(d.skipped(), "still held by reader 2");
    let d = d.apply(Op::ReaderRelease(2)).unwrap();
    assert_eq!(d, Descriptor::FREE);
    assert!(Descriptor::FREE.apply(Op::MarkSkipped).is_none());
}

#[test]
fn test_stray_skipped_bit_does_not_block_writers() {
    let d = Descriptor::from_bits(DSC_SKIPPED);
    assert_eq!(d.state(), DescriptorState::Free);
    assert_eq!(d.apply(Op::WriterClaim).map(|d| d.bits()), Some(DSC_WRITER_OWNED));
}

#[test]
fn test_reader_ids_out_of_range() {
    assert!(Descriptor::FREE.apply(Op::ReaderClaim(30)).is_none());
    assert!(!ReaderSet::from_bits(u32::MAX).contains(30));
}

#[test]
fn test_table_transition_reports_current_on_refusal() {
    let storage = entries(4);
    let contention = AtomicU64::new(0);
    let table = unsafe { DescriptorTable::new(storage.as_ptr(), storage.len(), &contention) };

    assert!(table.transition(2, Op::WriterClaim).is_ok());
    let err = table.transition(2, Op::ReaderClaim(0)).unwrap_err();
    assert!(err.writer_owned());

    table.set_stamp(2, 17);
    assert_eq!(table.stamp(2), 17);
    assert!(table.transition(2, Op::WriterRelease).is_ok());
    assert_eq!(table.load(2), Descriptor::FREE);
    assert_eq!(table.contention(), 0);
}

#[test]
fn test_writer_claim_is_exclusive_under_contention() {
    const THREADS: usize = 8;
    let storage = Arc::new(entries(1));
    let contention = Arc::new(AtomicU64::new(0));
    let inside = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let storage = Arc::clone(&storage);
            let contention = Arc::clone(&contention);
            let inside = Arc::clone(&inside);
            thread::spawn(move || {
                let table = unsafe { DescriptorTable::new(storage.as_ptr(), 1, &*contention) };
                let mut wins = 0;
                for _ in 0..10_000 {
                    if table.transition(0, Op::WriterClaim).is_ok() {
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0, "two writers own the slot");
                        inside.fetch_sub(1, Ordering::SeqCst);
                        table.transition(0, Op::WriterRelease).unwrap();
                        wins += 1;
                    }
                }
                wins
            })
        })
        .collect();
    let wins: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    println!("wins: {}, contention: {}", wins, contention.load(Ordering::Relaxed));
    assert!(wins > 0);
}

// Releasing a claim that was taken away from its holder trips a debug assertion.
#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "refused")]
fn test_lost_reader_bit_is_caught_on_release() {
    let set = Arc::new(
        RingSetBuilder::new()
            .with_slots(16)
            .with_readers(1)
            .with_writers(1)
            .build("dsc_lost")
            .unwrap(),
    );
    let mut reader = set.open_reader(RingId::Ring(0)).unwrap();
    let mut writer = set.open_writer(0).unwrap();
    writer.write_plain(b"one");
    assert!(reader.next().is_some());

    let ring = set.ring(0).unwrap();
    let (_, pos) = reader.position().unwrap();
    ring.table()
        .transition(ring.index_of(pos), Op::ReaderRelease(reader.reader_id()))
        .unwrap();

    writer.write_plain(b"two");
    let _ = reader.next();
}
