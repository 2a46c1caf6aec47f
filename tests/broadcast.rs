// Broadcast delivery: every bound reader sees every message, across one
// ring or all rings of a set.
// Run with: cargo test --test broadcast -- --nocapture

use kring::Core::WaitOutcome;
use kring::{ErrorKind, Mode, RingId, RingSet, RingSetBuilder};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn set(name: &str, rings: usize, readers: usize) -> Arc<RingSet> {
    Arc::new(
        RingSetBuilder::new()
            .with_rings(rings)
            .with_slots(256)
            .with_slot_size(256)
            .with_readers(readers)
            .with_writers(2)
            .build(name)
            .unwrap(),
    )
}

#[test]
fn test_every_reader_sees_every_message() {
    let set = set("bcast", 1, 3);
    let mut readers: Vec<_> = (0..3).map(|_| set.open_reader(RingId::Ring(0)).unwrap()).collect();
    let mut writer = set.open_writer(0).unwrap();

    for i in 0..100u32 {
        writer.write_plain(&i.to_le_bytes());
    }

    for reader in readers.iter_mut() {
        let mut got = Vec::new();
        while let Some(bytes) = reader.next_plain() {
            got.push(u32::from_le_bytes(bytes.try_into().unwrap()));
        }
        assert_eq!(got, (0..100).collect::<Vec<_>>(), "reader {}", reader.reader_id());
        assert_eq!(reader.skips(), 0);
        assert_eq!(reader.consumed(), 100);
    }
}

#[test]
fn test_readers_progress_independently() {
    let set = set("bcast_indep", 1, 2);
    let mut fast = set.open_reader(RingId::Ring(0)).unwrap();
    let mut slow = set.open_reader(RingId::Ring(0)).unwrap();
    let mut writer = set.open_writer(0).unwrap();

    writer.write_plain(b"a");
    assert_eq!(fast.next_plain(), Some(&b"a"[..]));
    writer.write_plain(b"b");
    assert_eq!(fast.next_plain(), Some(&b"b"[..]));

    // Both held the first slot at some point; the slow one still gets both.
    assert_eq!(slow.next_plain(), Some(&b"a"[..]));
    assert_eq!(slow.next_plain(), Some(&b"b"[..]));
    assert!(fast.next().is_none() && slow.next().is_none());
}

#[test]
fn test_all_rings_reader() {
    let set = set("bcast_all", 3, 2);
    let mut all = set.open_reader(RingId::All).unwrap();
    let mut writers: Vec<_> = (0..3).map(|r| set.open_writer(r).unwrap()).collect();

    assert!(!all.avail());
    for (r, w) in writers.iter_mut().enumerate() {
        for i in 0..5 {
            w.write_plain(format!("{}:{}", r, i).as_bytes());
        }
    }
    assert!(all.avail());

    let mut per_ring = vec![Vec::new(); 3];
    while let Some(bytes) = all.next_plain() {
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let (r, i) = text.split_once(':').unwrap();
        per_ring[r.parse::<usize>().unwrap()].push(i.parse::<u32>().unwrap());
    }
    for got in per_ring {
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
    }
    assert_eq!(all.consumed(), 15);
    assert_eq!(all.skips(), 0);
    assert_eq!(all.position().map(|(ring, _)| ring), Some(2));
}

#[test]
fn test_all_rings_reader_needs_common_id() {
    let set = set("bcast_ids", 2, 2);
    // Ring 0 loses id 0, ring 1 loses id 1: no id is free on both.
    let _r0 = set.open_reader(RingId::Ring(0)).unwrap();
    let _r1a = set.open_reader(RingId::Ring(1)).unwrap();
    let r1b = set.open_reader(RingId::Ring(1)).unwrap();
    assert_eq!(r1b.reader_id(), 1);
    drop(_r1a);

    // id 0 is taken on ring 0, id 1 on ring 1.
    let err = set.open(RingId::All, Mode::Read).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoFreeReaderId);
    // The failed attempt rolled back: ring 1 id 0 is still free.
    assert_eq!(set.open_reader(RingId::Ring(1)).unwrap().reader_id(), 0);

    drop(r1b);
    let all = set.open_reader(RingId::All).unwrap();
    assert_eq!(all.reader_id(), 1);
}

#[test]
fn test_blocking_reader_wakes_on_publish() {
    let set = set("bcast_wait", 1, 1);
    let mut reader = set.open_reader(RingId::Ring(0)).unwrap();

    let writer_set = Arc::clone(&set);
    let writer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        let mut w = writer_set.open_writer(0).unwrap();
        w.write_plain(b"wake");
    });

    let msg = reader.next_wait(Some(Duration::from_secs(5))).map(|m| m.payload().to_vec());
    writer.join().unwrap();
    assert_eq!(msg.as_deref(), Some(&b"wake"[..]));

    assert!(reader.next_wait(Some(Duration::from_millis(20))).is_none());
}

#[test]
fn test_interrupt_ends_blocking_read() {
    let set = set("bcast_intr", 1, 1);
    let mut reader = set.open_reader(RingId::Ring(0)).unwrap();

    let (tx, rx) = mpsc::channel();
    let blocked = thread::spawn(move || {
        let got = reader.next_wait(None).map(|m| m.payload().to_vec());
        tx.send(got).unwrap();
        reader
    });

    thread::sleep(Duration::from_millis(100));
    set.interrupt();
    let got = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("next_wait(None) kept sleeping after interrupt");
    assert_eq!(got, None);

    // The interrupt is consumed: the same reader blocks for real data again.
    let mut reader = blocked.join().unwrap();
    let mut writer = set.open_writer(0).unwrap();
    writer.write_plain(b"after");
    let msg = reader.next_wait(None).map(|m| m.payload().to_vec());
    assert_eq!(msg.as_deref(), Some(&b"after"[..]));
}

#[test]
fn test_interrupt_before_wait_is_not_lost() {
    let set = set("bcast_intr_early", 1, 2);
    let first = set.open_reader(RingId::Ring(0)).unwrap();
    set.interrupt();
    let late = set.open_reader(RingId::Ring(0)).unwrap();

    assert_eq!(first.wait(Some(Duration::from_secs(5))), WaitOutcome::Interrupted);
    assert_eq!(first.wait(Some(Duration::from_millis(20))), WaitOutcome::TimedOut);
    // Bound after the interrupt: not affected by it.
    assert_eq!(late.wait(Some(Duration::from_millis(20))), WaitOutcome::TimedOut);
}

#[test]
fn test_publish_is_not_an_interrupt() {
    let set = set("bcast_notify", 1, 1);
    let reader = set.open_reader(RingId::Ring(0)).unwrap();

    let writer_set = Arc::clone(&set);
    let writer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        writer_set.open_writer(0).unwrap().write_plain(b"x");
    });
    let outcome = reader.wait(Some(Duration::from_secs(5)));
    writer.join().unwrap();
    assert_eq!(outcome, WaitOutcome::Notified);
    assert!(reader.avail());
}
