// Registry and binding: names, error kinds, id reuse and teardown.
// Run with: cargo test --test registry -- --nocapture

use kring::{ErrorKind, Host, Mode, RingId, RingSetConfig, RingSetRegistry};

fn config(rings: usize, readers: usize, writers: usize) -> RingSetConfig {
    RingSetConfig {
        rings,
        slots: 64,
        slot_size: 256,
        readers,
        writers,
        host: Host::InProcess,
    }
}

#[test]
fn test_bind_errors_are_distinct() {
    let registry = RingSetRegistry::new();
    registry.create("bind", config(2, 1, 1)).unwrap();

    let kind = |name: &str, ring: RingId, mode: Mode| registry.open(name, ring, mode).unwrap_err().kind();

    assert_eq!(kind("bad name", RingId::Ring(0), Mode::Read), ErrorKind::BadName);
    assert_eq!(kind("", RingId::Ring(0), Mode::Read), ErrorKind::BadName);
    assert_eq!(kind(&"x".repeat(32), RingId::Ring(0), Mode::Read), ErrorKind::BadName);
    assert_eq!(kind("missing", RingId::Ring(0), Mode::Read), ErrorKind::UnknownRingSet);
    assert_eq!(kind("bind", RingId::Ring(2), Mode::Read), ErrorKind::InvalidRingId);
    assert_eq!(kind("bind", RingId::All, Mode::Write), ErrorKind::WriteToAllRings);

    let _w = registry.open("bind", RingId::Ring(0), Mode::Write).unwrap();
    assert_eq!(kind("bind", RingId::Ring(0), Mode::Write), ErrorKind::NoFreeWriterId);
    // Writer ids are per ring.
    assert!(registry.open("bind", RingId::Ring(1), Mode::Write).is_ok());

    let _r = registry.open("bind", RingId::Ring(0), Mode::Read).unwrap();
    assert_eq!(kind("bind", RingId::Ring(0), Mode::Read), ErrorKind::NoFreeReaderId);
    assert_eq!(kind("bind", RingId::All, Mode::Read), ErrorKind::NoFreeReaderId);
}

#[test]
fn test_longest_valid_name() {
    let registry = RingSetRegistry::new();
    let name = "a.B-9_".repeat(5) + "z";
    assert_eq!(name.len(), 31);
    registry.create(&name, config(1, 1, 1)).unwrap();
    assert!(registry.get(&name).is_ok());
}

#[test]
fn test_invalid_configs_are_refused() {
    let registry = RingSetRegistry::new();
    let cases = [
        RingSetConfig { slots: 48, ..config(1, 1, 1) },
        RingSetConfig { slots: 8, ..config(1, 2, 4) },
        RingSetConfig { slot_size: 200, ..config(1, 1, 1) },
        RingSetConfig { slot_size: 128, ..config(1, 1, 1) },
        config(0, 1, 1),
        config(33, 1, 1),
        config(1, 0, 1),
        config(1, 31, 1),
        config(1, 1, 0),
        config(1, 1, 33),
    ];
    for (i, cfg) in cases.into_iter().enumerate() {
        let err = registry.create(&format!("bad{}", i), cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig, "case {}: {:?}", i, cfg);
    }
    assert!(registry.is_empty());
}

#[test]
fn test_create_twice_fails() {
    let registry = RingSetRegistry::new();
    registry.create("dup", config(1, 1, 1)).unwrap();
    let err = registry.create("dup", config(1, 1, 1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[test]
fn test_reader_id_reuse_resets_counters() {
    let registry = RingSetRegistry::new();
    let set = registry.create("reuse", RingSetConfig { slots: 8, ..config(1, 1, 1) }).unwrap();
    let mut writer = set.open_writer(0).unwrap();

    let mut reader = set.open_reader(RingId::Ring(0)).unwrap();
    for i in 0..12u8 {
        writer.write_plain(&[i]);
    }
    assert!(reader.next_plain().is_some());
    assert!(reader.skips() > 0);
    assert!(reader.consumed() > 0);
    let id = reader.reader_id();
    reader.close();

    let reader = set.open_reader(RingId::Ring(0)).unwrap();
    assert_eq!(reader.reader_id(), id);
    assert_eq!(reader.skips(), 0);
    assert_eq!(reader.consumed(), 0);
    assert!(!reader.avail());
}

#[test]
fn test_writer_id_reuse() {
    let registry = RingSetRegistry::new();
    let set = registry.create("wreuse", config(1, 1, 2)).unwrap();
    let a = set.open_writer(0).unwrap();
    let b = set.open_writer(0).unwrap();
    assert_eq!((a.writer_id(), b.writer_id()), (0, 1));
    drop(a);
    assert_eq!(set.open_writer(0).unwrap().writer_id(), 0);
    assert_eq!(set.stats(0).unwrap().bound_writers, 1);
}

#[test]
fn test_teardown_refused_while_bound() {
    let registry = RingSetRegistry::new();
    let set = registry.create("busy", config(1, 1, 1)).unwrap();
    let reader = set.open_reader(RingId::Ring(0)).unwrap();

    let err = registry.teardown("busy").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Busy);
    assert!(registry.contains("busy"));

    drop(reader);
    registry.teardown("busy").unwrap();
    assert!(!registry.contains("busy"));
    assert_eq!(registry.teardown("busy").unwrap_err().kind(), ErrorKind::UnknownRingSet);
    assert_eq!(
        registry.open("busy", RingId::Ring(0), Mode::Read).unwrap_err().kind(),
        ErrorKind::UnknownRingSet
    );
}

#[test]
fn test_names_are_listed_sorted() {
    let registry = RingSetRegistry::new();
    for name in ["zeta", "alpha", "mid"] {
        registry.create(name, config(1, 1, 1)).unwrap();
    }
    registry
        .create_control("ctl", kring::ControlConfig { nodes: 4, slot_size: 256, writers: 1, host: Host::InProcess })
        .unwrap();
    assert_eq!(registry.names(), vec!["alpha", "ctl", "mid", "zeta"]);
    assert_eq!(registry.len(), 4);
    assert_eq!(registry.get("ctl").unwrap_err().kind(), ErrorKind::UnknownRingSet);
    assert!(registry.control("ctl").is_ok());

    let dbg = format!("{:?}", registry);
    println!("{}", dbg);
    assert!(dbg.contains("alpha") && dbg.contains("ControlChannel"));
}

#[test]
fn test_handle_conversions() {
    let registry = RingSetRegistry::new();
    registry.create("conv", config(1, 1, 1)).unwrap();
    let h = registry.open("conv", RingId::Ring(0), Mode::Write).unwrap();
    assert!(h.into_writer().is_some());
    let h = registry.open("conv", RingId::from_raw(-1), Mode::Read).unwrap();
    let reader = h.into_reader().unwrap();
    assert_eq!(reader.ring_id(), RingId::All);
}
