use crossbeam_utils::CachePadded;
use std::mem::size_of;
use std::sync::atomic::{AtomicU32, AtomicU64};

/// "KRINGSET", written last when a region is initialized.
pub const SET_MAGIC: u64 = 0x4B52_494E_4753_4554;

pub const LAYOUT_VERSION: u32 = 2;

/// Ring-set names are NUL padded to this length; at most `NAME_LEN - 1` bytes.
pub const NAME_LEN: usize = 32;

pub const MAX_RINGS: usize = 32;

/// Reader bits share the descriptor word with the writer and skipped bits.
pub const MAX_READERS: usize = 30;

pub const MAX_WRITERS: usize = 32;

pub const KIND_DATA: u32 = 1;
pub const KIND_CONTROL: u32 = 2;

const LINE: usize = 128;

#[inline]
pub const fn align_up(v: usize) -> usize {
    (v + LINE - 1) & !(LINE - 1)
}

/// Header at offset 0 of every region.
///
/// Geometry is recorded so a second process can attach without knowing the
/// configuration. The wait channel words live here too, shared by all rings.
#[repr(C, align(128))]
pub struct SetHeader {
    pub magic: AtomicU64,
    pub version: u32,
    pub kind: u32,
    pub nrings: u32,
    pub readers: u32,
    pub writers: u32,
    pub slot_size: u32,
    pub slots: u64,
    pub ring_stride: u64,
    pub name: [u8; NAME_LEN],

    /// Futex word bumped on every publish.
    pub epoch: AtomicU32,
    pub waiters: AtomicU32,
    /// Bumped by `interrupt` before the epoch.
    pub interrupts: AtomicU32,
}

/// Shared cursors and bookkeeping of one ring.
#[repr(C, align(128))]
pub struct RingHeader {
    /// Position of the newest fully published slot; 0 before the first write.
    pub whead: CachePadded<AtomicU64>,

    /// Highest position reserved by any writer.
    pub wresv: CachePadded<AtomicU64>,

    pub produced: AtomicU64,

    /// Failed compare-and-swap attempts on this ring.
    pub contention: AtomicU64,

    pub writer_ids: AtomicU32,
    pub reader_ids: AtomicU32,

    /// Optional ring-wide write mutex (0 free, 1 held).
    pub write_mutex: AtomicU32,
    pub _reserved: u32,
}

/// Private cursors of one writer, used by the multi-writer release protocol.
#[repr(C, align(64))]
pub struct WriterRecord {
    pub whead: AtomicU64,
    pub wresv: AtomicU64,
    /// 0 when idle, otherwise the barrier position plus one.
    pub wbar: AtomicU64,
}

#[repr(C, align(64))]
pub struct ReaderRecord {
    /// Last position examined; everything at or before it is consumed or lost.
    pub rhead: AtomicU64,
    /// Position of the slot this reader currently holds, valid while `entered`.
    pub held: AtomicU64,
    pub skips: AtomicU64,
    pub consumed: AtomicU64,
    pub entered: AtomicU32,
    pub _pad: u32,
}

/// One descriptor word plus the position last published into the slot.
#[repr(C)]
pub struct DescriptorEntry {
    pub desc: AtomicU32,
    pub _pad: u32,
    pub stamp: AtomicU64,
}

/// Fixed shape of every ring in a set, with the byte offsets derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingGeometry {
    pub slots: usize,
    pub slot_size: usize,
    pub readers: usize,
    pub writers: usize,
}

impl RingGeometry {
    pub const fn writers_offset(&self) -> usize {
        size_of::<RingHeader>()
    }

    pub const fn readers_offset(&self) -> usize {
        self.writers_offset() + self.writers * size_of::<WriterRecord>()
    }

    pub const fn descriptors_offset(&self) -> usize {
        self.readers_offset() + self.readers * size_of::<ReaderRecord>()
    }

    pub const fn arena_offset(&self) -> usize {
        align_up(self.descriptors_offset() + self.slots * size_of::<DescriptorEntry>())
    }

    /// Bytes taken by one ring (control words, descriptors and slots).
    pub const fn ring_stride(&self) -> usize {
        align_up(self.arena_offset() + self.slots * self.slot_size)
    }

    pub const fn rings_offset() -> usize {
        align_up(size_of::<SetHeader>())
    }

    pub const fn region_size(&self, nrings: usize) -> usize {
        Self::rings_offset() + nrings * self.ring_stride()
    }
}

/// Copy a validated name into the fixed header field.
pub fn encode_name(name: &str) -> [u8; NAME_LEN] {
    let mut out = [0u8; NAME_LEN];
    let n = name.len().min(NAME_LEN - 1);
    out[..n].copy_from_slice(&name.as_bytes()[..n]);
    out
}

pub fn decode_name(raw: &[u8; NAME_LEN]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
