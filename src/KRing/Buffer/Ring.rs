// One ring of a ring set: shared cursors, descriptor table and slot arena.

use super::arena::SlotArena;
use super::layout::{ReaderRecord, RingGeometry, RingHeader, WriterRecord};
use crate::KRing::Descriptor::DescriptorTable;

/// A lock-free broadcast ring view.
///
/// This struct is NOT stored in shared memory. It is a per-process view that
/// holds pointers into the mapped region; every process builds its own.
///
/// ### Concurrency Design:
/// - **Writers** walk positions forward from the shared reservation cursor and
///   claim the first free slot with a compare-and-swap on its descriptor. Slots
///   held by readers are marked skipped and passed over, so writers never wait.
/// - **Readers** each keep a private cursor, claim their bit on the next slot
///   and release the previous one. A reader that falls a full ring behind is
///   moved forward and the writers have already counted what it lost.
/// - Positions grow without wrapping; the slot index is `position & mask`.
pub struct Ring {
    pub(crate) header: *const RingHeader,
    pub(crate) writers: *const WriterRecord,
    pub(crate) readers: *const ReaderRecord,
    pub(crate) table: DescriptorTable,
    pub(crate) arena: SlotArena,
    pub(crate) geometry: RingGeometry,
    pub(crate) mask: usize,
}

unsafe impl Send for Ring {}
unsafe impl Sync for Ring {}

/// Point-in-time counters of one ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RingStats {
    pub whead: u64,
    pub wresv: u64,
    pub produced: u64,
    pub contention: u64,
    pub bound_writers: usize,
    pub bound_readers: usize,
}
