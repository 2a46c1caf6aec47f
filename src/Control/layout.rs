use crossbeam_utils::CachePadded;
use std::mem::size_of;
use std::sync::atomic::{AtomicU32, AtomicU64};

use crate::KRing::Buffer::layout::{align_up, RingGeometry};

/// Low half of a link word: node index + 1, 0 for none.
pub const LINK_MASK: u64 = 0xffff_ffff;

/// Shared words of a control channel, placed after the set header.
#[repr(C, align(128))]
pub struct ControlHeader {
    /// Free list top: ABA tag in the high half, link in the low half.
    pub free_head: CachePadded<AtomicU64>,

    /// Publish stack top (link); writers push, the reader swaps it out whole.
    pub stack_head: CachePadded<AtomicU64>,

    // Reader side FIFO, touched by the bound reader only.
    pub fifo_head: AtomicU64,
    pub fifo_tail: AtomicU64,
    /// Node handed out by the last read, released on the next one.
    pub held: AtomicU64,

    pub produced: AtomicU64,
    pub consumed: AtomicU64,
    pub contention: AtomicU64,
    pub writer_ids: AtomicU32,
    pub reader_bound: AtomicU32,
}

#[repr(C)]
pub struct ControlNode {
    pub next: AtomicU64,
    pub len: AtomicU32,
    pub _pad: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlGeometry {
    pub nodes: usize,
    pub slot_size: usize,
}

impl ControlGeometry {
    pub const fn header_offset() -> usize {
        RingGeometry::rings_offset()
    }

    pub const fn nodes_offset() -> usize {
        Self::header_offset() + align_up(size_of::<ControlHeader>())
    }

    pub const fn arena_offset(&self) -> usize {
        align_up(Self::nodes_offset() + self.nodes * size_of::<ControlNode>())
    }

    pub const fn region_size(&self) -> usize {
        align_up(self.arena_offset() + self.nodes * self.slot_size)
    }
}

#[inline]
pub const fn link(index: usize) -> u64 {
    index as u64 + 1
}

/// Node index behind a link, `None` for the empty link.
#[inline]
pub const fn unlink(word: u64) -> Option<usize> {
    match word & LINK_MASK {
        0 => None,
        l => Some(l as usize - 1),
    }
}
