//! Slot ownership words and their state machine.
//!
//! Every transition goes through [`Descriptor::apply`], so the precondition of
//! each move is checked in one place, and through
//! [`DescriptorTable::transition`], the only compare-and-swap loop on
//! descriptor words.
//!
//! ```text
//!             WriterClaim                 ReaderClaim(r)
//!   Free ----------------> WriterOwned     Free -------> ReaderOwned{r}
//!    ^                          |          ReaderOwned{..} --> ReaderOwned{.., r}
//!    +------ WriterRelease -----+          ReaderRelease(r) drops r (and `skipped`
//!                                          when r was the last holder)
//!   MarkSkipped: ReaderOwned{..} -> ReaderOwned{..} + skipped
//! ```

use super::Buffer::layout::{DescriptorEntry, MAX_READERS};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub const DSC_WRITER_OWNED: u32 = 0x1;
pub const DSC_SKIPPED: u32 = 0x2;
pub const DSC_READER_SHIFT: u32 = 2;
pub const DSC_READER_OWNED: u32 = !(DSC_WRITER_OWNED | DSC_SKIPPED);

/// Bitset of reader ids.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ReaderSet(u32);

impl ReaderSet {
    pub const fn empty() -> Self {
        ReaderSet(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        ReaderSet(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, id: usize) -> bool {
        id < MAX_READERS && self.0 & (1 << id) != 0
    }

    pub fn with(self, id: usize) -> Self {
        debug_assert!(id < MAX_READERS);
        ReaderSet(self.0 | (1 << id))
    }

    pub fn without(self, id: usize) -> Self {
        ReaderSet(self.0 & !(1 << id))
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..MAX_READERS).filter(move |&id| self.0 & (1 << id) != 0)
    }
}

impl fmt::Debug for ReaderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorState {
    Free,
    WriterOwned,
    ReaderOwned(ReaderSet),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    WriterClaim,
    WriterRelease,
    ReaderClaim(usize),
    ReaderRelease(usize),
    /// A writer passing over a reader-held slot.
    MarkSkipped,
}

/// Value of one descriptor word.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Descriptor(u32);

impl Descriptor {
    pub const FREE: Descriptor = Descriptor(0);

    pub const fn from_bits(bits: u32) -> Self {
        Descriptor(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn writer_owned(self) -> bool {
        self.0 & DSC_WRITER_OWNED != 0
    }

    pub fn skipped(self) -> bool {
        self.0 & DSC_SKIPPED != 0
    }

    pub fn readers(self) -> ReaderSet {
        ReaderSet((self.0 & DSC_READER_OWNED) >> DSC_READER_SHIFT)
    }

    pub fn state(self) -> DescriptorState {
        if self.writer_owned() {
            DescriptorState::WriterOwned
        } else if self.readers().is_empty() {
            DescriptorState::Free
        } else {
            DescriptorState::ReaderOwned(self.readers())
        }
    }

    fn with_readers(self, set: ReaderSet) -> Self {
        Descriptor((self.0 & !DSC_READER_OWNED) | (set.bits() << DSC_READER_SHIFT))
    }

    /// The value after `op`, or `None` when `op` is not allowed from here.
    pub fn apply(self, op: Op) -> Option<Descriptor> {
        match op {
            // A stray skipped bit with no holders left is cleared by the claim.
            Op::WriterClaim => (!self.writer_owned() && self.readers().is_empty())
                .then_some(Descriptor(DSC_WRITER_OWNED)),
            Op::WriterRelease => self
                .writer_owned()
                .then_some(Descriptor(self.0 & !DSC_WRITER_OWNED)),
            Op::ReaderClaim(id) => {
                if self.writer_owned() || id >= MAX_READERS {
                    return None;
                }
                Some(self.with_readers(self.readers().with(id)))
            }
            Op::ReaderRelease(id) => {
                if !self.readers().contains(id) {
                    return None;
                }
                let readers = self.readers().without(id);
                let mut next = self.with_readers(readers);
                if readers.is_empty() {
                    next = Descriptor(next.0 & !DSC_SKIPPED);
                }
                Some(next)
            }
            Op::MarkSkipped => {
                if self.writer_owned() || (self.readers().is_empty() && !self.skipped()) {
                    return None;
                }
                Some(Descriptor(self.0 | DSC_SKIPPED))
            }
        }
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("state", &self.state())
            .field("skipped", &self.skipped())
            .finish()
    }
}

/// View over a ring's descriptor entries in shared memory.
pub struct DescriptorTable {
    entries: *const DescriptorEntry,
    len: usize,
    contention: *const AtomicU64,
}

unsafe impl Send for DescriptorTable {}
unsafe impl Sync for DescriptorTable {}

impl DescriptorTable {
    /// # Safety
    /// `entries` must point at `len` mapped entries and `contention` at a
    /// mapped counter, both outliving the table.
    pub unsafe fn new(entries: *const DescriptorEntry, len: usize, contention: *const AtomicU64) -> Self {
        Self {
            entries,
            len,
            contention,
        }
    }

    #[inline]
    fn entry(&self, index: usize) -> &DescriptorEntry {
        debug_assert!(index < self.len);
        unsafe { &*self.entries.add(index) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn load(&self, index: usize) -> Descriptor {
        Descriptor(self.entry(index).desc.load(Ordering::Acquire))
    }

    /// Position last published into the slot, 0 if never written.
    #[inline]
    pub fn stamp(&self, index: usize) -> u64 {
        self.entry(index).stamp.load(Ordering::Acquire)
    }

    /// Only the writer holding the slot may stamp it.
    #[inline]
    pub fn set_stamp(&self, index: usize, position: u64) {
        self.entry(index).stamp.store(position, Ordering::Release);
    }

    /// Apply `op` to slot `index` with a compare-and-swap retry loop.
    ///
    /// Returns the new value, or the current value when `op` is refused.
    pub fn transition(&self, index: usize, op: Op) -> Result<Descriptor, Descriptor> {
        let word = &self.entry(index).desc;
        let mut current = Descriptor(word.load(Ordering::Acquire));
        loop {
            let next = current.apply(op).ok_or(current)?;
            match word.compare_exchange_weak(current.0, next.0, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Ok(next),
                Err(actual) => {
                    self.note_contention();
                    current = Descriptor(actual);
                }
            }
        }
    }

    #[inline]
    pub fn note_contention(&self) {
        unsafe { &*self.contention }.fetch_add(1, Ordering::Relaxed);
    }

    pub fn contention(&self) -> u64 {
        unsafe { &*self.contention }.load(Ordering::Relaxed)
    }
}
