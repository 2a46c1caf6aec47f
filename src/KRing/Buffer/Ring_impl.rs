use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release, SeqCst};

use super::arena::SlotArena;
use super::layout::{DescriptorEntry, ReaderRecord, RingGeometry, RingHeader, WriterRecord};
use super::Ring::{Ring, RingStats};
use crate::KRing::Descriptor::{DescriptorState, DescriptorTable, Op, ReaderSet};

impl Ring {
    /// Build a view over a ring block.
    ///
    /// # Safety
    /// `base` must point at `geometry.ring_stride()` mapped bytes, 128-byte
    /// aligned, either zeroed or previously initialized by this crate, and
    /// outliving the view.
    pub unsafe fn new(base: *mut u8, geometry: RingGeometry) -> Self {
        let header = base as *const RingHeader;
        let writers = base.add(geometry.writers_offset()) as *const WriterRecord;
        let readers = base.add(geometry.readers_offset()) as *const ReaderRecord;
        let entries = base.add(geometry.descriptors_offset()) as *const DescriptorEntry;
        let table = DescriptorTable::new(entries, geometry.slots, &(*header).contention);
        let arena = SlotArena::new(
            base.add(geometry.arena_offset()),
            geometry.slot_size,
            geometry.slots,
        );
        Self {
            header,
            writers,
            readers,
            table,
            arena,
            geometry,
            mask: geometry.slots - 1,
        }
    }

    #[inline]
    pub(crate) fn head(&self) -> &RingHeader {
        unsafe { &*self.header }
    }

    #[inline]
    pub(crate) fn writer(&self, id: usize) -> &WriterRecord {
        assert!(id < self.geometry.writers, "writer id {id} out of range");
        unsafe { &*self.writers.add(id) }
    }

    #[inline]
    pub(crate) fn reader(&self, id: usize) -> &ReaderRecord {
        assert!(id < self.geometry.readers, "reader id {id} out of range");
        unsafe { &*self.readers.add(id) }
    }

    pub fn capacity(&self) -> usize {
        self.geometry.slots
    }

    pub fn geometry(&self) -> RingGeometry {
        self.geometry
    }

    pub fn table(&self) -> &DescriptorTable {
        &self.table
    }

    pub fn arena(&self) -> &SlotArena {
        &self.arena
    }

    pub fn is_single_writer(&self) -> bool {
        self.geometry.writers == 1
    }

    #[inline]
    pub fn index_of(&self, position: u64) -> usize {
        position as usize & self.mask
    }

    pub fn whead(&self) -> u64 {
        self.head().whead.load(Acquire)
    }

    // ---------------------------------------------------------------------
    // Id allocation
    // ---------------------------------------------------------------------

    fn claim_bit(&self, word: &AtomicU32, id: usize) -> bool {
        let bit = 1u32 << id;
        let mut cur = word.load(Acquire);
        loop {
            if cur & bit != 0 {
                return false;
            }
            match word.compare_exchange_weak(cur, cur | bit, AcqRel, Acquire) {
                Ok(_) => return true,
                Err(actual) => {
                    self.table.note_contention();
                    cur = actual;
                }
            }
        }
    }

    pub fn allocate_writer_id(&self) -> Option<usize> {
        let id = (0..self.geometry.writers).find(|&id| self.claim_bit(&self.head().writer_ids, id))?;
        // Private whead/wresv are left as they are: they only ever feed max().
        self.writer(id).wbar.store(0, SeqCst);
        Some(id)
    }

    pub fn release_writer_id(&self, id: usize) {
        self.head().writer_ids.fetch_and(!(1u32 << id), AcqRel);
    }

    /// Claim a specific reader id, used when one id must be free on every ring.
    pub fn try_claim_reader_id(&self, id: usize) -> bool {
        id < self.geometry.readers && self.claim_bit(&self.head().reader_ids, id)
    }

    pub fn allocate_reader_id(&self) -> Option<usize> {
        (0..self.geometry.readers).find(|&id| self.try_claim_reader_id(id))
    }

    pub fn release_reader_id(&self, id: usize) {
        self.head().reader_ids.fetch_and(!(1u32 << id), AcqRel);
    }

    pub fn bound_readers(&self) -> ReaderSet {
        ReaderSet::from_bits(self.head().reader_ids.load(Acquire))
    }

    pub fn bound_writers(&self) -> usize {
        self.head().writer_ids.load(Acquire).count_ones() as usize
    }

    // ---------------------------------------------------------------------
    // Writers
    // ---------------------------------------------------------------------

    /// Walk positions after `start` and claim the first usable slot.
    ///
    /// Reader-held slots are marked skipped and each holder is charged a skip.
    /// Slots owned by another writer are passed over. Never blocks; the walk
    /// only keeps going while slots are held.
    pub fn find_write_loc(&self, start: u64) -> u64 {
        let mut pos = start;
        loop {
            pos += 1;
            let floor = self.head().whead.load(Acquire);
            if pos <= floor {
                pos = floor + 1;
            }
            let idx = self.index_of(pos);

            loop {
                match self.table.load(idx).state() {
                    DescriptorState::WriterOwned => break,
                    DescriptorState::ReaderOwned(_) => {
                        if let Ok(marked) = self.table.transition(idx, Op::MarkSkipped) {
                            for r in marked.readers().iter() {
                                self.reader(r).skips.fetch_add(1, Relaxed);
                            }
                            break;
                        }
                    }
                    DescriptorState::Free => {
                        if self.table.transition(idx, Op::WriterClaim).is_err() {
                            continue;
                        }
                        let old = self.table.stamp(idx);
                        // Already published by another writer, or overtaken by
                        // the shared head while we walked.
                        if old >= pos || pos <= self.head().whead.load(SeqCst) {
                            self.release(idx, Op::WriterRelease);
                            break;
                        }
                        self.credit_overwrite(old);
                        return pos;
                    }
                }
            }
        }
    }

    /// Give up a claim held by the caller. Refusal means the ownership word
    /// was changed behind the holder's back.
    #[inline]
    fn release(&self, index: usize, op: Op) {
        let released = self.table.transition(index, op);
        debug_assert!(released.is_ok(), "{op:?} on slot {index} refused: {released:?}");
    }

    /// Charge a skip to every bound reader that had not consumed `old` yet.
    fn credit_overwrite(&self, old: u64) {
        if old == 0 {
            return;
        }
        for r in self.bound_readers().iter() {
            let rec = self.reader(r);
            if old > rec.rhead.load(Acquire) {
                rec.skips.fetch_add(1, Relaxed);
            }
        }
    }

    fn publish_slot(&self, position: u64) {
        let idx = self.index_of(position);
        self.table.set_stamp(idx, position);
        self.release(idx, Op::WriterRelease);
        self.head().produced.fetch_add(1, Relaxed);
    }

    /// Reserve a slot on a ring with a single writer.
    pub fn write_first_single(&self) -> u64 {
        let h = self.head();
        let start = h.wresv.load(Acquire).max(h.whead.load(Acquire));
        let pos = self.find_write_loc(start);
        h.wresv.store(pos, Release);
        pos
    }

    pub fn write_second_single(&self, position: u64) {
        self.publish_slot(position);
        self.head().whead.fetch_max(position, AcqRel);
    }

    /// Reserve a slot on a ring shared by several writers.
    ///
    /// The barrier is raised before the walk starts so the shared head cannot
    /// pass the slot this writer is about to claim.
    pub fn write_first_multi(&self, writer_id: usize) -> u64 {
        let h = self.head();
        let w = self.writer(writer_id);
        let barrier = h.wresv.load(Acquire);
        w.wbar.store(barrier + 1, SeqCst);

        let start = barrier.max(h.whead.load(SeqCst));
        let pos = self.find_write_loc(start);
        w.wresv.fetch_max(pos, SeqCst);
        self.update_wresv();
        pos
    }

    pub fn write_second_multi(&self, writer_id: usize, position: u64) {
        self.publish_slot(position);
        let w = self.writer(writer_id);
        w.whead.fetch_max(position, SeqCst);
        w.wbar.store(0, SeqCst);
        self.update_whead();
    }

    /// Give back a reservation without publishing it.
    pub fn abandon(&self, writer_id: Option<usize>, position: u64) {
        self.release(self.index_of(position), Op::WriterRelease);
        if let Some(id) = writer_id {
            self.writer(id).wbar.store(0, SeqCst);
            self.update_whead();
        }
    }

    /// Shared reservation becomes the highest private reservation.
    fn update_wresv(&self) {
        let h = self.head();
        loop {
            let cur = h.wresv.load(Acquire);
            let highest = (0..self.geometry.writers)
                .map(|w| self.writer(w).wresv.load(SeqCst))
                .max()
                .unwrap_or(0);
            let next = cur.max(highest);
            if next == cur {
                return;
            }
            if h.wresv.compare_exchange(cur, next, AcqRel, Acquire).is_ok() {
                return;
            }
            self.table.note_contention();
        }
    }

    /// Shared head becomes min(highest private head, lowest active barrier).
    fn update_whead(&self) {
        let h = self.head();
        loop {
            let orig = h.whead.load(SeqCst);

            // Heads first, then barriers: a barrier raised after the head scan
            // belongs to a writer that will claim beyond what we saw.
            let highest = (0..self.geometry.writers)
                .map(|w| self.writer(w).whead.load(SeqCst))
                .max()
                .unwrap_or(0);
            let limit = (0..self.geometry.writers)
                .map(|w| self.writer(w).wbar.load(SeqCst))
                .filter(|&b| b != 0)
                .map(|b| b - 1)
                .min()
                .unwrap_or(u64::MAX);

            let next = orig.max(highest.min(limit));
            if next == orig {
                return;
            }
            if h.whead.compare_exchange(orig, next, AcqRel, Acquire).is_ok() {
                return;
            }
            self.table.note_contention();
        }
    }

    /// Ring-wide write mutex for writers that need append order between them.
    pub fn lock_writes(&self) -> WriteLockGuard<'_> {
        let word = &self.head().write_mutex;
        let mut spins = 0u32;
        while word.compare_exchange_weak(0, 1, Acquire, Relaxed).is_err() {
            self.table.note_contention();
            spins += 1;
            if spins < 64 {
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
        WriteLockGuard { word }
    }

    // ---------------------------------------------------------------------
    // Readers
    // ---------------------------------------------------------------------

    /// Point a freshly bound reader at the current head so it only sees
    /// future writes.
    pub fn prime_reader(&self, id: usize) {
        let rec = self.reader(id);
        rec.entered.store(0, Release);
        rec.held.store(0, Relaxed);
        rec.skips.store(0, Relaxed);
        rec.consumed.store(0, Relaxed);
        rec.rhead.store(self.whead(), Release);
    }

    pub fn reader_avail(&self, id: usize) -> bool {
        self.reader(id).rhead.load(Acquire) < self.whead()
    }

    pub fn reader_skips(&self, id: usize) -> u64 {
        self.reader(id).skips.load(Relaxed)
    }

    pub fn reader_consumed(&self, id: usize) -> u64 {
        self.reader(id).consumed.load(Relaxed)
    }

    /// Move reader `id` to the next published message and claim its slot.
    ///
    /// Returns the position of the claimed slot, or `None` when the reader
    /// has caught up with the shared head.
    pub fn advance_reader(&self, id: usize) -> Option<u64> {
        let rec = self.reader(id);
        let entered = rec.entered.load(Acquire) != 0;
        let held = rec.held.load(Relaxed);
        let held_idx = self.index_of(held);
        let mut pos = rec.rhead.load(Acquire);

        loop {
            let whead = self.whead();
            if pos >= whead {
                rec.rhead.store(pos, Release);
                return None;
            }
            // Lapped: everything up to here was overwritten and already charged.
            let floor = whead.saturating_sub(self.geometry.slots as u64);
            if pos < floor {
                pos = floor;
            }
            pos += 1;
            let idx = self.index_of(pos);

            // Our own held slot cannot carry a newer message.
            if entered && idx == held_idx {
                continue;
            }
            // Writer owned: its old content is being overwritten.
            if self.table.transition(idx, Op::ReaderClaim(id)).is_err() {
                continue;
            }
            if self.table.stamp(idx) != pos {
                self.release(idx, Op::ReaderRelease(id));
                continue;
            }

            rec.rhead.store(pos, Release);
            rec.held.store(pos, Relaxed);
            rec.entered.store(1, Release);
            rec.consumed.fetch_add(1, Relaxed);
            // The record already points at the new slot when the old one goes.
            if entered {
                self.release(held_idx, Op::ReaderRelease(id));
            }
            return Some(pos);
        }
    }

    /// Drop the slot a reader currently holds, if any.
    pub fn release_reader_slot(&self, id: usize) {
        let rec = self.reader(id);
        if rec.entered.swap(0, AcqRel) != 0 {
            let idx = self.index_of(rec.held.load(Relaxed));
            self.release(idx, Op::ReaderRelease(id));
        }
    }

    pub fn stats(&self) -> RingStats {
        let h = self.head();
        RingStats {
            whead: h.whead.load(Acquire),
            wresv: h.wresv.load(Acquire),
            produced: h.produced.load(Relaxed),
            contention: self.table.contention(),
            bound_writers: self.bound_writers(),
            bound_readers: self.bound_readers().len(),
        }
    }
}

pub struct WriteLockGuard<'a> {
    word: &'a AtomicU32,
}

impl Drop for WriteLockGuard<'_> {
    fn drop(&mut self) {
        self.word.store(0, Release);
    }
}
