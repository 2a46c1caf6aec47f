use std::slice;

/// Slot pages of one ring, addressed by index.
///
/// The same index resolves to a different address in every process that maps
/// the region, so only indices are ever stored in shared memory.
pub struct SlotArena {
    base: *mut u8,
    slot_size: usize,
    slots: usize,
}

unsafe impl Send for SlotArena {}
unsafe impl Sync for SlotArena {}

impl SlotArena {
    /// # Safety
    /// `base` must point at `slots * slot_size` mapped bytes that outlive the arena.
    pub unsafe fn new(base: *mut u8, slot_size: usize, slots: usize) -> Self {
        Self {
            base,
            slot_size,
            slots,
        }
    }

    #[inline]
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    #[inline]
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Process-local address of slot `index`.
    #[inline]
    pub fn resolve(&self, index: usize) -> *mut u8 {
        assert!(index < self.slots, "slot index {index} out of range");
        unsafe { self.base.add(index * self.slot_size) }
    }

    /// # Safety
    /// The caller must hold a reader claim on the slot.
    #[inline]
    pub unsafe fn slot(&self, index: usize) -> &[u8] {
        slice::from_raw_parts(self.resolve(index), self.slot_size)
    }

    /// # Safety
    /// The caller must hold the writer claim on the slot, and no other
    /// reference to it may be alive.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slot_mut(&self, index: usize) -> &mut [u8] {
        slice::from_raw_parts_mut(self.resolve(index), self.slot_size)
    }
}
