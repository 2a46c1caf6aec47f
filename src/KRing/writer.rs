use std::fmt;
use std::sync::Arc;

use log::debug;

use super::ringset::RingSet;
use super::Buffer::Ring::Ring;
use super::Structs::Message_Structs::{
    encode_decrypted, encode_packet, encode_plain, payload_capacity, Direction, KIND_PACKET,
};

/// A writer bound to one ring.
///
/// `write_first` reserves a slot and hands out its bytes; `write_second`
/// publishes it. The typed `write_*` helpers do both around a header.
pub struct RingWriter {
    set: Arc<RingSet>,
    ring: usize,
    writer_id: usize,
    reserved: Option<u64>,
    closed: bool,
}

impl RingWriter {
    pub(crate) fn new(set: Arc<RingSet>, ring: usize, writer_id: usize) -> Self {
        Self {
            set,
            ring,
            writer_id,
            reserved: None,
            closed: false,
        }
    }

    fn ring(&self) -> &Ring {
        &self.set.rings()[self.ring]
    }

    pub fn ring_set(&self) -> &Arc<RingSet> {
        &self.set
    }

    pub fn ring_id(&self) -> usize {
        self.ring
    }

    pub fn writer_id(&self) -> usize {
        self.writer_id
    }

    /// Position of the open reservation, if any.
    pub fn reserved(&self) -> Option<u64> {
        self.reserved
    }

    pub fn slot_size(&self) -> usize {
        self.set.geometry().slot_size
    }

    fn reserve(&mut self) -> u64 {
        if let Some(pos) = self.reserved {
            return pos;
        }
        let ring = self.ring();
        let pos = if ring.is_single_writer() {
            ring.write_first_single()
        } else {
            ring.write_first_multi(self.writer_id)
        };
        self.reserved = Some(pos);
        pos
    }

    /// Reserve a slot and return its bytes. Calling it again before
    /// `write_second` returns the same slot.
    pub fn write_first(&mut self) -> &mut [u8] {
        let pos = self.reserve();
        let ring = self.ring();
        unsafe { ring.arena().slot_mut(ring.index_of(pos)) }
    }

    /// Publish the reserved slot and wake readers. Returns false when nothing
    /// was reserved.
    pub fn write_second(&mut self) -> bool {
        let Some(pos) = self.reserved.take() else {
            return false;
        };
        let ring = self.ring();
        if ring.is_single_writer() {
            ring.write_second_single(pos);
        } else {
            ring.write_second_multi(self.writer_id, pos);
        }
        self.set.notify();
        true
    }

    /// One slot; bytes beyond the slot capacity are cut. Returns the bytes stored.
    pub fn write_packet(&mut self, dir: Direction, data: &[u8]) -> usize {
        let stored = encode_packet(self.write_first(), dir, data, data.len());
        self.write_second();
        stored
    }

    /// Spread a packet over as many slots as it needs. Every slot carries the
    /// full packet length. Returns the number of slots written.
    pub fn write_packet_all(&mut self, dir: Direction, data: &[u8]) -> usize {
        let cap = payload_capacity(self.slot_size(), KIND_PACKET);
        if data.is_empty() {
            self.write_packet(dir, data);
            return 1;
        }
        let mut slots = 0;
        for chunk in data.chunks(cap) {
            encode_packet(self.write_first(), dir, chunk, data.len());
            self.write_second();
            slots += 1;
        }
        slots
    }

    pub fn write_decrypted(&mut self, id: i64, side: u8, host: Option<&str>, data: &[u8]) -> usize {
        let stored = encode_decrypted(self.write_first(), id, side, host, data);
        self.write_second();
        stored
    }

    pub fn write_plain(&mut self, data: &[u8]) -> usize {
        let stored = encode_plain(self.write_first(), data);
        self.write_second();
        stored
    }

    /// `write_plain` under the ring's write mutex, for writers that need
    /// their messages appended in lock order.
    pub fn write_plain_serialized(&mut self, data: &[u8]) -> usize {
        let set = Arc::clone(&self.set);
        let _guard = set.rings()[self.ring].lock_writes();
        self.write_plain(data)
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let multi = !self.ring().is_single_writer();
        if let Some(pos) = self.reserved.take() {
            self.ring().abandon(multi.then_some(self.writer_id), pos);
        }
        self.ring().release_writer_id(self.writer_id);
        debug!("Closed writer {} on {}[{}]", self.writer_id, self.set.name(), self.ring);
    }

    /// Abandon any open reservation and free the writer id.
    pub fn close(mut self) {
        self.shutdown();
    }
}

impl Drop for RingWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for RingWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingWriter")
            .field("set", &self.set.name())
            .field("ring", &self.ring)
            .field("writer_id", &self.writer_id)
            .field("reserved", &self.reserved)
            .finish()
    }
}
