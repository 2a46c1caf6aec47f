use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use super::ringset::{RingId, RingSet};
use super::Structs::Message_Structs::{decode, DecryptedView, Message, PacketView};
use crate::Core::{WaitOutcome, WaitToken};

/// A reader bound to one ring or to every ring of a set.
///
/// Each returned message borrows the slot the reader holds; the slot is
/// released when the reader moves on or closes.
pub struct RingReader {
    set: Arc<RingSet>,
    ring: RingId,
    reader_id: usize,
    current: Option<(usize, u64)>,
    /// Interrupt generation this reader has already returned for.
    interrupts_seen: AtomicU32,
    closed: bool,
}

impl RingReader {
    pub(crate) fn new(set: Arc<RingSet>, ring: RingId, reader_id: usize) -> Self {
        let interrupts_seen = AtomicU32::new(set.wait_channel().interrupts());
        Self {
            set,
            ring,
            reader_id,
            current: None,
            interrupts_seen,
            closed: false,
        }
    }

    pub(crate) fn ring_range(&self) -> Range<usize> {
        match self.ring {
            RingId::Ring(r) => r..r + 1,
            RingId::All => 0..self.set.nrings(),
        }
    }

    pub fn ring_set(&self) -> &Arc<RingSet> {
        &self.set
    }

    pub fn ring_id(&self) -> RingId {
        self.ring
    }

    pub fn reader_id(&self) -> usize {
        self.reader_id
    }

    /// Ring and position of the slot behind the last returned message.
    pub fn position(&self) -> Option<(usize, u64)> {
        self.current
    }

    fn advance(&mut self) -> Option<(usize, u64)> {
        let rings = self.set.rings();
        for r in self.ring_range() {
            if let Some(pos) = rings[r].advance_reader(self.reader_id) {
                self.current = Some((r, pos));
                return self.current;
            }
        }
        None
    }

    fn slot(&self, ring: usize, pos: u64) -> &[u8] {
        let ring = &self.set.rings()[ring];
        unsafe { ring.arena().slot(ring.index_of(pos)) }
    }

    /// Next message, or `None` once the reader has caught up.
    pub fn next(&mut self) -> Option<Message<'_>> {
        let (r, pos) = self.advance()?;
        Some(decode(self.slot(r, pos)))
    }

    /// Payload of the next message whatever its header.
    pub fn next_plain(&mut self) -> Option<&[u8]> {
        let (r, pos) = self.advance()?;
        Some(decode(self.slot(r, pos)).payload())
    }

    /// Next packet; messages of other kinds are consumed and passed over.
    pub fn next_packet(&mut self) -> Option<PacketView<'_>> {
        let (r, pos) = loop {
            let (r, pos) = self.advance()?;
            if matches!(decode(self.slot(r, pos)), Message::Packet(_)) {
                break (r, pos);
            }
        };
        match decode(self.slot(r, pos)) {
            Message::Packet(p) => Some(p),
            _ => None,
        }
    }

    /// Next decrypted record; messages of other kinds are consumed and passed over.
    pub fn next_decrypted(&mut self) -> Option<DecryptedView<'_>> {
        let (r, pos) = loop {
            let (r, pos) = self.advance()?;
            if matches!(decode(self.slot(r, pos)), Message::Decrypted(_)) {
                break (r, pos);
            }
        };
        match decode(self.slot(r, pos)) {
            Message::Decrypted(d) => Some(d),
            _ => None,
        }
    }

    /// Like [`next`](Self::next), sleeping on the set's wait channel while
    /// nothing is available. `None` on timeout or interruption.
    pub fn next_wait(&mut self, timeout: Option<Duration>) -> Option<Message<'_>> {
        let (r, pos) = loop {
            if let Some(found) = self.advance() {
                break found;
            }
            match self.wait(timeout) {
                WaitOutcome::Notified => continue,
                WaitOutcome::TimedOut | WaitOutcome::Interrupted => return None,
            }
        };
        Some(decode(self.slot(r, pos)))
    }

    /// The message last returned, still held.
    pub fn current(&self) -> Option<Message<'_>> {
        self.current.map(|(r, pos)| decode(self.slot(r, pos)))
    }

    pub fn avail(&self) -> bool {
        let rings = self.set.rings();
        self.ring_range().any(|r| rings[r].reader_avail(self.reader_id))
    }

    /// Messages lost by this reader, summed over its rings.
    pub fn skips(&self) -> u64 {
        let rings = self.set.rings();
        self.ring_range().map(|r| rings[r].reader_skips(self.reader_id)).sum()
    }

    pub fn consumed(&self) -> u64 {
        let rings = self.set.rings();
        self.ring_range().map(|r| rings[r].reader_consumed(self.reader_id)).sum()
    }

    /// Sleep until something is published, the set is interrupted or the
    /// timeout expires. Returns at once when data is already available, or
    /// with `Interrupted` when the set was interrupted since this reader last
    /// returned for it.
    pub fn wait(&self, timeout: Option<Duration>) -> WaitOutcome {
        let channel = self.set.wait_channel();
        let token = WaitToken {
            interrupts: self.interrupts_seen.load(Ordering::Relaxed),
            epoch: channel.epoch(),
        };
        let outcome = if channel.interrupts() != token.interrupts {
            WaitOutcome::Interrupted
        } else if self.avail() {
            WaitOutcome::Notified
        } else {
            channel.wait(token, timeout)
        };
        if outcome == WaitOutcome::Interrupted {
            self.interrupts_seen.store(channel.interrupts(), Ordering::Relaxed);
        }
        outcome
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.current = None;
        let rings = self.set.rings();
        for r in self.ring_range() {
            rings[r].release_reader_slot(self.reader_id);
            rings[r].release_reader_id(self.reader_id);
        }
        debug!("Closed reader {} on {}[{:?}]", self.reader_id, self.set.name(), self.ring);
    }

    /// Release the held slot and free the reader id.
    pub fn close(mut self) {
        self.shutdown();
    }
}

impl Drop for RingReader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for RingReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingReader")
            .field("set", &self.set.name())
            .field("ring", &self.ring)
            .field("reader_id", &self.reader_id)
            .field("position", &self.current)
            .field("skips", &self.skips())
            .finish()
    }
}
