use std::fmt;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::{Acquire, Relaxed};
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use super::channel::ControlChannel;
use super::layout::{link, unlink};
use crate::Core::{WaitOutcome, WaitToken};

/// The single reader of a control channel.
///
/// The node returned by `read` stays held until the next `read` or `close`,
/// then goes back to the free list.
pub struct ControlReader {
    chan: Arc<ControlChannel>,
    interrupts_seen: AtomicU32,
    closed: bool,
}

impl ControlReader {
    pub(crate) fn new(chan: Arc<ControlChannel>) -> Self {
        let interrupts_seen = AtomicU32::new(chan.wait_channel().interrupts());
        Self {
            chan,
            interrupts_seen,
            closed: false,
        }
    }

    fn release_held(&self) {
        let held = &self.chan.head().held;
        if let Some(index) = unlink(held.swap(0, Relaxed)) {
            self.chan.push_free(index);
        }
    }

    fn take_next(&mut self) -> Option<usize> {
        self.release_held();
        let index = match self.chan.pop_fifo() {
            Some(index) => index,
            None => {
                self.chan.drain_stack();
                self.chan.pop_fifo()?
            }
        };
        let h = self.chan.head();
        h.held.store(link(index), Relaxed);
        h.consumed.fetch_add(1, Relaxed);
        Some(index)
    }

    fn bytes(&self, index: usize) -> &[u8] {
        let len = self.chan.node(index).len.load(Acquire) as usize;
        let slot = unsafe { self.chan.arena().slot(index) };
        &slot[..len.min(slot.len())]
    }

    /// The message last returned by `read`, still held.
    pub fn current(&self) -> Option<&[u8]> {
        let index = unlink(self.chan.head().held.load(Relaxed))?;
        Some(self.bytes(index))
    }

    /// Next message in publish order per writer, or `None` when nothing is pending.
    pub fn read(&mut self) -> Option<&[u8]> {
        let index = self.take_next()?;
        Some(self.bytes(index))
    }

    pub fn read_wait(&mut self, timeout: Option<Duration>) -> Option<&[u8]> {
        let index = loop {
            if let Some(index) = self.take_next() {
                break index;
            }
            match self.wait(timeout) {
                WaitOutcome::Notified => continue,
                WaitOutcome::TimedOut | WaitOutcome::Interrupted => return None,
            }
        };
        Some(self.bytes(index))
    }

    pub fn avail(&self) -> bool {
        self.chan.pending()
    }

    /// `Interrupted` once per `ControlChannel::interrupt`, even when the
    /// interrupt came before the call.
    pub fn wait(&self, timeout: Option<Duration>) -> WaitOutcome {
        let channel = self.chan.wait_channel();
        let token = WaitToken {
            interrupts: self.interrupts_seen.load(Relaxed),
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
            self.interrupts_seen.store(channel.interrupts(), Relaxed);
        }
        outcome
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.release_held();
        self.chan.release_reader();
        debug!("Closed control reader on {}", self.chan.name());
    }

    pub fn close(mut self) {
        self.shutdown();
    }
}

impl Drop for ControlReader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ControlReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlReader")
            .field("channel", &self.chan.name())
            .field("pending", &self.avail())
            .finish()
    }
}
