use std::fmt;
use std::sync::atomic::Ordering::Release;
use std::sync::Arc;

use log::debug;

use super::channel::ControlChannel;

/// Writer side of a control channel.
pub struct ControlWriter {
    chan: Arc<ControlChannel>,
    writer_id: usize,
    reserved: Option<usize>,
    closed: bool,
}

impl ControlWriter {
    pub(crate) fn new(chan: Arc<ControlChannel>, writer_id: usize) -> Self {
        Self {
            chan,
            writer_id,
            reserved: None,
            closed: false,
        }
    }

    pub fn writer_id(&self) -> usize {
        self.writer_id
    }

    /// Take a node off the free list and return its buffer. `None` when every
    /// node is in flight; nothing is overwritten.
    pub fn open(&mut self) -> Option<&mut [u8]> {
        let index = match self.reserved {
            Some(index) => index,
            None => {
                let index = self.chan.pop_free()?;
                self.reserved = Some(index);
                index
            }
        };
        Some(unsafe { self.chan.arena().slot_mut(index) })
    }

    /// Publish the opened node with `len` bytes of content.
    pub fn write(&mut self, len: usize) -> bool {
        let Some(index) = self.reserved.take() else {
            return false;
        };
        let len = len.min(self.chan.slot_size());
        self.chan.node(index).len.store(len as u32, Release);
        self.chan.push_published(index);
        true
    }

    /// Copy `data` (cut to the node size) into a fresh node and publish it.
    pub fn send(&mut self, data: &[u8]) -> bool {
        let Some(buf) = self.open() else {
            return false;
        };
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        self.write(n)
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(index) = self.reserved.take() {
            self.chan.push_free(index);
        }
        self.chan.release_writer_id(self.writer_id);
        debug!("Closed control writer {} on {}", self.writer_id, self.chan.name());
    }

    pub fn close(mut self) {
        self.shutdown();
    }
}

impl Drop for ControlWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ControlWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlWriter")
            .field("channel", &self.chan.name())
            .field("writer_id", &self.writer_id)
            .field("reserved", &self.reserved)
            .finish()
    }
}
