use std::fmt;
use std::mem::size_of;
use std::ptr::addr_of_mut;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};
use std::sync::Arc;

use log::{debug, info, warn};

use super::layout::{link, unlink, ControlGeometry, ControlHeader, ControlNode, LINK_MASK};
use super::reader::ControlReader;
use super::writer::ControlWriter;
use crate::Core::{attach_shared_memory, remove_shared_memory, SharedMemoryBackend, WaitChannel};
use crate::KRing::Buffer::arena::SlotArena;
use crate::KRing::Buffer::layout::{encode_name, SetHeader, KIND_CONTROL, LAYOUT_VERSION, SET_MAGIC};
use crate::KRing::{allocate_region, checked_header, validate_name, wait_channel_for};
use crate::KRing::{ControlConfig, Host};
use crate::error::{Result, RingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlStats {
    pub produced: u64,
    pub consumed: u64,
    pub contention: u64,
    pub bound_writers: usize,
    pub reader_bound: bool,
}

/// Small variable-length messages from many writers to one reader.
///
/// Nodes move from the free list to a writer, onto the publish stack, into
/// the reader's FIFO and back to the free list. Nothing is overwritten: a
/// writer finding the free list empty gets `None`.
pub struct ControlChannel {
    name: String,
    geometry: ControlGeometry,
    writers: usize,
    host: Host,
    owner: bool,
    header: *const ControlHeader,
    nodes: *const ControlNode,
    arena: SlotArena,
    wait: Box<dyn WaitChannel>,
    // Last: the pointers above point into it.
    region: Box<dyn SharedMemoryBackend>,
}

unsafe impl Send for ControlChannel {}
unsafe impl Sync for ControlChannel {}

impl ControlChannel {
    pub fn create(name: &str, config: ControlConfig) -> Result<Self> {
        validate_name(name)?;
        if let Err(e) = config.validate() {
            warn!("Refusing control channel {}: {}", name, e);
            return Err(e);
        }
        let geometry = ControlGeometry {
            nodes: config.nodes,
            slot_size: config.slot_size,
        };
        let region = allocate_region(name, config.host, geometry.region_size())?;
        let header = region.as_ptr() as *mut SetHeader;
        unsafe {
            addr_of_mut!((*header).version).write(LAYOUT_VERSION);
            addr_of_mut!((*header).kind).write(KIND_CONTROL);
            addr_of_mut!((*header).readers).write(1);
            addr_of_mut!((*header).writers).write(config.writers as u32);
            addr_of_mut!((*header).slot_size).write(config.slot_size as u32);
            addr_of_mut!((*header).slots).write(config.nodes as u64);
            addr_of_mut!((*header).name).write(encode_name(name));
        }

        let chan = unsafe { Self::from_region(name, geometry, config.writers, config.host, true, region) };
        chan.init_free_list();
        chan.set_header().magic.store(SET_MAGIC, Release);

        info!(
            "Created control channel {} ({} nodes x {} bytes, {:?})",
            name, config.nodes, config.slot_size, config.host
        );
        Ok(chan)
    }

    pub fn attach(name: &str) -> Result<Self> {
        validate_name(name)?;
        let region = attach_shared_memory(name, size_of::<SetHeader>()).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RingError::UnknownRingSet(name.to_string()),
            _ => RingError::map(name, e),
        })?;
        let header = checked_header(region.as_ref(), name, KIND_CONTROL)?;
        let config = ControlConfig {
            nodes: header.slots as usize,
            slot_size: header.slot_size as usize,
            writers: header.writers as usize,
            host: Host::SharedMemory,
        };
        config
            .validate()
            .map_err(|e| RingError::Protocol(format!("region {name:?} has bad geometry: {e}")))?;
        let geometry = ControlGeometry {
            nodes: config.nodes,
            slot_size: config.slot_size,
        };
        if region.size() < geometry.region_size() {
            warn!("Region {} does not match its recorded geometry", name);
            return Err(RingError::Protocol(format!("region {name:?} is truncated")));
        }
        let chan = unsafe { Self::from_region(name, geometry, config.writers, Host::SharedMemory, false, region) };
        info!("Attached control channel {}", name);
        Ok(chan)
    }

    unsafe fn from_region(
        name: &str,
        geometry: ControlGeometry,
        writers: usize,
        host: Host,
        owner: bool,
        region: Box<dyn SharedMemoryBackend>,
    ) -> Self {
        let base = region.as_ptr();
        let wait = wait_channel_for(host, &*(base as *const SetHeader));
        Self {
            name: name.to_string(),
            geometry,
            writers,
            host,
            owner,
            header: base.add(ControlGeometry::header_offset()) as *const ControlHeader,
            nodes: base.add(ControlGeometry::nodes_offset()) as *const ControlNode,
            arena: SlotArena::new(base.add(geometry.arena_offset()), geometry.slot_size, geometry.nodes),
            wait,
            region,
        }
    }

    /// Chain every node onto the free list, node 0 on top.
    fn init_free_list(&self) {
        let n = self.geometry.nodes;
        for i in 0..n {
            let next = if i + 1 < n { link(i + 1) } else { 0 };
            self.node(i).next.store(next, Relaxed);
        }
        self.head().free_head.store(link(0), Release);
    }

    fn set_header(&self) -> &SetHeader {
        unsafe { &*(self.region.as_ptr() as *const SetHeader) }
    }

    pub(crate) fn head(&self) -> &ControlHeader {
        unsafe { &*self.header }
    }

    pub(crate) fn node(&self, index: usize) -> &ControlNode {
        assert!(index < self.geometry.nodes, "control node {index} out of range");
        unsafe { &*self.nodes.add(index) }
    }

    pub(crate) fn arena(&self) -> &SlotArena {
        &self.arena
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> usize {
        self.geometry.nodes
    }

    pub fn slot_size(&self) -> usize {
        self.geometry.slot_size
    }

    pub fn host(&self) -> Host {
        self.host
    }

    pub fn is_owner(&self) -> bool {
        self.owner
    }

    fn note_contention(&self) {
        self.head().contention.fetch_add(1, Relaxed);
    }

    // ---------------------------------------------------------------------
    // Free list (tagged against ABA)
    // ---------------------------------------------------------------------

    pub(crate) fn pop_free(&self) -> Option<usize> {
        let free = &self.head().free_head;
        let mut cur = free.load(Acquire);
        loop {
            let index = unlink(cur)?;
            let next = self.node(index).next.load(Acquire) & LINK_MASK;
            let tag = (cur >> 32).wrapping_add(1);
            match free.compare_exchange_weak(cur, (tag << 32) | next, AcqRel, Acquire) {
                Ok(_) => return Some(index),
                Err(actual) => {
                    self.note_contention();
                    cur = actual;
                }
            }
        }
    }

    pub(crate) fn push_free(&self, index: usize) {
        let free = &self.head().free_head;
        let mut cur = free.load(Acquire);
        loop {
            self.node(index).next.store(cur & LINK_MASK, Release);
            let tag = (cur >> 32).wrapping_add(1);
            match free.compare_exchange_weak(cur, (tag << 32) | link(index), AcqRel, Acquire) {
                Ok(_) => return,
                Err(actual) => {
                    self.note_contention();
                    cur = actual;
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Publish stack
    // ---------------------------------------------------------------------

    pub(crate) fn push_published(&self, index: usize) {
        let stack = &self.head().stack_head;
        let mut cur = stack.load(Acquire);
        loop {
            self.node(index).next.store(cur, Relaxed);
            match stack.compare_exchange_weak(cur, link(index), AcqRel, Acquire) {
                Ok(_) => break,
                Err(actual) => {
                    self.note_contention();
                    cur = actual;
                }
            }
        }
        self.head().produced.fetch_add(1, Relaxed);
        self.wait.notify_all();
    }

    /// Move everything published so far onto the reader's FIFO, oldest first.
    /// Reader only.
    pub(crate) fn drain_stack(&self) {
        let h = self.head();
        let mut top = h.stack_head.swap(0, AcqRel);
        if top == 0 {
            return;
        }
        let newest = top;
        let mut prev = 0u64;
        while let Some(index) = unlink(top) {
            let node = self.node(index);
            top = node.next.load(Relaxed);
            node.next.store(prev, Relaxed);
            prev = link(index);
        }
        match unlink(h.fifo_tail.load(Relaxed)) {
            Some(tail) => self.node(tail).next.store(prev, Relaxed),
            None => h.fifo_head.store(prev, Relaxed),
        }
        h.fifo_tail.store(newest, Relaxed);
    }

    /// Reader only.
    pub(crate) fn pop_fifo(&self) -> Option<usize> {
        let h = self.head();
        let index = unlink(h.fifo_head.load(Relaxed))?;
        let next = self.node(index).next.load(Relaxed);
        h.fifo_head.store(next, Relaxed);
        if next == 0 {
            h.fifo_tail.store(0, Relaxed);
        }
        Some(index)
    }

    pub(crate) fn pending(&self) -> bool {
        let h = self.head();
        h.fifo_head.load(Relaxed) != 0 || h.stack_head.load(Acquire) != 0
    }

    pub(crate) fn wait_channel(&self) -> &dyn WaitChannel {
        self.wait.as_ref()
    }

    /// Wake a sleeping reader without publishing anything; its blocking
    /// read returns `None`.
    pub fn interrupt(&self) {
        self.wait.interrupt();
        debug!("Interrupted reader of {}", self.name);
    }

    // ---------------------------------------------------------------------
    // Binding
    // ---------------------------------------------------------------------

    pub fn open_writer(self: &Arc<Self>) -> Result<ControlWriter> {
        let ids = &self.head().writer_ids;
        let mut cur = ids.load(Acquire);
        loop {
            let Some(id) = (0..self.writers).find(|&i| cur & (1 << i) == 0) else {
                return Err(RingError::NoFreeWriterId { ring: 0 });
            };
            match ids.compare_exchange_weak(cur, cur | (1 << id), AcqRel, Acquire) {
                Ok(_) => {
                    debug!("Bound control writer {} on {}", id, self.name);
                    return Ok(ControlWriter::new(Arc::clone(self), id));
                }
                Err(actual) => {
                    self.note_contention();
                    cur = actual;
                }
            }
        }
    }

    /// There is exactly one reader per channel.
    pub fn open_reader(self: &Arc<Self>) -> Result<ControlReader> {
        if self
            .head()
            .reader_bound
            .compare_exchange(0, 1, AcqRel, Acquire)
            .is_err()
        {
            return Err(RingError::NoFreeReaderId { ring: None });
        }
        debug!("Bound control reader on {}", self.name);
        Ok(ControlReader::new(Arc::clone(self)))
    }

    pub(crate) fn release_writer_id(&self, id: usize) {
        self.head().writer_ids.fetch_and(!(1u32 << id), AcqRel);
    }

    pub(crate) fn release_reader(&self) {
        self.head().reader_bound.store(0, Release);
    }

    pub fn bound_handles(&self) -> usize {
        let h = self.head();
        h.writer_ids.load(Acquire).count_ones() as usize + h.reader_bound.load(Acquire) as usize
    }

    pub fn stats(&self) -> ControlStats {
        let h = self.head();
        ControlStats {
            produced: h.produced.load(Relaxed),
            consumed: h.consumed.load(Relaxed),
            contention: h.contention.load(Relaxed),
            bound_writers: h.writer_ids.load(Acquire).count_ones() as usize,
            reader_bound: h.reader_bound.load(Acquire) != 0,
        }
    }

    pub(crate) fn remove_backing(&self) -> Result<()> {
        if self.host == Host::SharedMemory && self.owner {
            remove_shared_memory(&self.name).map_err(|e| RingError::map(&self.name, e))?;
        }
        Ok(())
    }
}

impl fmt::Debug for ControlChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_control_channel(self, f)
    }
}
