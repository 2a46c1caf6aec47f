use std::fmt;
use std::mem::size_of;
use std::ptr::addr_of_mut;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::{debug, info, warn};

use super::builder::{Host, RingSetConfig};
use super::reader::RingReader;
use super::writer::RingWriter;
use super::Buffer::layout::{
    decode_name, encode_name, RingGeometry, SetHeader, KIND_DATA, LAYOUT_VERSION, SET_MAGIC,
};
use super::Buffer::Ring::{Ring, RingStats};
use crate::Core::{
    attach_shared_memory, create_shared_memory, remove_shared_memory, CondvarWait, FutexChannel,
    HeapRegion, SharedMemoryBackend, WaitChannel,
};
use crate::error::{Result, RingError};

/// Which ring of a set a handle binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RingId {
    Ring(usize),
    /// Every ring of the set; readers only.
    All,
}

impl RingId {
    /// Negative values select every ring.
    pub fn from_raw(raw: i32) -> Self {
        if raw < 0 {
            RingId::All
        } else {
            RingId::Ring(raw as usize)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Read,
    Write,
}

/// A bound reader or writer, as returned by [`RingSet::open`].
#[derive(Debug)]
pub enum Handle {
    Reader(RingReader),
    Writer(RingWriter),
}

impl Handle {
    pub fn into_reader(self) -> Option<RingReader> {
        match self {
            Handle::Reader(r) => Some(r),
            Handle::Writer(_) => None,
        }
    }

    pub fn into_writer(self) -> Option<RingWriter> {
        match self {
            Handle::Writer(w) => Some(w),
            Handle::Reader(_) => None,
        }
    }
}

/// 1..=31 bytes of `[A-Za-z0-9_.-]`.
pub fn validate_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.len() < super::Buffer::layout::NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'));
    if ok {
        Ok(())
    } else {
        Err(RingError::BadName(name.to_string()))
    }
}

pub(crate) fn allocate_region(
    name: &str,
    host: Host,
    size: usize,
) -> Result<Box<dyn SharedMemoryBackend>> {
    match host {
        Host::InProcess => HeapRegion::new(size)
            .map(|r| Box::new(r) as Box<dyn SharedMemoryBackend>)
            .map_err(|e| RingError::map(name, e)),
        Host::SharedMemory => create_shared_memory(size, name).map_err(|e| RingError::map(name, e)),
    }
}

/// Header of a region mapped by somebody else, checked before any view is built.
pub(crate) fn checked_header<'a>(
    region: &'a dyn SharedMemoryBackend,
    name: &str,
    kind: u32,
) -> Result<&'a SetHeader> {
    if region.size() < size_of::<SetHeader>() {
        return Err(RingError::Protocol(format!("region {name:?} too small for a header")));
    }
    let header = unsafe { &*(region.as_ptr() as *const SetHeader) };
    let magic = header.magic.load(Ordering::Acquire);
    if magic != SET_MAGIC {
        warn!("Region {} has bad magic {:#x}", name, magic);
        return Err(RingError::Protocol(format!("region {name:?} is not initialized")));
    }
    if header.version != LAYOUT_VERSION || header.kind != kind {
        warn!(
            "Region {} has version {} kind {}, expected version {} kind {}",
            name, header.version, header.kind, LAYOUT_VERSION, kind
        );
        return Err(RingError::Protocol(format!("region {name:?} has an incompatible layout")));
    }
    if decode_name(&header.name) != name {
        warn!("Region {} carries name {:?}", name, decode_name(&header.name));
        return Err(RingError::Protocol(format!("region {name:?} belongs to another set")));
    }
    Ok(header)
}

/// Futex channel for mapped regions, condvar for heap ones.
pub(crate) fn wait_channel_for(host: Host, header: &SetHeader) -> Box<dyn WaitChannel> {
    match host {
        Host::InProcess => Box::new(CondvarWait::new()),
        Host::SharedMemory => unsafe { Box::new(FutexChannel::new(
            &header.epoch,
            &header.interrupts,
            &header.waiters,
        )) },
    }
}

/// A named group of rings sharing one region and one wait channel.
pub struct RingSet {
    name: String,
    geometry: RingGeometry,
    host: Host,
    owner: bool,
    rings: Vec<Ring>,
    wait: Box<dyn WaitChannel>,
    // Last: the views above point into it.
    region: Box<dyn SharedMemoryBackend>,
}

impl RingSet {
    /// Allocate and initialize a new ring set.
    pub fn create(name: &str, config: RingSetConfig) -> Result<Self> {
        validate_name(name)?;
        if let Err(e) = config.validate() {
            warn!("Refusing ring set {}: {}", name, e);
            return Err(e);
        }
        let geometry = config.geometry();
        let size = geometry.region_size(config.rings);
        let region = allocate_region(name, config.host, size)?;

        let base = region.as_ptr();
        let header = base as *mut SetHeader;
        // Fresh regions are zeroed; cursors, bitmaps and descriptors start at 0.
        unsafe {
            addr_of_mut!((*header).version).write(LAYOUT_VERSION);
            addr_of_mut!((*header).kind).write(KIND_DATA);
            addr_of_mut!((*header).nrings).write(config.rings as u32);
            addr_of_mut!((*header).readers).write(config.readers as u32);
            addr_of_mut!((*header).writers).write(config.writers as u32);
            addr_of_mut!((*header).slot_size).write(config.slot_size as u32);
            addr_of_mut!((*header).slots).write(config.slots as u64);
            addr_of_mut!((*header).ring_stride).write(geometry.ring_stride() as u64);
            addr_of_mut!((*header).name).write(encode_name(name));
        }
        let set = unsafe { Self::from_region(name, geometry, config.rings, config.host, true, region) };
        // Published last: attachers treat anything else as uninitialized.
        set.header().magic.store(SET_MAGIC, Ordering::Release);

        info!(
            "Created ring set {} ({} rings x {} slots x {} bytes, {} readers, {} writers, {:?})",
            name, config.rings, config.slots, config.slot_size, config.readers, config.writers, config.host
        );
        Ok(set)
    }

    /// Map a ring set created by another process.
    pub fn attach(name: &str) -> Result<Self> {
        validate_name(name)?;
        let region = attach_shared_memory(name, size_of::<SetHeader>()).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RingError::UnknownRingSet(name.to_string()),
            _ => RingError::map(name, e),
        })?;
        let header = checked_header(region.as_ref(), name, KIND_DATA)?;
        let config = RingSetConfig {
            rings: header.nrings as usize,
            slots: header.slots as usize,
            slot_size: header.slot_size as usize,
            readers: header.readers as usize,
            writers: header.writers as usize,
            host: Host::SharedMemory,
        };
        config
            .validate()
            .map_err(|e| RingError::Protocol(format!("region {name:?} has bad geometry: {e}")))?;
        let geometry = config.geometry();
        if header.ring_stride != geometry.ring_stride() as u64
            || region.size() < geometry.region_size(config.rings)
        {
            warn!("Region {} does not match its recorded geometry", name);
            return Err(RingError::Protocol(format!("region {name:?} is truncated")));
        }

        let set = unsafe { Self::from_region(name, geometry, config.rings, Host::SharedMemory, false, region) };
        info!("Attached ring set {} ({} rings)", name, config.rings);
        Ok(set)
    }

    /// # Safety
    /// `region` must hold a set header followed by `nrings` rings of `geometry`.
    unsafe fn from_region(
        name: &str,
        geometry: RingGeometry,
        nrings: usize,
        host: Host,
        owner: bool,
        region: Box<dyn SharedMemoryBackend>,
    ) -> Self {
        let base = region.as_ptr();
        let stride = geometry.ring_stride();
        let rings = (0..nrings)
            .map(|i| Ring::new(base.add(RingGeometry::rings_offset() + i * stride), geometry))
            .collect();
        let wait = wait_channel_for(host, &*(base as *const SetHeader));
        Self {
            name: name.to_string(),
            geometry,
            host,
            owner,
            rings,
            wait,
            region,
        }
    }

    fn header(&self) -> &SetHeader {
        unsafe { &*(self.region.as_ptr() as *const SetHeader) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> RingGeometry {
        self.geometry
    }

    pub fn nrings(&self) -> usize {
        self.rings.len()
    }

    pub fn host(&self) -> Host {
        self.host
    }

    /// True for the process that created the set.
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    pub fn region(&self) -> &dyn SharedMemoryBackend {
        self.region.as_ref()
    }

    pub fn ring(&self, ring: usize) -> Option<&Ring> {
        self.rings.get(ring)
    }

    pub(crate) fn rings(&self) -> &[Ring] {
        &self.rings
    }

    pub(crate) fn wait_channel(&self) -> &dyn WaitChannel {
        self.wait.as_ref()
    }

    pub(crate) fn notify(&self) {
        self.wait.notify_all();
    }

    /// Wake every sleeping reader without publishing anything. Blocking
    /// reads in progress, and the next one of every reader bound now, return
    /// without a message.
    pub fn interrupt(&self) {
        self.wait.interrupt();
        debug!("Interrupted readers of {}", self.name);
    }

    pub fn stats(&self, ring: usize) -> Option<RingStats> {
        self.rings.get(ring).map(Ring::stats)
    }

    /// Writer and reader ids currently bound, summed over rings.
    pub fn bound_handles(&self) -> usize {
        self.rings
            .iter()
            .map(|r| r.bound_writers() + r.bound_readers().len())
            .sum()
    }

    fn check_ring(&self, ring: usize) -> Result<()> {
        if ring >= self.rings.len() {
            return Err(RingError::InvalidRingId {
                ring_id: ring,
                nrings: self.rings.len(),
            });
        }
        Ok(())
    }

    pub fn open(self: &Arc<Self>, ring: RingId, mode: Mode) -> Result<Handle> {
        match (mode, ring) {
            (Mode::Write, RingId::All) => Err(RingError::WriteToAllRings),
            (Mode::Write, RingId::Ring(r)) => self.open_writer(r).map(Handle::Writer),
            (Mode::Read, id) => self.open_reader(id).map(Handle::Reader),
        }
    }

    pub fn open_writer(self: &Arc<Self>, ring: usize) -> Result<RingWriter> {
        self.check_ring(ring)?;
        let writer_id = self.rings[ring]
            .allocate_writer_id()
            .ok_or(RingError::NoFreeWriterId { ring })?;
        debug!("Bound writer {} on {}[{}]", writer_id, self.name, ring);
        Ok(RingWriter::new(Arc::clone(self), ring, writer_id))
    }

    pub fn open_reader(self: &Arc<Self>, id: RingId) -> Result<RingReader> {
        let reader_id = match id {
            RingId::Ring(r) => {
                self.check_ring(r)?;
                self.rings[r]
                    .allocate_reader_id()
                    .ok_or(RingError::NoFreeReaderId { ring: Some(r) })?
            }
            RingId::All => self
                .allocate_reader_id_all()
                .ok_or(RingError::NoFreeReaderId { ring: None })?,
        };
        let reader = RingReader::new(Arc::clone(self), id, reader_id);
        for r in reader.ring_range() {
            self.rings[r].prime_reader(reader_id);
        }
        debug!("Bound reader {} on {}[{:?}]", reader_id, self.name, id);
        Ok(reader)
    }

    /// One reader id free on every ring, claimed ring by ring and rolled back on conflict.
    fn allocate_reader_id_all(&self) -> Option<usize> {
        'ids: for id in 0..self.geometry.readers {
            for (claimed, ring) in self.rings.iter().enumerate() {
                if !ring.try_claim_reader_id(id) {
                    for r in &self.rings[..claimed] {
                        r.release_reader_id(id);
                    }
                    continue 'ids;
                }
            }
            return Some(id);
        }
        None
    }

    /// Unlink the backing file of a shared-memory set. The mapping itself
    /// stays valid until the last handle drops.
    pub(crate) fn remove_backing(&self) -> Result<()> {
        if self.host == Host::SharedMemory && self.owner {
            remove_shared_memory(&self.name).map_err(|e| RingError::map(&self.name, e))?;
        }
        Ok(())
    }
}

impl fmt::Debug for RingSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_ring_set(self, f)
    }
}
