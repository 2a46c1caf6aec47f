use std::sync::Arc;

use super::Buffer::layout::{RingGeometry, MAX_READERS, MAX_RINGS, MAX_WRITERS};
use super::ringset::RingSet;
use crate::Control::ControlChannel;
use crate::Core::alloc::RingSetRegistry;
use crate::error::{Result, RingError};

/// Where a ring set's region and wait channel live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Host {
    /// Heap region and condvar; readers and writers are threads of one process.
    #[default]
    InProcess,
    /// `/dev/shm` mapping and a futex word inside it; other processes attach by name.
    SharedMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingSetConfig {
    pub rings: usize,
    pub slots: usize,
    pub slot_size: usize,
    pub readers: usize,
    pub writers: usize,
    pub host: Host,
}

impl Default for RingSetConfig {
    fn default() -> Self {
        Self {
            rings: 1,
            slots: 2048,
            slot_size: 4096,
            readers: 6,
            writers: 6,
            host: Host::InProcess,
        }
    }
}

fn check_slot_size(slot_size: usize) -> Result<()> {
    if slot_size < 256 || slot_size % 128 != 0 {
        return Err(RingError::InvalidConfig(format!(
            "slot size {slot_size} must be a multiple of 128 and at least 256"
        )));
    }
    Ok(())
}

fn check_writers(writers: usize) -> Result<()> {
    if writers == 0 || writers > MAX_WRITERS {
        return Err(RingError::InvalidConfig(format!(
            "writers {writers} out of range 1..={MAX_WRITERS}"
        )));
    }
    Ok(())
}

impl RingSetConfig {
    pub fn geometry(&self) -> RingGeometry {
        RingGeometry {
            slots: self.slots,
            slot_size: self.slot_size,
            readers: self.readers,
            writers: self.writers,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rings == 0 || self.rings > MAX_RINGS {
            return Err(RingError::InvalidConfig(format!(
                "rings {} out of range 1..={MAX_RINGS}",
                self.rings
            )));
        }
        if self.readers == 0 || self.readers > MAX_READERS {
            return Err(RingError::InvalidConfig(format!(
                "readers {} out of range 1..={MAX_READERS}",
                self.readers
            )));
        }
        check_writers(self.writers)?;
        if !self.slots.is_power_of_two() {
            return Err(RingError::InvalidConfig(format!(
                "slots {} is not a power of two",
                self.slots
            )));
        }
        // Every reader can hold one slot and skip past another; writers need room beyond that.
        if self.slots <= 2 * self.readers + self.writers {
            return Err(RingError::InvalidConfig(format!(
                "slots {} must exceed 2 * readers + writers ({})",
                self.slots,
                2 * self.readers + self.writers
            )));
        }
        check_slot_size(self.slot_size)
    }
}

pub struct RingSetBuilder {
    config: RingSetConfig,
}

impl Default for RingSetBuilder {
    fn default() -> Self {
        Self {
            config: RingSetConfig::default(),
        }
    }
}

impl RingSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rings(mut self, rings: usize) -> Self {
        self.config.rings = rings;
        self
    }

    pub fn with_slots(mut self, slots: usize) -> Self {
        self.config.slots = slots;
        self
    }

    pub fn with_slot_size(mut self, slot_size: usize) -> Self {
        self.config.slot_size = slot_size;
        self
    }

    pub fn with_readers(mut self, readers: usize) -> Self {
        self.config.readers = readers;
        self
    }

    pub fn with_writers(mut self, writers: usize) -> Self {
        self.config.writers = writers;
        self
    }

    pub fn with_host(mut self, host: Host) -> Self {
        self.config.host = host;
        self
    }

    pub fn config(&self) -> RingSetConfig {
        self.config
    }

    /// Create the ring set and register it under `name`.
    pub fn build_in(self, registry: &RingSetRegistry, name: &str) -> Result<Arc<RingSet>> {
        registry.create(name, self.config)
    }

    /// Create an unregistered ring set, owned by the caller.
    pub fn build(self, name: &str) -> Result<RingSet> {
        RingSet::create(name, self.config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlConfig {
    pub nodes: usize,
    pub slot_size: usize,
    pub writers: usize,
    pub host: Host,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            nodes: 2048,
            slot_size: 4096,
            writers: 6,
            host: Host::InProcess,
        }
    }
}

impl ControlConfig {
    pub fn validate(&self) -> Result<()> {
        // Node links store index + 1 in 32 bits.
        if self.nodes == 0 || self.nodes >= u32::MAX as usize {
            return Err(RingError::InvalidConfig(format!(
                "control nodes {} out of range",
                self.nodes
            )));
        }
        check_writers(self.writers)?;
        check_slot_size(self.slot_size)
    }
}

pub struct ControlBuilder {
    config: ControlConfig,
}

impl Default for ControlBuilder {
    fn default() -> Self {
        Self {
            config: ControlConfig::default(),
        }
    }
}

impl ControlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nodes(mut self, nodes: usize) -> Self {
        self.config.nodes = nodes;
        self
    }

    pub fn with_slot_size(mut self, slot_size: usize) -> Self {
        self.config.slot_size = slot_size;
        self
    }

    pub fn with_writers(mut self, writers: usize) -> Self {
        self.config.writers = writers;
        self
    }

    pub fn with_host(mut self, host: Host) -> Self {
        self.config.host = host;
        self
    }

    pub fn config(&self) -> ControlConfig {
        self.config
    }

    pub fn build_in(self, registry: &RingSetRegistry, name: &str) -> Result<Arc<ControlChannel>> {
        registry.create_control(name, self.config)
    }

    pub fn build(self, name: &str) -> Result<ControlChannel> {
        ControlChannel::create(name, self.config)
    }
}
