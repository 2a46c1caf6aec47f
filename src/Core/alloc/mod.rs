use std::collections::HashMap;
use std::sync::Arc;

use log::{info, warn};
// Use parking_lot's Mutex for better performance
use parking_lot::Mutex;

use crate::Control::ControlChannel;
use crate::KRing::{validate_name, ControlConfig, Handle, Mode, RingId, RingSet, RingSetConfig};
use crate::error::{Result, RingError};

mod debug;
mod getters;

/// One named entry of the registry.
#[derive(Clone)]
pub enum RegistryEntry {
    Data(Arc<RingSet>),
    Control(Arc<ControlChannel>),
}

impl RegistryEntry {
    pub fn bound_handles(&self) -> usize {
        match self {
            RegistryEntry::Data(set) => set.bound_handles(),
            RegistryEntry::Control(chan) => chan.bound_handles(),
        }
    }

    fn remove_backing(&self) -> Result<()> {
        match self {
            RegistryEntry::Data(set) => set.remove_backing(),
            RegistryEntry::Control(chan) => chan.remove_backing(),
        }
    }
}

/// Named ring sets and control channels of this process.
///
/// An explicit object owned by the application; nothing is global. The
/// mutex only guards the name table, never a ring.
pub struct RingSetRegistry {
    sets: Mutex<HashMap<String, RegistryEntry>>,
}

impl Default for RingSetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RingSetRegistry {
    pub fn new() -> Self {
        Self {
            sets: Mutex::new(HashMap::new()),
        }
    }

    fn insert(&self, name: &str, make: impl FnOnce() -> Result<RegistryEntry>) -> Result<RegistryEntry> {
        validate_name(name)?;
        let mut sets = self.sets.lock();
        if sets.contains_key(name) {
            return Err(RingError::AlreadyExists(name.to_string()));
        }
        let entry = make()?;
        sets.insert(name.to_string(), entry.clone());
        Ok(entry)
    }

    /// Create a ring set and register it. Fails when the name is taken.
    pub fn create(&self, name: &str, config: RingSetConfig) -> Result<Arc<RingSet>> {
        let entry = self.insert(name, || {
            RingSet::create(name, config).map(|s| RegistryEntry::Data(Arc::new(s)))
        })?;
        match entry {
            RegistryEntry::Data(set) => Ok(set),
            RegistryEntry::Control(_) => Err(RingError::Protocol(format!("{name:?} is a control channel"))),
        }
    }

    pub fn create_control(&self, name: &str, config: ControlConfig) -> Result<Arc<ControlChannel>> {
        let entry = self.insert(name, || {
            ControlChannel::create(name, config).map(|c| RegistryEntry::Control(Arc::new(c)))
        })?;
        match entry {
            RegistryEntry::Control(chan) => Ok(chan),
            RegistryEntry::Data(_) => Err(RingError::Protocol(format!("{name:?} is a ring set"))),
        }
    }

    /// Map a shared-memory ring set created by another process and register it here.
    pub fn attach(&self, name: &str) -> Result<Arc<RingSet>> {
        let entry = self.insert(name, || {
            RingSet::attach(name).map(|s| RegistryEntry::Data(Arc::new(s)))
        })?;
        match entry {
            RegistryEntry::Data(set) => Ok(set),
            RegistryEntry::Control(_) => Err(RingError::Protocol(format!("{name:?} is a control channel"))),
        }
    }

    pub fn attach_control(&self, name: &str) -> Result<Arc<ControlChannel>> {
        let entry = self.insert(name, || {
            ControlChannel::attach(name).map(|c| RegistryEntry::Control(Arc::new(c)))
        })?;
        match entry {
            RegistryEntry::Control(chan) => Ok(chan),
            RegistryEntry::Data(_) => Err(RingError::Protocol(format!("{name:?} is a ring set"))),
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<RingSet>> {
        validate_name(name)?;
        match self.sets.lock().get(name) {
            Some(RegistryEntry::Data(set)) => Ok(Arc::clone(set)),
            _ => Err(RingError::UnknownRingSet(name.to_string())),
        }
    }

    pub fn control(&self, name: &str) -> Result<Arc<ControlChannel>> {
        validate_name(name)?;
        match self.sets.lock().get(name) {
            Some(RegistryEntry::Control(chan)) => Ok(Arc::clone(chan)),
            _ => Err(RingError::UnknownRingSet(name.to_string())),
        }
    }

    /// Bind a reader or writer on a registered ring set.
    pub fn open(&self, name: &str, ring: RingId, mode: Mode) -> Result<Handle> {
        self.get(name)?.open(ring, mode)
    }

    /// Unregister `name`, refusing while any handle is bound to it.
    ///
    /// The shared-memory file of an owned set is unlinked; mappings held by
    /// other processes stay valid until they drop.
    pub fn teardown(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let mut sets = self.sets.lock();
        let Some(entry) = sets.get(name) else {
            return Err(RingError::UnknownRingSet(name.to_string()));
        };
        let bound = entry.bound_handles();
        if bound > 0 {
            warn!("Refusing teardown of {}: {} handles bound", name, bound);
            return Err(RingError::Busy {
                name: name.to_string(),
                bound,
            });
        }
        if let Some(entry) = sets.remove(name) {
            entry.remove_backing()?;
        }
        info!("Tore down {}", name);
        Ok(())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sets.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.sets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.lock().is_empty()
    }
}
