use super::*;
use std::fmt;

// Debug proxy implementations that call the standalone debug functions
impl fmt::Debug for RingSetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_registry(self, f)
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryEntry::Data(set) => fmt::Debug::fmt(set.as_ref(), f),
            RegistryEntry::Control(chan) => fmt::Debug::fmt(chan.as_ref(), f),
        }
    }
}
