use super::*;

/// Read-only accessors used for debugging and monitoring.
impl RingSetRegistry {
    /// Snapshot of every entry, sorted by name.
    ///
    /// The name table lock is released before the caller looks at the entries.
    pub fn entries(&self) -> Vec<(String, RegistryEntry)> {
        let mut entries: Vec<(String, RegistryEntry)> = self
            .sets
            .lock()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sets.lock().contains_key(name)
    }

    /// Handles bound across every registered entry.
    pub fn bound_handles(&self) -> usize {
        self.entries().iter().map(|(_, e)| e.bound_handles()).sum()
    }
}
