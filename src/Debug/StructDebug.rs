use std::fmt;

use crate::Control::ControlChannel;
use crate::Core::alloc::RingSetRegistry;
use crate::KRing::Buffer::Ring::Ring;
use crate::KRing::RingSet;

/// Debug function for RingSetRegistry
///
/// Shows each registered name with its entry, using a snapshot so the name
/// table lock is not held while formatting.
pub fn debug_registry(registry: &RingSetRegistry, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let entries = registry.entries();
    f.debug_map()
        .entries(entries.iter().map(|(name, entry)| (name, entry)))
        .finish()
}

/// Debug function for RingSet
///
/// Shows:
/// - Geometry and host
/// - Region location and size (never its contents)
/// - Per-ring cursors
pub fn debug_ring_set(set: &RingSet, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let rings: Vec<RingDebug<'_>> = (0..set.nrings()).filter_map(|i| set.ring(i)).map(RingDebug).collect();
    f.debug_struct("RingSet")
        .field("name", &set.name())
        .field("host", &set.host())
        .field("owner", &set.is_owner())
        .field("geometry", &set.geometry())
        .field("region", &format_args!("{:p}+{}", set.region().as_ptr(), set.region().size()))
        .field("rings", &rings)
        .finish()
}

/// Debug function for Ring
///
/// Cursors and counters only; slot memory is never dereferenced.
pub fn debug_ring(ring: &Ring, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let stats = ring.stats();
    f.debug_struct("Ring")
        .field("slots", &ring.capacity())
        .field("whead", &stats.whead)
        .field("wresv", &stats.wresv)
        .field("produced", &stats.produced)
        .field("contention", &stats.contention)
        .field("writers", &stats.bound_writers)
        .field("readers", &ring.bound_readers())
        .finish_non_exhaustive()
}

pub fn debug_control_channel(chan: &ControlChannel, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ControlChannel")
        .field("name", &chan.name())
        .field("host", &chan.host())
        .field("nodes", &chan.nodes())
        .field("slot_size", &chan.slot_size())
        .field("stats", &chan.stats())
        .finish()
}

struct RingDebug<'a>(&'a Ring);

impl fmt::Debug for RingDebug<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_ring(self.0, f)
    }
}
