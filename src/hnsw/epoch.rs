//! Epoch / read-slot registry.
//!
//! Readers register in a bounded table of atomic slots before touching the
//! graph; each occupied slot holds the writer version observed at
//! acquisition. Writers bump the version at every commit. The registry is
//! the only synchronization between readers and the deleter: a node that
//! died at version `V` is physically freed only once every occupied slot
//! holds a version greater than `V` (quiescent-state reclamation).
//!
//! Acquire and release are single-word atomic updates. When all slots are
//! taken the acquiring reader spins with `yield_now` until one frees up.

use std::sync::atomic::{AtomicU64, Ordering};

/// Number of concurrent read slots.
pub(crate) const SLOT_COUNT: usize = 16;

const FREE_SLOT: u64 = u64::MAX;

pub(crate) struct SlotRegistry {
    slots: [AtomicU64; SLOT_COUNT],
    version: AtomicU64,
}

impl SlotRegistry {
    pub(crate) fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| AtomicU64::new(FREE_SLOT)),
            version: AtomicU64::new(0),
        }
    }

    /// Current writer version.
    pub(crate) fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Advances the writer version; called once per committed write.
    pub(crate) fn bump(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Claims a free slot, stamping it with the current version. Blocks
    /// (yielding) while all slots are occupied.
    pub(crate) fn acquire(&self) -> usize {
        loop {
            let version = self.version();
            for (i, slot) in self.slots.iter().enumerate() {
                if slot
                    .compare_exchange(FREE_SLOT, version, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    return i;
                }
            }
            std::thread::yield_now();
        }
    }

    pub(crate) fn release(&self, index: usize) {
        self.slots[index].store(FREE_SLOT, Ordering::Release);
    }

    /// Smallest version held by any occupied slot, or `u64::MAX` when no
    /// reader is registered. Graves below this value are reclaimable.
    pub(crate) fn min_active(&self) -> u64 {
        self.slots
            .iter()
            .map(|slot| slot.load(Ordering::Acquire))
            .filter(|&v| v != FREE_SLOT)
            .min()
            .unwrap_or(u64::MAX)
    }
}

/// A registered read slot, released on drop.
///
/// Holding a `ReadSlot` guarantees that no node observed through it is
/// physically freed for the guard's lifetime; search requires one so that
/// the ids it returns stay resolvable until the caller lets go.
pub struct ReadSlot<'a> {
    registry: &'a SlotRegistry,
    index: usize,
}

impl<'a> ReadSlot<'a> {
    pub(crate) fn new(registry: &'a SlotRegistry) -> Self {
        Self {
            registry,
            index: registry.acquire(),
        }
    }

    pub(crate) fn registry(&self) -> &SlotRegistry {
        self.registry
    }
}

impl Drop for ReadSlot<'_> {
    fn drop(&mut self) {
        self.registry.release(self.index);
    }
}
