//! # Mutation Ledger
//!
//! Structural changes never touch the slot arrays directly. They are queued
//! here, behind a mutex shared with every [`InstanceWriter`], and applied by
//! [`SourceStore::apply_pending`](super::SourceStore::apply_pending) at the
//! frame boundary.
//!
//! The ledger is also the authority for handle validity: generations and
//! reservations change at request time, so a handle is rejected as soon as
//! its removal is queued.

use std::sync::Arc;

use parking_lot::Mutex;

use super::handle::InstanceHandle;
use super::instance::Instance;
use crate::error::{StoreError, StoreResult};

/// A queued structural change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Mutation {
    /// Place a new instance in a reserved slot.
    Add { index: u32, instance: Instance },
    /// Replace the data of a live slot.
    Update { index: u32, instance: Instance },
    /// Tombstone a slot.
    Remove { index: u32 },
}

/// Handle bookkeeping plus the pending mutation queue.
#[derive(Debug)]
pub(crate) struct Ledger {
    /// Current generation per slot.
    generations: Vec<u32>,
    /// Whether a valid handle currently refers to the slot.
    reserved: Vec<bool>,
    /// Slots reusable by new additions.
    free: Vec<u32>,
    /// Slots removed since the last frame boundary.
    /// They only become reusable after the boundary so that a slot is never
    /// recycled inside the frame that still culls it.
    retired: Vec<u32>,
    /// Queued mutations, in request order.
    pub(crate) pending: Vec<Mutation>,
    /// Number of registered archetypes.
    archetype_count: u16,
    /// Maximum number of slots.
    capacity: u32,
}

impl Ledger {
    pub(crate) fn new(archetype_count: u16, capacity: u32) -> Self {
        Self {
            generations: Vec::new(),
            reserved: Vec::new(),
            free: Vec::new(),
            retired: Vec::new(),
            pending: Vec::new(),
            archetype_count,
            capacity,
        }
    }

    fn validate(&self, instance: &Instance) -> StoreResult<()> {
        if instance.archetype.0 >= self.archetype_count {
            return Err(StoreError::UnknownArchetype {
                archetype: instance.archetype.0,
                registered: self.archetype_count,
            });
        }
        if !instance.is_well_formed() {
            return Err(StoreError::MalformedInstance);
        }
        Ok(())
    }

    /// Resolves a handle to its slot index if it is still valid.
    pub(crate) fn resolve(&self, handle: InstanceHandle) -> StoreResult<u32> {
        let index = handle.index() as usize;
        match (self.generations.get(index), self.reserved.get(index)) {
            (Some(&generation), Some(&true)) if generation == handle.generation() => {
                Ok(handle.index())
            }
            _ => Err(StoreError::StaleHandle(handle)),
        }
    }

    pub(crate) fn add(&mut self, instance: Instance) -> StoreResult<InstanceHandle> {
        self.validate(&instance)?;

        let index = if let Some(index) = self.free.pop() {
            index
        } else {
            let next = self.generations.len();
            if next >= self.capacity as usize {
                return Err(StoreError::Full {
                    capacity: self.capacity,
                });
            }
            self.generations.push(0);
            self.reserved.push(false);
            next as u32
        };

        self.reserved[index as usize] = true;
        self.pending.push(Mutation::Add { index, instance });
        Ok(InstanceHandle::new(index, self.generations[index as usize]))
    }

    pub(crate) fn update(&mut self, handle: InstanceHandle, instance: Instance) -> StoreResult<()> {
        self.validate(&instance)?;
        let index = self.resolve(handle)?;
        self.pending.push(Mutation::Update { index, instance });
        Ok(())
    }

    pub(crate) fn remove(&mut self, handle: InstanceHandle) -> StoreResult<()> {
        let index = self.resolve(handle)?;
        let slot = index as usize;
        self.reserved[slot] = false;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.retired.push(index);
        self.pending.push(Mutation::Remove { index });
        Ok(())
    }

    /// Makes slots removed before this boundary available for reuse.
    pub(crate) fn recycle_retired(&mut self) {
        self.free.append(&mut self.retired);
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.generations.len()
    }
}

/// Cloneable front-end for queuing structural changes from any thread.
///
/// Requests take effect at the next frame boundary. Handles are issued
/// immediately and are valid right away for `update`/`remove`.
///
/// ## Usage
///
/// ```rust,ignore
/// let writer = store.writer();
/// std::thread::spawn(move || {
///     let handle = writer.add(Instance::new(Vec3::ZERO, ArchetypeId(0)))?;
///     writer.remove(handle)
/// });
/// ```
#[derive(Clone, Debug)]
pub struct InstanceWriter {
    ledger: Arc<Mutex<Ledger>>,
}

impl InstanceWriter {
    pub(crate) fn new(ledger: Arc<Mutex<Ledger>>) -> Self {
        Self { ledger }
    }

    /// Queues an addition and returns the handle of the reserved slot.
    ///
    /// # Errors
    ///
    /// Fails for unknown archetypes, malformed transforms or a full store.
    pub fn add(&self, instance: Instance) -> StoreResult<InstanceHandle> {
        self.ledger.lock().add(instance)
    }

    /// Queues a data change for a live instance.
    ///
    /// # Errors
    ///
    /// Fails for stale handles, unknown archetypes or malformed transforms.
    pub fn update(&self, handle: InstanceHandle, instance: Instance) -> StoreResult<()> {
        self.ledger.lock().update(handle, instance)
    }

    /// Queues a removal. The handle is invalid as soon as this returns.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::StaleHandle`] if the handle was already removed.
    pub fn remove(&self, handle: InstanceHandle) -> StoreResult<()> {
        self.ledger.lock().remove(handle)
    }

    /// Returns true if the handle refers to a reserved slot.
    #[must_use]
    pub fn contains(&self, handle: InstanceHandle) -> bool {
        self.ledger.lock().resolve(handle).is_ok()
    }

    /// Number of mutations waiting for the next frame boundary.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.ledger.lock().pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ArchetypeId;
    use glam::Vec3;

    fn grass() -> Instance {
        Instance::new(Vec3::ZERO, ArchetypeId(0))
    }

    #[test]
    fn test_remove_invalidates_immediately() {
        let mut ledger = Ledger::new(1, 16);
        let handle = ledger.add(grass()).unwrap();
        ledger.remove(handle).unwrap();
        assert_eq!(ledger.remove(handle), Err(StoreError::StaleHandle(handle)));
        assert_eq!(ledger.pending.len(), 2);
    }

    #[test]
    fn test_slot_not_reused_before_boundary() {
        let mut ledger = Ledger::new(1, 16);
        let first = ledger.add(grass()).unwrap();
        ledger.remove(first).unwrap();

        let second = ledger.add(grass()).unwrap();
        assert_ne!(first.index(), second.index());

        ledger.recycle_retired();
        let third = ledger.add(grass()).unwrap();
        assert_eq!(third.index(), first.index());
        assert_eq!(third.generation(), first.generation() + 1);
    }

    #[test]
    fn test_capacity_and_validation() {
        let mut ledger = Ledger::new(2, 1);
        assert!(matches!(
            ledger.add(Instance::new(Vec3::ZERO, ArchetypeId(2))),
            Err(StoreError::UnknownArchetype { archetype: 2, registered: 2 })
        ));
        ledger.add(grass()).unwrap();
        assert_eq!(ledger.add(grass()), Err(StoreError::Full { capacity: 1 }));
        assert_eq!(ledger.slot_count(), 1);
    }
}
