//! # Source Store
//!
//! Authoritative per-instance data, laid out as parallel arrays indexed by
//! slot. Removed slots are tombstoned, never compacted, so slot indices held
//! by the cluster index and the LOD history stay valid for the whole frame.

use std::sync::Arc;

use parking_lot::Mutex;

use super::handle::InstanceHandle;
use super::instance::Instance;
use super::ledger::{InstanceWriter, Ledger, Mutation};
use crate::error::StoreResult;

/// Receives membership changes while pending mutations are applied.
///
/// This is the seam through which spatial indices and per-slot caches stay
/// consistent with the store.
pub trait StoreObserver {
    /// A slot became live.
    fn inserted(&mut self, index: u32, instance: &Instance);
    /// A live slot changed its data.
    fn updated(&mut self, index: u32, old: &Instance, new: &Instance);
    /// A live slot was tombstoned.
    fn removed(&mut self, index: u32, instance: &Instance);
}

impl StoreObserver for () {
    fn inserted(&mut self, _index: u32, _instance: &Instance) {}
    fn updated(&mut self, _index: u32, _old: &Instance, _new: &Instance) {}
    fn removed(&mut self, _index: u32, _instance: &Instance) {}
}

/// Summary of one `apply_pending` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedMutations {
    /// Slots that became live.
    pub added: u32,
    /// Slots whose data changed.
    pub updated: u32,
    /// Slots that were tombstoned.
    pub removed: u32,
}

impl AppliedMutations {
    /// Returns true if nothing changed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}

/// Authoritative instance storage.
///
/// # Example
///
/// ```rust,ignore
/// let mut store = SourceStore::new(1, 1_000_000);
/// let handle = store.add(Instance::new(Vec3::ZERO, ArchetypeId(0)))?;
/// assert_eq!(store.count(), 0); // queued until the frame boundary
/// store.apply_pending(&mut ());
/// assert_eq!(store.count(), 1);
/// ```
pub struct SourceStore {
    /// Shared with every `InstanceWriter`.
    ledger: Arc<Mutex<Ledger>>,
    /// Instance data per slot. Tombstoned slots keep their last value.
    instances: Vec<Instance>,
    /// Applied liveness per slot.
    live: Vec<bool>,
    /// Number of live slots.
    live_count: usize,
    /// Reused drain buffer for the pending queue.
    scratch: Vec<Mutation>,
}

impl SourceStore {
    /// Creates an empty store.
    ///
    /// # Arguments
    ///
    /// * `archetype_count` - Number of registered archetypes; instances must name one of them
    /// * `capacity` - Maximum number of slots
    #[must_use]
    pub fn new(archetype_count: u16, capacity: u32) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(Ledger::new(archetype_count, capacity))),
            instances: Vec::new(),
            live: Vec::new(),
            live_count: 0,
            scratch: Vec::new(),
        }
    }

    /// Returns a writer that can queue mutations from other threads.
    #[must_use]
    pub fn writer(&self) -> InstanceWriter {
        InstanceWriter::new(Arc::clone(&self.ledger))
    }

    /// Queues an addition. See [`InstanceWriter::add`].
    ///
    /// # Errors
    ///
    /// Fails for unknown archetypes, malformed transforms or a full store.
    pub fn add(&self, instance: Instance) -> StoreResult<InstanceHandle> {
        self.ledger.lock().add(instance)
    }

    /// Queues a data change. See [`InstanceWriter::update`].
    ///
    /// # Errors
    ///
    /// Fails for stale handles, unknown archetypes or malformed transforms.
    pub fn update(&self, handle: InstanceHandle, instance: Instance) -> StoreResult<()> {
        self.ledger.lock().update(handle, instance)
    }

    /// Queues a removal. See [`InstanceWriter::remove`].
    ///
    /// # Errors
    ///
    /// Fails with `StaleHandle` if the handle is no longer valid.
    pub fn remove(&self, handle: InstanceHandle) -> StoreResult<()> {
        self.ledger.lock().remove(handle)
    }

    /// Number of live instances (as of the last frame boundary).
    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.live_count
    }

    /// Number of slots, live or tombstoned.
    #[inline]
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.instances.len()
    }

    /// Returns the instance in a slot, or `None` for tombstoned/unknown slots.
    #[inline]
    #[must_use]
    pub fn at(&self, index: u32) -> Option<&Instance> {
        let slot = index as usize;
        match self.live.get(slot) {
            Some(true) => self.instances.get(slot),
            _ => None,
        }
    }

    /// Returns the applied instance behind a handle.
    ///
    /// `None` if the handle is stale or its addition is still queued.
    #[must_use]
    pub fn get(&self, handle: InstanceHandle) -> Option<&Instance> {
        let index = self.ledger.lock().resolve(handle).ok()?;
        self.at(index)
    }

    /// Instance data for every slot (hot loop access).
    #[inline]
    #[must_use]
    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    /// Liveness for every slot (hot loop access).
    #[inline]
    #[must_use]
    pub fn live(&self) -> &[bool] {
        &self.live
    }

    /// Number of mutations waiting for the next frame boundary.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.ledger.lock().pending.len()
    }

    /// Applies every queued mutation in request order.
    ///
    /// Call this only at the frame boundary, before any pass reads the store.
    /// The observer sees each membership change exactly once.
    pub fn apply_pending<O: StoreObserver + ?Sized>(&mut self, observer: &mut O) -> AppliedMutations {
        {
            let mut ledger = self.ledger.lock();
            std::mem::swap(&mut ledger.pending, &mut self.scratch);
            ledger.recycle_retired();
            let slots = ledger.slot_count();
            if self.instances.len() < slots {
                let template = Instance::new(glam::Vec3::ZERO, super::ArchetypeId(0));
                self.instances.resize(slots, template);
                self.live.resize(slots, false);
            }
        }

        let mut applied = AppliedMutations::default();
        for mutation in self.scratch.drain(..) {
            match mutation {
                Mutation::Add { index, instance } => {
                    let slot = index as usize;
                    self.instances[slot] = instance;
                    self.live[slot] = true;
                    self.live_count += 1;
                    observer.inserted(index, &instance);
                    applied.added += 1;
                }
                Mutation::Update { index, instance } => {
                    let slot = index as usize;
                    if self.live[slot] {
                        let old = std::mem::replace(&mut self.instances[slot], instance);
                        observer.updated(index, &old, &instance);
                        applied.updated += 1;
                    }
                }
                Mutation::Remove { index } => {
                    let slot = index as usize;
                    if self.live[slot] {
                        self.live[slot] = false;
                        self.live_count -= 1;
                        observer.removed(index, &self.instances[slot]);
                        applied.removed += 1;
                    }
                }
            }
        }

        if !applied.is_empty() {
            tracing::trace!(
                added = applied.added,
                updated = applied.updated,
                removed = applied.removed,
                live = self.live_count,
                "applied store mutations"
            );
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ArchetypeId;
    use glam::Vec3;

    #[derive(Default)]
    struct Recorder {
        inserted: Vec<u32>,
        updated: Vec<u32>,
        removed: Vec<u32>,
    }

    impl StoreObserver for Recorder {
        fn inserted(&mut self, index: u32, _instance: &Instance) {
            self.inserted.push(index);
        }
        fn updated(&mut self, index: u32, _old: &Instance, _new: &Instance) {
            self.updated.push(index);
        }
        fn removed(&mut self, index: u32, _instance: &Instance) {
            self.removed.push(index);
        }
    }

    fn at_x(x: f32) -> Instance {
        Instance::new(Vec3::new(x, 0.0, 0.0), ArchetypeId(0))
    }

    #[test]
    fn test_mutations_wait_for_boundary() {
        let mut store = SourceStore::new(1, 100);
        let handle = store.add(at_x(1.0)).unwrap();
        assert_eq!(store.count(), 0);
        assert!(store.get(handle).is_none());

        let applied = store.apply_pending(&mut ());
        assert_eq!(applied.added, 1);
        assert_eq!(store.count(), 1);
        assert_eq!(store.get(handle).unwrap().position.x, 1.0);
    }

    #[test]
    fn test_add_remove_round_trip() {
        let mut store = SourceStore::new(1, 1000);
        let handles: Vec<_> = (0..100).map(|i| store.add(at_x(i as f32)).unwrap()).collect();
        store.apply_pending(&mut ());

        for handle in handles.iter().step_by(3) {
            store.remove(*handle).unwrap();
        }
        let mut recorder = Recorder::default();
        store.apply_pending(&mut recorder);

        assert_eq!(store.count(), 100 - 34);
        assert_eq!(recorder.removed.len(), 34);
        assert!(store.at(handles[0].index()).is_none());
        assert!(store.at(handles[1].index()).is_some());
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut store = SourceStore::new(1, 10);
        let old = store.add(at_x(0.0)).unwrap();
        store.apply_pending(&mut ());
        store.remove(old).unwrap();
        store.apply_pending(&mut ());

        let new = store.add(at_x(5.0)).unwrap();
        store.apply_pending(&mut ());

        assert_eq!(old.index(), new.index());
        assert!(store.get(old).is_none());
        assert!(store.update(old, at_x(9.0)).is_err());
        assert_eq!(store.get(new).unwrap().position.x, 5.0);
    }

    #[test]
    fn test_update_and_remove_in_same_batch() {
        let mut store = SourceStore::new(1, 10);
        let handle = store.add(at_x(0.0)).unwrap();
        store.update(handle, at_x(3.0)).unwrap();
        store.remove(handle).unwrap();

        let mut recorder = Recorder::default();
        let applied = store.apply_pending(&mut recorder);
        assert_eq!(applied, AppliedMutations { added: 1, updated: 1, removed: 1 });
        assert_eq!(recorder.inserted, vec![0]);
        assert_eq!(recorder.updated, vec![0]);
        assert_eq!(recorder.removed, vec![0]);
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_writer_from_other_thread() {
        let mut store = SourceStore::new(1, 10);
        let writer = store.writer();
        let handle = std::thread::spawn(move || writer.add(at_x(2.0)).unwrap())
            .join()
            .unwrap();
        assert_eq!(store.pending_count(), 1);
        store.apply_pending(&mut ());
        assert!(store.get(handle).is_some());
    }
}
