//! # SYLVAN Core
//!
//! CPU-side foundations of the instance culling pipeline:
//! - Authoritative instance storage with generation-checked handles
//! - Structural mutations queued from any thread, applied at frame boundaries
//! - A generic double buffer with per-set reader tracking
//!
//! ## Architecture Rules
//!
//! 1. **Slots are stable** - removal tombstones a slot, it never compacts
//! 2. **Mutations wait for the boundary** - passes never observe a half-applied batch
//! 3. **A set with readers is never written** - the writer gets an error instead
//!
//! ## Example
//!
//! ```rust,ignore
//! use sylvan_core::{ArchetypeId, Instance, SourceStore};
//!
//! let mut store = SourceStore::new(1, 1_000_000);
//! let writer = store.writer();
//! let handle = writer.add(Instance::new(Vec3::ZERO, ArchetypeId(0)))?;
//! store.apply_pending(&mut ());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod store;
pub mod sync;

pub use error::{StoreError, StoreResult, SyncError, SyncResult};
pub use store::{
    AppliedMutations, ArchetypeId, Instance, InstanceHandle, InstanceWriter, SourceStore,
    StoreObserver,
};
pub use sync::{BufferSetId, DoubleBuffered, ReadHandle, Roles, WriteHandle};
