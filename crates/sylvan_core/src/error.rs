//! # Core Error Types
//!
//! Errors raised by the instance store and the double-buffer primitives.

use thiserror::Error;

use crate::store::InstanceHandle;
use crate::sync::BufferSetId;

/// Errors that can occur when mutating the source store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The handle was removed (or never issued by this store).
    #[error("stale instance handle {0}")]
    StaleHandle(InstanceHandle),

    /// The instance names an archetype that is not registered.
    #[error("unknown archetype {archetype} (registry holds {registered})")]
    UnknownArchetype {
        /// The requested archetype.
        archetype: u16,
        /// Number of registered archetypes.
        registered: u16,
    },

    /// Non-finite transform or non-positive scale.
    #[error("malformed instance: non-finite transform or non-positive scale")]
    MalformedInstance,

    /// All slots are in use.
    #[error("store full: capacity {capacity}")]
    Full {
        /// Maximum number of slots.
        capacity: u32,
    },
}

/// Errors raised by [`DoubleBuffered`](crate::sync::DoubleBuffered).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// A write handle is already held.
    #[error("write handle already held")]
    WriteInProgress,

    /// The write target is still being read by a previous frame's consumer.
    #[error("buffer set {set:?} still has {readers} active reader(s)")]
    ReadersActive {
        /// The buffer set that was requested for writing.
        set: BufferSetId,
        /// Number of outstanding read handles.
        readers: usize,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;
