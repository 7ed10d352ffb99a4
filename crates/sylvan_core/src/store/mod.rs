//! # Instance Store
//!
//! The authoritative set of renderable instances.
//!
//! ```text
//!   any thread                      frame boundary (orchestrator)
//!   ──────────                      ─────────────────────────────
//!   InstanceWriter::add ──┐
//!   InstanceWriter::update├──► Ledger ──► SourceStore::apply_pending ──► StoreObserver
//!   InstanceWriter::remove┘   (queue)       (slot arrays)                (cluster index,
//!                                                                         LOD history)
//! ```
//!
//! Handles are issued at request time. Slot data changes only at the
//! boundary, so the culling passes always see a consistent snapshot.

mod handle;
mod instance;
mod ledger;
mod source;

pub use handle::InstanceHandle;
pub use instance::{ArchetypeId, Instance};
pub use ledger::InstanceWriter;
pub use source::{AppliedMutations, SourceStore, StoreObserver};
