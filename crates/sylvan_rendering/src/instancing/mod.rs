//! Survivor storage and indirect draw commands.
//!
//! ## Key Concepts
//!
//! - **Survivor Record**: per-instance data written by the cull pass, bound as an instance buffer
//! - **Segment**: fixed slice of a tier array owned by one archetype, with its own atomic counter
//! - **Indirect Drawing**: instance counts come from the counters, clamped to segment capacity

mod indirect;
mod output;
mod survivor;

pub use indirect::{
    DrawArgs, DrawCommand, DrawIndexedIndirectArgs, DrawIndirectArgs, IndirectCommandWriter,
    INDIRECT_BUFFER_USAGE,
};
pub use output::{
    create_output_store, OutputStore, Segment, SegmentLayout, SurvivorBuffers, SurvivorWriter,
    COUNTER_BUFFER_USAGE, SURVIVOR_BUFFER_USAGE,
};
pub use survivor::{pack_orientation, unpack_orientation, SurvivorRecord};
