//! # SYLVAN Rendering
//!
//! GPU-driven culling pipeline for vegetation and particle instances:
//! - 1,000,000 instances culled and classified per frame
//! - One indirect draw per (LOD tier, archetype), independent of density
//! - Fixed output memory, overflow truncates instead of growing
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       FRAME PIPELINE                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  SourceStore → ClusterVisibilityPass → CullAndLodPass        │
//! │                                             ↓                │
//! │          SurvivorBuffers (write set, atomic segments)        │
//! │                                             ↓                │
//! │  publish → IndirectCommandWriter → DrawPacket (read set)     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Pipeline Rules
//!
//! - No allocations in the frame loop once segments are sized
//! - No flicker: hysteresis on tiers, seed-stable thinning
//! - The draw stage only ever sees a published set

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod culling;
pub mod error;
pub mod instancing;
pub mod pipeline;
pub mod scatter;

pub use config::{
    ArchetypeDesc, ArchetypeKind, BlendCurve, Geometry, GridConfig, LodConfig, PipelineConfig,
};
pub use culling::{
    Camera, ClusterIndex, ClusterVisibility, ClusterVisibilityPass, CullAndLodPass, Frustum,
    LodBand, LodTier,
};
pub use error::{
    ConfigError, ConfigResult, FrameError, RenderError, RenderResult, ResourceError,
};
pub use instancing::{
    DrawArgs, DrawCommand, IndirectCommandWriter, OutputStore, SegmentLayout, SurvivorBuffers,
    SurvivorRecord,
};
pub use pipeline::{DrawPacket, FrameInputs, FrameOrchestrator, FrameStats, WindSample};
pub use scatter::Scatter;
