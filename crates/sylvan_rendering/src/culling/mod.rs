//! # Culling
//!
//! Two passes per frame, both data-parallel:
//!
//! ```text
//! ClusterIndex ──► ClusterVisibilityPass ──► visibility per cell
//!                                                │
//! SourceStore ───────────► CullAndLodPass ◄──────┘
//!                                │
//!                                ▼
//!                     SurvivorWriter (tier, archetype)
//! ```
//!
//! ## Key Concepts
//!
//! - **Cluster**: one grid cell on the XZ plane with a conservative bounding sphere
//! - **Forced impostor**: clusters past `cluster_impostor_distance` skip per-instance tests
//! - **Hysteresis**: tier changes need the distance to cross the far edge of the blend band

mod cluster;
mod cluster_pass;
mod cull_pass;
mod frustum;
mod lod;

pub use cluster::{Cluster, ClusterId, ClusterIndex, NO_CLUSTER};
pub use cluster_pass::{
    ClusterBounds, ClusterPassStats, ClusterUniforms, ClusterVisibility, ClusterVisibilityPass,
};
pub use cull_pass::{
    keeps_at_density, CullAndLodPass, CullInputs, CullPassStats, CullUniforms, WORKGROUP_SIZE,
};
pub use frustum::{Camera, Frustum, Plane};
pub use lod::{LodBand, LodTier};
