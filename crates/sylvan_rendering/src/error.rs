//! # Rendering Error Types
//!
//! Setup errors are fatal and reported once. Per-frame errors only come from
//! the buffer-set protocol; overflow is not an error (it truncates and logs).

use std::collections::TryReserveError;
use std::path::PathBuf;

use sylvan_core::{StoreError, SyncError};
use thiserror::Error;

use crate::culling::LodTier;

/// Rejected pipeline configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A tier segment was configured with zero capacity.
    #[error("archetype {archetype:?}: {tier:?} capacity must be positive")]
    NonPositiveCapacity {
        /// Archetype name.
        archetype: String,
        /// Offending tier.
        tier: LodTier,
    },

    /// `lod_start` must be below `lod_end`.
    #[error("inverted LOD thresholds: lod_start {lod_start} >= lod_end {lod_end}")]
    InvertedLodThresholds {
        /// Configured start of the blend band.
        lod_start: f32,
        /// Configured end of the blend band.
        lod_end: f32,
    },

    /// A distance is negative, non-finite or out of order.
    #[error("invalid distance {name} = {value}: {reason}")]
    InvalidDistance {
        /// Field name.
        name: &'static str,
        /// Configured value.
        value: f32,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// Density outside [0, 1].
    #[error("density {0} outside [0, 1]")]
    InvalidDensity(f32),

    /// Grid with non-positive cell size or zero cells.
    #[error("invalid cluster grid: {0}")]
    InvalidGrid(&'static str),

    /// The store was configured without slots.
    #[error("max_instances must be positive")]
    ZeroInstanceCapacity,

    /// The archetype registry is empty.
    #[error("no archetypes configured")]
    NoArchetypes,

    /// More archetypes than `ArchetypeId` can address.
    #[error("{0} archetypes configured, at most 65535 supported")]
    TooManyArchetypes(usize),

    /// Archetype with unusable bounds or geometry.
    #[error("archetype {name:?}: {reason}")]
    InvalidArchetype {
        /// Archetype name.
        name: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The view-projection matrix does not describe a usable frustum.
    #[error("degenerate frustum: {0}")]
    DegenerateFrustum(&'static str),

    /// The TOML document could not be parsed.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config file could not be read.
    #[error("cannot read config {path:?}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Failure to acquire output storage.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// Host allocation of a buffer set failed.
    #[error("failed to allocate {bytes} bytes for {what}: {source}")]
    Allocation {
        /// What was being allocated.
        what: &'static str,
        /// Requested size.
        bytes: usize,
        /// Allocator error.
        #[source]
        source: TryReserveError,
    },

    /// A survivor array would not fit in one storage-buffer binding.
    #[error("{tier:?} survivor array needs {bytes} bytes, device binding limit is {limit}")]
    ExceedsDeviceLimit {
        /// Offending tier.
        tier: LodTier,
        /// Required binding size.
        bytes: u64,
        /// Device limit.
        limit: u64,
    },
}

/// Per-frame failure of the orchestrator.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// The write set could not be acquired or published.
    #[error("buffer set rotation failed: {0}")]
    Sync(#[from] SyncError),
}

/// Any error raised by the rendering crate.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Resource acquisition failure.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Frame sequencing failure.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Rejected store mutation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for configuration loading and validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for rendering operations.
pub type RenderResult<T> = Result<T, RenderError>;
