//! # Pipeline Configuration
//!
//! Loaded once at startup, validated, then treated as immutable. Every limit
//! that bounds memory or draw calls lives here.
//!
//! ## Example
//!
//! ```toml
//! density = 0.8
//! sway_padding = 0.3
//! max_instances = 1048576
//!
//! [grid]
//! origin = [-1024.0, -1024.0]
//! cell_size = 32.0
//! dims = [64, 64]
//!
//! [lod]
//! lod_start = 40.0
//! lod_end = 50.0
//! cull_distance = 200.0
//! cluster_cull_distance = 200.0
//! cluster_impostor_distance = 150.0
//! blend_curve = "smoothstep"
//!
//! [[archetypes]]
//! name = "meadow_grass"
//! kind = "grass_blade"
//! bounding_radius = 0.6
//! full_detail = { kind = "vertices", vertex_count = 15 }
//! impostor = { kind = "vertices", vertex_count = 3, first_vertex = 15 }
//! full_detail_capacity = 262144
//! impostor_capacity = 524288
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::culling::LodTier;
use crate::error::{ConfigError, ConfigResult};

/// Complete pipeline setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cluster grid.
    pub grid: GridConfig,
    /// Distance thresholds and blend shape.
    pub lod: LodConfig,
    /// Fraction of instances kept by seed thinning, in [0, 1].
    pub density: f32,
    /// Culling radius inflation per unit of wind (strength + gust).
    pub sway_padding: f32,
    /// Maximum number of store slots (live plus tombstoned).
    pub max_instances: u32,
    /// Archetype registry. `ArchetypeId(i)` names `archetypes[i]`.
    pub archetypes: Vec<ArchetypeDesc>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            lod: LodConfig::default(),
            density: 1.0,
            sway_padding: 0.3,
            max_instances: 1 << 20,
            archetypes: vec![ArchetypeDesc::preset("meadow_grass", ArchetypeKind::GrassBlade)],
        }
    }
}

impl PipelineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and any validation error.
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`Self::from_toml_str`].
    pub fn from_toml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks every setup constraint.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> ConfigResult<()> {
        self.grid.validate()?;
        self.lod.validate()?;

        if !(0.0..=1.0).contains(&self.density) {
            return Err(ConfigError::InvalidDensity(self.density));
        }
        if !self.sway_padding.is_finite() || self.sway_padding < 0.0 {
            return Err(ConfigError::InvalidDistance {
                name: "sway_padding",
                value: self.sway_padding,
                reason: "must be finite and non-negative",
            });
        }

        if self.max_instances == 0 {
            return Err(ConfigError::ZeroInstanceCapacity);
        }

        if self.archetypes.is_empty() {
            return Err(ConfigError::NoArchetypes);
        }
        if self.archetypes.len() > usize::from(u16::MAX) {
            return Err(ConfigError::TooManyArchetypes(self.archetypes.len()));
        }
        for archetype in &self.archetypes {
            archetype.validate()?;
        }
        Ok(())
    }

    /// Number of registered archetypes.
    #[must_use]
    pub fn archetype_count(&self) -> u16 {
        u16::try_from(self.archetypes.len()).unwrap_or(u16::MAX)
    }

    /// Total survivor capacity of a tier (sum of its archetype segments).
    #[must_use]
    pub fn tier_capacity(&self, tier: LodTier) -> u64 {
        self.archetypes
            .iter()
            .map(|a| u64::from(a.capacity(tier)))
            .sum()
    }
}

/// Flat cluster grid over the XZ plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// World-space X/Z of the grid's minimum corner.
    pub origin: [f32; 2],
    /// Edge length of a square cell.
    pub cell_size: f32,
    /// Number of cells along X and Z.
    pub dims: [u32; 2],
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            origin: [-1024.0, -1024.0],
            cell_size: 32.0,
            dims: [64, 64],
        }
    }
}

impl GridConfig {
    /// Total number of cells.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.dims[0] as usize * self.dims[1] as usize
    }

    fn validate(&self) -> ConfigResult<()> {
        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            return Err(ConfigError::InvalidGrid("cell_size must be positive"));
        }
        if self.dims[0] == 0 || self.dims[1] == 0 {
            return Err(ConfigError::InvalidGrid("dims must be non-zero"));
        }
        if !self.origin[0].is_finite() || !self.origin[1].is_finite() {
            return Err(ConfigError::InvalidGrid("origin must be finite"));
        }
        if u32::try_from(self.cell_count()).is_err() {
            return Err(ConfigError::InvalidGrid("too many cells"));
        }
        Ok(())
    }
}

/// Shape of the blend factor across the LOD band.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendCurve {
    /// `t`
    Linear,
    /// `t * t * (3 - 2t)`
    #[default]
    Smoothstep,
    /// `t.powf(exponent)`
    Power(f32),
}

impl BlendCurve {
    /// Maps a normalized band position in [0, 1] to a blend factor in [0, 1].
    #[inline]
    #[must_use]
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::Smoothstep => t * t * (3.0 - 2.0 * t),
            Self::Power(exponent) => t.powf(exponent),
        }
    }
}

/// Distance thresholds. All distances are world units from the camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    /// Start of the blend band; Impostor promotes to FullDetail below it.
    pub lod_start: f32,
    /// End of the blend band; FullDetail drops to Impostor beyond it.
    pub lod_end: f32,
    /// Instances farther than this are culled.
    pub cull_distance: f32,
    /// Clusters farther than this are invisible.
    pub cluster_cull_distance: f32,
    /// Clusters farther than this force their instances to Impostor.
    pub cluster_impostor_distance: f32,
    /// Blend factor shape.
    pub blend_curve: BlendCurve,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            lod_start: 40.0,
            lod_end: 50.0,
            cull_distance: 200.0,
            cluster_cull_distance: 200.0,
            cluster_impostor_distance: 150.0,
            blend_curve: BlendCurve::Smoothstep,
        }
    }
}

impl LodConfig {
    fn validate(&self) -> ConfigResult<()> {
        let distances = [
            ("lod_start", self.lod_start),
            ("lod_end", self.lod_end),
            ("cull_distance", self.cull_distance),
            ("cluster_cull_distance", self.cluster_cull_distance),
            ("cluster_impostor_distance", self.cluster_impostor_distance),
        ];
        for (name, value) in distances {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidDistance {
                    name,
                    value,
                    reason: "must be finite and non-negative",
                });
            }
        }

        if self.lod_start >= self.lod_end {
            return Err(ConfigError::InvertedLodThresholds {
                lod_start: self.lod_start,
                lod_end: self.lod_end,
            });
        }
        if self.cull_distance <= 0.0 {
            return Err(ConfigError::InvalidDistance {
                name: "cull_distance",
                value: self.cull_distance,
                reason: "must be positive",
            });
        }
        if self.lod_end > self.cull_distance {
            return Err(ConfigError::InvalidDistance {
                name: "lod_end",
                value: self.lod_end,
                reason: "must not exceed cull_distance",
            });
        }
        if self.cluster_impostor_distance > self.cluster_cull_distance {
            return Err(ConfigError::InvalidDistance {
                name: "cluster_impostor_distance",
                value: self.cluster_impostor_distance,
                reason: "must not exceed cluster_cull_distance",
            });
        }
        if let BlendCurve::Power(exponent) = self.blend_curve {
            if !exponent.is_finite() || exponent <= 0.0 {
                return Err(ConfigError::InvalidDistance {
                    name: "blend_curve.power",
                    value: exponent,
                    reason: "exponent must be positive",
                });
            }
        }
        Ok(())
    }
}

/// Broad category of an archetype. Selects preset bounds and geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchetypeKind {
    /// Short, dense, wind-driven.
    GrassBlade,
    /// Tall, sparse, indexed meshes with billboard impostors.
    Tree,
    /// Tiny camera-local sprites.
    WeatherParticle,
}

/// Static draw geometry of one tier of an archetype.
///
/// Only the command writer branches on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Geometry {
    /// Non-indexed draw.
    Vertices {
        /// Vertices per instance.
        vertex_count: u32,
        /// First vertex in the shared vertex buffer.
        #[serde(default)]
        first_vertex: u32,
    },
    /// Indexed draw.
    Indexed {
        /// Indices per instance.
        index_count: u32,
        /// First index in the shared index buffer.
        #[serde(default)]
        first_index: u32,
        /// Value added to each index.
        #[serde(default)]
        base_vertex: i32,
    },
}

impl Geometry {
    /// Vertices or indices per instance.
    #[must_use]
    pub const fn element_count(&self) -> u32 {
        match *self {
            Self::Vertices { vertex_count, .. } => vertex_count,
            Self::Indexed { index_count, .. } => index_count,
        }
    }
}

/// One registered archetype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeDesc {
    /// Display name (logs and errors).
    pub name: String,
    /// Category.
    pub kind: ArchetypeKind,
    /// Bounding sphere radius at unit scale, centred on the instance origin.
    pub bounding_radius: f32,
    /// FullDetail geometry.
    pub full_detail: Geometry,
    /// Impostor geometry.
    pub impostor: Geometry,
    /// Survivor slots reserved for this archetype in the FullDetail tier.
    pub full_detail_capacity: u32,
    /// Survivor slots reserved for this archetype in the Impostor tier.
    pub impostor_capacity: u32,
}

impl ArchetypeDesc {
    /// Returns a preset for the given kind.
    #[must_use]
    pub fn preset(name: impl Into<String>, kind: ArchetypeKind) -> Self {
        let name = name.into();
        match kind {
            ArchetypeKind::GrassBlade => Self {
                name,
                kind,
                bounding_radius: 0.6,
                // 7-segment blade strip, then a single-triangle card
                full_detail: Geometry::Vertices {
                    vertex_count: 15,
                    first_vertex: 0,
                },
                impostor: Geometry::Vertices {
                    vertex_count: 3,
                    first_vertex: 15,
                },
                full_detail_capacity: 262_144,
                impostor_capacity: 524_288,
            },
            ArchetypeKind::Tree => Self {
                name,
                kind,
                bounding_radius: 6.0,
                full_detail: Geometry::Indexed {
                    index_count: 3072,
                    first_index: 0,
                    base_vertex: 0,
                },
                // Octahedral billboard quad
                impostor: Geometry::Indexed {
                    index_count: 6,
                    first_index: 3072,
                    base_vertex: 0,
                },
                full_detail_capacity: 16_384,
                impostor_capacity: 131_072,
            },
            ArchetypeKind::WeatherParticle => Self {
                name,
                kind,
                bounding_radius: 0.05,
                full_detail: Geometry::Vertices {
                    vertex_count: 6,
                    first_vertex: 0,
                },
                impostor: Geometry::Vertices {
                    vertex_count: 6,
                    first_vertex: 0,
                },
                full_detail_capacity: 65_536,
                impostor_capacity: 65_536,
            },
        }
    }

    /// Sets both tier capacities.
    #[must_use]
    pub fn with_capacities(mut self, full_detail: u32, impostor: u32) -> Self {
        self.full_detail_capacity = full_detail;
        self.impostor_capacity = impostor;
        self
    }

    /// Sets the unit-scale bounding radius.
    #[must_use]
    pub fn with_bounding_radius(mut self, radius: f32) -> Self {
        self.bounding_radius = radius;
        self
    }

    /// Segment capacity for a tier. Culled has none.
    #[must_use]
    pub const fn capacity(&self, tier: LodTier) -> u32 {
        match tier {
            LodTier::Culled => 0,
            LodTier::Impostor => self.impostor_capacity,
            LodTier::FullDetail => self.full_detail_capacity,
        }
    }

    /// Geometry for a drawn tier.
    #[must_use]
    pub const fn geometry(&self, tier: LodTier) -> Option<&Geometry> {
        match tier {
            LodTier::Culled => None,
            LodTier::Impostor => Some(&self.impostor),
            LodTier::FullDetail => Some(&self.full_detail),
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        for tier in LodTier::DRAWN {
            if self.capacity(tier) == 0 {
                return Err(ConfigError::NonPositiveCapacity {
                    archetype: self.name.clone(),
                    tier,
                });
            }
        }
        if !self.bounding_radius.is_finite() || self.bounding_radius < 0.0 {
            return Err(ConfigError::InvalidArchetype {
                name: self.name.clone(),
                reason: "bounding_radius must be finite and non-negative",
            });
        }
        if self.full_detail.element_count() == 0 || self.impostor.element_count() == 0 {
            return Err(ConfigError::InvalidArchetype {
                name: self.name.clone(),
                reason: "geometry must have at least one vertex or index",
            });
        }
        Ok(())
    }
}
