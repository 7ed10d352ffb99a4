//! Per-instance source data.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Index into the archetype registry (species, particle type, ...).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ArchetypeId(pub u16);

impl ArchetypeId {
    /// Returns the id as an array index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// One renderable element: a grass blade, a tree or a weather particle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// World-space position of the instance origin.
    pub position: Vec3,
    /// Orientation.
    pub rotation: Quat,
    /// Uniform scale.
    pub scale: f32,
    /// Archetype selecting geometry and bounds.
    pub archetype: ArchetypeId,
    /// Per-instance random seed (variation, density thinning).
    pub seed: u32,
}

impl Instance {
    /// Creates an unrotated, unit-scale instance.
    #[must_use]
    pub fn new(position: Vec3, archetype: ArchetypeId) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            scale: 1.0,
            archetype,
            seed: 0,
        }
    }

    /// Sets the orientation.
    #[must_use]
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Sets the orientation to a rotation about +Y.
    #[must_use]
    pub fn with_yaw(self, radians: f32) -> Self {
        self.with_rotation(Quat::from_rotation_y(radians))
    }

    /// Sets the uniform scale.
    #[must_use]
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Sets the random seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    /// Returns true when every component is finite and the scale is positive.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.position.is_finite() && self.rotation.is_finite() && self.scale.is_finite() && self.scale > 0.0
    }
}
