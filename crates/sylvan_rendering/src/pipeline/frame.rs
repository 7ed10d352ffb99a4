//! Frame inputs and the packet handed to the draw stage.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use sylvan_core::{BufferSetId, ReadHandle};

use super::FrameStats;
use crate::culling::{Camera, LodTier};
use crate::instancing::{DrawCommand, SurvivorBuffers, SurvivorRecord};

/// Wind sample for one frame, by value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindSample {
    /// Horizontal direction (normalized on upload).
    pub direction: Vec2,
    /// Base strength.
    pub strength: f32,
    /// Gust strength on top of the base.
    pub gust: f32,
}

impl Default for WindSample {
    fn default() -> Self {
        Self::CALM
    }
}

impl WindSample {
    /// No wind.
    pub const CALM: Self = Self {
        direction: Vec2::X,
        strength: 0.0,
        gust: 0.0,
    };

    /// Total displacement driver, used to pad culling bounds.
    #[inline]
    #[must_use]
    pub fn magnitude(&self) -> f32 {
        (self.strength + self.gust).max(0.0)
    }

    /// Packs the sample for the vertex stage.
    #[must_use]
    pub fn uniform(&self) -> WindUniform {
        let direction = self.direction.normalize_or_zero();
        WindUniform {
            dir_strength_gust: [direction.x, direction.y, self.strength, self.gust],
        }
    }
}

/// Wind uniform: xy direction, z strength, w gust.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct WindUniform {
    /// Direction and strengths.
    pub dir_strength_gust: [f32; 4],
}

/// Everything the orchestrator consumes at the start of a frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameInputs {
    /// Camera for both passes.
    pub camera: Camera,
    /// Wind sample.
    pub wind: WindSample,
    /// Density override; `None` keeps the configured value.
    pub density: Option<f32>,
}

impl FrameInputs {
    /// Inputs with calm wind and the configured density.
    #[must_use]
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            wind: WindSample::CALM,
            density: None,
        }
    }

    /// Sets the wind sample.
    #[must_use]
    pub fn with_wind(mut self, wind: WindSample) -> Self {
        self.wind = wind;
        self
    }

    /// Overrides the configured density for this frame.
    ///
    /// Clamped to [0, 1]; a non-finite value keeps the configured density.
    #[must_use]
    pub fn with_density(mut self, density: f32) -> Self {
        self.density = Some(density);
        self
    }
}

/// The published output of one frame.
///
/// Holds a read handle on its buffer set. While a packet is alive the set
/// cannot be written, so drop it once the draw stage has consumed it.
#[derive(Debug)]
pub struct DrawPacket {
    /// Frame that produced the packet.
    pub frame: u64,
    /// Buffer set holding the survivors.
    pub set: BufferSetId,
    /// Survivor arrays and counters.
    pub buffers: ReadHandle<SurvivorBuffers>,
    /// One command per (tier, archetype).
    pub commands: Vec<DrawCommand>,
    /// Wind uniform for the vertex stage.
    pub wind: WindUniform,
    /// Frame statistics.
    pub stats: FrameStats,
}

impl DrawPacket {
    /// Stored survivors of a tier, all archetypes.
    pub fn records(&self, tier: LodTier) -> impl Iterator<Item = &SurvivorRecord> + '_ {
        self.buffers.tier_records(tier)
    }

    /// Indirect argument bytes of every command, in command order.
    #[must_use]
    pub fn indirect_bytes(&self) -> Vec<u8> {
        self.commands
            .iter()
            .flat_map(|c| c.args.as_bytes().iter().copied())
            .collect()
    }

    /// Returns the wind uniform as bytes.
    #[must_use]
    pub fn wind_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(&self.wind)
    }

    /// Returns true if any command draws at least one instance.
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.commands.iter().any(|c| c.args.instance_count() > 0)
    }

    /// Instances drawn, summed over commands.
    #[must_use]
    pub fn instance_count(&self) -> u64 {
        self.commands
            .iter()
            .map(|c| u64::from(c.args.instance_count()))
            .sum()
    }
}
