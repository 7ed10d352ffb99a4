//! Per-instance culling and LOD classification.
//!
//! One parallel sweep over every store slot:
//! 1. Skip tombstones and members of invisible clusters
//! 2. Seed-stable density thinning
//! 3. Forced-impostor clusters go straight to Impostor
//! 4. Otherwise distance and frustum test on the instance sphere
//! 5. Hysteresis classification and blend factor
//! 6. Atomic reserve in the (tier, archetype) segment, conditional write

use bytemuck::{Pod, Zeroable};
use rayon::prelude::*;
use sylvan_core::{Instance, SourceStore};

use super::cluster::{ClusterIndex, NO_CLUSTER};
use super::cluster_pass::ClusterVisibility;
use super::frustum::Camera;
use super::lod::{LodBand, LodTier};
use crate::config::{BlendCurve, PipelineConfig};
use crate::instancing::{SurvivorRecord, SurvivorWriter};

/// Instances per work item. Matches `@workgroup_size` in the compute shaders.
pub const WORKGROUP_SIZE: usize = 64;

/// Uniform block of `cull_lod.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct CullUniforms {
    /// View-projection matrix.
    pub view_proj: [[f32; 4]; 4],
    /// Camera position (w unused).
    pub camera_pos: [f32; 4],
    /// Frustum planes (6 planes, ABCD each).
    pub frustum_planes: [[f32; 4]; 6],
    /// lod_start, lod_end, cull_distance, density.
    pub lod: [f32; 4],
    /// Sway padding, blend curve kind, blend exponent, unused.
    pub params: [f32; 4],
    /// Slot count, frame tag, archetype count, unused.
    pub counts: [u32; 4],
}

/// Per-frame values the instance pass reads.
#[derive(Debug, Clone, Copy)]
pub struct CullInputs<'a> {
    /// Camera for this frame.
    pub camera: &'a Camera,
    /// Fraction of instances kept by thinning.
    pub density: f32,
    /// Extra radius for wind sway.
    pub padding: f32,
}

/// Counts from one instance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CullPassStats {
    /// Live instances visited.
    pub tested: u64,
    /// Rejected because their cluster was invisible.
    pub cluster_culled: u64,
    /// Live instances outside the grid (tested individually).
    pub unclustered: u64,
    /// Removed by density thinning.
    pub thinned: u64,
    /// Rejected by distance or frustum.
    pub culled: u64,
    /// Classified Impostor because their cluster forced it.
    pub forced_impostor: u64,
    /// Reservations per drawn tier (stored plus dropped).
    pub reserved: [u64; 2],
    /// Reservations that did not fit their segment.
    pub dropped: u64,
}

impl CullPassStats {
    fn merge(self, other: Self) -> Self {
        Self {
            tested: self.tested + other.tested,
            cluster_culled: self.cluster_culled + other.cluster_culled,
            unclustered: self.unclustered + other.unclustered,
            thinned: self.thinned + other.thinned,
            culled: self.culled + other.culled,
            forced_impostor: self.forced_impostor + other.forced_impostor,
            reserved: [
                self.reserved[0] + other.reserved[0],
                self.reserved[1] + other.reserved[1],
            ],
            dropped: self.dropped + other.dropped,
        }
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Tombstone => return,
            Outcome::ClusterCulled => self.cluster_culled += 1,
            Outcome::Thinned => self.thinned += 1,
            Outcome::Culled => self.culled += 1,
            Outcome::Survived {
                tier,
                forced,
                stored,
            } => {
                if let Some(t) = tier.drawn_index() {
                    self.reserved[t] += 1;
                }
                self.forced_impostor += u64::from(forced);
                self.dropped += u64::from(!stored);
            }
        }
        self.tested += 1;
    }

    /// Reservations summed over tiers.
    #[must_use]
    pub fn survivors(&self) -> u64 {
        self.reserved.iter().sum()
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Tombstone,
    ClusterCulled,
    Thinned,
    Culled,
    Survived {
        tier: LodTier,
        forced: bool,
        stored: bool,
    },
}

/// Read-only state shared by every worker.
struct InstanceTest<'a, 'w> {
    inputs: CullInputs<'a>,
    band: LodBand,
    cull_distance: f32,
    radii: &'a [f32],
    visibility: &'a [ClusterVisibility],
    cluster_slots: &'a [u32],
    writer: &'a SurvivorWriter<'w>,
}

impl InstanceTest<'_, '_> {
    #[inline]
    fn run(&self, index: usize, instance: &Instance, previous: &mut LodTier) -> Outcome {
        let cluster = self.cluster_slots.get(index).copied().unwrap_or(NO_CLUSTER);
        let forced = if cluster == NO_CLUSTER {
            false
        } else {
            match self.visibility.get(cluster as usize) {
                Some(v) if v.visible => v.forced_impostor,
                _ => {
                    *previous = LodTier::Culled;
                    return Outcome::ClusterCulled;
                }
            }
        };

        if !keeps_at_density(instance.seed, self.inputs.density) {
            *previous = LodTier::Culled;
            return Outcome::Thinned;
        }

        let (tier, blend) = if forced {
            (LodTier::Impostor, 1.0)
        } else {
            let camera = self.inputs.camera;
            let distance = camera.position.distance(instance.position);
            let radius = self
                .radii
                .get(instance.archetype.index())
                .copied()
                .unwrap_or(0.0)
                * instance.scale
                + self.inputs.padding;
            if distance > self.cull_distance
                || !camera.frustum.intersects_sphere(instance.position, radius)
            {
                *previous = LodTier::Culled;
                return Outcome::Culled;
            }
            (self.band.classify(*previous, distance), self.band.blend(distance))
        };

        *previous = tier;
        let record = SurvivorRecord::new(instance, blend, self.writer.frame_tag());
        let stored = self.writer.push(tier, instance.archetype, record);
        Outcome::Survived {
            tier,
            forced,
            stored,
        }
    }
}

/// Seed-stable thinning: the same instances survive every frame.
#[inline]
#[must_use]
pub fn keeps_at_density(seed: u32, density: f32) -> bool {
    if density >= 1.0 {
        return true;
    }
    f64::from(seed) / f64::from(u32::MAX) < f64::from(density)
}

/// The instance pass. Owns the per-slot LOD history used for hysteresis.
#[derive(Debug, Clone)]
pub struct CullAndLodPass {
    band: LodBand,
    cull_distance: f32,
    /// Unit-scale bounding radius per archetype.
    radii: Vec<f32>,
    /// Tier of every slot in the previous frame.
    history: Vec<LodTier>,
}

impl CullAndLodPass {
    /// Creates the pass for a validated configuration.
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            band: LodBand::from(&config.lod),
            cull_distance: config.lod.cull_distance,
            radii: config.archetypes.iter().map(|a| a.bounding_radius).collect(),
            history: Vec::new(),
        }
    }

    /// Forgets the LOD history of a slot (new or removed instance).
    pub fn reset_slot(&mut self, index: u32) {
        let slot = index as usize;
        if slot >= self.history.len() {
            self.history.resize(slot + 1, LodTier::Culled);
        }
        self.history[slot] = LodTier::Culled;
    }

    /// Tier a slot was assigned by the last pass.
    #[must_use]
    pub fn tier_of(&self, index: u32) -> LodTier {
        self.history
            .get(index as usize)
            .copied()
            .unwrap_or(LodTier::Culled)
    }

    /// LOD band in use.
    #[must_use]
    pub fn band(&self) -> LodBand {
        self.band
    }

    /// Culls and classifies every slot of the store into `writer`.
    ///
    /// `visibility` must come from a cluster pass over `clusters` this frame.
    pub fn run(
        &mut self,
        store: &SourceStore,
        clusters: &ClusterIndex,
        visibility: &[ClusterVisibility],
        inputs: CullInputs<'_>,
        writer: &SurvivorWriter<'_>,
    ) -> CullPassStats {
        let Self {
            band,
            cull_distance,
            radii,
            history,
        } = self;
        history.resize(store.slot_count(), LodTier::Culled);

        let test = InstanceTest {
            inputs,
            band: *band,
            cull_distance: *cull_distance,
            radii,
            visibility,
            cluster_slots: clusters.cluster_slots(),
            writer,
        };
        let instances = store.instances();
        let live = store.live();

        history
            .par_iter_mut()
            .enumerate()
            .with_min_len(WORKGROUP_SIZE)
            .fold(CullPassStats::default, |mut stats, (index, previous)| {
                let outcome = if live[index] {
                    test.run(index, &instances[index], previous)
                } else {
                    *previous = LodTier::Culled;
                    Outcome::Tombstone
                };
                let clustered = test
                    .cluster_slots
                    .get(index)
                    .is_some_and(|&c| c != NO_CLUSTER);
                if live[index] && !clustered {
                    stats.unclustered += 1;
                }
                stats.record(outcome);
                stats
            })
            .reduce(CullPassStats::default, CullPassStats::merge)
    }

    /// Uniform block for the compute path.
    #[must_use]
    pub fn uniforms(
        &self,
        inputs: &CullInputs<'_>,
        slot_count: u32,
        frame_tag: u32,
    ) -> CullUniforms {
        let camera = inputs.camera;
        let (curve_kind, exponent) = match self.band.curve {
            BlendCurve::Linear => (0.0, 1.0),
            BlendCurve::Smoothstep => (1.0, 1.0),
            BlendCurve::Power(exponent) => (2.0, exponent),
        };
        CullUniforms {
            view_proj: camera.view_proj.to_cols_array_2d(),
            camera_pos: camera.position.extend(1.0).to_array(),
            frustum_planes: camera.frustum.as_arrays(),
            lod: [self.band.start, self.band.end, self.cull_distance, inputs.density],
            params: [inputs.padding, curve_kind, exponent, 0.0],
            counts: [slot_count, frame_tag, self.radii.len() as u32, 0],
        }
    }

    /// Returns the WGSL source of the instance cull compute shader.
    #[must_use]
    pub fn shader_source() -> &'static str {
        include_str!("../../shaders/cull_lod.wgsl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_density_thinning_is_stable() {
        assert!(keeps_at_density(u32::MAX, 1.0));
        assert!(!keeps_at_density(0, 0.0));
        assert!(keeps_at_density(0, 0.5));
        assert!(!keeps_at_density(u32::MAX, 0.5));

        let kept = (0..10_000u32)
            .map(|i| i.wrapping_mul(2_654_435_761))
            .filter(|&seed| keeps_at_density(seed, 0.25))
            .count();
        assert!((2_000..3_000).contains(&kept));
    }

    #[test]
    fn test_uniforms_size() {
        assert_eq!(std::mem::size_of::<CullUniforms>(), 224);
    }

    #[test]
    fn test_reset_slot_grows_history() {
        let mut pass = CullAndLodPass::new(&PipelineConfig::default());
        pass.reset_slot(9);
        assert_eq!(pass.tier_of(9), LodTier::Culled);
        assert_eq!(pass.tier_of(100), LodTier::Culled);
    }
}
