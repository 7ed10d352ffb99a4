//! Per-cluster visibility, computed once per frame before the instance pass.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use rayon::prelude::*;

use super::cluster::ClusterIndex;
use super::cull_pass::WORKGROUP_SIZE;
use super::frustum::Camera;
use crate::config::LodConfig;

/// Visibility of one cluster for the current frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterVisibility {
    /// Members may survive the instance pass.
    pub visible: bool,
    /// Members skip per-instance tests and are drawn as impostors.
    pub forced_impostor: bool,
}

impl ClusterVisibility {
    /// Culled cluster.
    pub const HIDDEN: Self = Self {
        visible: false,
        forced_impostor: false,
    };
    /// Visible, members tested individually.
    pub const VISIBLE: Self = Self {
        visible: true,
        forced_impostor: false,
    };
    /// Visible, members forced to Impostor.
    pub const FORCED_IMPOSTOR: Self = Self {
        visible: true,
        forced_impostor: true,
    };

    /// Flag: cluster visible.
    pub const FLAG_VISIBLE: u32 = 1 << 0;
    /// Flag: members forced to Impostor.
    pub const FLAG_FORCED_IMPOSTOR: u32 = 1 << 1;

    /// Packs into the flag word the compute shader reads.
    #[must_use]
    pub const fn to_bits(self) -> u32 {
        let mut bits = 0;
        if self.visible {
            bits |= Self::FLAG_VISIBLE;
        }
        if self.forced_impostor {
            bits |= Self::FLAG_FORCED_IMPOSTOR;
        }
        bits
    }
}

/// Cluster bounds as uploaded for the compute path.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct ClusterBounds {
    /// Sphere centre.
    pub center: [f32; 3],
    /// Sphere radius (negative for empty clusters).
    pub radius: f32,
}

/// Uniform block of `cluster_cull.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct ClusterUniforms {
    /// Camera position (w unused).
    pub camera_pos: [f32; 4],
    /// Frustum planes (6 planes, ABCD each).
    pub frustum_planes: [[f32; 4]; 6],
    /// Cluster cull distance, cluster impostor distance, sway padding, unused.
    pub distances: [f32; 4],
    /// Cluster count, unused x3.
    pub counts: [u32; 4],
}

/// Counts from one cluster pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterPassStats {
    /// Non-empty clusters tested.
    pub tested: u32,
    /// Visible with per-instance testing.
    pub visible: u32,
    /// Visible with members forced to Impostor.
    pub forced_impostor: u32,
    /// Rejected by distance or frustum.
    pub culled: u32,
}

impl ClusterPassStats {
    fn merge(self, other: Self) -> Self {
        Self {
            tested: self.tested + other.tested,
            visible: self.visible + other.visible,
            forced_impostor: self.forced_impostor + other.forced_impostor,
            culled: self.culled + other.culled,
        }
    }
}

/// Coarse visibility pass over the cluster grid.
///
/// Runs in time proportional to the number of cells, independent of the
/// instance count.
#[derive(Debug, Clone, Default)]
pub struct ClusterVisibilityPass {
    visibility: Vec<ClusterVisibility>,
}

impl ClusterVisibilityPass {
    /// Creates an empty pass. Storage grows to the grid size on first run.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recomputes visibility for every cluster.
    ///
    /// # Arguments
    ///
    /// * `padding` - Extra radius for wind sway, added to every cluster sphere
    pub fn run(
        &mut self,
        index: &ClusterIndex,
        camera: &Camera,
        lod: &LodConfig,
        padding: f32,
    ) -> ClusterPassStats {
        self.visibility
            .resize(index.len(), ClusterVisibility::HIDDEN);

        self.visibility
            .par_iter_mut()
            .zip(index.clusters().par_iter())
            .with_min_len(WORKGROUP_SIZE)
            .map(|(out, cluster)| {
                if cluster.is_empty() {
                    *out = ClusterVisibility::HIDDEN;
                    return ClusterPassStats::default();
                }
                *out = classify(cluster.center(), cluster.radius() + padding, camera, lod);
                ClusterPassStats {
                    tested: 1,
                    visible: u32::from(*out == ClusterVisibility::VISIBLE),
                    forced_impostor: u32::from(out.forced_impostor),
                    culled: u32::from(!out.visible),
                }
            })
            .reduce(ClusterPassStats::default, ClusterPassStats::merge)
    }

    /// Visibility per cluster, indexed by [`ClusterId`](super::ClusterId).
    #[must_use]
    pub fn visibility(&self) -> &[ClusterVisibility] {
        &self.visibility
    }

    /// Flag words for GPU upload, one per cluster.
    #[must_use]
    pub fn flags(&self) -> Vec<u32> {
        self.visibility.iter().map(|v| v.to_bits()).collect()
    }

    /// Cluster spheres for GPU upload.
    #[must_use]
    pub fn bounds(index: &ClusterIndex) -> Vec<ClusterBounds> {
        index
            .clusters()
            .iter()
            .map(|cluster| ClusterBounds {
                center: cluster.center().to_array(),
                radius: if cluster.is_empty() {
                    -1.0
                } else {
                    cluster.radius()
                },
            })
            .collect()
    }

    /// Uniform block for the compute path.
    #[must_use]
    pub fn uniforms(
        index: &ClusterIndex,
        camera: &Camera,
        lod: &LodConfig,
        padding: f32,
    ) -> ClusterUniforms {
        ClusterUniforms {
            camera_pos: camera.position.extend(1.0).to_array(),
            frustum_planes: camera.frustum.as_arrays(),
            distances: [
                lod.cluster_cull_distance,
                lod.cluster_impostor_distance,
                padding,
                0.0,
            ],
            counts: [index.len() as u32, 0, 0, 0],
        }
    }

    /// Returns the WGSL source of the cluster visibility compute shader.
    #[must_use]
    pub fn shader_source() -> &'static str {
        include_str!("../../shaders/cluster_cull.wgsl")
    }
}

/// Distance is measured to the sphere surface, so a cluster the camera is
/// standing in has distance zero.
#[inline]
fn classify(center: Vec3, radius: f32, camera: &Camera, lod: &LodConfig) -> ClusterVisibility {
    let distance = (camera.position.distance(center) - radius).max(0.0);
    if distance > lod.cluster_cull_distance {
        return ClusterVisibility::HIDDEN;
    }
    if !camera.frustum.intersects_sphere(center, radius) {
        return ClusterVisibility::HIDDEN;
    }
    if distance > lod.cluster_impostor_distance {
        ClusterVisibility::FORCED_IMPOSTOR
    } else {
        ClusterVisibility::VISIBLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridConfig;
    use sylvan_core::{ArchetypeId, Instance, StoreObserver};

    fn setup() -> (ClusterIndex, Camera, LodConfig) {
        let grid = GridConfig {
            origin: [-50.0, -500.0],
            cell_size: 10.0,
            dims: [10, 50],
        };
        let mut index = ClusterIndex::new(&grid, vec![0.5]);
        // One instance per cell along the -Z axis.
        for z in 0..50u32 {
            let position = Vec3::new(5.0, 0.0, -500.0 + z as f32 * 10.0 + 5.0);
            index.inserted(z, &Instance::new(position, ArchetypeId(0)));
        }
        let camera = Camera::look_at(
            Vec3::new(5.0, 2.0, 0.0),
            Vec3::new(5.0, 2.0, -1.0),
            Vec3::Y,
            60f32.to_radians(),
            1.0,
            0.1,
            1000.0,
        )
        .unwrap();
        let lod = LodConfig {
            cluster_cull_distance: 300.0,
            cluster_impostor_distance: 150.0,
            ..LodConfig::default()
        };
        (index, camera, lod)
    }

    #[test]
    fn test_distance_bands() {
        let (index, camera, lod) = setup();
        let mut pass = ClusterVisibilityPass::new();
        let stats = pass.run(&index, &camera, &lod, 0.0);

        assert_eq!(stats.tested, 50);
        assert_eq!(stats.tested, stats.visible + stats.forced_impostor + stats.culled);
        assert!(stats.visible > 0 && stats.forced_impostor > 0 && stats.culled > 0);

        let near = index.cell_of(Vec3::new(5.0, 0.0, -15.0)).unwrap();
        let mid = index.cell_of(Vec3::new(5.0, 0.0, -225.0)).unwrap();
        let far = index.cell_of(Vec3::new(5.0, 0.0, -455.0)).unwrap();
        assert_eq!(pass.visibility()[near.index()], ClusterVisibility::VISIBLE);
        assert_eq!(pass.visibility()[mid.index()], ClusterVisibility::FORCED_IMPOSTOR);
        assert_eq!(pass.visibility()[far.index()], ClusterVisibility::HIDDEN);
    }

    #[test]
    fn test_empty_and_offscreen_clusters_hidden() {
        let (index, camera, lod) = setup();
        let mut pass = ClusterVisibilityPass::new();
        pass.run(&index, &camera, &lod, 0.0);

        // Empty cell beside the populated column.
        let empty = index.cell_of(Vec3::new(-45.0, 0.0, -15.0)).unwrap();
        assert_eq!(pass.visibility()[empty.index()], ClusterVisibility::HIDDEN);
        assert_eq!(pass.flags()[empty.index()], 0);
    }

    #[test]
    fn test_uniforms_layout() {
        assert_eq!(std::mem::size_of::<ClusterUniforms>(), 144);
        let (index, camera, lod) = setup();
        let uniforms = ClusterVisibilityPass::uniforms(&index, &camera, &lod, 0.5);
        assert_eq!(uniforms.counts[0], 500);
        assert_eq!(uniforms.distances, [300.0, 150.0, 0.5, 0.0]);
    }

    #[test]
    fn test_flag_bits() {
        assert_eq!(ClusterVisibility::HIDDEN.to_bits(), 0);
        assert_eq!(ClusterVisibility::VISIBLE.to_bits(), 1);
        assert_eq!(ClusterVisibility::FORCED_IMPOSTOR.to_bits(), 3);
    }
}
