//! Flat cluster grid over the XZ plane.
//!
//! Instances are bucketed into fixed cells when they are applied to the
//! store. A cell's bounding sphere covers its full XZ footprint plus the
//! vertical range and the largest instance radius seen since it was last
//! empty, so it is conservative for every member.

use glam::Vec3;
use sylvan_core::{Instance, StoreObserver};

use crate::config::GridConfig;

/// Marks an instance slot that belongs to no cluster.
pub const NO_CLUSTER: u32 = u32::MAX;

/// Index of a cell in the grid (row-major, X fastest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterId(pub u32);

impl ClusterId {
    /// Returns the id as an array index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// One grid cell.
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Cell centre on the XZ plane.
    center_xz: [f32; 2],
    /// Half the cell diagonal on the XZ plane.
    half_diagonal: f32,
    /// Vertical extent of members (grow-only while non-empty).
    min_y: f32,
    max_y: f32,
    /// Largest member radius (grow-only while non-empty).
    max_radius: f32,
    /// Member slot indices, unordered.
    members: Vec<u32>,
}

impl Cluster {
    fn new(center_xz: [f32; 2], cell_size: f32) -> Self {
        Self {
            center_xz,
            half_diagonal: cell_size * std::f32::consts::FRAC_1_SQRT_2,
            min_y: f32::INFINITY,
            max_y: f32::NEG_INFINITY,
            max_radius: 0.0,
            members: Vec::new(),
        }
    }

    fn grow(&mut self, y: f32, radius: f32) {
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
        self.max_radius = self.max_radius.max(radius);
    }

    fn reset_bounds(&mut self) {
        self.min_y = f32::INFINITY;
        self.max_y = f32::NEG_INFINITY;
        self.max_radius = 0.0;
    }

    /// Bounding sphere centre.
    #[must_use]
    pub fn center(&self) -> Vec3 {
        let y = if self.members.is_empty() {
            0.0
        } else {
            (self.min_y + self.max_y) * 0.5
        };
        Vec3::new(self.center_xz[0], y, self.center_xz[1])
    }

    /// Bounding sphere radius.
    #[must_use]
    pub fn radius(&self) -> f32 {
        let half_height = if self.members.is_empty() {
            0.0
        } else {
            (self.max_y - self.min_y) * 0.5
        };
        self.half_diagonal.hypot(half_height) + self.max_radius
    }

    /// Member slot indices.
    #[must_use]
    pub fn members(&self) -> &[u32] {
        &self.members
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the cell holds no instance.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// The cluster grid plus per-slot membership.
///
/// Kept in sync with the store through [`StoreObserver`].
#[derive(Debug, Clone)]
pub struct ClusterIndex {
    origin: [f32; 2],
    cell_size: f32,
    dims: [u32; 2],
    clusters: Vec<Cluster>,
    /// Unit-scale bounding radius per archetype.
    archetype_radii: Vec<f32>,
    /// Owning cluster per slot, or [`NO_CLUSTER`].
    cluster_of: Vec<u32>,
    /// Position of each slot inside its cluster's member list.
    member_slot: Vec<u32>,
    /// Live instances outside the grid.
    unclustered: usize,
}

impl ClusterIndex {
    /// Creates an empty grid.
    ///
    /// `archetype_radii[a]` is the unit-scale bounding radius of archetype `a`.
    #[must_use]
    pub fn new(grid: &GridConfig, archetype_radii: Vec<f32>) -> Self {
        let [nx, nz] = grid.dims;
        let mut clusters = Vec::with_capacity(grid.cell_count());
        for z in 0..nz {
            for x in 0..nx {
                let cx = grid.origin[0] + (x as f32 + 0.5) * grid.cell_size;
                let cz = grid.origin[1] + (z as f32 + 0.5) * grid.cell_size;
                clusters.push(Cluster::new([cx, cz], grid.cell_size));
            }
        }
        Self {
            origin: grid.origin,
            cell_size: grid.cell_size,
            dims: grid.dims,
            clusters,
            archetype_radii,
            cluster_of: Vec::new(),
            member_slot: Vec::new(),
            unclustered: 0,
        }
    }

    /// Returns the cell containing a world position, if it lies on the grid.
    #[inline]
    #[must_use]
    pub fn cell_of(&self, position: Vec3) -> Option<ClusterId> {
        let fx = ((position.x - self.origin[0]) / self.cell_size).floor();
        let fz = ((position.z - self.origin[1]) / self.cell_size).floor();
        // Also rejects NaN.
        if !(fx >= 0.0 && fz >= 0.0 && fx < self.dims[0] as f32 && fz < self.dims[1] as f32) {
            return None;
        }
        let (x, z) = (fx as u32, fz as u32);
        Some(ClusterId(z * self.dims[0] + x))
    }

    /// All cells, indexed by [`ClusterId`].
    #[must_use]
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Returns true if the grid has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Owning cluster of a slot.
    #[must_use]
    pub fn cluster_of(&self, index: u32) -> Option<ClusterId> {
        match self.cluster_of.get(index as usize) {
            Some(&c) if c != NO_CLUSTER => Some(ClusterId(c)),
            _ => None,
        }
    }

    /// Owning cluster per slot ([`NO_CLUSTER`] if none), for the hot loop.
    ///
    /// May be shorter than the store's slot array; missing entries mean none.
    #[must_use]
    pub fn cluster_slots(&self) -> &[u32] {
        &self.cluster_of
    }

    /// Live instances that fell outside the grid.
    #[must_use]
    pub fn unclustered_count(&self) -> usize {
        self.unclustered
    }

    fn instance_radius(&self, instance: &Instance) -> f32 {
        self.archetype_radii
            .get(instance.archetype.index())
            .copied()
            .unwrap_or(0.0)
            * instance.scale
    }

    fn ensure_slot(&mut self, index: u32) {
        let needed = index as usize + 1;
        if self.cluster_of.len() < needed {
            self.cluster_of.resize(needed, NO_CLUSTER);
            self.member_slot.resize(needed, 0);
        }
    }

    fn attach(&mut self, index: u32, instance: &Instance) {
        self.ensure_slot(index);
        let radius = self.instance_radius(instance);
        match self.cell_of(instance.position) {
            Some(id) => {
                let cluster = &mut self.clusters[id.index()];
                self.member_slot[index as usize] = cluster.members.len() as u32;
                cluster.members.push(index);
                cluster.grow(instance.position.y, radius);
                self.cluster_of[index as usize] = id.0;
            }
            None => {
                self.cluster_of[index as usize] = NO_CLUSTER;
                self.unclustered += 1;
                tracing::debug!(
                    slot = index,
                    x = instance.position.x,
                    z = instance.position.z,
                    "instance outside cluster grid, culled per instance"
                );
            }
        }
    }

    fn detach(&mut self, index: u32) {
        let slot = index as usize;
        let Some(&owner) = self.cluster_of.get(slot) else {
            return;
        };
        if owner == NO_CLUSTER {
            self.unclustered = self.unclustered.saturating_sub(1);
            return;
        }

        let cluster = &mut self.clusters[owner as usize];
        let position = self.member_slot[slot] as usize;
        cluster.members.swap_remove(position);
        if let Some(&moved) = cluster.members.get(position) {
            self.member_slot[moved as usize] = position as u32;
        }
        if cluster.members.is_empty() {
            cluster.reset_bounds();
        }
        self.cluster_of[slot] = NO_CLUSTER;
    }
}

impl StoreObserver for ClusterIndex {
    fn inserted(&mut self, index: u32, instance: &Instance) {
        self.attach(index, instance);
    }

    fn updated(&mut self, index: u32, _old: &Instance, new: &Instance) {
        let target = self.cell_of(new.position).map_or(NO_CLUSTER, |id| id.0);
        let current = self.cluster_of.get(index as usize).copied();
        if current == Some(target) && target != NO_CLUSTER {
            let radius = self.instance_radius(new);
            self.clusters[target as usize].grow(new.position.y, radius);
        } else {
            self.detach(index);
            self.attach(index, new);
        }
    }

    fn removed(&mut self, index: u32, _instance: &Instance) {
        self.detach(index);
    }
}
