//! # Deterministic Scatter
//!
//! Fills a rectangle on the XZ plane with instances from a 64-bit seed.
//! Same seed, same instances, on every platform: used by tests, benches
//! and demo scenes.

use glam::{Quat, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sylvan_core::{ArchetypeId, Instance, InstanceHandle, InstanceWriter, StoreResult};

/// Scatter parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Scatter {
    /// Minimum X/Z corner.
    pub min: [f32; 2],
    /// Maximum X/Z corner.
    pub max: [f32; 2],
    /// Ground height of every instance.
    pub height: f32,
    /// Uniform scale range (inclusive).
    pub scale: (f32, f32),
    /// Relative weight per archetype. `ArchetypeId(i)` gets `weights[i]`.
    pub weights: Vec<f32>,
    /// Randomize yaw.
    pub random_yaw: bool,
}

impl Scatter {
    /// Uniform scatter of a single archetype over a square centred on the origin.
    #[must_use]
    pub fn square(half_extent: f32) -> Self {
        Self {
            min: [-half_extent, -half_extent],
            max: [half_extent, half_extent],
            height: 0.0,
            scale: (1.0, 1.0),
            weights: vec![1.0],
            random_yaw: true,
        }
    }

    /// Sets the area.
    #[must_use]
    pub fn with_area(mut self, min: [f32; 2], max: [f32; 2]) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Sets the ground height.
    #[must_use]
    pub fn with_height(mut self, height: f32) -> Self {
        self.height = height;
        self
    }

    /// Sets the scale jitter range.
    #[must_use]
    pub fn with_scale(mut self, min: f32, max: f32) -> Self {
        self.scale = (min, max);
        self
    }

    /// Sets the archetype weights.
    #[must_use]
    pub fn with_weights(mut self, weights: Vec<f32>) -> Self {
        self.weights = weights;
        self
    }

    /// Generates `count` instances from `seed`.
    #[must_use]
    pub fn generate(&self, seed: u64, count: usize) -> Vec<Instance> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let total: f32 = self.weights.iter().filter(|w| **w > 0.0).sum();
        (0..count).map(|_| self.sample(&mut rng, total)).collect()
    }

    /// Generates `count` instances and queues them on `writer`.
    ///
    /// # Errors
    ///
    /// Returns the first rejected add (store full, unknown archetype).
    pub fn fill(
        &self,
        writer: &InstanceWriter,
        seed: u64,
        count: usize,
    ) -> StoreResult<Vec<InstanceHandle>> {
        self.generate(seed, count)
            .into_iter()
            .map(|instance| writer.add(instance))
            .collect()
    }

    fn sample(&self, rng: &mut ChaCha8Rng, total_weight: f32) -> Instance {
        let x = lerp(self.min[0], self.max[0], rng.gen::<f32>());
        let z = lerp(self.min[1], self.max[1], rng.gen::<f32>());
        let scale = lerp(self.scale.0, self.scale.1, rng.gen::<f32>());
        let yaw = if self.random_yaw {
            rng.gen::<f32>() * std::f32::consts::TAU
        } else {
            0.0
        };
        let archetype = self.pick_archetype(rng.gen::<f32>() * total_weight);

        Instance::new(Vec3::new(x, self.height, z), archetype)
            .with_rotation(Quat::from_rotation_y(yaw))
            .with_scale(scale)
            .with_seed(rng.gen())
    }

    /// Cumulative scan; the last positive weight absorbs rounding.
    fn pick_archetype(&self, mut roll: f32) -> ArchetypeId {
        let mut chosen = 0;
        for (i, &weight) in self.weights.iter().enumerate() {
            if weight <= 0.0 {
                continue;
            }
            chosen = i;
            if roll < weight {
                break;
            }
            roll -= weight;
        }
        ArchetypeId(u16::try_from(chosen).unwrap_or(u16::MAX))
    }
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_instances() {
        let scatter = Scatter::square(100.0);
        assert_eq!(scatter.generate(7, 64), scatter.generate(7, 64));
        assert_ne!(scatter.generate(7, 64), scatter.generate(8, 64));
    }

    #[test]
    fn test_stays_in_area() {
        let scatter = Scatter::square(50.0).with_height(3.0).with_scale(0.5, 2.0);
        for instance in scatter.generate(1, 1_000) {
            assert!(instance.position.x >= -50.0 && instance.position.x <= 50.0);
            assert!(instance.position.z >= -50.0 && instance.position.z <= 50.0);
            assert_eq!(instance.position.y, 3.0);
            assert!(instance.scale >= 0.5 && instance.scale <= 2.0);
            assert!(instance.is_well_formed());
        }
    }

    #[test]
    fn test_archetype_weights() {
        let scatter = Scatter::square(10.0).with_weights(vec![3.0, 0.0, 1.0]);
        let instances = scatter.generate(3, 4_000);
        let count = |a: u16| instances.iter().filter(|i| i.archetype == ArchetypeId(a)).count();
        assert_eq!(count(1), 0);
        assert!((2_700..3_300).contains(&count(0)));
        assert_eq!(count(0) + count(2), 4_000);
    }
}
