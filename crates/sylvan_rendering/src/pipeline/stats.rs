//! Per-frame pipeline statistics.

use sylvan_core::AppliedMutations;

use crate::culling::{ClusterPassStats, CullPassStats, LodTier};

/// Statistics from one orchestrated frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    /// Frame number (first frame is 1).
    pub frame: u64,
    /// Mutations applied at the start of the frame.
    pub applied: AppliedMutations,
    /// Cluster pass counts.
    pub clusters: ClusterPassStats,
    /// Instance pass counts.
    pub instances: CullPassStats,
    /// Stored survivors per drawn tier (Impostor, FullDetail).
    pub survivors: [u64; 2],
    /// Records discarded because a segment was full.
    pub dropped: u64,
    /// Indirect commands handed to the draw stage.
    pub draw_commands: u32,
    /// Host time spent in the two passes, in milliseconds.
    pub cull_time_ms: f32,
}

impl FrameStats {
    /// Stored survivors of one tier.
    #[must_use]
    pub fn survivors_in(&self, tier: LodTier) -> u64 {
        tier.drawn_index().map_or(0, |t| self.survivors[t])
    }

    /// Stored survivors over all tiers.
    #[must_use]
    pub fn total_survivors(&self) -> u64 {
        self.survivors.iter().sum()
    }

    /// Survivors divided by live instances tested.
    #[must_use]
    pub fn survivor_ratio(&self) -> f64 {
        if self.instances.tested == 0 {
            0.0
        } else {
            self.total_survivors() as f64 / self.instances.tested as f64
        }
    }

    /// Returns true if any segment truncated this frame.
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.dropped > 0
    }
}
