//! LOD tiers, hysteresis classification and blend factors.

use crate::config::{BlendCurve, LodConfig};

/// Level-of-detail tier of an instance for one frame.
#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LodTier {
    /// Not drawn.
    #[default]
    Culled = 0,
    /// Cheap far-field representation.
    Impostor = 1,
    /// Full geometry.
    FullDetail = 2,
}

impl LodTier {
    /// Tiers that own survivor arrays and draw commands, in array order.
    pub const DRAWN: [Self; 2] = [Self::Impostor, Self::FullDetail];

    /// Position of a drawn tier in [`Self::DRAWN`].
    #[inline]
    #[must_use]
    pub const fn drawn_index(self) -> Option<usize> {
        match self {
            Self::Culled => None,
            Self::Impostor => Some(0),
            Self::FullDetail => Some(1),
        }
    }

    /// Lowercase name for labels and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Culled => "culled",
            Self::Impostor => "impostor",
            Self::FullDetail => "full_detail",
        }
    }
}

/// The blend band between `start` and `end`.
///
/// The band doubles as the hysteresis window: the thresholds for entering
/// and leaving FullDetail are its two edges, so an instance hovering inside
/// the band keeps whatever tier it had.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodBand {
    /// Promotion threshold (Impostor to FullDetail below it).
    pub start: f32,
    /// Demotion threshold (FullDetail to Impostor beyond it).
    pub end: f32,
    /// Blend shape.
    pub curve: BlendCurve,
}

impl From<&LodConfig> for LodBand {
    fn from(config: &LodConfig) -> Self {
        Self {
            start: config.lod_start,
            end: config.lod_end,
            curve: config.blend_curve,
        }
    }
}

impl LodBand {
    /// Chooses the tier of a surviving instance.
    ///
    /// `previous` is the tier the instance had last frame. `Culled` means it
    /// has no history (new, or invisible last frame); such instances only
    /// start at FullDetail when they are already inside `start`.
    #[inline]
    #[must_use]
    pub fn classify(&self, previous: LodTier, distance: f32) -> LodTier {
        match previous {
            LodTier::FullDetail if distance > self.end => LodTier::Impostor,
            LodTier::FullDetail => LodTier::FullDetail,
            LodTier::Impostor | LodTier::Culled if distance < self.start => LodTier::FullDetail,
            LodTier::Impostor | LodTier::Culled => LodTier::Impostor,
        }
    }

    /// Blend factor: 0 at or inside `start`, 1 at or beyond `end`.
    #[inline]
    #[must_use]
    pub fn blend(&self, distance: f32) -> f32 {
        let t = (distance - self.start) / (self.end - self.start);
        self.curve.apply(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band() -> LodBand {
        LodBand {
            start: 100.0,
            end: 120.0,
            curve: BlendCurve::Smoothstep,
        }
    }

    #[test]
    fn test_fresh_instances() {
        let band = band();
        assert_eq!(band.classify(LodTier::Culled, 50.0), LodTier::FullDetail);
        assert_eq!(band.classify(LodTier::Culled, 110.0), LodTier::Impostor);
        assert_eq!(band.classify(LodTier::Culled, 500.0), LodTier::Impostor);
    }

    #[test]
    fn test_hysteresis_inside_band() {
        let band = band();
        assert_eq!(band.classify(LodTier::FullDetail, 119.0), LodTier::FullDetail);
        assert_eq!(band.classify(LodTier::Impostor, 101.0), LodTier::Impostor);
        assert_eq!(band.classify(LodTier::FullDetail, 121.0), LodTier::Impostor);
        assert_eq!(band.classify(LodTier::Impostor, 99.0), LodTier::FullDetail);
    }

    #[test]
    fn test_oscillation_around_end_changes_tier_once() {
        let band = band();
        let mut tier = LodTier::FullDetail;
        let mut changes = 0;
        // Oscillate within +-5 of lod_end (band is 20 wide), never reaching start.
        for step in 0..200 {
            let distance = 120.0 + 5.0 * ((step as f32) * 0.7).sin();
            let next = band.classify(tier, distance);
            if next != tier {
                changes += 1;
            }
            tier = next;
        }
        assert_eq!(changes, 1);
        assert_eq!(tier, LodTier::Impostor);
    }

    #[test]
    fn test_blend_edges() {
        let band = band();
        assert_eq!(band.blend(90.0), 0.0);
        assert_eq!(band.blend(100.0), 0.0);
        assert_eq!(band.blend(110.0), 0.5);
        assert_eq!(band.blend(120.0), 1.0);
        assert_eq!(band.blend(200.0), 1.0);
    }

    #[test]
    fn test_drawn_index() {
        assert_eq!(LodTier::Culled.drawn_index(), None);
        for (i, tier) in LodTier::DRAWN.iter().enumerate() {
            assert_eq!(tier.drawn_index(), Some(i));
        }
    }
}
