//! # Survivor Output Buffers
//!
//! One buffer set holds a survivor array per drawn tier, each split into a
//! fixed segment per archetype, plus one atomic counter per segment.
//!
//! ```text
//!   Impostor array:   [ archetype 0 ......... | archetype 1 ..... | ... ]
//!   FullDetail array: [ archetype 0 ... | archetype 1 . | ... ]
//!   counters:         [ imp/0, imp/1, ..., full/0, full/1, ... ]
//! ```
//!
//! Writers reserve a slot with `fetch_add` and write only if the slot is
//! below the segment capacity. Counters may overshoot; every reader clamps.
//!
//! ## Safety Note
//!
//! [`SurvivorWriter`] writes through a raw pointer from many threads. Each
//! slot index is handed out exactly once per pass by the atomic counter.

#![allow(unsafe_code)]

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use sylvan_core::{ArchetypeId, DoubleBuffered};

use super::survivor::SurvivorRecord;
use crate::config::PipelineConfig;
use crate::culling::LodTier;
use crate::error::ResourceError;

/// Buffer usage of a survivor array on the GPU path.
pub const SURVIVOR_BUFFER_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::VERTEX)
    .union(wgpu::BufferUsages::COPY_DST);

/// Buffer usage of the counter array on the GPU path.
pub const COUNTER_BUFFER_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::COPY_SRC)
    .union(wgpu::BufferUsages::COPY_DST);

/// Placement of one (tier, archetype) segment inside its tier array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// First record of the segment.
    pub offset: u32,
    /// Number of records the segment holds.
    pub capacity: u32,
}

/// Segment placement for every (tier, archetype) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentLayout {
    archetype_count: usize,
    /// Indexed by `drawn_index * archetype_count + archetype`.
    segments: Vec<Segment>,
    /// Total records per drawn tier.
    tier_capacity: [u32; 2],
}

impl SegmentLayout {
    /// Lays out segments in archetype order.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::ExceedsDeviceLimit`] if a tier needs more
    /// than `u32::MAX` records.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ResourceError> {
        let archetype_count = config.archetypes.len();
        let mut segments = Vec::with_capacity(archetype_count * LodTier::DRAWN.len());
        let mut tier_capacity = [0u32; 2];

        for (t, tier) in LodTier::DRAWN.into_iter().enumerate() {
            let mut offset = 0u32;
            for archetype in &config.archetypes {
                let capacity = archetype.capacity(tier);
                segments.push(Segment { offset, capacity });
                offset = offset.checked_add(capacity).ok_or_else(|| {
                    ResourceError::ExceedsDeviceLimit {
                        tier,
                        bytes: config.tier_capacity(tier) * SurvivorRecord::SIZE as u64,
                        limit: u64::from(u32::MAX) * SurvivorRecord::SIZE as u64,
                    }
                })?;
            }
            tier_capacity[t] = offset;
        }

        Ok(Self {
            archetype_count,
            segments,
            tier_capacity,
        })
    }

    /// Number of archetypes.
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.archetype_count
    }

    /// Number of (tier, archetype) segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Flat segment index, `None` for `Culled` or unknown archetypes.
    #[inline]
    #[must_use]
    pub fn segment_index(&self, tier: LodTier, archetype: ArchetypeId) -> Option<usize> {
        let t = tier.drawn_index()?;
        let a = archetype.index();
        (a < self.archetype_count).then_some(t * self.archetype_count + a)
    }

    /// Placement of a segment.
    #[must_use]
    pub fn segment(&self, tier: LodTier, archetype: ArchetypeId) -> Option<Segment> {
        self.segment_index(tier, archetype).map(|i| self.segments[i])
    }

    /// Total records of a tier.
    #[must_use]
    pub fn tier_capacity(&self, tier: LodTier) -> u32 {
        tier.drawn_index().map_or(0, |t| self.tier_capacity[t])
    }

    /// Bytes of one tier array.
    #[must_use]
    pub fn tier_bytes(&self, tier: LodTier) -> u64 {
        u64::from(self.tier_capacity(tier)) * SurvivorRecord::SIZE as u64
    }

    /// Rejects layouts whose arrays exceed the device's storage binding size.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::ExceedsDeviceLimit`] for the first tier that
    /// does not fit.
    pub fn check_device_limits(&self, limits: &wgpu::Limits) -> Result<(), ResourceError> {
        let limit = u64::from(limits.max_storage_buffer_binding_size);
        for tier in LodTier::DRAWN {
            let bytes = self.tier_bytes(tier);
            if bytes > limit {
                return Err(ResourceError::ExceedsDeviceLimit { tier, bytes, limit });
            }
        }
        Ok(())
    }
}

/// One buffer set: survivor arrays, counters and the frame it was written for.
pub struct SurvivorBuffers {
    layout: Arc<SegmentLayout>,
    /// One array per drawn tier.
    records: [Box<[SurvivorRecord]>; 2],
    /// One counter per segment.
    counters: Box<[AtomicU32]>,
    /// Frame number of the last pass that wrote this set.
    frame: u64,
}

impl SurvivorBuffers {
    /// Allocates a zeroed buffer set.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Allocation`] if the host cannot provide the
    /// memory. Allocation is never retried.
    pub fn new(layout: Arc<SegmentLayout>) -> Result<Self, ResourceError> {
        let records = [
            allocate_records(layout.tier_capacity(LodTier::Impostor))?,
            allocate_records(layout.tier_capacity(LodTier::FullDetail))?,
        ];
        let counters = (0..layout.segment_count())
            .map(|_| AtomicU32::new(0))
            .collect();
        Ok(Self {
            layout,
            records,
            counters,
            frame: 0,
        })
    }

    /// Zeroes every counter and stamps the set with the frame about to write it.
    pub fn reset(&mut self, frame: u64) {
        for counter in self.counters.iter_mut() {
            *counter.get_mut() = 0;
        }
        self.frame = frame;
    }

    /// Frame this set was last written for.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Segment layout.
    #[must_use]
    pub fn layout(&self) -> &SegmentLayout {
        &self.layout
    }

    /// Returns a writer for the current pass.
    ///
    /// The mutable borrow guarantees no reader observes the set while the
    /// pass runs.
    #[must_use]
    pub fn writer(&mut self) -> SurvivorWriter<'_> {
        let [impostor, full] = &mut self.records;
        SurvivorWriter {
            base: [impostor.as_mut_ptr(), full.as_mut_ptr()],
            layout: &self.layout,
            counters: &self.counters,
            frame_tag: self.frame as u32,
            _marker: PhantomData,
        }
    }

    /// Reservations made for a segment, including dropped overflow.
    #[must_use]
    pub fn raw_count(&self, tier: LodTier, archetype: ArchetypeId) -> u32 {
        self.layout
            .segment_index(tier, archetype)
            .map_or(0, |i| self.counters[i].load(Ordering::Acquire))
    }

    /// Records actually stored in a segment (raw count clamped to capacity).
    #[must_use]
    pub fn count(&self, tier: LodTier, archetype: ArchetypeId) -> u32 {
        self.layout
            .segment(tier, archetype)
            .map_or(0, |s| self.raw_count(tier, archetype).min(s.capacity))
    }

    /// Records stored in a segment.
    #[must_use]
    pub fn records(&self, tier: LodTier, archetype: ArchetypeId) -> &[SurvivorRecord] {
        match (tier.drawn_index(), self.layout.segment(tier, archetype)) {
            (Some(t), Some(segment)) => {
                let start = segment.offset as usize;
                let len = self.count(tier, archetype) as usize;
                &self.records[t][start..start + len]
            }
            _ => &[],
        }
    }

    /// Stored records of a tier, all archetypes.
    pub fn tier_records(&self, tier: LodTier) -> impl Iterator<Item = &SurvivorRecord> + '_ {
        (0..self.layout.archetype_count()).flat_map(move |a| {
            // Archetype count is bounded by u16 at config validation.
            self.records(tier, ArchetypeId(a as u16)).iter()
        })
    }

    /// Stored records of a tier, summed over archetypes.
    #[must_use]
    pub fn tier_count(&self, tier: LodTier) -> u64 {
        (0..self.layout.archetype_count())
            .map(|a| u64::from(self.count(tier, ArchetypeId(a as u16))))
            .sum()
    }

    /// Reservations beyond capacity, summed over all segments.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        let mut dropped = 0u64;
        for tier in LodTier::DRAWN {
            for a in 0..self.layout.archetype_count() {
                let archetype = ArchetypeId(a as u16);
                dropped += u64::from(self.raw_count(tier, archetype) - self.count(tier, archetype));
            }
        }
        dropped
    }

    /// Whole tier array as bytes for GPU upload (unused slots included).
    #[must_use]
    pub fn tier_bytes(&self, tier: LodTier) -> &[u8] {
        tier.drawn_index()
            .map_or(&[][..], |t| bytemuck::cast_slice(&self.records[t]))
    }

    /// Descriptor for the GPU buffer mirroring a tier array.
    #[must_use]
    pub fn buffer_descriptor(&self, tier: LodTier) -> wgpu::BufferDescriptor<'static> {
        wgpu::BufferDescriptor {
            label: Some(match tier {
                LodTier::FullDetail => "sylvan.survivors.full_detail",
                _ => "sylvan.survivors.impostor",
            }),
            size: self.layout.tier_bytes(tier),
            usage: SURVIVOR_BUFFER_USAGE,
            mapped_at_creation: false,
        }
    }
}

fn allocate_records(capacity: u32) -> Result<Box<[SurvivorRecord]>, ResourceError> {
    let len = capacity as usize;
    let mut records = Vec::new();
    records
        .try_reserve_exact(len)
        .map_err(|source| ResourceError::Allocation {
            what: "survivor records",
            bytes: len.saturating_mul(SurvivorRecord::SIZE),
            source,
        })?;
    records.resize(len, SurvivorRecord::default());
    Ok(records.into_boxed_slice())
}

/// Append-only access to a buffer set, shared by every worker of a pass.
pub struct SurvivorWriter<'a> {
    base: [*mut SurvivorRecord; 2],
    layout: &'a SegmentLayout,
    counters: &'a [AtomicU32],
    frame_tag: u32,
    _marker: PhantomData<&'a mut [SurvivorRecord]>,
}

// SAFETY: the writer only hands out disjoint slots (one fetch_add per write)
// and borrows the set mutably for 'a, so no reader can alias it.
unsafe impl Send for SurvivorWriter<'_> {}
// SAFETY: see above; concurrent `push` calls never touch the same slot.
unsafe impl Sync for SurvivorWriter<'_> {}

impl SurvivorWriter<'_> {
    /// Frame tag stamped on every record.
    #[inline]
    #[must_use]
    pub fn frame_tag(&self) -> u32 {
        self.frame_tag
    }

    /// Reserves a slot in the (tier, archetype) segment and writes the record,
    /// stamped with this pass's frame tag.
    ///
    /// Returns `false` if the record was dropped because the segment is full
    /// (or the tier is `Culled`). The counter is incremented either way.
    #[inline]
    pub fn push(&self, tier: LodTier, archetype: ArchetypeId, record: SurvivorRecord) -> bool {
        let (Some(t), Some(index)) = (tier.drawn_index(), self.layout.segment_index(tier, archetype))
        else {
            return false;
        };
        let slot = self.counters[index].fetch_add(1, Ordering::Relaxed);
        let segment = self.layout.segments[index];
        if slot >= segment.capacity {
            return false;
        }
        let record = SurvivorRecord {
            frame_tag: self.frame_tag,
            ..record
        };
        // SAFETY: offset + slot < tier capacity, and `slot` was returned by
        // exactly one fetch_add in this pass, so no other thread writes it.
        unsafe {
            self.base[t]
                .add((segment.offset + slot) as usize)
                .write(record);
        }
        true
    }
}

/// The double-buffered output store.
pub type OutputStore = Arc<DoubleBuffered<SurvivorBuffers>>;

/// Allocates both buffer sets.
///
/// # Errors
///
/// Returns [`ResourceError::Allocation`] if either set cannot be allocated.
pub fn create_output_store(layout: Arc<SegmentLayout>) -> Result<OutputStore, ResourceError> {
    let a = SurvivorBuffers::new(Arc::clone(&layout))?;
    let b = SurvivorBuffers::new(layout)?;
    Ok(DoubleBuffered::new(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArchetypeDesc, ArchetypeKind};
    use rayon::prelude::*;

    fn two_archetypes() -> PipelineConfig {
        PipelineConfig {
            archetypes: vec![
                ArchetypeDesc::preset("grass", ArchetypeKind::GrassBlade).with_capacities(4, 8),
                ArchetypeDesc::preset("oak", ArchetypeKind::Tree).with_capacities(2, 3),
            ],
            ..PipelineConfig::default()
        }
    }

    fn record(tag: u32) -> SurvivorRecord {
        SurvivorRecord {
            frame_tag: tag,
            ..SurvivorRecord::default()
        }
    }

    #[test]
    fn test_segment_layout() {
        let layout = SegmentLayout::from_config(&two_archetypes()).unwrap();
        assert_eq!(layout.segment_count(), 4);
        assert_eq!(
            layout.segment(LodTier::Impostor, ArchetypeId(1)),
            Some(Segment {
                offset: 8,
                capacity: 3
            })
        );
        assert_eq!(
            layout.segment(LodTier::FullDetail, ArchetypeId(1)),
            Some(Segment {
                offset: 4,
                capacity: 2
            })
        );
        assert_eq!(layout.tier_capacity(LodTier::Impostor), 11);
        assert_eq!(layout.segment(LodTier::Culled, ArchetypeId(0)), None);
        assert_eq!(layout.segment(LodTier::Impostor, ArchetypeId(2)), None);
    }

    #[test]
    fn test_overflow_truncates() {
        let layout = Arc::new(SegmentLayout::from_config(&two_archetypes()).unwrap());
        let mut buffers = SurvivorBuffers::new(layout).unwrap();
        buffers.reset(1);

        let writer = buffers.writer();
        let written = (0..50)
            .into_par_iter()
            .filter(|_| writer.push(LodTier::FullDetail, ArchetypeId(0), record(1)))
            .count();
        assert_eq!(written, 4);

        assert_eq!(buffers.raw_count(LodTier::FullDetail, ArchetypeId(0)), 50);
        assert_eq!(buffers.count(LodTier::FullDetail, ArchetypeId(0)), 4);
        assert_eq!(buffers.records(LodTier::FullDetail, ArchetypeId(0)).len(), 4);
        // Neighbouring segment untouched.
        assert_eq!(buffers.count(LodTier::FullDetail, ArchetypeId(1)), 0);
        assert_eq!(buffers.dropped(), 46);
    }

    #[test]
    fn test_reset_clears_counters() {
        let layout = Arc::new(SegmentLayout::from_config(&two_archetypes()).unwrap());
        let mut buffers = SurvivorBuffers::new(layout).unwrap();
        buffers.reset(3);
        assert!(buffers.writer().push(LodTier::Impostor, ArchetypeId(1), record(3)));
        assert_eq!(buffers.tier_count(LodTier::Impostor), 1);
        assert_eq!(buffers.records(LodTier::Impostor, ArchetypeId(1))[0].frame_tag, 3);

        buffers.reset(4);
        assert_eq!(buffers.tier_count(LodTier::Impostor), 0);
        assert_eq!(buffers.frame(), 4);
        assert!(!buffers.writer().push(LodTier::Culled, ArchetypeId(0), record(4)));
    }

    #[test]
    fn test_device_limits() {
        let layout = SegmentLayout::from_config(&PipelineConfig::default()).unwrap();
        let tiny = wgpu::Limits {
            max_storage_buffer_binding_size: 1024,
            ..wgpu::Limits::default()
        };
        assert!(matches!(
            layout.check_device_limits(&tiny),
            Err(ResourceError::ExceedsDeviceLimit { .. })
        ));
        let roomy = wgpu::Limits {
            max_storage_buffer_binding_size: u32::MAX,
            ..wgpu::Limits::default()
        };
        assert!(layout.check_device_limits(&roomy).is_ok());
    }
}
