//! Indirect draw commands built from the survivor counters.
//!
//! The only place that branches on archetype geometry. The cull loop never
//! looks at it.

use bytemuck::{Pod, Zeroable};
use sylvan_core::ArchetypeId;

use super::output::{SegmentLayout, SurvivorBuffers};
use crate::config::{Geometry, PipelineConfig};
use crate::culling::LodTier;

/// Buffer usage of the indirect argument buffers on the GPU path.
pub const INDIRECT_BUFFER_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::INDIRECT
    .union(wgpu::BufferUsages::STORAGE)
    .union(wgpu::BufferUsages::COPY_DST);

/// DrawIndirect arguments (non-indexed).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndirectArgs {
    /// Vertices per instance.
    pub vertex_count: u32,
    /// Number of instances to draw (clamped survivor count).
    pub instance_count: u32,
    /// First vertex.
    pub first_vertex: u32,
    /// First instance (segment offset in the survivor array).
    pub first_instance: u32,
}

/// DrawIndexedIndirect arguments.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedIndirectArgs {
    /// Indices per instance.
    pub index_count: u32,
    /// Number of instances to draw (clamped survivor count).
    pub instance_count: u32,
    /// First index.
    pub first_index: u32,
    /// Base vertex.
    pub base_vertex: i32,
    /// First instance (segment offset in the survivor array).
    pub first_instance: u32,
}

/// Arguments of one command, matching the archetype's geometry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawArgs {
    /// `draw_indirect`.
    NonIndexed(DrawIndirectArgs),
    /// `draw_indexed_indirect`.
    Indexed(DrawIndexedIndirectArgs),
}

impl DrawArgs {
    /// Instance count of the command.
    #[must_use]
    pub const fn instance_count(&self) -> u32 {
        match self {
            Self::NonIndexed(args) => args.instance_count,
            Self::Indexed(args) => args.instance_count,
        }
    }

    /// First instance of the command.
    #[must_use]
    pub const fn first_instance(&self) -> u32 {
        match self {
            Self::NonIndexed(args) => args.first_instance,
            Self::Indexed(args) => args.first_instance,
        }
    }

    /// Raw argument bytes as consumed by the indirect buffer.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::NonIndexed(args) => bytemuck::bytes_of(args),
            Self::Indexed(args) => bytemuck::bytes_of(args),
        }
    }
}

/// One draw per (tier, archetype).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCommand {
    /// Tier the survivors belong to.
    pub tier: LodTier,
    /// Archetype drawn.
    pub archetype: ArchetypeId,
    /// Indirect arguments.
    pub args: DrawArgs,
}

/// Turns survivor counters into indirect draw commands.
///
/// Geometry fields are fixed at setup; only `instance_count` changes per frame.
#[derive(Debug, Clone)]
pub struct IndirectCommandWriter {
    /// Static command per (tier, archetype), `instance_count` zero.
    templates: Vec<DrawCommand>,
}

impl IndirectCommandWriter {
    /// Builds the static part of every command.
    #[must_use]
    pub fn new(config: &PipelineConfig, layout: &SegmentLayout) -> Self {
        let mut templates = Vec::with_capacity(layout.segment_count());
        for tier in LodTier::DRAWN {
            for (a, desc) in config.archetypes.iter().enumerate() {
                let archetype = ArchetypeId(a as u16);
                let first_instance = layout.segment(tier, archetype).map_or(0, |s| s.offset);
                let Some(geometry) = desc.geometry(tier) else {
                    continue;
                };
                let args = match *geometry {
                    Geometry::Vertices {
                        vertex_count,
                        first_vertex,
                    } => DrawArgs::NonIndexed(DrawIndirectArgs {
                        vertex_count,
                        instance_count: 0,
                        first_vertex,
                        first_instance,
                    }),
                    Geometry::Indexed {
                        index_count,
                        first_index,
                        base_vertex,
                    } => DrawArgs::Indexed(DrawIndexedIndirectArgs {
                        index_count,
                        instance_count: 0,
                        first_index,
                        base_vertex,
                        first_instance,
                    }),
                };
                templates.push(DrawCommand {
                    tier,
                    archetype,
                    args,
                });
            }
        }
        Self { templates }
    }

    /// Number of commands written per frame.
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.templates.len()
    }

    /// Writes one command per (tier, archetype) into `out`, replacing its
    /// contents. Counts are clamped to segment capacity.
    ///
    /// Call only on a published buffer set.
    pub fn write(&self, buffers: &SurvivorBuffers, out: &mut Vec<DrawCommand>) {
        out.clear();
        out.extend(self.templates.iter().map(|template| {
            let count = buffers.count(template.tier, template.archetype);
            let mut command = *template;
            match &mut command.args {
                DrawArgs::NonIndexed(args) => args.instance_count = count,
                DrawArgs::Indexed(args) => args.instance_count = count,
            }
            command
        }));
    }

    /// Convenience wrapper around [`Self::write`].
    #[must_use]
    pub fn commands(&self, buffers: &SurvivorBuffers) -> Vec<DrawCommand> {
        let mut out = Vec::with_capacity(self.templates.len());
        self.write(buffers, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArchetypeDesc, ArchetypeKind};
    use crate::instancing::SurvivorRecord;
    use std::sync::Arc;

    fn config() -> PipelineConfig {
        PipelineConfig {
            archetypes: vec![
                ArchetypeDesc::preset("grass", ArchetypeKind::GrassBlade).with_capacities(10, 20),
                ArchetypeDesc::preset("oak", ArchetypeKind::Tree).with_capacities(5, 6),
            ],
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_args_sizes() {
        assert_eq!(std::mem::size_of::<DrawIndirectArgs>(), 16);
        assert_eq!(std::mem::size_of::<DrawIndexedIndirectArgs>(), 20);
    }

    #[test]
    fn test_geometry_selects_command_kind() {
        let config = config();
        let layout = SegmentLayout::from_config(&config).unwrap();
        let writer = IndirectCommandWriter::new(&config, &layout);
        let buffers = SurvivorBuffers::new(Arc::new(layout)).unwrap();
        let commands = writer.commands(&buffers);

        assert_eq!(commands.len(), 4);
        let oak_impostor = commands
            .iter()
            .find(|c| c.tier == LodTier::Impostor && c.archetype == ArchetypeId(1))
            .unwrap();
        assert!(matches!(
            oak_impostor.args,
            DrawArgs::Indexed(DrawIndexedIndirectArgs {
                index_count: 6,
                first_instance: 20,
                ..
            })
        ));
        let grass_full = commands
            .iter()
            .find(|c| c.tier == LodTier::FullDetail && c.archetype == ArchetypeId(0))
            .unwrap();
        assert!(matches!(grass_full.args, DrawArgs::NonIndexed(_)));
        assert_eq!(grass_full.args.as_bytes().len(), 16);
    }

    #[test]
    fn test_instance_count_clamped() {
        let config = config();
        let layout = Arc::new(SegmentLayout::from_config(&config).unwrap());
        let writer = IndirectCommandWriter::new(&config, &layout);
        let mut buffers = SurvivorBuffers::new(layout).unwrap();
        buffers.reset(1);
        {
            let out = buffers.writer();
            for _ in 0..9 {
                out.push(LodTier::FullDetail, ArchetypeId(1), SurvivorRecord::default());
            }
        }
        let commands = writer.commands(&buffers);
        let oak_full = commands
            .iter()
            .find(|c| c.tier == LodTier::FullDetail && c.archetype == ArchetypeId(1))
            .unwrap();
        assert_eq!(oak_full.args.instance_count(), 5);
        assert_eq!(oak_full.args.first_instance(), 10);
    }
}
