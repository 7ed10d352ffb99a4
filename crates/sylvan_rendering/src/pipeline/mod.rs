//! Frame orchestration.
//!
//! Sequences the passes once per frame and rotates the buffer sets:
//!
//! ```text
//! apply mutations ─► reset write set ─► cluster pass ─► instance pass
//!        ─► barrier (write handle dropped) ─► publish ─► DrawPacket
//! ```

mod frame;
mod stats;

pub use frame::{DrawPacket, FrameInputs, WindSample, WindUniform};
pub use stats::FrameStats;

use std::sync::Arc;
use std::time::Instant;

use sylvan_core::{Instance, InstanceWriter, SourceStore, StoreObserver};

use crate::config::PipelineConfig;
use crate::culling::{ClusterIndex, ClusterVisibilityPass, CullAndLodPass, CullInputs, LodTier};
use crate::error::{FrameError, RenderResult};
use crate::instancing::{create_output_store, IndirectCommandWriter, OutputStore, SegmentLayout};

/// Keeps the cluster index and the LOD history in step with the store.
struct BoundaryObserver<'a> {
    clusters: &'a mut ClusterIndex,
    cull_pass: &'a mut CullAndLodPass,
}

impl StoreObserver for BoundaryObserver<'_> {
    fn inserted(&mut self, index: u32, instance: &Instance) {
        self.clusters.inserted(index, instance);
        self.cull_pass.reset_slot(index);
    }

    fn updated(&mut self, index: u32, old: &Instance, new: &Instance) {
        // The slot keeps its LOD history across moves.
        self.clusters.updated(index, old, new);
    }

    fn removed(&mut self, index: u32, instance: &Instance) {
        self.clusters.removed(index, instance);
        self.cull_pass.reset_slot(index);
    }
}

/// Runs the culling pipeline once per frame.
///
/// Owns the store, the cluster index, both passes and the output buffer
/// sets. Collaborator threads queue mutations through [`Self::writer`];
/// they take effect at the start of the next [`Self::run_frame`].
pub struct FrameOrchestrator {
    config: PipelineConfig,
    store: SourceStore,
    clusters: ClusterIndex,
    cluster_pass: ClusterVisibilityPass,
    cull_pass: CullAndLodPass,
    output: OutputStore,
    commands: IndirectCommandWriter,
    /// Frames published so far.
    frame: u64,
    /// Dropped count of the previous frame, for overflow logging.
    last_dropped: u64,
}

impl FrameOrchestrator {
    /// Validates the configuration and allocates every fixed resource.
    ///
    /// # Errors
    ///
    /// - [`ConfigError`](crate::ConfigError) for an invalid configuration
    /// - [`ResourceError`](crate::ResourceError) if the output sets cannot be allocated
    pub fn new(config: PipelineConfig) -> RenderResult<Self> {
        config.validate()?;

        let layout = Arc::new(SegmentLayout::from_config(&config)?);
        let output = create_output_store(Arc::clone(&layout))?;
        let commands = IndirectCommandWriter::new(&config, &layout);
        let radii = config.archetypes.iter().map(|a| a.bounding_radius).collect();
        let clusters = ClusterIndex::new(&config.grid, radii);

        tracing::info!(
            grid_x = config.grid.dims[0],
            grid_z = config.grid.dims[1],
            cell_size = config.grid.cell_size,
            archetypes = config.archetypes.len(),
            max_instances = config.max_instances,
            impostor_capacity = layout.tier_capacity(LodTier::Impostor),
            full_detail_capacity = layout.tier_capacity(LodTier::FullDetail),
            draw_commands = commands.command_count(),
            "culling pipeline ready"
        );

        Ok(Self {
            store: SourceStore::new(config.archetype_count(), config.max_instances),
            cull_pass: CullAndLodPass::new(&config),
            cluster_pass: ClusterVisibilityPass::new(),
            clusters,
            output,
            commands,
            frame: 0,
            last_dropped: 0,
            config,
        })
    }

    /// Validated configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Instance store (applied state).
    #[must_use]
    pub fn store(&self) -> &SourceStore {
        &self.store
    }

    /// Returns a writer that queues mutations for the next frame.
    #[must_use]
    pub fn writer(&self) -> InstanceWriter {
        self.store.writer()
    }

    /// Cluster grid.
    #[must_use]
    pub fn clusters(&self) -> &ClusterIndex {
        &self.clusters
    }

    /// Cluster pass, holding the visibility of the last frame.
    #[must_use]
    pub fn cluster_pass(&self) -> &ClusterVisibilityPass {
        &self.cluster_pass
    }

    /// Instance pass, holding the LOD history of the last frame.
    #[must_use]
    pub fn cull_pass(&self) -> &CullAndLodPass {
        &self.cull_pass
    }

    /// Both buffer sets.
    #[must_use]
    pub fn output(&self) -> &OutputStore {
        &self.output
    }

    /// Frames published so far.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Runs one frame and publishes its output.
    ///
    /// Camera, density and wind are read once here and stay fixed for both
    /// passes.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Sync`] if the write set is still held by a
    /// [`DrawPacket`] from two frames ago. Nothing is applied in that case;
    /// queued mutations stay queued.
    pub fn run_frame(&mut self, inputs: &FrameInputs) -> Result<DrawPacket, FrameError> {
        let frame = self.frame + 1;
        let mut set = self.output.write_handle()?;

        let applied = self.store.apply_pending(&mut BoundaryObserver {
            clusters: &mut self.clusters,
            cull_pass: &mut self.cull_pass,
        });

        // NaN would fail every thinning comparison; fall back to the config.
        let density = inputs
            .density
            .filter(|d| d.is_finite())
            .unwrap_or(self.config.density)
            .clamp(0.0, 1.0);
        let padding = self.config.sway_padding * inputs.wind.magnitude();

        let started = Instant::now();
        set.reset(frame);
        let cluster_stats = self
            .cluster_pass
            .run(&self.clusters, &inputs.camera, &self.config.lod, padding);
        let cull_stats = {
            let writer = set.writer();
            self.cull_pass.run(
                &self.store,
                &self.clusters,
                self.cluster_pass.visibility(),
                CullInputs {
                    camera: &inputs.camera,
                    density,
                    padding,
                },
                &writer,
            )
        };
        let cull_time_ms = started.elapsed().as_secs_f32() * 1000.0;

        // Barrier: every reservation and record write of this frame is done.
        drop(set);
        self.output.publish()?;
        self.frame = frame;

        let buffers = self.output.read_handle();
        let commands = self.commands.commands(&buffers);
        let stats = FrameStats {
            frame,
            applied,
            clusters: cluster_stats,
            instances: cull_stats,
            survivors: [
                buffers.tier_count(LodTier::Impostor),
                buffers.tier_count(LodTier::FullDetail),
            ],
            dropped: buffers.dropped(),
            draw_commands: u32::try_from(commands.len()).unwrap_or(u32::MAX),
            cull_time_ms,
        };
        self.log_frame(&stats);

        Ok(DrawPacket {
            frame,
            set: buffers.set(),
            buffers,
            commands,
            wind: inputs.wind.uniform(),
            stats,
        })
    }

    fn log_frame(&mut self, stats: &FrameStats) {
        tracing::debug!(
            frame = stats.frame,
            added = stats.applied.added,
            updated = stats.applied.updated,
            removed = stats.applied.removed,
            clusters_visible = stats.clusters.visible,
            clusters_forced = stats.clusters.forced_impostor,
            clusters_culled = stats.clusters.culled,
            tested = stats.instances.tested,
            unclustered = stats.instances.unclustered,
            impostor = stats.survivors[0],
            full_detail = stats.survivors[1],
            reserved = stats.instances.survivors(),
            dropped = stats.dropped,
            draw_commands = stats.draw_commands,
            cull_time_ms = stats.cull_time_ms,
            "frame culled"
        );

        if stats.dropped != self.last_dropped {
            if stats.dropped > 0 {
                tracing::warn!(
                    frame = stats.frame,
                    dropped = stats.dropped,
                    previous = self.last_dropped,
                    "survivor segments full, output truncated"
                );
            } else {
                tracing::info!(frame = stats.frame, "survivor overflow cleared");
            }
        } else if stats.dropped > 0 {
            tracing::trace!(frame = stats.frame, dropped = stats.dropped, "overflow unchanged");
        }
        self.last_dropped = stats.dropped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArchetypeDesc, ArchetypeKind};
    use crate::culling::Camera;
    use glam::Vec3;
    use sylvan_core::{ArchetypeId, SyncError};

    fn orchestrator() -> FrameOrchestrator {
        let config = PipelineConfig {
            max_instances: 64,
            archetypes: vec![
                ArchetypeDesc::preset("grass", ArchetypeKind::GrassBlade).with_capacities(32, 32)
            ],
            ..PipelineConfig::default()
        };
        FrameOrchestrator::new(config).unwrap()
    }

    fn inputs() -> FrameInputs {
        let camera = Camera::look_at(
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(0.0, 2.0, 10.0),
            Vec3::Y,
            90f32.to_radians(),
            1.0,
            0.1,
            500.0,
        )
        .unwrap();
        FrameInputs::new(camera)
    }

    #[test]
    fn test_mutations_wait_for_frame() {
        let mut pipeline = orchestrator();
        let writer = pipeline.writer();
        writer
            .add(Instance::new(Vec3::new(0.0, 0.0, 10.0), ArchetypeId(0)))
            .unwrap();
        assert_eq!(pipeline.store().count(), 0);

        let packet = pipeline.run_frame(&inputs()).unwrap();
        assert_eq!(pipeline.store().count(), 1);
        assert_eq!(packet.stats.applied.added, 1);
        assert_eq!(packet.stats.survivors_in(LodTier::FullDetail), 1);
        assert_eq!(packet.instance_count(), 1);
    }

    #[test]
    fn test_frames_alternate_sets() {
        let mut pipeline = orchestrator();
        let first = pipeline.run_frame(&inputs()).unwrap();
        let first_set = first.set;
        drop(first);
        let second = pipeline.run_frame(&inputs()).unwrap();
        assert_ne!(second.set, first_set);
        assert_eq!(second.frame, 2);
        assert_eq!(second.buffers.frame(), 2);
    }

    #[test]
    fn test_non_finite_density_uses_config() {
        let mut pipeline = orchestrator();
        let writer = pipeline.writer();
        for i in 0..8 {
            writer
                .add(Instance::new(Vec3::new(i as f32, 0.0, 10.0), ArchetypeId(0)))
                .unwrap();
        }

        let packet = pipeline.run_frame(&inputs().with_density(f32::NAN)).unwrap();
        assert_eq!(packet.stats.instances.thinned, 0);
        assert_eq!(packet.stats.total_survivors(), 8);
        drop(packet);

        let packet = pipeline.run_frame(&inputs().with_density(0.0)).unwrap();
        assert_eq!(packet.stats.total_survivors(), 0);
    }

    #[test]
    fn test_held_packet_blocks_write_two_frames_later() {
        let mut pipeline = orchestrator();
        let held = pipeline.run_frame(&inputs()).unwrap();
        // Frame 2 writes the other set.
        let second = pipeline.run_frame(&inputs()).unwrap();
        drop(second);
        // Frame 3 would overwrite the set `held` still reads.
        let err = pipeline.run_frame(&inputs()).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Sync(SyncError::ReadersActive { .. })
        ));
        assert_eq!(pipeline.frame(), 2);

        drop(held);
        let third = pipeline.run_frame(&inputs()).unwrap();
        assert_eq!(third.frame, 3);
    }
}
