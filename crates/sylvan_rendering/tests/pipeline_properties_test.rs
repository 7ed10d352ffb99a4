//! # Pipeline Property Tests
//!
//! Invariants that must hold for any camera and any instance set:
//! cluster gating, store and cluster consistency across churn, buffer-set
//! alternation, LOD hysteresis through updates, forced impostors,
//! degraded (out-of-grid) culling and stable density thinning.

use glam::{Vec2, Vec3};
use std::collections::HashSet;
use sylvan_core::{ArchetypeId, Instance};
use sylvan_rendering::{
    ArchetypeDesc, ArchetypeKind, Camera, FrameInputs, FrameOrchestrator, GridConfig, LodConfig,
    LodTier, PipelineConfig, Scatter, WindSample,
};

fn config(full: u32, impostor: u32) -> PipelineConfig {
    PipelineConfig {
        archetypes: vec![
            ArchetypeDesc::preset("grass", ArchetypeKind::GrassBlade).with_capacities(full, impostor),
            ArchetypeDesc::preset("oak", ArchetypeKind::Tree).with_capacities(full, impostor),
        ],
        ..PipelineConfig::default()
    }
}

fn camera_towards(direction: Vec3) -> Camera {
    let eye = Vec3::new(0.0, 2.0, 0.0);
    Camera::look_at(
        eye,
        eye + direction,
        Vec3::Y,
        70f32.to_radians(),
        16.0 / 9.0,
        0.1,
        1000.0,
    )
    .unwrap()
}

/// Order-independent key for a survivor.
fn key(position: Vec3) -> [u32; 3] {
    position.to_array().map(f32::to_bits)
}

#[test]
fn test_invisible_clusters_never_survive() {
    let mut pipeline = FrameOrchestrator::new(config(65_536, 65_536)).unwrap();
    Scatter::square(500.0)
        .with_weights(vec![4.0, 1.0])
        .fill(&pipeline.writer(), 11, 100_000)
        .unwrap();

    for direction in [Vec3::Z, Vec3::X, Vec3::new(-1.0, -0.3, -1.0)] {
        let packet = pipeline
            .run_frame(&FrameInputs::new(camera_towards(direction)))
            .unwrap();
        assert!(packet.stats.total_survivors() > 0);

        let visibility = pipeline.cluster_pass().visibility();
        for tier in LodTier::DRAWN {
            for record in packet.records(tier) {
                let cell = pipeline.clusters().cell_of(record.position()).unwrap();
                assert!(visibility[cell.index()].visible, "survivor in hidden cluster {cell:?}");
            }
        }
    }
}

#[test]
fn test_add_remove_round_trip_keeps_clusters_consistent() {
    let mut pipeline = FrameOrchestrator::new(config(1024, 1024)).unwrap();
    let writer = pipeline.writer();
    let handles = Scatter::square(900.0).fill(&writer, 5, 1_000).unwrap();
    // Removals queued in the same batch as their adds.
    for handle in handles.iter().step_by(10) {
        writer.remove(*handle).unwrap();
    }
    let packet = pipeline
        .run_frame(&FrameInputs::new(camera_towards(Vec3::Z)))
        .unwrap();
    assert_eq!(packet.stats.applied.added, 1_000);
    assert_eq!(packet.stats.applied.removed, 100);
    drop(packet);

    // Removals of applied instances.
    for handle in handles.iter().skip(1).step_by(5) {
        writer.remove(*handle).unwrap();
    }
    let packet = pipeline
        .run_frame(&FrameInputs::new(camera_towards(Vec3::Z)))
        .unwrap();
    assert_eq!(packet.stats.applied.removed, 200);
    drop(packet);

    let store = pipeline.store();
    let clusters = pipeline.clusters();
    assert_eq!(store.count(), 700);

    let members: usize = clusters.clusters().iter().map(|c| c.len()).sum();
    assert_eq!(members + clusters.unclustered_count(), 700);

    for (index, live) in store.live().iter().enumerate() {
        let owner = clusters.cluster_of(index as u32);
        if *live {
            let instance = &store.instances()[index];
            assert_eq!(owner, clusters.cell_of(instance.position));
            let cluster = &clusters.clusters()[owner.unwrap().index()];
            assert!(cluster.members().contains(&(index as u32)));
        } else {
            assert_eq!(owner, None);
        }
    }
}

#[test]
fn test_update_moves_instance_between_clusters() {
    let mut pipeline = FrameOrchestrator::new(config(64, 64)).unwrap();
    let writer = pipeline.writer();
    let handle = writer
        .add(Instance::new(Vec3::new(5.0, 0.0, 20.0), ArchetypeId(0)))
        .unwrap();
    drop(pipeline.run_frame(&FrameInputs::new(camera_towards(Vec3::Z))).unwrap());
    let before = pipeline.clusters().cluster_of(handle.index()).unwrap();

    writer
        .update(handle, Instance::new(Vec3::new(5.0, 0.0, 300.0), ArchetypeId(0)))
        .unwrap();
    let packet = pipeline
        .run_frame(&FrameInputs::new(camera_towards(Vec3::Z)))
        .unwrap();
    let after = pipeline.clusters().cluster_of(handle.index()).unwrap();

    assert_ne!(before, after);
    assert!(pipeline.clusters().clusters()[before.index()].is_empty());
    assert_eq!(packet.stats.applied.updated, 1);
    assert_eq!(pipeline.store().count(), 1);
}

#[test]
fn test_frame_tags_follow_buffer_sets() {
    let mut pipeline = FrameOrchestrator::new(config(4096, 4096)).unwrap();
    Scatter::square(200.0)
        .fill(&pipeline.writer(), 3, 5_000)
        .unwrap();

    let mut sets = Vec::new();
    for frame in 1..=6u64 {
        let packet = pipeline
            .run_frame(&FrameInputs::new(camera_towards(Vec3::Z)))
            .unwrap();
        assert_eq!(packet.frame, frame);
        assert_eq!(packet.buffers.frame(), frame);
        assert!(packet.stats.total_survivors() > 0);
        for tier in LodTier::DRAWN {
            assert!(packet.records(tier).all(|r| r.frame_tag == frame as u32));
        }
        sets.push(packet.set);
    }
    assert!(sets.windows(2).all(|w| w[0] != w[1]));
}

#[test]
fn test_oscillation_around_lod_end_changes_tier_once() {
    let mut pipeline = FrameOrchestrator::new(config(16, 16)).unwrap();
    let lod_end = pipeline.config().lod.lod_end;
    let writer = pipeline.writer();
    let at = |z: f32| Instance::new(Vec3::new(0.0, 0.0, z), ArchetypeId(0));
    // Starts well inside the band so the first tier is FullDetail.
    let handle = writer.add(at(pipeline.config().lod.lod_start - 5.0)).unwrap();

    let mut tiers = Vec::new();
    for frame in 0..60 {
        if frame > 0 {
            let z = if frame % 2 == 0 { lod_end - 2.0 } else { lod_end + 2.0 };
            writer.update(handle, at(z)).unwrap();
        }
        let packet = pipeline
            .run_frame(&FrameInputs::new(camera_towards(Vec3::Z)))
            .unwrap();
        let tier = LodTier::DRAWN
            .into_iter()
            .find(|&tier| packet.records(tier).next().is_some())
            .expect("instance stays in view");
        assert_eq!(pipeline.cull_pass().tier_of(handle.index()), tier);
        tiers.push(tier);
    }

    assert_eq!(tiers[0], LodTier::FullDetail);
    assert_eq!(*tiers.last().unwrap(), LodTier::Impostor);
    let changes = tiers.windows(2).filter(|w| w[0] != w[1]).count();
    assert_eq!(changes, 1, "tiers: {tiers:?}");
}

#[test]
fn test_distant_clusters_forced_to_impostor() {
    let mut config = config(1024, 1024);
    config.lod = LodConfig {
        cluster_cull_distance: 800.0,
        cluster_impostor_distance: 150.0,
        ..LodConfig::default()
    };
    let mut pipeline = FrameOrchestrator::new(config).unwrap();
    let writer = pipeline.writer();
    // Beyond the per-instance cull distance (200), inside the cluster cull distance.
    for i in 0..100 {
        let x = (i % 10) as f32 - 5.0;
        let z = 400.0 + (i / 10) as f32;
        writer
            .add(Instance::new(Vec3::new(x, 0.0, z), ArchetypeId(1)))
            .unwrap();
    }

    let packet = pipeline
        .run_frame(&FrameInputs::new(camera_towards(Vec3::Z)))
        .unwrap();
    let stats = packet.stats;
    assert!(stats.clusters.forced_impostor > 0);
    assert_eq!(stats.instances.forced_impostor, 100);
    assert_eq!(stats.survivors_in(LodTier::Impostor), 100);
    assert_eq!(stats.survivors_in(LodTier::FullDetail), 0);
    assert!(packet.records(LodTier::Impostor).all(|r| r.blend == 1.0));
}

#[test]
fn test_out_of_grid_instances_culled_individually() {
    let mut config = config(256, 256);
    config.grid = GridConfig {
        origin: [-64.0, -64.0],
        cell_size: 32.0,
        dims: [4, 4],
    };
    let mut pipeline = FrameOrchestrator::new(config).unwrap();
    let writer = pipeline.writer();
    for i in 0..20 {
        let x = i as f32 - 10.0;
        // In front of the camera, off the grid.
        writer
            .add(Instance::new(Vec3::new(x, 0.0, 100.0), ArchetypeId(0)))
            .unwrap();
        // Behind the camera, off the grid.
        writer
            .add(Instance::new(Vec3::new(x, 0.0, -100.0), ArchetypeId(0)))
            .unwrap();
    }

    let packet = pipeline
        .run_frame(&FrameInputs::new(camera_towards(Vec3::Z)))
        .unwrap();
    let stats = packet.stats;
    assert_eq!(pipeline.clusters().unclustered_count(), 40);
    assert_eq!(stats.instances.unclustered, 40);
    assert_eq!(stats.total_survivors(), 20);
    assert!(packet.records(LodTier::Impostor).all(|r| r.position().z > 0.0));
}

#[test]
fn test_density_thinning_is_stable_across_frames() {
    let mut pipeline = FrameOrchestrator::new(config(8192, 8192)).unwrap();
    Scatter::square(60.0)
        .fill(&pipeline.writer(), 9, 20_000)
        .unwrap();
    let camera = camera_towards(Vec3::Z);

    let survivors = |pipeline: &mut FrameOrchestrator, density: f32| {
        let packet = pipeline
            .run_frame(&FrameInputs::new(camera).with_density(density))
            .unwrap();
        LodTier::DRAWN
            .into_iter()
            .flat_map(|tier| packet.records(tier).map(|r| key(r.position())).collect::<Vec<_>>())
            .collect::<HashSet<_>>()
    };

    let all = survivors(&mut pipeline, 1.0);
    let half = survivors(&mut pipeline, 0.5);
    let half_again = survivors(&mut pipeline, 0.5);
    let none = survivors(&mut pipeline, 0.0);

    assert_eq!(half, half_again);
    assert!(half.is_subset(&all));
    let ratio = half.len() as f64 / all.len() as f64;
    assert!((0.4..0.6).contains(&ratio), "thinning ratio {ratio}");
    assert!(none.is_empty());
}

#[test]
fn test_wind_pads_culling_bounds() {
    let mut config = config(64, 64);
    config.sway_padding = 1.0;
    let mut pipeline = FrameOrchestrator::new(config).unwrap();
    // Just outside the right edge of a 90 degree frustum at z = 20.
    pipeline
        .writer()
        .add(Instance::new(Vec3::new(-21.0, 2.0, 20.0), ArchetypeId(0)))
        .unwrap();
    let camera = Camera::look_at(
        Vec3::new(0.0, 2.0, 0.0),
        Vec3::new(0.0, 2.0, 1.0),
        Vec3::Y,
        90f32.to_radians(),
        1.0,
        0.1,
        500.0,
    )
    .unwrap();

    let calm = pipeline.run_frame(&FrameInputs::new(camera)).unwrap();
    assert_eq!(calm.stats.total_survivors(), 0);
    drop(calm);

    let windy = FrameInputs::new(camera).with_wind(WindSample {
        direction: Vec2::X,
        strength: 0.8,
        gust: 0.4,
    });
    let packet = pipeline.run_frame(&windy).unwrap();
    assert_eq!(packet.stats.total_survivors(), 1);
    assert_eq!(packet.wind.dir_strength_gust, [1.0, 0.0, 0.8, 0.4]);
}
