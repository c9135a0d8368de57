//! Surface resize, mesh release and shutdown through the graphics facade.

use cadence_core::{Classify, Severity};
use cadence_gpu::{
    GpuError, GpuTimeline, GraphicsBackend, GraphicsConfig, HeadlessBackend, MeshData,
    RenderData, ResizeOutcome, SurfaceDesc,
};
use glam::Mat4;

fn backend(timeline: GpuTimeline) -> HeadlessBackend {
    let config = GraphicsConfig::default()
        .with_frames_in_flight(2)
        .with_headless_timeline(timeline);
    HeadlessBackend::new(&config).unwrap()
}

#[test]
fn resize_to_current_size_is_a_no_op() {
    let mut gpu = backend(GpuTimeline::Immediate);
    let probe = gpu.probe();
    let surface = gpu.create_surface(&SurfaceDesc::offscreen(800, 600)).unwrap();
    let before = gpu.surface_info(surface).unwrap();

    let outcome = gpu.resize_surface(surface, 800, 600).unwrap();

    assert_eq!(outcome, ResizeOutcome::Unchanged);
    assert_eq!(gpu.surface_info(surface).unwrap(), before);
    assert_eq!(probe.swapchain_rebuilds(), 0);
}

#[test]
fn zero_extent_suspends_and_keeps_buffers() {
    let mut gpu = backend(GpuTimeline::Immediate);
    let probe = gpu.probe();
    let surface = gpu.create_surface(&SurfaceDesc::offscreen(800, 600)).unwrap();

    let err = gpu.resize_surface(surface, 0, 600).unwrap_err();
    assert!(matches!(err, GpuError::ZeroExtent { width: 0, height: 600 }));
    assert_eq!(err.severity(), Severity::Ignorable);

    let info = gpu.surface_info(surface).unwrap();
    assert!(info.suspended);
    assert_eq!((info.width, info.height, info.buffer_count), (800, 600, 2));
    assert_eq!(probe.swapchain_rebuilds(), 0);

    // Suspended surfaces are skipped rather than failing the frame.
    gpu.begin_frame().unwrap();
    let stats = gpu.render(&[surface], &[], &Mat4::IDENTITY).unwrap();
    assert_eq!(stats.draws, 0);
    gpu.end_frame().unwrap();
    assert_eq!(probe.presents(), 0);

    let outcome = gpu.resize_surface(surface, 1024, 768).unwrap();
    assert_eq!(
        outcome,
        ResizeOutcome::Resized {
            width: 1024,
            height: 768
        }
    );
    assert!(!gpu.surface_info(surface).unwrap().suspended);
    gpu.begin_frame().unwrap();
    gpu.end_frame().unwrap();
    assert_eq!(probe.presents(), 1);
}

#[test]
fn zero_size_creation_is_clamped() {
    let mut gpu = backend(GpuTimeline::Immediate);
    let surface = gpu.create_surface(&SurfaceDesc::offscreen(0, 0)).unwrap();
    let info = gpu.surface_info(surface).unwrap();
    assert_eq!((info.width, info.height), (1, 1));
    assert!(!info.suspended);
}

#[test]
fn resize_waits_for_the_gpu() {
    let mut gpu = backend(GpuTimeline::Latency(2));
    let surface = gpu.create_surface(&SurfaceDesc::offscreen(320, 200)).unwrap();
    for _ in 0..2 {
        gpu.begin_frame().unwrap();
        gpu.end_frame().unwrap();
    }
    let stats = gpu.frame_stats();
    assert!(stats.completed_value < stats.submitted_value);

    gpu.resize_surface(surface, 640, 400).unwrap();
    let stats = gpu.frame_stats();
    assert_eq!(stats.completed_value, stats.submitted_value);
}

#[test]
fn freed_meshes_wait_for_the_fence() {
    let mut gpu = backend(GpuTimeline::Manual);
    let probe = gpu.probe();
    let fence = gpu.fence();
    let surface = gpu.create_surface(&SurfaceDesc::offscreen(64, 64)).unwrap();
    let mesh = gpu.load_meshes(&[MeshData::cube(1.0)]).unwrap()[0];

    gpu.begin_frame().unwrap();
    let world = Mat4::IDENTITY;
    gpu.render(&[surface], &[RenderData::new(mesh, &world)], &Mat4::IDENTITY)
        .unwrap();
    gpu.end_frame().unwrap();

    gpu.free_mesh(mesh).unwrap();
    assert!(matches!(gpu.mesh_info(mesh), Err(GpuError::MeshNotFound(_))));
    assert_eq!(gpu.frame_stats().pending_releases, 1);

    // The next submission may still reference it.
    gpu.begin_frame().unwrap();
    gpu.end_frame().unwrap();
    assert_eq!(probe.meshes_released(), 0);

    fence.complete(1);
    gpu.begin_frame().unwrap();
    gpu.end_frame().unwrap();
    assert_eq!(probe.meshes_released(), 0);

    fence.complete(2);
    gpu.begin_frame().unwrap();
    assert_eq!(probe.meshes_released(), 1);
    assert_eq!(gpu.frame_stats().pending_releases, 0);
    gpu.end_frame().unwrap();

    fence.complete_all();
    gpu.flush().unwrap();
}

#[test]
fn stale_handles_are_skipped_and_counted() {
    let mut gpu = backend(GpuTimeline::Immediate);
    let surface = gpu.create_surface(&SurfaceDesc::offscreen(64, 64)).unwrap();
    let handles = gpu
        .load_meshes(&[MeshData::cube(1.0), MeshData::cube(2.0)])
        .unwrap();
    gpu.free_mesh(handles[0]).unwrap();

    let world = Mat4::IDENTITY;
    let draws = [
        RenderData::new(handles[0], &world),
        RenderData::new(handles[1], &world),
    ];
    gpu.begin_frame().unwrap();
    let stats = gpu.render(&[surface], &draws, &Mat4::IDENTITY).unwrap();
    gpu.end_frame().unwrap();

    assert_eq!((stats.draws, stats.skipped), (1, 1));
    assert_eq!(gpu.frame_stats().skipped_draws, 1);
}

#[test]
fn flush_then_shutdown_leaves_nothing_outstanding() {
    let mut gpu = backend(GpuTimeline::Latency(1));
    let probe = gpu.probe();
    gpu.create_surface(&SurfaceDesc::offscreen(64, 64)).unwrap();
    let meshes = gpu
        .load_meshes(&[MeshData::cube(1.0), MeshData::cube(0.5)])
        .unwrap();
    gpu.free_mesh(meshes[0]).unwrap();
    for _ in 0..3 {
        gpu.begin_frame().unwrap();
        gpu.end_frame().unwrap();
    }

    gpu.flush().unwrap();
    let stats = gpu.frame_stats();
    assert_eq!(stats.completed_value, stats.submitted_value);
    assert_eq!(stats.pending_releases, 0);

    gpu.shutdown().unwrap();
    gpu.shutdown().unwrap();
    assert!(probe.is_shut_down());
    assert_eq!(probe.meshes_released(), 2);
    assert!(gpu.begin_frame().is_err());
}

#[test]
fn shutdown_mid_frame_abandons_it() {
    let mut gpu = backend(GpuTimeline::Immediate);
    gpu.create_surface(&SurfaceDesc::offscreen(64, 64)).unwrap();
    gpu.begin_frame().unwrap();
    gpu.shutdown().unwrap();
    let stats = gpu.frame_stats();
    assert_eq!(stats.frames_abandoned, 1);
    assert_eq!(stats.frames_submitted, 0);
}
