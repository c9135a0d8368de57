//! CPU/GPU pacing through the render context and the headless backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cadence_core::BackendKind;
use cadence_gpu::{
    create_backend, GpuFence, GpuTimeline, GraphicsConfig, HeadlessDevice, QueueType,
    RenderContext, RenderContextState, SurfaceDesc,
};

fn config(timeline: GpuTimeline, frames: usize) -> GraphicsConfig {
    GraphicsConfig::default()
        .with_frames_in_flight(frames)
        .with_headless_timeline(timeline)
}

/// Run `frames` empty frames and return the frame indices that stalled.
fn stalled_frames(timeline: GpuTimeline, frames_in_flight: usize, frames: u64) -> Vec<u64> {
    let mut gpu = create_backend(
        BackendKind::Headless,
        &config(timeline, frames_in_flight),
        None,
    )
    .unwrap();
    gpu.create_surface(&SurfaceDesc::offscreen(64, 64)).unwrap();

    let mut stalled = Vec::new();
    let mut last = 0;
    for frame in 0..frames {
        gpu.begin_frame().unwrap();
        gpu.end_frame().unwrap();
        let stalls = gpu.frame_stats().stalls;
        if stalls > last {
            stalled.push(frame);
            last = stalls;
        }
    }
    stalled
}

#[test]
fn ready_gpu_never_stalls() {
    assert!(stalled_frames(GpuTimeline::Immediate, 3, 10).is_empty());
}

#[test]
fn gpu_within_the_ring_never_stalls() {
    assert!(stalled_frames(GpuTimeline::Latency(2), 3, 10).is_empty());
}

#[test]
fn lagging_gpu_stalls_once_the_ring_wraps() {
    let expected: Vec<u64> = (3..10).collect();
    assert_eq!(stalled_frames(GpuTimeline::Latency(3), 3, 10), expected);
    assert_eq!(stalled_frames(GpuTimeline::Latency(8), 3, 10), expected);
}

#[test]
fn double_buffering_stalls_from_the_second_frame_pair() {
    let expected: Vec<u64> = (2..6).collect();
    assert_eq!(stalled_frames(GpuTimeline::Latency(2), 2, 6), expected);
}

#[test]
fn begin_recording_blocks_until_the_slot_fence_completes() {
    let device = Arc::new(HeadlessDevice::new(GpuTimeline::Manual));
    let mut context = RenderContext::new(device, 2, QueueType::Graphics).unwrap();

    for slot in 0..2 {
        context.begin_recording(slot).unwrap();
        context.submit(&()).unwrap();
    }
    assert_eq!(context.submitted_value(), 2);
    assert!(!context.is_slot_ready(0).unwrap());

    let fence = context.fence().clone();
    let released = Arc::new(AtomicBool::new(false));
    let signaller = {
        let released = Arc::clone(&released);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            released.store(true, Ordering::SeqCst);
            fence.complete(1);
        })
    };

    context.begin_recording(0).unwrap();
    assert!(released.load(Ordering::SeqCst));
    assert_eq!(context.stall_count(), 1);
    assert_eq!(context.completed_value().unwrap(), 1);
    assert_eq!(context.state(), RenderContextState::Recording { slot: 0 });

    signaller.join().unwrap();
    context.abandon().unwrap();
    context.fence().complete_all();
    context.flush().unwrap();
    assert_eq!(context.fence().completed_value().unwrap(), 2);
}
