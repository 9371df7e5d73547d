// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end preview: synthetic camera, headless device

mod common;

use camera_preview::backends::camera::{LensFacing, Resolution, SessionState, SinkKind};
use camera_preview::errors::{CaptureError, SnapshotError};
use camera_preview::gpu::{GpuDevice, HeadlessDevice};
use camera_preview::preview::PreviewPipeline;
use camera_preview::render::RendererKind;
use camera_preview::snapshot::{DebugFrameSink, SnapshotScheduler};
use common::backend_with;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(5);

fn pipeline(id: &str, kind: RendererKind, gpu: &mut HeadlessDevice) -> PreviewPipeline {
    pipeline_with(backend_with(id, LensFacing::Back), kind, gpu)
}

fn pipeline_with(
    backend: camera_preview::backends::camera::SyntheticBackend,
    kind: RendererKind,
    gpu: &mut HeadlessDevice,
) -> PreviewPipeline {
    let mut preview = PreviewPipeline::new(
        Arc::new(backend),
        Arc::default(),
        kind,
        LensFacing::Back,
        Resolution::new(320, 240),
    );
    preview.on_surface_created(gpu);
    preview.on_surface_changed(gpu, 1080, 1920);
    preview
}

/// Tick until `condition` holds, returning whether it did
fn draw_until(
    preview: &mut PreviewPipeline,
    gpu: &mut HeadlessDevice,
    mut condition: impl FnMut(&PreviewPipeline, bool) -> bool,
) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        let drawn = preview.on_draw_frame(gpu).unwrap();
        if condition(preview, drawn) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn test_every_renderer_draws_camera_frames() {
    for (index, kind) in RendererKind::ALL.into_iter().enumerate() {
        let mut gpu = HeadlessDevice::new(1080, 1920);
        let mut preview = pipeline(&format!("preview-kind-{}", index), kind, &mut gpu);
        preview.start().unwrap();

        assert!(
            draw_until(&mut preview, &mut gpu, |_, drawn| drawn),
            "{} never drew a frame",
            kind
        );
        let stats = preview.stats();
        assert_eq!(stats.stream.unwrap().resolution, Resolution::new(320, 240));
        assert!(stats.frames_published >= 1);
        assert_eq!(gpu.frames_finished(), stats.ticks);

        preview.release(&mut gpu);
        assert!(gpu.resource_counts().is_empty());
        assert_eq!(preview.session().state(), SessionState::Closed);
    }
}

#[test]
fn test_switch_renderer_moves_session_to_new_sink() {
    let mut gpu = HeadlessDevice::new(1080, 1920);
    let mut preview = pipeline("preview-switch", RendererKind::DirectTexture, &mut gpu);
    preview.start().unwrap();
    assert!(draw_until(&mut preview, &mut gpu, |_, drawn| drawn));

    preview.switch_renderer(RendererKind::PlanarColor).unwrap();
    assert_eq!(preview.session().sink_kind(), SinkKind::Planar);
    assert!(draw_until(&mut preview, &mut gpu, |p, drawn| {
        drawn && p.active_kind() == RendererKind::PlanarColor
    }));

    // Offscreen shares the surface sink with the direct renderer
    preview.switch_renderer(RendererKind::OffscreenComposite).unwrap();
    assert_eq!(preview.session().sink_kind(), SinkKind::Surface);
    assert!(draw_until(&mut preview, &mut gpu, |p, drawn| {
        drawn && p.active_kind() == RendererKind::OffscreenComposite
    }));
    preview.switch_renderer(RendererKind::DirectTexture).unwrap();
    assert_eq!(preview.session().sink_kind(), SinkKind::Surface);

    assert_eq!(preview.stats().renderer_switches, 3);
    assert_eq!(preview.session().lens_facing(), LensFacing::Back);
    preview.release(&mut gpu);
}

#[test]
fn test_pause_and_resume() {
    let mut gpu = HeadlessDevice::new(1080, 1920);
    let mut preview = pipeline("preview-pause", RendererKind::PlanarColor, &mut gpu);
    preview.start().unwrap();
    assert!(draw_until(&mut preview, &mut gpu, |_, drawn| drawn));

    preview.pause();
    assert_eq!(preview.session().state(), SessionState::Closed);
    for _ in 0..5 {
        assert!(!preview.on_draw_frame(&mut gpu).unwrap());
    }

    preview.resume().unwrap();
    assert!(draw_until(&mut preview, &mut gpu, |_, drawn| drawn));
    preview.release(&mut gpu);
}

#[test]
fn test_capture_error_does_not_break_drawing() {
    let mut gpu = HeadlessDevice::new(1080, 1920);
    let backend = backend_with("preview-error", LensFacing::Back);
    backend.set_open_error(Some(CaptureError::DeviceDisabled));
    let mut preview = pipeline_with(backend, RendererKind::DirectTexture, &mut gpu);
    preview.start().unwrap();

    assert!(draw_until(&mut preview, &mut gpu, |p, drawn| {
        !drawn && p.stats().last_error == Some(CaptureError::DeviceDisabled)
    }));
    assert_eq!(preview.session().state(), SessionState::Error);
    preview.release(&mut gpu);
}

#[derive(Default)]
struct RecordingSink {
    sizes: Mutex<Vec<(usize, u32, u32)>>,
}

impl DebugFrameSink for RecordingSink {
    fn write_snapshot(
        &self,
        rgba: &[u8],
        width: u32,
        height: u32,
        _sequence: u64,
    ) -> Result<(), SnapshotError> {
        self.sizes.lock().unwrap().push((rgba.len(), width, height));
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_snapshots_capped_and_viewport_sized() {
    let sink = Arc::new(RecordingSink::default());
    let mut gpu = HeadlessDevice::new(1080, 1920);
    let scheduler = SnapshotScheduler::new(
        tokio::runtime::Handle::current(),
        Arc::clone(&sink) as Arc<dyn DebugFrameSink>,
        2,
        Duration::from_millis(20),
    );
    let mut preview =
        pipeline("preview-snapshots", RendererKind::DirectTexture, &mut gpu).with_snapshots(scheduler);
    // Landscape surface: the portrait viewport is pillarboxed
    preview.on_surface_changed(&mut gpu, 1920, 1080);
    preview.start().unwrap();

    assert!(draw_until(&mut preview, &mut gpu, |p, _| {
        p.stats().snapshots_taken >= 2
    }));
    // More ticks never exceed the limit
    for _ in 0..20 {
        preview.on_draw_frame(&mut gpu).unwrap();
        std::thread::sleep(Duration::from_millis(5));
    }

    let viewport = preview.viewport();
    preview.release(&mut gpu);
    preview.snapshots_mut().unwrap().flush().await;

    let sizes = sink.sizes.lock().unwrap();
    assert_eq!(sizes.len(), 2);
    for &(len, width, height) in sizes.iter() {
        assert_eq!((width, height), (viewport.width, viewport.height));
        assert_eq!(len, viewport.rgba_len());
    }
    assert_eq!(viewport.height, 1080);
}
