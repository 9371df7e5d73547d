// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Running the preview pipeline against an offscreen surface

use camera_preview::Config;
use camera_preview::backends::camera::{
    CameraBackendType, Resolution, SessionState, SinkKind, get_backend,
};
use camera_preview::constants::timing;
use camera_preview::gpu::{GpuDevice, HeadlessDevice, WgpuDevice, create_device};
use camera_preview::preview::PreviewPipeline;
use camera_preview::snapshot::SnapshotScheduler;
use camera_preview::storage::{PngSnapshotSink, default_snapshot_dir};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Resolutions shown per camera by `list`
const LISTED_RESOLUTIONS: usize = 3;

/// Options of the `run` command that are not part of [`Config`]
pub struct RunOptions {
    pub surface: Resolution,
    pub frames: Option<u64>,
    pub fps: Option<u32>,
    pub switch_every: Option<u64>,
}

/// List all available cameras
pub fn list_cameras(backend_type: CameraBackendType) -> Result<(), Box<dyn std::error::Error>> {
    let backend = get_backend(backend_type)?;
    let cameras = backend.enumerate_cameras()?;

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras ({}):", backend_type);
    println!();
    for (index, camera) in cameras.iter().enumerate() {
        println!("  [{}] {}", index, camera.name);
        println!("      Id: {}", camera.id);
        println!("      Facing: {}", camera.facing);

        let resolutions = match backend.open(camera) {
            Ok(mut device) => {
                let resolutions = device.output_resolutions(SinkKind::Surface);
                device.close();
                resolutions.unwrap_or_default()
            }
            Err(e) => {
                warn!(camera = %camera.id, error = %e, "Could not open camera for listing");
                Vec::new()
            }
        };

        if !resolutions.is_empty() {
            let mut resolutions = resolutions;
            // Highest first
            resolutions.sort_by_key(|r| std::cmp::Reverse(r.width * r.height));
            let res_strs: Vec<String> = resolutions
                .iter()
                .take(LISTED_RESOLUTIONS)
                .map(|r| r.to_string())
                .collect();
            println!("      Resolutions: {}", res_strs.join(", "));
        }
        println!();
    }

    Ok(())
}

/// Create the drawing device, falling back to the headless one without a GPU
fn create_gpu(surface: Resolution) -> Box<dyn GpuDevice> {
    match pollster::block_on(create_device("camera-preview")) {
        Ok((device, queue, info)) => {
            println!("GPU: {} ({:?})", info.adapter_name, info.backend);
            Box::new(WgpuDevice::new(
                device,
                queue,
                info,
                surface.width,
                surface.height,
            ))
        }
        Err(e) => {
            warn!(error = %e, "No GPU available, using headless device");
            println!("GPU: none (headless)");
            Box::new(HeadlessDevice::new(surface.width, surface.height))
        }
    }
}

/// Run the preview pipeline until Ctrl+C or the frame limit
pub fn run_preview(config: Config, options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    // Runtime for the snapshot timer and blocking writes
    let runtime = tokio::runtime::Runtime::new()?;
    let backend = get_backend(config.backend)?;
    let mut gpu = create_gpu(options.surface);

    let mut preview = PreviewPipeline::new(
        backend,
        Arc::new(config.renderer_config()),
        config.renderer,
        config.lens_facing,
        config.target_resolution,
    );

    if config.snapshots.enabled && config.snapshots.limit > 0 {
        let dir = config
            .snapshots
            .directory
            .clone()
            .unwrap_or_else(default_snapshot_dir);
        let sink = PngSnapshotSink::new(&dir)?;
        println!("Snapshots: up to {} in {}", config.snapshots.limit, dir.display());
        preview = preview.with_snapshots(SnapshotScheduler::new(
            runtime.handle().clone(),
            Arc::new(sink),
            config.snapshots.limit,
            config.snapshots.interval(),
        ));
    }

    println!("Backend: {}", config.backend);
    println!("Renderer: {}", config.renderer);
    println!("Surface: {}", options.surface);

    preview.on_surface_created(gpu.as_mut());
    preview.on_surface_changed(gpu.as_mut(), options.surface.width, options.surface.height);
    preview.start()?;

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = Arc::clone(&stop_flag);
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    println!();
    println!("Previewing... (press Ctrl+C to stop)");

    let fps = options.fps.unwrap_or(timing::DEFAULT_FPS).max(1);
    let tick = Duration::from_secs_f64(1.0 / f64::from(fps));
    let started = Instant::now();
    let mut ticks: u64 = 0;

    while !stop_flag.load(Ordering::SeqCst) {
        let tick_start = Instant::now();

        if let Some(every) = options.switch_every
            && every > 0
            && ticks > 0
            && ticks % every == 0
        {
            let next = preview.active_kind().next();
            info!(renderer = %next, "Cycling renderer");
            preview.switch_renderer(next)?;
        }

        if let Err(e) = preview.on_draw_frame(gpu.as_mut()) {
            warn!(error = %e, "Draw tick failed");
        }
        ticks += 1;

        // A failed session only recovers through a fresh start
        if preview.session().state() == SessionState::Error {
            println!();
            println!("Capture stopped with an error");
            break;
        }
        if let Some(limit) = options.frames
            && preview.stats().frames_drawn >= limit
        {
            break;
        }

        if let Some(remaining) = tick.checked_sub(tick_start.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    preview.release(gpu.as_mut());
    if let Some(snapshots) = preview.snapshots_mut() {
        runtime.block_on(snapshots.flush());
    }

    let stats = preview.stats();
    let elapsed = started.elapsed().as_secs_f64();

    println!();
    println!("Summary");
    println!("=======");
    if let Some(stream) = &stats.stream {
        println!(
            "Camera: {} ({}) at {}",
            stream.camera_name, stream.lens_facing, stream.resolution
        );
    }
    println!("Ticks: {}", stats.ticks);
    println!("Frames drawn: {}", stats.frames_drawn);
    println!("Frames published: {}", stats.frames_published);
    println!("Frames dropped: {}", stats.frames_dropped);
    println!("Renderer switches: {}", stats.renderer_switches);
    println!("Snapshots: {}", stats.snapshots_taken);
    if elapsed > 0.0 {
        println!("Draw rate: {:.1} fps", stats.frames_drawn as f64 / elapsed);
    }
    if let Some(error) = &stats.last_error {
        println!("Capture error: {} ({})", error, error.code());
    }

    Ok(())
}
