// SPDX-License-Identifier: GPL-3.0-only

//! Preview pipeline: the display-surface boundary
//!
//! Owns the frame sources, the renderer selector and the capture session
//! feeding them. Every method is called on the drawing context. The capture
//! worker talks back only through the frame sources and the session event
//! channel, which is drained at the start of each tick.

use crate::backends::camera::{
    CameraBackend, CaptureSession, ChannelListener, FrameSink, LensFacing, Resolution,
    SessionEvent, SinkKind, StreamInfo,
};
use crate::errors::{CaptureError, CaptureResult, RenderResult};
use crate::frame::FrameSources;
use crate::gpu::GpuDevice;
use crate::render::{RendererCallbacks, RendererConfig, RendererKind, RendererSelector};
use crate::snapshot::SnapshotScheduler;
use crate::viewport::ViewportRect;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Counters reported by [`PreviewPipeline::stats`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreviewStats {
    /// Draw ticks run
    pub ticks: u64,
    /// Ticks that drew a camera frame
    pub frames_drawn: u64,
    /// Frames published by the capture session, both sinks
    pub frames_published: u64,
    /// Published frames overwritten before the renderer consumed them
    pub frames_dropped: u64,
    pub renderer_switches: u32,
    pub snapshots_taken: u32,
    pub stream: Option<StreamInfo>,
    pub last_error: Option<CaptureError>,
}

pub struct PreviewPipeline {
    backend: Arc<dyn CameraBackend>,
    sources: FrameSources,
    selector: RendererSelector,
    session: CaptureSession,
    listener: Arc<ChannelListener>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    target: Resolution,
    facing: LensFacing,
    /// Capture should be running (started and not paused)
    running: bool,
    snapshots: Option<SnapshotScheduler>,
    stats: PreviewStats,
}

impl PreviewPipeline {
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        config: Arc<RendererConfig>,
        kind: RendererKind,
        facing: LensFacing,
        target: Resolution,
    ) -> Self {
        let sources = FrameSources::new();
        let mut selector = RendererSelector::new(kind, config, sources.clone());
        selector.set_lens_facing(facing);
        let (listener, events) = ChannelListener::channel();
        let session = new_session(&backend, &sources, kind.sink_kind(), &listener, target);

        Self {
            backend,
            sources,
            selector,
            session,
            listener,
            events,
            target,
            facing,
            running: false,
            snapshots: None,
            stats: PreviewStats::default(),
        }
    }

    /// Push periodic snapshots of the drawn preview to `scheduler`
    pub fn with_snapshots(mut self, scheduler: SnapshotScheduler) -> Self {
        self.snapshots = Some(scheduler);
        self
    }

    pub fn set_callbacks(&mut self, callbacks: RendererCallbacks) {
        self.selector.set_callbacks(callbacks);
    }

    pub fn on_surface_created(&mut self, gpu: &mut dyn GpuDevice) {
        self.selector.on_surface_created(gpu);
    }

    pub fn on_surface_changed(&mut self, gpu: &mut dyn GpuDevice, width: u32, height: u32) {
        gpu.resize_surface(width, height);
        self.selector.on_surface_changed(gpu, width, height);
    }

    /// Run one draw tick
    ///
    /// Returns whether a camera frame was drawn. Capture failures never end
    /// up here; they are recorded in [`PreviewStats::last_error`].
    pub fn on_draw_frame(&mut self, gpu: &mut dyn GpuDevice) -> RenderResult<bool> {
        self.drain_events();

        let drawn = self.selector.on_draw_frame(gpu)?;
        gpu.finish_frame()?;

        self.stats.ticks += 1;
        if drawn {
            self.stats.frames_drawn += 1;
            if let Some(snapshots) = self.snapshots.as_mut() {
                snapshots.capture_if_requested(gpu, self.selector.viewport());
            }
        }
        Ok(drawn)
    }

    pub fn set_preview_size(&mut self, width: u32, height: u32) {
        self.selector.set_preview_size(width, height);
    }

    pub fn set_lens_facing(&mut self, facing: LensFacing) {
        self.selector.set_lens_facing(facing);
    }

    pub fn set_camera_active(&mut self, active: bool) {
        self.selector.set_camera_active(active);
    }

    /// Start capturing from the camera with the current lens facing
    pub fn start(&mut self) -> CaptureResult<()> {
        self.selector.set_camera_active(true);
        self.session.start(self.facing)?;
        self.running = true;
        Ok(())
    }

    /// Host went to the background: stop capture, keep GPU resources
    pub fn pause(&mut self) {
        if !self.running {
            return;
        }
        info!("Pausing preview");
        self.selector.set_camera_active(false);
        self.session.stop();
        self.running = false;
    }

    /// Host came back: restart capture with the last facing
    pub fn resume(&mut self) -> CaptureResult<()> {
        if self.running {
            return Ok(());
        }
        info!(facing = %self.facing, "Resuming preview");
        self.start()
    }

    /// Open the camera facing `facing` instead of the current one
    pub fn switch_camera(&mut self, facing: LensFacing) -> CaptureResult<()> {
        if facing == self.facing {
            return Ok(());
        }
        self.facing = facing;
        self.selector.set_lens_facing(facing);
        if self.running {
            self.session.stop();
            self.session.start(facing)?;
        }
        Ok(())
    }

    /// Swap the renderer on the next tick
    ///
    /// If the new kind consumes a different sink the session is restarted
    /// onto it; the lens facing carries over.
    pub fn switch_renderer(&mut self, kind: RendererKind) -> CaptureResult<()> {
        let current = self.selector.pending_switch().unwrap_or(self.selector.active_kind());
        if current == kind {
            return Ok(());
        }
        self.selector.request_switch(kind);
        self.stats.renderer_switches += 1;

        let sink = kind.sink_kind();
        if sink == self.session.sink_kind() {
            return Ok(());
        }

        debug!(from = %self.session.sink_kind(), to = %sink, "Moving capture session to new sink");
        self.session.stop();
        self.session = new_session(&self.backend, &self.sources, sink, &self.listener, self.target);
        if self.running {
            self.session.start(self.facing)?;
        }
        Ok(())
    }

    /// Release GPU resources and stop capture
    pub fn release(&mut self, gpu: &mut dyn GpuDevice) {
        self.session.stop();
        self.running = false;
        // Keep the final stream info and error visible in the stats
        self.drain_events();
        self.selector.release(gpu);
        if let Some(snapshots) = self.snapshots.as_mut() {
            snapshots.cancel();
        }
    }

    pub fn active_kind(&self) -> RendererKind {
        self.selector.active_kind()
    }

    pub fn viewport(&self) -> ViewportRect {
        self.selector.viewport()
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn snapshots_mut(&mut self) -> Option<&mut SnapshotScheduler> {
        self.snapshots.as_mut()
    }

    pub fn stats(&self) -> PreviewStats {
        PreviewStats {
            frames_published: self.sources.surface.frames_published()
                + self.sources.planar.frames_published(),
            frames_dropped: self.sources.surface.frames_dropped()
                + self.sources.planar.frames_dropped(),
            snapshots_taken: self.snapshots.as_ref().map_or(0, SnapshotScheduler::taken),
            ..self.stats.clone()
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                SessionEvent::Configured(info) => {
                    self.selector
                        .set_preview_size(info.resolution.width, info.resolution.height);
                    self.selector.set_lens_facing(info.lens_facing);
                    self.stats.stream = Some(info);
                }
                SessionEvent::Error(error) => {
                    warn!(code = error.code(), %error, "Capture session failed");
                    self.stats.last_error = Some(error);
                }
                SessionEvent::StateChanged(state) => {
                    debug!(%state, "Capture session state changed");
                }
            }
        }
    }
}

impl Drop for PreviewPipeline {
    fn drop(&mut self) {
        self.session.stop();
    }
}

fn new_session(
    backend: &Arc<dyn CameraBackend>,
    sources: &FrameSources,
    sink: SinkKind,
    listener: &Arc<ChannelListener>,
    target: Resolution,
) -> CaptureSession {
    let sink = match sink {
        SinkKind::Surface => FrameSink::Surface(sources.surface.producer()),
        SinkKind::Planar => FrameSink::Planar(Arc::clone(&sources.planar)),
    };
    CaptureSession::new(Arc::clone(backend), sink, Arc::clone(listener) as _)
        .with_target_resolution(target)
}
