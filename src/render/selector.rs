// SPDX-License-Identifier: GPL-3.0-only

//! Renderer selection and hot-swapping
//!
//! The selector owns exactly one renderer. A switch deactivates the camera on
//! the old renderer, releases its GPU resources, builds the new kind and
//! replays everything the host told the old one (surface, preview size, lens
//! facing, callbacks, camera activity).

use super::{
    OffscreenCompositor, PlanarColorRenderer, Renderer, RendererCallbacks, RendererConfig,
    RendererKind, TextureRenderer,
};
use crate::backends::camera::{LensFacing, SinkKind};
use crate::errors::RenderResult;
use crate::frame::FrameSources;
use crate::gpu::GpuDevice;
use crate::viewport::ViewportRect;
use std::sync::Arc;
use tracing::{debug, info};

pub struct RendererSelector {
    config: Arc<RendererConfig>,
    sources: FrameSources,
    active: Box<dyn Renderer>,
    /// Switch requested off the drawing context, applied on the next tick
    requested: Option<RendererKind>,
    surface_created: bool,
    surface_size: Option<(u32, u32)>,
    preview_size: Option<(u32, u32)>,
    lens_facing: LensFacing,
    camera_active: bool,
    callbacks: RendererCallbacks,
}

impl RendererSelector {
    pub fn new(kind: RendererKind, config: Arc<RendererConfig>, sources: FrameSources) -> Self {
        let active = build(kind, &config, &sources);
        Self {
            config,
            sources,
            active,
            requested: None,
            surface_created: false,
            surface_size: None,
            preview_size: None,
            lens_facing: LensFacing::default(),
            camera_active: false,
            callbacks: RendererCallbacks::default(),
        }
    }

    pub fn active_kind(&self) -> RendererKind {
        self.active.kind()
    }

    pub fn sink_kind(&self) -> SinkKind {
        self.active_kind().sink_kind()
    }

    pub fn viewport(&self) -> ViewportRect {
        self.active.viewport()
    }

    pub fn sources(&self) -> &FrameSources {
        &self.sources
    }

    /// Replace the active renderer now. Returns false if `kind` is already active.
    pub fn switch_to(&mut self, gpu: &mut dyn GpuDevice, kind: RendererKind) -> bool {
        self.requested = None;
        let previous = self.active.kind();
        if previous == kind {
            return false;
        }

        info!(from = %previous, to = %kind, "Switching renderer");

        // Halt texture updates and detach before tearing down
        self.active.set_camera_active(false);
        self.active.set_callbacks(&RendererCallbacks::default());
        self.active.release(gpu);

        let mut next = build(kind, &self.config, &self.sources);
        next.set_callbacks(&self.callbacks);
        next.set_lens_facing(self.lens_facing);
        if let Some((width, height)) = self.preview_size {
            next.set_preview_size(width, height);
        }
        if self.surface_created {
            next.on_surface_created(gpu);
        }
        if let Some((width, height)) = self.surface_size {
            next.on_surface_changed(gpu, width, height);
        }
        next.set_camera_active(self.camera_active);

        self.active = next;
        debug!(kind = %kind, counts = ?gpu.resource_counts(), "Renderer switched");
        true
    }

    /// Switch at the start of the next draw tick
    pub fn request_switch(&mut self, kind: RendererKind) {
        self.requested = Some(kind);
    }

    pub fn pending_switch(&self) -> Option<RendererKind> {
        self.requested
    }

    pub fn set_callbacks(&mut self, callbacks: RendererCallbacks) {
        self.active.set_callbacks(&callbacks);
        self.callbacks = callbacks;
    }

    pub fn on_surface_created(&mut self, gpu: &mut dyn GpuDevice) {
        self.surface_created = true;
        self.active.on_surface_created(gpu);
    }

    pub fn on_surface_changed(&mut self, gpu: &mut dyn GpuDevice, width: u32, height: u32) {
        self.surface_size = Some((width, height));
        self.active.on_surface_changed(gpu, width, height);
    }

    /// Apply a pending switch, then draw one tick
    pub fn on_draw_frame(&mut self, gpu: &mut dyn GpuDevice) -> RenderResult<bool> {
        if let Some(kind) = self.requested.take() {
            self.switch_to(gpu, kind);
        }
        self.active.on_draw_frame(gpu)
    }

    pub fn set_preview_size(&mut self, width: u32, height: u32) {
        self.preview_size = Some((width, height));
        self.active.set_preview_size(width, height);
    }

    pub fn set_lens_facing(&mut self, facing: LensFacing) {
        self.lens_facing = facing;
        self.active.set_lens_facing(facing);
    }

    pub fn set_camera_active(&mut self, active: bool) {
        self.camera_active = active;
        self.active.set_camera_active(active);
    }

    pub fn is_camera_active(&self) -> bool {
        self.active.is_camera_active()
    }

    /// Release the active renderer's GPU resources
    ///
    /// The selector stays usable: a later `on_surface_created` recreates them.
    pub fn release(&mut self, gpu: &mut dyn GpuDevice) {
        self.camera_active = false;
        self.active.set_camera_active(false);
        self.active.release(gpu);
        self.surface_created = false;
    }
}

fn build(kind: RendererKind, config: &Arc<RendererConfig>, sources: &FrameSources) -> Box<dyn Renderer> {
    let config = Arc::clone(config);
    match kind {
        RendererKind::DirectTexture => Box::new(TextureRenderer::new(config, sources.surface.clone())),
        RendererKind::PlanarColor => {
            Box::new(PlanarColorRenderer::new(config, Arc::clone(&sources.planar)))
        }
        RendererKind::OffscreenComposite => {
            Box::new(OffscreenCompositor::new(config, sources.surface.clone()))
        }
    }
}
