// SPDX-License-Identifier: GPL-3.0-only

//! Direct texture renderer: opaque-surface frames drawn straight to the screen

use super::{
    Renderer, RendererCallbacks, RendererConfig, RendererKind, RendererState,
    create_program_logged,
};
use crate::backends::camera::LensFacing;
use crate::errors::{RenderError, RenderResult};
use crate::frame::SurfaceTexture;
use crate::gpu::mat4::{self, Mat4};
use crate::gpu::{DrawCall, DrawUniforms, GpuDevice, ProgramId, Quad, TextureId, TextureKind};
use crate::viewport::ViewportRect;
use std::sync::Arc;
use tracing::{debug, warn};

/// External texture plus the transform of the buffer latched into it
///
/// Shared by every renderer that consumes the opaque surface.
#[derive(Debug, Default)]
pub(crate) struct ExternalFrame {
    texture: Option<TextureId>,
    /// Set once a buffer was latched
    transform: Option<Mat4>,
}

impl ExternalFrame {
    pub fn create(&mut self, gpu: &mut dyn GpuDevice) {
        // External textures are sized by the buffer latched into them
        match gpu.create_texture(TextureKind::External, 1, 1) {
            Ok(texture) => self.texture = Some(texture),
            Err(e) => warn!(error = %e, "Failed to create external texture"),
        }
        self.transform = None;
    }

    /// Latch the newest pending buffer, retrying next tick on transient failure
    ///
    /// Returns the texture and transform to draw with, or `None` before the
    /// first successful latch.
    pub fn update(
        &mut self,
        gpu: &mut dyn GpuDevice,
        surface: &SurfaceTexture,
    ) -> Option<(TextureId, Mat4)> {
        let texture = self.texture?;
        match surface.update_tex_image(gpu, texture) {
            Ok(Some(transform)) => self.transform = Some(transform),
            Ok(None) => {}
            Err(RenderError::TextureUpdateTransientFailure(reason)) => {
                debug!(%reason, "Surface latch failed, retrying next frame");
            }
            Err(e) => warn!(error = %e, "Surface latch failed"),
        }
        self.transform.map(|transform| (texture, transform))
    }

    /// Forget the latched buffer so it is never drawn again
    pub fn forget(&mut self) {
        self.transform = None;
    }

    pub fn release(&mut self, gpu: &mut dyn GpuDevice) {
        if let Some(texture) = self.texture.take() {
            gpu.delete_texture(texture);
        }
        self.transform = None;
    }
}

/// Draws opaque-surface frames as a full-viewport quad
pub struct TextureRenderer {
    state: RendererState,
    surface: SurfaceTexture,
    program: Option<ProgramId>,
    frame: ExternalFrame,
}

impl TextureRenderer {
    pub fn new(config: Arc<RendererConfig>, surface: SurfaceTexture) -> Self {
        Self {
            state: RendererState::new(config),
            surface,
            program: None,
            frame: ExternalFrame::default(),
        }
    }
}

impl Renderer for TextureRenderer {
    fn kind(&self) -> RendererKind {
        RendererKind::DirectTexture
    }

    fn on_surface_created(&mut self, gpu: &mut dyn GpuDevice) {
        // A recreated surface invalidates everything made for the old one
        self.release(gpu);
        self.program = create_program_logged(gpu, &self.state.config.external_program);
        self.frame.create(gpu);
    }

    fn on_surface_changed(&mut self, _gpu: &mut dyn GpuDevice, width: u32, height: u32) {
        self.state.surface_changed(width, height);
    }

    fn on_draw_frame(&mut self, gpu: &mut dyn GpuDevice) -> RenderResult<bool> {
        self.state.clear_screen(gpu);

        if !self.surface.is_camera_active() {
            return Ok(false);
        }
        let Some((texture, tex_transform)) = self.frame.update(gpu, &self.surface) else {
            return Ok(false);
        };
        let Some(program) = self.program else {
            return Ok(false);
        };
        if self.state.viewport.is_empty() {
            return Ok(false);
        }

        let quad = Quad::full(
            self.state
                .config
                .direct_tables
                .for_facing(self.state.lens_facing),
        );
        gpu.set_viewport(self.state.viewport);
        gpu.draw(&DrawCall {
            program,
            textures: &[texture],
            quad: &quad,
            uniforms: DrawUniforms {
                mvp: mat4::IDENTITY,
                tex_transform,
                ..Default::default()
            },
        })?;
        Ok(true)
    }

    fn set_preview_size(&mut self, width: u32, height: u32) {
        self.state.preview_size = Some((width, height));
    }

    fn set_lens_facing(&mut self, facing: LensFacing) {
        self.state.lens_facing = facing;
    }

    fn set_camera_active(&mut self, active: bool) {
        if !active {
            self.frame.forget();
        }
        self.surface.set_camera_active(active);
    }

    fn is_camera_active(&self) -> bool {
        self.surface.is_camera_active()
    }

    fn set_callbacks(&mut self, callbacks: &RendererCallbacks) {
        self.surface
            .set_on_frame_available(callbacks.on_frame_available.clone());
        self.state.callbacks = callbacks.clone();
    }

    fn viewport(&self) -> ViewportRect {
        self.state.viewport
    }

    fn release(&mut self, gpu: &mut dyn GpuDevice) {
        if let Some(program) = self.program.take() {
            gpu.delete_program(program);
        }
        self.frame.release(gpu);
    }
}
