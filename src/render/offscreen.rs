// SPDX-License-Identifier: GPL-3.0-only

//! Offscreen compositor
//!
//! Three passes per tick:
//!
//! 1. offscreen target (viewport sized): clear, draw the camera frame
//! 2. same target, no clear: draw the frame again into the bottom-right
//!    third through the tint program
//! 3. screen: restore the viewport, blit the offscreen color texture

use super::texture::ExternalFrame;
use super::{
    Renderer, RendererCallbacks, RendererConfig, RendererKind, RendererState,
    create_program_logged,
};
use crate::backends::camera::LensFacing;
use crate::errors::RenderResult;
use crate::frame::SurfaceTexture;
use crate::gpu::mat4;
use crate::gpu::{DrawCall, DrawUniforms, FramebufferId, GpuDevice, ProgramId, Quad, RenderTarget};
use crate::viewport::ViewportRect;
use std::sync::Arc;
use tracing::{debug, warn};

/// Tint blend of the picture-in-picture pass, the CPU counterpart of the tint program
///
/// `rgb = src.rgb * (1 - tint.a) + tint.rgb * tint.a`, alpha kept from `src`.
pub fn apply_tint(src: [f32; 4], tint: [f32; 4]) -> [f32; 4] {
    let a = tint[3];
    [
        src[0] * (1.0 - a) + tint[0] * a,
        src[1] * (1.0 - a) + tint[1] * a,
        src[2] * (1.0 - a) + tint[2] * a,
        src[3],
    ]
}

#[derive(Debug, Clone, Copy, Default)]
struct Programs {
    frame: Option<ProgramId>,
    tint: Option<ProgramId>,
    blit: Option<ProgramId>,
}

impl Programs {
    fn all(&self) -> Option<(ProgramId, ProgramId, ProgramId)> {
        Some((self.frame?, self.tint?, self.blit?))
    }
}

/// Offscreen target and the size it was allocated at
#[derive(Debug, Clone, Copy)]
struct Target {
    framebuffer: FramebufferId,
    width: u32,
    height: u32,
}

pub struct OffscreenCompositor {
    state: RendererState,
    surface: SurfaceTexture,
    frame: ExternalFrame,
    programs: Programs,
    target: Option<Target>,
    /// Reallocate the target before the next draw
    target_stale: bool,
}

impl OffscreenCompositor {
    pub fn new(config: Arc<RendererConfig>, surface: SurfaceTexture) -> Self {
        Self {
            state: RendererState::new(config),
            surface,
            frame: ExternalFrame::default(),
            programs: Programs::default(),
            target: None,
            target_stale: true,
        }
    }

    /// Offscreen target matching the current viewport, if one can exist
    fn ensure_target(&mut self, gpu: &mut dyn GpuDevice) -> Option<Target> {
        if !self.target_stale {
            return self.target;
        }
        self.target_stale = false;

        if let Some(old) = self.target.take() {
            gpu.delete_framebuffer(old.framebuffer);
        }

        let viewport = self.state.viewport;
        if viewport.is_empty() {
            return None;
        }
        match gpu.create_framebuffer(viewport.width, viewport.height) {
            Ok(framebuffer) => {
                debug!(width = viewport.width, height = viewport.height, "Offscreen target allocated");
                self.target = Some(Target {
                    framebuffer,
                    width: viewport.width,
                    height: viewport.height,
                });
            }
            Err(e) => {
                // Stays empty until the next resize
                warn!(error = %e, "Offscreen target unavailable, drawing nothing");
            }
        }
        self.target
    }

    fn release_target(&mut self, gpu: &mut dyn GpuDevice) {
        if let Some(target) = self.target.take() {
            gpu.delete_framebuffer(target.framebuffer);
        }
        self.target_stale = true;
    }
}

impl Renderer for OffscreenCompositor {
    fn kind(&self) -> RendererKind {
        RendererKind::OffscreenComposite
    }

    fn on_surface_created(&mut self, gpu: &mut dyn GpuDevice) {
        self.release(gpu);
        let config = Arc::clone(&self.state.config);
        self.programs = Programs {
            frame: create_program_logged(gpu, &config.external_program),
            tint: create_program_logged(gpu, &config.tint_program),
            blit: create_program_logged(gpu, &config.blit_program),
        };
        self.frame.create(gpu);
    }

    fn on_surface_changed(&mut self, _gpu: &mut dyn GpuDevice, width: u32, height: u32) {
        self.state.surface_changed(width, height);
        self.target_stale = true;
    }

    fn on_draw_frame(&mut self, gpu: &mut dyn GpuDevice) -> RenderResult<bool> {
        self.state.clear_screen(gpu);

        if !self.surface.is_camera_active() {
            return Ok(false);
        }
        let Some((texture, tex_transform)) = self.frame.update(gpu, &self.surface) else {
            return Ok(false);
        };
        let Some((frame_program, tint_program, blit_program)) = self.programs.all() else {
            return Ok(false);
        };
        let Some(target) = self.ensure_target(gpu) else {
            return Ok(false);
        };
        let color = gpu.framebuffer_texture(target.framebuffer)?;

        let config = &self.state.config;
        let frame_quad = Quad::full(config.direct_tables.for_facing(self.state.lens_facing));
        let frame_uniforms = DrawUniforms {
            mvp: mat4::IDENTITY,
            tex_transform,
            ..Default::default()
        };
        let offscreen = ViewportRect::full(target.width, target.height);

        // Pass 1: full frame
        gpu.bind_target(RenderTarget::Offscreen(target.framebuffer));
        gpu.set_viewport(offscreen);
        gpu.clear(config.clear_color);
        gpu.draw(&DrawCall {
            program: frame_program,
            textures: &[texture],
            quad: &frame_quad,
            uniforms: frame_uniforms,
        })?;

        // Pass 2: tinted picture-in-picture
        gpu.set_viewport(offscreen.bottom_right(config.pip_fraction));
        gpu.draw(&DrawCall {
            program: tint_program,
            textures: &[texture],
            quad: &frame_quad,
            uniforms: DrawUniforms {
                tint: config.tint_color,
                ..frame_uniforms
            },
        })?;

        // Pass 3: composite to screen
        gpu.bind_target(RenderTarget::Screen);
        gpu.set_viewport(self.state.viewport);
        gpu.draw(&DrawCall {
            program: blit_program,
            textures: &[color],
            quad: &Quad::full(config.blit_tex_coords),
            uniforms: DrawUniforms::default(),
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
        for program in [
            self.programs.frame.take(),
            self.programs.tint.take(),
            self.programs.blit.take(),
        ]
        .into_iter()
        .flatten()
        {
            gpu.delete_program(program);
        }
        self.frame.release(gpu);
        self.release_target(gpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SurfaceBuffer;
    use crate::gpu::HeadlessDevice;
    use crate::render::tables;

    fn buffer(sequence: u64) -> SurfaceBuffer {
        SurfaceBuffer::new(64, 48, 64, 48, Arc::from(vec![0u8; 64 * 48 * 4]), sequence).unwrap()
    }

    fn compositor(gpu: &mut HeadlessDevice) -> (OffscreenCompositor, SurfaceTexture) {
        let surface = SurfaceTexture::new();
        let mut compositor = OffscreenCompositor::new(Arc::default(), surface.clone());
        compositor.on_surface_created(gpu);
        compositor.on_surface_changed(gpu, 1080, 1920);
        compositor.set_camera_active(true);
        (compositor, surface)
    }

    #[test]
    fn test_tint_blend() {
        let out = apply_tint([1.0, 1.0, 1.0, 0.5], [0.0, 0.0, 1.0, 0.2]);
        assert!((out[0] - 0.8).abs() < 1e-6);
        assert!((out[2] - 1.0).abs() < 1e-6);
        assert_eq!(out[3], 0.5);
    }

    #[test]
    fn test_three_passes() {
        let mut gpu = HeadlessDevice::new(1080, 1920);
        let (mut compositor, surface) = compositor(&mut gpu);
        surface.producer().queue_buffer(buffer(1));

        assert!(compositor.on_draw_frame(&mut gpu).unwrap());
        let draws = gpu.take_draws();
        assert_eq!(draws.len(), 3);

        let fb = compositor.target.unwrap().framebuffer;
        let offscreen = ViewportRect::full(1080, 1920);
        assert_eq!(draws[0].target, RenderTarget::Offscreen(fb));
        assert_eq!(draws[0].viewport, offscreen);
        assert_eq!(draws[0].program_label, "external-quad");

        assert_eq!(draws[1].target, RenderTarget::Offscreen(fb));
        assert_eq!(draws[1].viewport, ViewportRect::new(720, 1280, 360, 640));
        assert_eq!(draws[1].program_label, "pip-tint");
        assert_eq!(draws[1].uniforms.tint, crate::constants::pip::TINT_COLOR);

        assert_eq!(draws[2].target, RenderTarget::Screen);
        assert_eq!(draws[2].viewport, compositor.viewport());
        assert_eq!(draws[2].textures, vec![gpu.framebuffer_texture(fb).unwrap()]);
        assert_eq!(draws[2].tex_coords, tables::BLIT);

        // Screen cleared, then offscreen cleared; the PiP pass does not clear
        assert_eq!(
            gpu.take_clears(),
            vec![RenderTarget::Screen, RenderTarget::Offscreen(fb)]
        );
    }

    #[test]
    fn test_target_reallocated_on_resize() {
        let mut gpu = HeadlessDevice::new(1080, 1920);
        let (mut compositor, surface) = compositor(&mut gpu);
        surface.producer().queue_buffer(buffer(1));
        compositor.on_draw_frame(&mut gpu).unwrap();
        let first = compositor.target.unwrap().framebuffer;

        gpu.resize_surface(720, 1280);
        compositor.on_surface_changed(&mut gpu, 720, 1280);
        compositor.on_draw_frame(&mut gpu).unwrap();

        let second = compositor.target.unwrap().framebuffer;
        assert_ne!(first, second);
        assert_eq!(gpu.framebuffer_size(first), None);
        assert_eq!(gpu.framebuffer_size(second), Some((720, 1280)));
        assert_eq!(gpu.resource_counts().framebuffers, 1);
    }

    #[test]
    fn test_incomplete_framebuffer_draws_only_clear() {
        let mut gpu = HeadlessDevice::new(1080, 1920);
        gpu.fail_framebuffers(true);
        let (mut compositor, surface) = compositor(&mut gpu);
        surface.producer().queue_buffer(buffer(1));

        assert!(!compositor.on_draw_frame(&mut gpu).unwrap());
        assert!(gpu.draws().is_empty());
        assert_eq!(gpu.take_clears(), vec![RenderTarget::Screen]);
    }

    #[test]
    fn test_release_frees_everything() {
        let mut gpu = HeadlessDevice::new(1080, 1920);
        let (mut compositor, surface) = compositor(&mut gpu);
        surface.producer().queue_buffer(buffer(1));
        compositor.on_draw_frame(&mut gpu).unwrap();
        assert_eq!(gpu.resource_counts().programs, 3);

        compositor.release(&mut gpu);
        assert!(gpu.resource_counts().is_empty());
    }
}
