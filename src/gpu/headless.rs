// SPDX-License-Identifier: GPL-3.0-only

//! GPU-less [`GpuDevice`] that accounts resources and records draws
//!
//! Used by the test suite and as the CLI fallback when no adapter is present.
//! Programs are "compiled" with the same entry-point contract the wgpu device
//! enforces, so a broken program description fails here too.

use super::{
    DrawCall, DrawUniforms, FramebufferId, GpuDevice, MAX_DRAW_TEXTURES, ProgramId,
    ProgramSource, RenderTarget, ResourceCounts, TextureId, TextureKind,
};
use crate::errors::{RenderError, RenderResult};
use crate::frame::SurfaceBuffer;
use crate::viewport::ViewportRect;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// One recorded draw
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub program: ProgramId,
    pub program_label: String,
    pub target: RenderTarget,
    pub viewport: ViewportRect,
    pub textures: Vec<TextureId>,
    pub tex_coords: [[f32; 2]; 4],
    pub uniforms: DrawUniforms,
}

#[derive(Debug)]
struct HeadlessTexture {
    kind: TextureKind,
    width: u32,
    height: u32,
    /// Sequence of the last latched surface buffer
    latched: Option<u64>,
    owner: Option<FramebufferId>,
}

#[derive(Debug)]
struct HeadlessFramebuffer {
    color: TextureId,
    width: u32,
    height: u32,
}

/// Resource-accounting device without a GPU
#[derive(Debug)]
pub struct HeadlessDevice {
    surface_size: (u32, u32),
    programs: HashMap<ProgramId, String>,
    textures: HashMap<TextureId, HeadlessTexture>,
    framebuffers: HashMap<FramebufferId, HeadlessFramebuffer>,
    next_id: u32,
    target: RenderTarget,
    viewport: ViewportRect,
    screen_clear: [f32; 4],
    draws: Vec<DrawRecord>,
    clears: Vec<RenderTarget>,
    frames_finished: u64,
    // Fault injection
    failing_latches: u32,
    passing_writes: u32,
    failing_writes: u32,
    failing_programs: HashSet<String>,
    fail_framebuffers: bool,
}

impl HeadlessDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface_size: (width, height),
            programs: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            next_id: 1,
            target: RenderTarget::Screen,
            viewport: ViewportRect::full(width, height),
            screen_clear: [0.0; 4],
            draws: Vec::new(),
            clears: Vec::new(),
            frames_finished: 0,
            failing_latches: 0,
            passing_writes: 0,
            failing_writes: 0,
            failing_programs: HashSet::new(),
            fail_framebuffers: false,
        }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Draws recorded since the last [`take_draws`](Self::take_draws)
    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn take_draws(&mut self) -> Vec<DrawRecord> {
        std::mem::take(&mut self.draws)
    }

    /// Targets cleared since the last [`take_clears`](Self::take_clears)
    pub fn take_clears(&mut self) -> Vec<RenderTarget> {
        std::mem::take(&mut self.clears)
    }

    pub fn frames_finished(&self) -> u64 {
        self.frames_finished
    }

    /// Size of a live texture
    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&texture).map(|t| (t.width, t.height))
    }

    /// Sequence of the surface buffer last latched into `texture`
    pub fn latched_sequence(&self, texture: TextureId) -> Option<u64> {
        self.textures.get(&texture).and_then(|t| t.latched)
    }

    pub fn framebuffer_size(&self, framebuffer: FramebufferId) -> Option<(u32, u32)> {
        self.framebuffers
            .get(&framebuffer)
            .map(|fb| (fb.width, fb.height))
    }

    /// Make the next `count` surface latches fail transiently
    pub fn fail_next_latches(&mut self, count: u32) {
        self.failing_latches = count;
    }

    /// Make the next `count` texture uploads fail transiently
    pub fn fail_next_writes(&mut self, count: u32) {
        self.fail_writes_after(0, count);
    }

    /// Let `passing` uploads succeed, then fail the following `count`
    pub fn fail_writes_after(&mut self, passing: u32, count: u32) {
        self.passing_writes = passing;
        self.failing_writes = count;
    }

    /// Make programs with this label fail to link
    pub fn fail_program(&mut self, label: &str) {
        self.failing_programs.insert(label.to_string());
    }

    /// Make framebuffer creation fail
    pub fn fail_framebuffers(&mut self, fail: bool) {
        self.fail_framebuffers = fail;
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_program(&mut self, source: &ProgramSource) -> RenderResult<ProgramId> {
        if source.wgsl.trim().is_empty() {
            return Err(RenderError::ShaderCompileFailed(format!(
                "{}: empty source",
                source.label
            )));
        }
        if !source.wgsl.contains("fn vs_main") || !source.wgsl.contains("fn fs_main") {
            return Err(RenderError::ProgramLinkFailed(format!(
                "{}: missing vs_main or fs_main entry point",
                source.label
            )));
        }
        if self.failing_programs.contains(source.label.as_ref()) {
            return Err(RenderError::ProgramLinkFailed(format!(
                "{}: injected failure",
                source.label
            )));
        }

        let id = ProgramId(self.next_id());
        self.programs.insert(id, source.label.to_string());
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
    }

    fn create_texture(
        &mut self,
        kind: TextureKind,
        width: u32,
        height: u32,
    ) -> RenderResult<TextureId> {
        let id = TextureId(self.next_id());
        self.textures.insert(
            id,
            HeadlessTexture {
                kind,
                width,
                height,
                latched: None,
                owner: None,
            },
        );
        Ok(id)
    }

    fn write_texture(
        &mut self,
        texture: TextureId,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> RenderResult<()> {
        if self.passing_writes > 0 {
            self.passing_writes -= 1;
        } else if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(RenderError::TextureUpdateTransientFailure(
                "injected upload failure".to_string(),
            ));
        }

        let entry = self
            .textures
            .get_mut(&texture)
            .ok_or_else(|| RenderError::InvalidHandle(format!("texture {:?}", texture)))?;

        let needed = width as usize * height as usize * entry.kind.bytes_per_pixel();
        if width == 0 || height == 0 || data.len() < needed {
            return Err(RenderError::TextureUpdateTransientFailure(format!(
                "{} bytes for {}x{} upload",
                data.len(),
                width,
                height
            )));
        }

        entry.width = width;
        entry.height = height;
        Ok(())
    }

    fn latch_surface(&mut self, texture: TextureId, buffer: &SurfaceBuffer) -> RenderResult<()> {
        if self.failing_latches > 0 {
            self.failing_latches -= 1;
            return Err(RenderError::TextureUpdateTransientFailure(
                "injected latch failure".to_string(),
            ));
        }

        let entry = self
            .textures
            .get_mut(&texture)
            .ok_or_else(|| RenderError::InvalidHandle(format!("texture {:?}", texture)))?;
        if entry.kind != TextureKind::External {
            return Err(RenderError::InvalidHandle(format!(
                "texture {:?} is not external",
                texture
            )));
        }

        entry.width = buffer.buffer_width;
        entry.height = buffer.buffer_height;
        entry.latched = Some(buffer.sequence);
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if let Some(entry) = self.textures.get(&texture)
            && entry.owner.is_none()
        {
            self.textures.remove(&texture);
        }
    }

    fn create_framebuffer(&mut self, width: u32, height: u32) -> RenderResult<FramebufferId> {
        if self.fail_framebuffers || width == 0 || height == 0 {
            return Err(RenderError::FramebufferIncomplete(format!(
                "{}x{}",
                width, height
            )));
        }

        let framebuffer = FramebufferId(self.next_id());
        let color = TextureId(self.next_id());
        self.textures.insert(
            color,
            HeadlessTexture {
                kind: TextureKind::Rgba,
                width,
                height,
                latched: None,
                owner: Some(framebuffer),
            },
        );
        self.framebuffers.insert(
            framebuffer,
            HeadlessFramebuffer {
                color,
                width,
                height,
            },
        );
        debug!(?framebuffer, width, height, "Headless framebuffer created");
        Ok(framebuffer)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        if let Some(fb) = self.framebuffers.remove(&framebuffer) {
            self.textures.remove(&fb.color);
            if self.target == RenderTarget::Offscreen(framebuffer) {
                self.target = RenderTarget::Screen;
            }
        }
    }

    fn framebuffer_texture(&self, framebuffer: FramebufferId) -> RenderResult<TextureId> {
        self.framebuffers
            .get(&framebuffer)
            .map(|fb| fb.color)
            .ok_or_else(|| RenderError::InvalidHandle(format!("framebuffer {:?}", framebuffer)))
    }

    fn bind_target(&mut self, target: RenderTarget) {
        self.target = target;
    }

    fn set_viewport(&mut self, rect: ViewportRect) {
        self.viewport = rect;
    }

    fn clear(&mut self, color: [f32; 4]) {
        if self.target == RenderTarget::Screen {
            self.screen_clear = color;
        }
        self.clears.push(self.target);
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> RenderResult<()> {
        let label = self
            .programs
            .get(&call.program)
            .cloned()
            .ok_or_else(|| RenderError::InvalidHandle(format!("program {:?}", call.program)))?;

        if call.textures.len() > MAX_DRAW_TEXTURES {
            return Err(RenderError::InvalidHandle(format!(
                "{} textures bound",
                call.textures.len()
            )));
        }
        if let Some(missing) = call.textures.iter().find(|t| !self.textures.contains_key(t)) {
            return Err(RenderError::InvalidHandle(format!("texture {:?}", missing)));
        }
        if let RenderTarget::Offscreen(fb) = self.target
            && !self.framebuffers.contains_key(&fb)
        {
            return Err(RenderError::InvalidHandle(format!("framebuffer {:?}", fb)));
        }

        self.draws.push(DrawRecord {
            program: call.program,
            program_label: label,
            target: self.target,
            viewport: self.viewport,
            textures: call.textures.to_vec(),
            tex_coords: call.quad.tex_coords,
            uniforms: call.uniforms,
        });
        Ok(())
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.surface_size = (width, height);
    }

    fn finish_frame(&mut self) -> RenderResult<()> {
        self.frames_finished += 1;
        Ok(())
    }

    /// Returns the rectangle filled with the last screen clear color
    fn read_pixels(&mut self, rect: ViewportRect) -> RenderResult<Vec<u8>> {
        let (width, height) = self.surface_size;
        if rect.is_empty() || rect.x + rect.width > width || rect.y + rect.height > height {
            return Err(RenderError::ReadbackFailed(format!(
                "rect {} outside {}x{} surface",
                rect, width, height
            )));
        }

        let pixel = self.screen_clear.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        Ok(pixel
            .iter()
            .copied()
            .cycle()
            .take(rect.rgba_len())
            .collect())
    }

    fn resource_counts(&self) -> ResourceCounts {
        ResourceCounts {
            textures: self.textures.values().filter(|t| t.owner.is_none()).count(),
            programs: self.programs.len(),
            framebuffers: self.framebuffers.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::Quad;

    const VALID: ProgramSource = ProgramSource::from_static(
        "valid",
        "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }\n\
         @fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }",
    );

    #[test]
    fn test_program_failures() {
        let mut gpu = HeadlessDevice::new(10, 10);
        let empty = ProgramSource::from_static("empty", "  ");
        assert!(matches!(
            gpu.create_program(&empty),
            Err(RenderError::ShaderCompileFailed(_))
        ));

        let no_fragment = ProgramSource::from_static("half", "fn vs_main() {}");
        assert!(matches!(
            gpu.create_program(&no_fragment),
            Err(RenderError::ProgramLinkFailed(_))
        ));

        gpu.fail_program("valid");
        assert!(gpu.create_program(&VALID).is_err());
        assert_eq!(gpu.resource_counts().programs, 0);
    }

    #[test]
    fn test_framebuffer_attachment_is_not_a_texture() {
        let mut gpu = HeadlessDevice::new(10, 10);
        let fb = gpu.create_framebuffer(4, 4).unwrap();
        let color = gpu.framebuffer_texture(fb).unwrap();

        gpu.delete_texture(color);
        assert_eq!(gpu.texture_size(color), Some((4, 4)));
        assert_eq!(gpu.resource_counts().textures, 0);

        gpu.delete_framebuffer(fb);
        assert!(gpu.resource_counts().is_empty());
        assert_eq!(gpu.texture_size(color), None);
    }

    #[test]
    fn test_draw_records_state() {
        let mut gpu = HeadlessDevice::new(100, 50);
        let program = gpu.create_program(&VALID).unwrap();
        let texture = gpu.create_texture(TextureKind::Rgba, 1, 1).unwrap();
        let quad = Quad::full([[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);

        gpu.set_viewport(ViewportRect::new(5, 0, 20, 50));
        gpu.draw(&DrawCall {
            program,
            textures: &[texture],
            quad: &quad,
            uniforms: DrawUniforms::default(),
        })
        .unwrap();

        let draws = gpu.take_draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].program_label, "valid");
        assert_eq!(draws[0].viewport, ViewportRect::new(5, 0, 20, 50));
        assert_eq!(draws[0].target, RenderTarget::Screen);
    }

    #[test]
    fn test_injected_write_failures() {
        let mut gpu = HeadlessDevice::new(10, 10);
        let texture = gpu.create_texture(TextureKind::Luma, 2, 2).unwrap();
        gpu.fail_next_writes(1);

        assert!(matches!(
            gpu.write_texture(texture, 4, 4, &[0; 16]),
            Err(RenderError::TextureUpdateTransientFailure(_))
        ));
        assert_eq!(gpu.texture_size(texture), Some((2, 2)));

        gpu.write_texture(texture, 4, 4, &[0; 16]).unwrap();
        assert_eq!(gpu.texture_size(texture), Some((4, 4)));
    }

    #[test]
    fn test_read_pixels_bounds() {
        let mut gpu = HeadlessDevice::new(8, 8);
        gpu.clear([1.0, 0.0, 0.0, 1.0]);
        let pixels = gpu.read_pixels(ViewportRect::new(2, 2, 3, 3)).unwrap();
        assert_eq!(pixels.len(), 36);
        assert_eq!(&pixels[..4], &[255, 0, 0, 255]);

        assert!(gpu.read_pixels(ViewportRect::new(6, 6, 3, 3)).is_err());
    }
}
