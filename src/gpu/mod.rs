// SPDX-License-Identifier: GPL-3.0-only

//! Graphics device boundary used by the renderers
//!
//! Every call happens on the drawing context. Resources are referred to by
//! small copyable handles; the owner (one renderer) deletes them explicitly
//! before it is discarded, so a device can always report what is still alive
//! through [`GpuDevice::resource_counts`].
//!
//! Two implementations:
//! - [`WgpuDevice`]: wgpu with an offscreen display surface
//! - [`HeadlessDevice`]: no GPU, records draws and counts resources

pub mod headless;
pub mod mat4;
pub mod wgpu_device;

pub use headless::{DrawRecord, HeadlessDevice};
pub use wgpu_device::{GpuDeviceInfo, WgpuDevice, create_device};

use crate::errors::RenderResult;
use crate::frame::SurfaceBuffer;
use crate::viewport::ViewportRect;
use mat4::Mat4;
use std::borrow::Cow;

/// Texture handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub(crate) u32);

/// Shader program handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub(crate) u32);

/// Offscreen render target handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub(crate) u32);

/// What a texture holds and how it is filled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    /// Bound to the opaque surface, filled only by [`GpuDevice::latch_surface`]
    External,
    /// Single channel (R8), one plane of a planar frame
    Luma,
    /// RGBA8
    Rgba,
}

impl TextureKind {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            TextureKind::Luma => 1,
            TextureKind::External | TextureKind::Rgba => 4,
        }
    }
}

/// WGSL program description
///
/// One module holding both stages, entry points `vs_main` and `fs_main`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramSource {
    pub label: Cow<'static, str>,
    pub wgsl: Cow<'static, str>,
}

impl ProgramSource {
    pub const fn from_static(label: &'static str, wgsl: &'static str) -> Self {
        Self {
            label: Cow::Borrowed(label),
            wgsl: Cow::Borrowed(wgsl),
        }
    }
}

/// Uniform block shared by all programs
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniforms {
    /// Applied to vertex positions
    pub mvp: Mat4,
    /// Applied to texture coordinates
    pub tex_transform: Mat4,
    pub tint: [f32; 4],
}

impl Default for DrawUniforms {
    fn default() -> Self {
        Self {
            mvp: mat4::IDENTITY,
            tex_transform: mat4::IDENTITY,
            tint: [0.0; 4],
        }
    }
}

/// Quad drawn as a 4-vertex triangle strip
///
/// Vertex order is bottom-left, bottom-right, top-left, top-right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub positions: [[f32; 2]; 4],
    pub tex_coords: [[f32; 2]; 4],
}

impl Quad {
    /// Positions covering the whole viewport in normalized device coordinates
    pub const FULL_POSITIONS: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];

    pub fn full(tex_coords: [[f32; 2]; 4]) -> Self {
        Self {
            positions: Self::FULL_POSITIONS,
            tex_coords,
        }
    }

    /// Interleaved `[x, y, u, v]` vertex data
    pub fn vertices(&self) -> [[f32; 4]; 4] {
        std::array::from_fn(|i| {
            [
                self.positions[i][0],
                self.positions[i][1],
                self.tex_coords[i][0],
                self.tex_coords[i][1],
            ]
        })
    }
}

/// One draw into the currently bound target and viewport
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    pub program: ProgramId,
    /// Bound in order to texture slots 0..3
    pub textures: &'a [TextureId],
    pub quad: &'a Quad,
    pub uniforms: DrawUniforms,
}

/// Where draws and clears go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    /// The display surface
    Screen,
    Offscreen(FramebufferId),
}

/// Live resource counts (framebuffer color attachments are not counted as textures)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub textures: usize,
    pub programs: usize,
    pub framebuffers: usize,
}

impl ResourceCounts {
    pub fn is_empty(&self) -> bool {
        self.textures == 0 && self.programs == 0 && self.framebuffers == 0
    }
}

/// Maximum number of textures one draw can bind
pub const MAX_DRAW_TEXTURES: usize = 3;

/// Graphics device operations available to the drawing context
pub trait GpuDevice {
    /// Compile and link a program
    fn create_program(&mut self, source: &ProgramSource) -> RenderResult<ProgramId>;

    fn delete_program(&mut self, program: ProgramId);

    fn create_texture(
        &mut self,
        kind: TextureKind,
        width: u32,
        height: u32,
    ) -> RenderResult<TextureId>;

    /// Upload tightly packed pixels, reallocating the texture when the size changed
    fn write_texture(
        &mut self,
        texture: TextureId,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> RenderResult<()>;

    /// Bind the latest opaque-surface buffer to an external texture
    fn latch_surface(&mut self, texture: TextureId, buffer: &SurfaceBuffer) -> RenderResult<()>;

    fn delete_texture(&mut self, texture: TextureId);

    /// Create an offscreen target with an RGBA color attachment
    fn create_framebuffer(&mut self, width: u32, height: u32) -> RenderResult<FramebufferId>;

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    /// Color attachment of a framebuffer, owned by the framebuffer
    fn framebuffer_texture(&self, framebuffer: FramebufferId) -> RenderResult<TextureId>;

    fn bind_target(&mut self, target: RenderTarget);

    fn set_viewport(&mut self, rect: ViewportRect);

    /// Clear the whole bound target
    fn clear(&mut self, color: [f32; 4]);

    fn draw(&mut self, call: &DrawCall<'_>) -> RenderResult<()>;

    fn surface_size(&self) -> (u32, u32);

    /// Resize the display surface (host window resize)
    fn resize_surface(&mut self, width: u32, height: u32);

    /// Submit everything recorded for this tick
    fn finish_frame(&mut self) -> RenderResult<()>;

    /// Read RGBA8 pixels of the display surface, rows top to bottom
    fn read_pixels(&mut self, rect: ViewportRect) -> RenderResult<Vec<u8>>;

    fn resource_counts(&self) -> ResourceCounts;
}
