// SPDX-License-Identifier: GPL-3.0-only

//! Frames exchanged between the capture worker and the drawing loop
//!
//! Two frame forms exist, one per capture sink:
//!
//! ```text
//!  capture worker                          drawing loop
//! ┌──────────────┐  SurfaceProducer   ┌────────────────┐
//! │ Surface sink │ ─────────────────▶ │ SurfaceTexture │ → external texture
//! └──────────────┘                    └────────────────┘
//! ┌──────────────┐  FrameHandoff      ┌────────────────┐
//! │ Planar sink  │ ─────────────────▶ │  PlanarFrame   │ → three R8 textures
//! └──────────────┘                    └────────────────┘
//! ```
//!
//! Both paths are single-slot mailboxes: the newest frame replaces any frame
//! the renderer has not consumed yet.

pub mod handoff;
pub mod surface;

pub use handoff::{FrameCallback, FrameHandoff};
pub use surface::{SurfaceProducer, SurfaceTexture};

use crate::gpu::mat4::{self, Mat4};
use std::sync::Arc;
use std::time::Instant;

/// One compacted plane of a planar frame
#[derive(Clone)]
pub struct Plane {
    /// Row-major bytes, exactly `width * height` long
    pub data: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
}

impl Plane {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Option<Self> {
        if data.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            data: Arc::from(data),
            width,
            height,
        })
    }
}

impl std::fmt::Debug for Plane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Plane({}x{}, {} bytes)", self.width, self.height, self.data.len())
    }
}

/// 4:2:0 planar frame (luma + two half-resolution chroma planes)
///
/// Immutable once published. The consumer uploads it during one draw call and
/// drops it.
#[derive(Debug, Clone)]
pub struct PlanarFrame {
    pub width: u32,
    pub height: u32,
    pub y: Plane,
    pub u: Plane,
    pub v: Plane,
    /// Producer-side frame counter
    pub sequence: u64,
    pub captured_at: Instant,
}

impl PlanarFrame {
    /// Assemble a frame from already compacted planes
    ///
    /// Returns `None` when a plane length does not match `width*height` (luma)
    /// or `(width/2)*(height/2)` (chroma).
    pub fn from_planes(
        width: u32,
        height: u32,
        y: Vec<u8>,
        u: Vec<u8>,
        v: Vec<u8>,
        sequence: u64,
    ) -> Option<Self> {
        let (chroma_width, chroma_height) = chroma_size(width, height);
        Some(Self {
            width,
            height,
            y: Plane::new(y, width, height)?,
            u: Plane::new(u, chroma_width, chroma_height)?,
            v: Plane::new(v, chroma_width, chroma_height)?,
            sequence,
            captured_at: Instant::now(),
        })
    }

    pub fn chroma_size(&self) -> (u32, u32) {
        chroma_size(self.width, self.height)
    }
}

/// Chroma plane dimensions for 4:2:0 subsampling
pub fn chroma_size(width: u32, height: u32) -> (u32, u32) {
    (width / 2, height / 2)
}

/// GPU-importable RGBA buffer delivered through the opaque surface
///
/// The allocation may be larger than the visible image (row alignment,
/// hardware padding). `transform` maps visible texture coordinates into the
/// allocation and must be applied to texture coordinates, never to vertex
/// positions.
#[derive(Clone)]
pub struct SurfaceBuffer {
    /// Visible image size
    pub width: u32,
    pub height: u32,
    /// Allocated size, at least the visible size
    pub buffer_width: u32,
    pub buffer_height: u32,
    /// RGBA8 pixels, `buffer_width * buffer_height * 4` bytes
    pub data: Arc<[u8]>,
    pub transform: Mat4,
    pub sequence: u64,
    pub captured_at: Instant,
}

impl SurfaceBuffer {
    /// Wrap a padded RGBA allocation, deriving the crop transform from the padding
    pub fn new(
        width: u32,
        height: u32,
        buffer_width: u32,
        buffer_height: u32,
        data: Arc<[u8]>,
        sequence: u64,
    ) -> Option<Self> {
        if width == 0
            || height == 0
            || buffer_width < width
            || buffer_height < height
            || data.len() < buffer_width as usize * buffer_height as usize * 4
        {
            return None;
        }

        let transform = mat4::scale(
            width as f32 / buffer_width as f32,
            height as f32 / buffer_height as f32,
        );

        Some(Self {
            width,
            height,
            buffer_width,
            buffer_height,
            data,
            transform,
            sequence,
            captured_at: Instant::now(),
        })
    }
}

impl std::fmt::Debug for SurfaceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceBuffer")
            .field("size", &(self.width, self.height))
            .field("buffer_size", &(self.buffer_width, self.buffer_height))
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Frame inputs shared by every renderer instance
///
/// Created once per pipeline. Renderers come and go; the sources (and the
/// capture session feeding them) survive a renderer switch.
#[derive(Clone)]
pub struct FrameSources {
    pub surface: SurfaceTexture,
    pub planar: Arc<FrameHandoff<PlanarFrame>>,
}

impl FrameSources {
    pub fn new() -> Self {
        Self {
            surface: SurfaceTexture::new(),
            planar: Arc::new(FrameHandoff::new()),
        }
    }
}

impl Default for FrameSources {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planar_frame_rejects_wrong_plane_sizes() {
        let ok = PlanarFrame::from_planes(4, 2, vec![0; 8], vec![0; 2], vec![0; 2], 0);
        assert!(ok.is_some());

        let bad_luma = PlanarFrame::from_planes(4, 2, vec![0; 7], vec![0; 2], vec![0; 2], 0);
        assert!(bad_luma.is_none());

        let bad_chroma = PlanarFrame::from_planes(4, 2, vec![0; 8], vec![0; 4], vec![0; 2], 0);
        assert!(bad_chroma.is_none());
    }

    #[test]
    fn test_surface_buffer_crop_transform() {
        let data: Arc<[u8]> = Arc::from(vec![0u8; 128 * 100 * 4]);
        let buffer = SurfaceBuffer::new(100, 50, 128, 100, data, 1).unwrap();

        let (s, t) = mat4::transform_uv(&buffer.transform, [1.0, 1.0]);
        assert!((s - 100.0 / 128.0).abs() < 1e-6);
        assert!((t - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_surface_buffer_requires_enough_data() {
        let data: Arc<[u8]> = Arc::from(vec![0u8; 16]);
        assert!(SurfaceBuffer::new(4, 4, 4, 4, data, 0).is_none());
    }
}
