// SPDX-License-Identifier: GPL-3.0-only

//! Opaque surface: the zero-copy frame path
//!
//! The capture side queues GPU-importable buffers through a
//! [`SurfaceProducer`]; the drawing side latches the newest one into an
//! external texture with [`SurfaceTexture::update_tex_image`]. Consumption is
//! two-phase so a failed latch leaves the buffer pending for the next tick.

use super::{FrameCallback, FrameHandoff, SurfaceBuffer};
use crate::errors::RenderResult;
use crate::gpu::mat4::Mat4;
use crate::gpu::{GpuDevice, TextureId};
use std::sync::Arc;
use tracing::trace;

/// Consumer side of the opaque surface
#[derive(Clone)]
pub struct SurfaceTexture {
    handoff: Arc<FrameHandoff<Arc<SurfaceBuffer>>>,
}

/// Producer side of the opaque surface, handed to the capture session
#[derive(Clone)]
pub struct SurfaceProducer {
    handoff: Arc<FrameHandoff<Arc<SurfaceBuffer>>>,
}

impl SurfaceTexture {
    pub fn new() -> Self {
        Self {
            handoff: Arc::new(FrameHandoff::new()),
        }
    }

    pub fn producer(&self) -> SurfaceProducer {
        SurfaceProducer {
            handoff: Arc::clone(&self.handoff),
        }
    }

    /// Latch the newest queued buffer into `texture`
    ///
    /// Returns the buffer's texture-coordinate transform when a new buffer was
    /// latched, `None` when nothing was pending (or the camera is inactive).
    /// On error the buffer stays pending.
    pub fn update_tex_image(
        &self,
        gpu: &mut dyn GpuDevice,
        texture: TextureId,
    ) -> RenderResult<Option<Mat4>> {
        let Some((sequence, buffer)) = self.handoff.pending() else {
            return Ok(None);
        };

        gpu.latch_surface(texture, &buffer)?;
        // A newer buffer may have arrived during the latch, keep it pending
        self.handoff.acknowledge(sequence);
        trace!(sequence = buffer.sequence, "Surface buffer latched");
        Ok(Some(buffer.transform))
    }

    pub fn set_camera_active(&self, active: bool) {
        self.handoff.set_camera_active(active);
    }

    pub fn is_camera_active(&self) -> bool {
        self.handoff.is_camera_active()
    }

    pub fn is_frame_available(&self) -> bool {
        self.handoff.is_frame_available()
    }

    pub fn set_on_frame_available(&self, callback: Option<FrameCallback>) {
        self.handoff.set_on_frame_available(callback);
    }

    /// Drop any queued buffer
    pub fn reset(&self) {
        self.handoff.reset();
    }

    pub fn frames_published(&self) -> u64 {
        self.handoff.frames_published()
    }

    pub fn frames_dropped(&self) -> u64 {
        self.handoff.frames_dropped()
    }
}

impl Default for SurfaceTexture {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceProducer {
    /// Queue a buffer, replacing any the consumer has not latched yet
    pub fn queue_buffer(&self, buffer: SurfaceBuffer) {
        self.handoff.publish(Arc::new(buffer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{HeadlessDevice, TextureKind};

    fn buffer(sequence: u64) -> SurfaceBuffer {
        let data: Arc<[u8]> = Arc::from(vec![0u8; 8 * 4 * 4]);
        SurfaceBuffer::new(6, 4, 8, 4, data, sequence).unwrap()
    }

    #[test]
    fn test_failed_latch_keeps_buffer_pending() {
        let surface = SurfaceTexture::new();
        surface.set_camera_active(true);
        let producer = surface.producer();

        let mut gpu = HeadlessDevice::new(16, 16);
        let texture = gpu.create_texture(TextureKind::External, 1, 1).unwrap();

        producer.queue_buffer(buffer(1));
        gpu.fail_next_latches(1);
        assert!(surface.update_tex_image(&mut gpu, texture).is_err());
        assert!(surface.is_frame_available());

        let transform = surface.update_tex_image(&mut gpu, texture).unwrap();
        assert!(transform.is_some());
        assert!(!surface.is_frame_available());
        assert_eq!(gpu.latched_sequence(texture), Some(1));
        assert_eq!(gpu.texture_size(texture), Some((8, 4)));
    }

    #[test]
    fn test_nothing_latched_while_inactive() {
        let surface = SurfaceTexture::new();
        let mut gpu = HeadlessDevice::new(16, 16);
        let texture = gpu.create_texture(TextureKind::External, 1, 1).unwrap();

        surface.producer().queue_buffer(buffer(1));
        assert_eq!(surface.update_tex_image(&mut gpu, texture).unwrap(), None);
        assert_eq!(gpu.latched_sequence(texture), None);
    }
}
