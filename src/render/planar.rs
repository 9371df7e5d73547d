// SPDX-License-Identifier: GPL-3.0-only

//! Planar color renderer
//!
//! Uploads the luma and both chroma planes of each frame into single-channel
//! textures and converts to RGB in the fragment shader. The projection is
//! rotated to turn the landscape sensor image upright on a portrait display.

use super::{
    Renderer, RendererCallbacks, RendererConfig, RendererKind, RendererState,
    create_program_logged, rotated_projection,
};
use crate::backends::camera::LensFacing;
use crate::errors::{RenderError, RenderResult};
use crate::frame::{FrameHandoff, PlanarFrame, chroma_size};
use crate::gpu::mat4;
use crate::gpu::{DrawCall, DrawUniforms, GpuDevice, ProgramId, Quad, TextureId, TextureKind};
use crate::viewport::ViewportRect;
use std::sync::Arc;
use tracing::{debug, warn};

/// Size the plane textures start at before the first frame
const INITIAL_PLANE_SIZE: (u32, u32) = (2, 2);

/// BT.601 full-range conversion, the CPU counterpart of the planar shader
///
/// Inputs and outputs are normalized to `[0, 1]`.
pub fn yuv_to_rgb(y: f32, u: f32, v: f32) -> [f32; 3] {
    let u = u - 0.5;
    let v = v - 0.5;
    [
        (y + 1.402 * v).clamp(0.0, 1.0),
        (y - 0.34414 * u - 0.71414 * v).clamp(0.0, 1.0),
        (y + 1.772 * u).clamp(0.0, 1.0),
    ]
}

/// Plane dimensions and lengths must match a 4:2:0 frame of the frame's size
fn check_planes(frame: &PlanarFrame) -> RenderResult<()> {
    let (chroma_width, chroma_height) = frame.chroma_size();
    let expected = [
        ("y", &frame.y, frame.width, frame.height),
        ("u", &frame.u, chroma_width, chroma_height),
        ("v", &frame.v, chroma_width, chroma_height),
    ];
    for (name, plane, width, height) in expected {
        if plane.width != width
            || plane.height != height
            || plane.data.len() != width as usize * height as usize
        {
            return Err(RenderError::TextureUpdateTransientFailure(format!(
                "{} plane is {}x{} with {} bytes, expected {}x{}",
                name,
                plane.width,
                plane.height,
                plane.data.len(),
                width,
                height
            )));
        }
    }
    Ok(())
}

/// The three plane textures, luma first
#[derive(Debug, Clone, Copy)]
struct PlaneTextures {
    luma: TextureId,
    chroma_u: TextureId,
    chroma_v: TextureId,
}

impl PlaneTextures {
    fn as_array(&self) -> [TextureId; 3] {
        [self.luma, self.chroma_u, self.chroma_v]
    }
}

pub struct PlanarColorRenderer {
    state: RendererState,
    frames: Arc<FrameHandoff<PlanarFrame>>,
    program: Option<ProgramId>,
    planes: Option<PlaneTextures>,
    /// Size of the frame currently held in the textures
    uploaded: Option<(u32, u32)>,
}

impl PlanarColorRenderer {
    pub fn new(config: Arc<RendererConfig>, frames: Arc<FrameHandoff<PlanarFrame>>) -> Self {
        Self {
            state: RendererState::new(config),
            frames,
            program: None,
            planes: None,
            uploaded: None,
        }
    }

    fn create_planes(&mut self, gpu: &mut dyn GpuDevice) -> RenderResult<PlaneTextures> {
        let (width, height) = self.state.preview_size.unwrap_or(INITIAL_PLANE_SIZE);
        let (chroma_width, chroma_height) = chroma_size(width, height);
        let (chroma_width, chroma_height) = (chroma_width.max(1), chroma_height.max(1));

        let luma = gpu.create_texture(TextureKind::Luma, width, height)?;
        let chroma_u = gpu
            .create_texture(TextureKind::Luma, chroma_width, chroma_height)
            .inspect_err(|_| gpu.delete_texture(luma))?;
        let chroma_v = gpu
            .create_texture(TextureKind::Luma, chroma_width, chroma_height)
            .inspect_err(|_| {
                gpu.delete_texture(luma);
                gpu.delete_texture(chroma_u);
            })?;

        Ok(PlaneTextures {
            luma,
            chroma_u,
            chroma_v,
        })
    }

    /// Upload all three planes; textures follow the frame size
    ///
    /// Plane sizes are checked before the first write, so a malformed frame
    /// leaves every texture untouched.
    fn upload(
        gpu: &mut dyn GpuDevice,
        planes: PlaneTextures,
        frame: &PlanarFrame,
    ) -> RenderResult<()> {
        check_planes(frame)?;
        for (texture, plane) in [
            (planes.luma, &frame.y),
            (planes.chroma_u, &frame.u),
            (planes.chroma_v, &frame.v),
        ] {
            gpu.write_texture(texture, plane.width, plane.height, &plane.data)?;
        }
        Ok(())
    }
}

impl Renderer for PlanarColorRenderer {
    fn kind(&self) -> RendererKind {
        RendererKind::PlanarColor
    }

    fn on_surface_created(&mut self, gpu: &mut dyn GpuDevice) {
        self.release(gpu);
        self.program = create_program_logged(gpu, &self.state.config.planar_program);
        match self.create_planes(gpu) {
            Ok(planes) => self.planes = Some(planes),
            Err(e) => warn!(error = %e, "Failed to create plane textures"),
        }
    }

    fn on_surface_changed(&mut self, _gpu: &mut dyn GpuDevice, width: u32, height: u32) {
        self.state.surface_changed(width, height);
    }

    fn on_draw_frame(&mut self, gpu: &mut dyn GpuDevice) -> RenderResult<bool> {
        self.state.clear_screen(gpu);

        if !self.frames.is_camera_active() {
            return Ok(false);
        }
        let Some(planes) = self.planes else {
            return Ok(false);
        };

        // Only acknowledged once all three planes are in, so a failed upload
        // is retried with the same (or a newer) frame on the next tick
        if let Some((sequence, frame)) = self.frames.pending() {
            match Self::upload(gpu, planes, &frame) {
                Ok(()) => {
                    if self.uploaded != Some((frame.width, frame.height)) {
                        debug!(width = frame.width, height = frame.height, "Plane textures resized");
                    }
                    self.uploaded = Some((frame.width, frame.height));
                    self.frames.acknowledge(sequence);
                }
                Err(RenderError::TextureUpdateTransientFailure(reason)) => {
                    debug!(%reason, sequence = frame.sequence, "Plane upload failed, retrying next frame");
                    // Some planes may already hold the new frame
                    self.uploaded = None;
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
        }

        if self.uploaded.is_none() || self.state.viewport.is_empty() {
            return Ok(false);
        }
        let Some(program) = self.program else {
            return Ok(false);
        };

        let config = &self.state.config;
        let quad = Quad::full(config.planar_tables.for_facing(self.state.lens_facing));
        let textures = planes.as_array();
        gpu.set_viewport(self.state.viewport);
        gpu.draw(&DrawCall {
            program,
            textures: &textures,
            quad: &quad,
            uniforms: DrawUniforms {
                mvp: rotated_projection(config.planar_rotation_degrees),
                tex_transform: mat4::IDENTITY,
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
            self.uploaded = None;
        }
        self.frames.set_camera_active(active);
    }

    fn is_camera_active(&self) -> bool {
        self.frames.is_camera_active()
    }

    fn set_callbacks(&mut self, callbacks: &RendererCallbacks) {
        self.frames
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
        if let Some(planes) = self.planes.take() {
            for texture in planes.as_array() {
                gpu.delete_texture(texture);
            }
        }
        self.uploaded = None;
    }
}
