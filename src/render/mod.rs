// SPDX-License-Identifier: GPL-3.0-only

//! Preview renderers
//!
//! Three interchangeable strategies draw camera frames to the display
//! surface. Each owns its GPU resources outright and releases them before it
//! is discarded; the [`RendererSelector`] holds exactly one at a time.
//!
//! | Kind                 | Frame source        | Passes                      |
//! |----------------------|---------------------|-----------------------------|
//! | `DirectTexture`      | opaque surface      | 1                           |
//! | `PlanarColor`        | planar handoff      | 1 (3 plane uploads)         |
//! | `OffscreenComposite` | opaque surface      | 3 (frame, tinted PiP, blit) |
//!
//! All renderer calls happen on the drawing context.

pub mod offscreen;
pub mod planar;
pub mod selector;
pub mod texture;

pub use offscreen::{OffscreenCompositor, apply_tint};
pub use planar::{PlanarColorRenderer, yuv_to_rgb};
pub use selector::RendererSelector;
pub use texture::TextureRenderer;

use crate::backends::camera::{LensFacing, SinkKind};
use crate::constants::{self, pip};
use crate::errors::RenderResult;
use crate::frame::FrameCallback;
use crate::gpu::mat4::{self, Mat4};
use crate::gpu::{GpuDevice, ProgramId, ProgramSource, RenderTarget};
use crate::shaders;
use crate::viewport::{ViewportRect, fit_viewport};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Rendering strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RendererKind {
    /// Opaque surface drawn straight to the screen
    #[default]
    #[serde(rename = "direct")]
    DirectTexture,
    /// Planes uploaded separately, color converted in the shader
    #[serde(rename = "planar")]
    PlanarColor,
    /// Offscreen pass with a tinted picture-in-picture, then blit
    #[serde(rename = "offscreen")]
    OffscreenComposite,
}

impl RendererKind {
    pub const ALL: [RendererKind; 3] = [
        RendererKind::DirectTexture,
        RendererKind::PlanarColor,
        RendererKind::OffscreenComposite,
    ];

    /// Form of frames this renderer consumes
    pub fn sink_kind(self) -> SinkKind {
        match self {
            RendererKind::DirectTexture | RendererKind::OffscreenComposite => SinkKind::Surface,
            RendererKind::PlanarColor => SinkKind::Planar,
        }
    }

    /// Following kind in [`RendererKind::ALL`], wrapping around
    pub fn next(self) -> Self {
        let index = Self::ALL.iter().position(|k| *k == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }
}

impl std::fmt::Display for RendererKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RendererKind::DirectTexture => write!(f, "direct"),
            RendererKind::PlanarColor => write!(f, "planar"),
            RendererKind::OffscreenComposite => write!(f, "offscreen"),
        }
    }
}

impl FromStr for RendererKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" | "direct-texture" | "texture" => Ok(RendererKind::DirectTexture),
            "planar" | "planar-color" | "yuv" => Ok(RendererKind::PlanarColor),
            "offscreen" | "offscreen-composite" | "composite" => {
                Ok(RendererKind::OffscreenComposite)
            }
            other => Err(format!("unknown renderer '{}'", other)),
        }
    }
}

/// Texture coordinates for a full quad, vertex order BL, BR, TL, TR
pub type TexCoords = [[f32; 2]; 4];

/// Coordinate tables per lens facing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexCoordTables {
    pub front: TexCoords,
    pub back: TexCoords,
}

impl TexCoordTables {
    /// `External` cameras use the back table
    pub fn for_facing(&self, facing: LensFacing) -> TexCoords {
        if facing.is_front() {
            self.front
        } else {
            self.back
        }
    }
}

/// Default coordinate tables
///
/// Texture row 0 is the top of the camera image, so `UPRIGHT` maps the top
/// screen edge to `v = 0`.
pub mod tables {
    use super::{TexCoordTables, TexCoords};

    /// Image upright, unmirrored
    pub const UPRIGHT: TexCoords = [[0.0, 1.0], [1.0, 1.0], [0.0, 0.0], [1.0, 0.0]];

    /// Image upright, mirrored left-right
    pub const MIRRORED: TexCoords = [[1.0, 1.0], [0.0, 1.0], [1.0, 0.0], [0.0, 0.0]];

    /// Raw texture space, `v = 0` at the bottom edge
    pub const RAW: TexCoords = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];

    /// Direct texture path: front mirrored, back flipped vertically only
    pub const DIRECT: TexCoordTables = TexCoordTables {
        front: MIRRORED,
        back: UPRIGHT,
    };

    /// Planar path, drawn through a 90° rotation
    ///
    /// The rotation turns the screen's horizontal axis into texture `v`, so
    /// the front mirror is a `v` flip of upright. Back is front flipped
    /// left-right in texture space, which is not the direct path's back
    /// table.
    pub const PLANAR: TexCoordTables = TexCoordTables {
        front: RAW,
        back: [[1.0, 0.0], [0.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
    };

    /// Offscreen color target to screen
    pub const BLIT: TexCoords = UPRIGHT;

    /// Flip a table left-right in texture space
    pub fn flip_u(coords: TexCoords) -> TexCoords {
        coords.map(|[u, v]| [1.0 - u, v])
    }

    /// Flip a table top-bottom in texture space
    pub fn flip_v(coords: TexCoords) -> TexCoords {
        coords.map(|[u, v]| [u, 1.0 - v])
    }
}

/// Immutable renderer configuration, shared by every renderer instance
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Preview aspect ratio (width / height)
    pub aspect_ratio: f32,
    pub clear_color: [f32; 4],
    pub external_program: ProgramSource,
    pub planar_program: ProgramSource,
    pub tint_program: ProgramSource,
    pub blit_program: ProgramSource,
    pub direct_tables: TexCoordTables,
    pub planar_tables: TexCoordTables,
    pub blit_tex_coords: TexCoords,
    /// Rotation applied to the planar path's projection
    pub planar_rotation_degrees: f32,
    /// Fraction of the offscreen target covered by the picture-in-picture
    pub pip_fraction: f32,
    pub tint_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            aspect_ratio: constants::TARGET_ASPECT_RATIO,
            clear_color: constants::CLEAR_COLOR,
            external_program: shaders::EXTERNAL_QUAD,
            planar_program: shaders::PLANAR_YUV,
            tint_program: shaders::PIP_TINT,
            blit_program: shaders::BLIT,
            direct_tables: tables::DIRECT,
            planar_tables: tables::PLANAR,
            blit_tex_coords: tables::BLIT,
            planar_rotation_degrees: 90.0,
            pip_fraction: pip::FRACTION,
            tint_color: pip::TINT_COLOR,
        }
    }
}

/// Called with the new viewport whenever the surface size changes
pub type ViewportCallback = Arc<dyn Fn(ViewportRect) + Send + Sync>;

/// Host callbacks carried across renderer switches
#[derive(Clone, Default)]
pub struct RendererCallbacks {
    /// Fired on the capture thread when the renderer's source gets a frame
    pub on_frame_available: Option<FrameCallback>,
    pub on_viewport_changed: Option<ViewportCallback>,
}

impl std::fmt::Debug for RendererCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererCallbacks")
            .field("on_frame_available", &self.on_frame_available.is_some())
            .field("on_viewport_changed", &self.on_viewport_changed.is_some())
            .finish()
    }
}

/// One rendering strategy
///
/// Lifecycle: `on_surface_created` creates GPU resources, `on_surface_changed`
/// sizes them, `on_draw_frame` runs once per tick and `release` deletes
/// everything the renderer created.
pub trait Renderer {
    fn kind(&self) -> RendererKind;

    fn on_surface_created(&mut self, gpu: &mut dyn GpuDevice);

    fn on_surface_changed(&mut self, gpu: &mut dyn GpuDevice, width: u32, height: u32);

    /// Draw one tick. Returns whether camera content was drawn.
    fn on_draw_frame(&mut self, gpu: &mut dyn GpuDevice) -> RenderResult<bool>;

    /// Camera output size, known once the session is configured
    fn set_preview_size(&mut self, width: u32, height: u32);

    fn set_lens_facing(&mut self, facing: LensFacing);

    fn set_camera_active(&mut self, active: bool);

    fn is_camera_active(&self) -> bool;

    fn set_callbacks(&mut self, callbacks: &RendererCallbacks);

    /// Current fitted viewport in surface pixels
    fn viewport(&self) -> ViewportRect;

    /// Delete every GPU resource this renderer created
    fn release(&mut self, gpu: &mut dyn GpuDevice);
}

/// Bookkeeping every renderer keeps
#[derive(Debug, Clone)]
pub(crate) struct RendererState {
    pub config: Arc<RendererConfig>,
    pub surface_size: (u32, u32),
    pub viewport: ViewportRect,
    pub preview_size: Option<(u32, u32)>,
    pub lens_facing: LensFacing,
    pub callbacks: RendererCallbacks,
}

impl RendererState {
    pub fn new(config: Arc<RendererConfig>) -> Self {
        Self {
            config,
            surface_size: (0, 0),
            viewport: ViewportRect::default(),
            preview_size: None,
            lens_facing: LensFacing::default(),
            callbacks: RendererCallbacks::default(),
        }
    }

    /// Refit the viewport and notify the host
    pub fn surface_changed(&mut self, width: u32, height: u32) {
        self.surface_size = (width, height);
        self.viewport = fit_viewport(width, height, self.config.aspect_ratio);
        debug!(width, height, viewport = %self.viewport, "Surface changed");
        if let Some(callback) = &self.callbacks.on_viewport_changed {
            callback(self.viewport);
        }
    }

    /// Bind the screen and clear all of it
    pub fn clear_screen(&self, gpu: &mut dyn GpuDevice) {
        let (width, height) = self.surface_size;
        gpu.bind_target(RenderTarget::Screen);
        gpu.set_viewport(ViewportRect::full(width, height));
        gpu.clear(self.config.clear_color);
    }
}

/// Create a program, logging instead of failing
///
/// A renderer without a program skips its draws.
pub(crate) fn create_program_logged(
    gpu: &mut dyn GpuDevice,
    source: &ProgramSource,
) -> Option<ProgramId> {
    match gpu.create_program(source) {
        Ok(program) => Some(program),
        Err(e) => {
            warn!(program = %source.label, error = %e, "Program creation failed, draws disabled");
            None
        }
    }
}

/// Projection rotated by `degrees` around the view axis
pub(crate) fn rotated_projection(degrees: f32) -> Mat4 {
    if degrees == 0.0 {
        mat4::IDENTITY
    } else {
        mat4::rotation_z(degrees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing_and_display() {
        for kind in RendererKind::ALL {
            assert_eq!(kind.to_string().parse::<RendererKind>(), Ok(kind));
        }
        assert_eq!(
            "offscreen-composite".parse::<RendererKind>(),
            Ok(RendererKind::OffscreenComposite)
        );
        assert!("opengl".parse::<RendererKind>().is_err());
    }

    #[test]
    fn test_kind_sink() {
        assert_eq!(RendererKind::DirectTexture.sink_kind(), SinkKind::Surface);
        assert_eq!(RendererKind::PlanarColor.sink_kind(), SinkKind::Planar);
        assert_eq!(RendererKind::OffscreenComposite.sink_kind(), SinkKind::Surface);
    }

    #[test]
    fn test_kind_cycle() {
        let mut kind = RendererKind::DirectTexture;
        for _ in 0..3 {
            kind = kind.next();
        }
        assert_eq!(kind, RendererKind::DirectTexture);
    }

    #[test]
    fn test_kind_serde_names() {
        let json = serde_json::to_string(&RendererKind::PlanarColor).unwrap();
        assert_eq!(json, "\"planar\"");
    }

    #[test]
    fn test_table_relations() {
        // Front tables mirror the back tables on the direct path
        assert_eq!(tables::flip_u(tables::DIRECT.back), tables::DIRECT.front);
        // Direct back is the raw table flipped vertically
        assert_eq!(tables::flip_v(tables::RAW), tables::DIRECT.back);
        // Planar back is planar front flipped left-right
        assert_eq!(tables::flip_u(tables::PLANAR.front), tables::PLANAR.back);
        // The two back tables intentionally differ
        assert_ne!(tables::PLANAR.back, tables::DIRECT.back);
    }

    #[test]
    fn test_external_uses_back_table() {
        assert_eq!(
            tables::DIRECT.for_facing(LensFacing::External),
            tables::DIRECT.back
        );
        assert_eq!(
            tables::DIRECT.for_facing(LensFacing::Front),
            tables::DIRECT.front
        );
    }
}
