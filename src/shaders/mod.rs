// SPDX-License-Identifier: GPL-3.0-only

//! WGSL programs used by the renderers
//!
//! All programs share one interface so a single bind group layout serves
//! every renderer:
//!
//! - `@binding(0)`: `DrawUniforms { mvp, tex_transform, tint }`
//! - `@binding(1)`: filtering sampler
//! - `@binding(2..=4)`: up to three 2D float textures
//! - vertex inputs: `@location(0)` position, `@location(1)` texture coordinate
//! - entry points: `vs_main`, `fs_main`

use crate::gpu::ProgramSource;

/// Opaque-surface frame, texture transform applied to coordinates
pub const EXTERNAL_QUAD: ProgramSource =
    ProgramSource::from_static("external-quad", include_str!("external_quad.wgsl"));

/// Three R8 planes converted to RGB in the fragment stage
pub const PLANAR_YUV: ProgramSource =
    ProgramSource::from_static("planar-yuv", include_str!("planar_yuv.wgsl"));

/// Camera frame blended with a constant tint for the picture-in-picture pass
pub const PIP_TINT: ProgramSource =
    ProgramSource::from_static("pip-tint", include_str!("pip_tint.wgsl"));

/// Offscreen color target copied to the screen
pub const BLIT: ProgramSource = ProgramSource::from_static("blit", include_str!("blit.wgsl"));

/// Every program, for validation
pub const ALL: [ProgramSource; 4] = [EXTERNAL_QUAD, PLANAR_YUV, PIP_TINT, BLIT];
