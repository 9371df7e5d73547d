// SPDX-License-Identifier: MPL-2.0

//! Camera Preview - real-time camera preview with hot-swappable GPU renderers
//!
//! Frames are produced by a capture session on its own worker thread and
//! consumed by one of three renderers on the drawing context. The two sides
//! only meet in a single-slot frame handoff.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera backend abstraction and capture sessions
//! - [`frame`]: Frame types and the cross-thread handoff
//! - [`gpu`]: Graphics device boundary (wgpu and headless)
//! - [`render`]: The renderers and the selector that swaps them
//! - [`preview`]: Pipeline wiring everything to a display surface
//! - [`snapshot`]: Periodic debug snapshots
//! - [`config`]: User configuration handling
//! - [`storage`]: PNG snapshot persistence
//!
//! # Example
//!
//! ```ignore
//! let backend = Arc::new(SyntheticBackend::new());
//! let mut preview = PreviewPipeline::new(
//!     backend,
//!     Arc::default(),
//!     RendererKind::PlanarColor,
//!     LensFacing::Back,
//!     Resolution::new(1280, 720),
//! );
//! preview.on_surface_created(&mut gpu);
//! preview.on_surface_changed(&mut gpu, 1080, 1920);
//! preview.start()?;
//! loop {
//!     preview.on_draw_frame(&mut gpu)?;
//! }
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod frame;
pub mod gpu;
pub mod preview;
pub mod render;
pub mod shaders;
pub mod snapshot;
pub mod storage;
pub mod viewport;

// Re-export commonly used types
pub use config::Config;
pub use errors::{AppError, AppResult};
pub use preview::{PreviewPipeline, PreviewStats};
pub use render::{RendererKind, RendererSelector};
pub use snapshot::{DebugFrameSink, SnapshotScheduler};
pub use viewport::{ViewportRect, fit_viewport};
