// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for camera capture
//!
//! The backend layer abstracts hardware access, giving the preview pipeline
//! one API regardless of where frames come from:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Preview Pipeline                │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                   │
//! │  ┌─────────────┐    ┌──────────────────┐   │
//! │  │  GStreamer  │    │    Synthetic     │   │
//! │  │  (devices)  │    │  (test pattern)  │   │
//! │  └─────────────┘    └──────────────────┘   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Camera backends, capture sessions and frame compaction

pub mod camera;
