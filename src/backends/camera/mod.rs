// SPDX-License-Identifier: MPL-2.0

//! Camera backend abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │   PreviewPipeline    │
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │    CaptureSession    │  ← State machine, worker thread, claims
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │ CameraBackend Trait  │  ← Enumerate / open
//! └──────────┬───────────┘
//!            │
//!       ┌────┴──────┐
//!       ▼           ▼
//!  ┌─────────┐ ┌─────────┐
//!  │GStreamer│ │Synthetic│
//!  └─────────┘ └─────────┘
//! ```

pub mod frame_loop;
#[cfg(feature = "gstreamer")]
pub mod gst;
pub mod planar;
pub mod session;
pub mod synthetic;
pub mod types;

pub use session::{CaptureSession, ChannelListener, SessionEvent, SessionListener};
pub use synthetic::SyntheticBackend;
pub use types::*;

use crate::errors::CaptureResult;
use std::sync::Arc;
use std::time::Duration;

/// Camera stack entry point: enumeration and opening
pub trait CameraBackend: Send + Sync {
    fn backend_type(&self) -> CameraBackendType;

    /// Enumerate available cameras with their facing
    fn enumerate_cameras(&self) -> CaptureResult<Vec<CameraDescriptor>>;

    /// Open a camera by descriptor
    ///
    /// Errors carry the camera stack's error code (permission, in use, ...).
    fn open(&self, camera: &CameraDescriptor) -> CaptureResult<Box<dyn CameraDevice>>;
}

/// An opened camera
///
/// Driven from a single worker thread: configure once, then poll frames
/// until closed.
pub trait CameraDevice: Send {
    /// Output sizes this camera offers for a sink kind, in enumeration order
    fn output_resolutions(&self, sink: SinkKind) -> CaptureResult<Vec<Resolution>>;

    /// Start a repeating capture into `sink`
    fn start_repeating(&mut self, resolution: Resolution, sink: FrameSink) -> CaptureResult<()>;

    /// Wait up to `timeout` for one frame and deliver it to the sink
    ///
    /// Returns whether a frame was delivered. Errors are fatal for the stream.
    fn poll_frame(&mut self, timeout: Duration) -> CaptureResult<bool>;

    /// Stop capturing and release the device. Idempotent.
    fn close(&mut self);
}

/// Get a backend implementation by type
pub fn get_backend(backend_type: CameraBackendType) -> CaptureResult<Arc<dyn CameraBackend>> {
    match backend_type {
        #[cfg(feature = "gstreamer")]
        CameraBackendType::GStreamer => Ok(Arc::new(gst::GStreamerBackend::new()?)),
        #[cfg(not(feature = "gstreamer"))]
        CameraBackendType::GStreamer => Err(crate::errors::CaptureError::ServiceError(
            "built without GStreamer support".to_string(),
        )),
        CameraBackendType::Synthetic => Ok(Arc::new(SyntheticBackend::new())),
    }
}

/// Pick the first camera facing `facing`, or the first camera at all
pub fn choose_camera(cameras: &[CameraDescriptor], facing: LensFacing) -> Option<&CameraDescriptor> {
    cameras
        .iter()
        .find(|camera| camera.facing == facing)
        .or_else(|| {
            let fallback = cameras.first();
            if let Some(camera) = fallback {
                tracing::warn!(
                    requested = %facing,
                    fallback = %camera,
                    "No camera with requested facing, using first camera"
                );
            }
            fallback
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(id: &str, facing: LensFacing) -> CameraDescriptor {
        CameraDescriptor {
            id: id.to_string(),
            name: id.to_string(),
            facing,
            backend: CameraBackendType::Synthetic,
        }
    }

    #[test]
    fn test_choose_matching_facing() {
        let cameras = [camera("a", LensFacing::Back), camera("b", LensFacing::Front)];
        assert_eq!(choose_camera(&cameras, LensFacing::Front).unwrap().id, "b");
    }

    #[test]
    fn test_choose_falls_back_to_first() {
        let cameras = [camera("a", LensFacing::External), camera("b", LensFacing::External)];
        assert_eq!(choose_camera(&cameras, LensFacing::Front).unwrap().id, "a");
        assert!(choose_camera(&[], LensFacing::Back).is_none());
    }
}
