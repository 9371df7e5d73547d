// SPDX-License-Identifier: MPL-2.0

//! GStreamer camera backend
//!
//! Cameras are discovered with a `DeviceMonitor` (which covers V4L2,
//! libcamera and PipeWire providers, whichever are installed) and streamed
//! through `source ! videoconvert ! videoscale ! appsink`. The capture worker
//! pulls samples from the appsink synchronously.

mod enumeration;
mod pipeline;

use super::{CameraBackend, CameraBackendType, CameraDescriptor, CameraDevice};
use crate::errors::{CaptureError, CaptureResult};
use tracing::{debug, info};

/// Real camera backend
pub struct GStreamerBackend {
    _priv: (),
}

impl GStreamerBackend {
    /// Initialize GStreamer. Fails with `ServiceError` when it is unusable.
    pub fn new() -> CaptureResult<Self> {
        debug!("Initializing GStreamer");
        gstreamer::init().map_err(|e| CaptureError::ServiceError(e.to_string()))?;
        info!(version = %gstreamer::version_string(), "GStreamer initialized");
        Ok(Self { _priv: () })
    }
}

impl CameraBackend for GStreamerBackend {
    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::GStreamer
    }

    fn enumerate_cameras(&self) -> CaptureResult<Vec<CameraDescriptor>> {
        Ok(enumeration::discover()?
            .into_iter()
            .map(|camera| camera.descriptor)
            .collect())
    }

    fn open(&self, camera: &CameraDescriptor) -> CaptureResult<Box<dyn CameraDevice>> {
        // Devices are only valid while their monitor's snapshot is, so look the
        // camera up again rather than caching handles between enumerate and open
        let discovered = enumeration::discover()?
            .into_iter()
            .find(|candidate| candidate.descriptor.id == camera.id)
            .ok_or_else(|| {
                CaptureError::DeviceError(format!("camera '{}' disappeared", camera.id))
            })?;

        info!(camera = %camera, "Opening GStreamer camera");
        Ok(Box::new(pipeline::GStreamerDevice::new(discovered)))
    }
}

/// Translate a GStreamer error into the capture error taxonomy
///
/// `NoSpaceLeft` is what v4l2 sources raise when the driver has no free
/// stream slots, so it maps to `TooManyOpenDevices`. `NotFound` on a device
/// that enumeration just returned means the node was switched off, which
/// is reported as `DeviceDisabled`.
fn map_gst_error(error: &gstreamer::glib::Error) -> CaptureError {
    use gstreamer::{CoreError, ResourceError};

    if let Some(kind) = error.kind::<ResourceError>() {
        return match kind {
            ResourceError::Busy => CaptureError::DeviceInUse,
            ResourceError::NoSpaceLeft => CaptureError::TooManyOpenDevices,
            ResourceError::NotFound => CaptureError::DeviceDisabled,
            ResourceError::NotAuthorized => CaptureError::PermissionDenied,
            ResourceError::Settings => CaptureError::ConfigurationFailed(error.to_string()),
            ResourceError::Failed => CaptureError::ServiceError(error.to_string()),
            _ => CaptureError::DeviceError(error.to_string()),
        };
    }
    if let Some(CoreError::MissingPlugin) = error.kind::<CoreError>() {
        return CaptureError::ServiceError(error.to_string());
    }
    if error.kind::<gstreamer::StreamError>().is_some() {
        return CaptureError::ConfigurationFailed(error.to_string());
    }
    CaptureError::DeviceError(error.to_string())
}
