// SPDX-License-Identifier: MPL-2.0

//! Error types for the preview pipeline
//!
//! Errors are grouped by the execution context that produces them:
//! - [`CaptureError`]: camera worker context, surfaced through the session listener
//! - [`RenderError`]: drawing context, never allowed to escape the draw loop
//! - [`SnapshotError`]: snapshot offload context, isolated per snapshot

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type for capture session and camera backend operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Result type for GPU and renderer operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Camera capture errors
    Capture(CaptureError),
    /// GPU / renderer errors
    Render(RenderError),
    /// Debug snapshot errors
    Snapshot(SnapshotError),
    /// Configuration errors
    Config(String),
    /// Generic error with message
    Other(String),
}

/// Capture session errors
///
/// The first seven variants mirror the error codes a camera stack reports when
/// opening or configuring a device. They are delivered asynchronously and are
/// only recoverable by starting a fresh session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Access to the camera was refused
    PermissionDenied,
    /// Camera is already streaming in this or another session
    DeviceInUse,
    /// The camera service refuses to open more devices
    TooManyOpenDevices,
    /// Camera disabled by policy
    DeviceDisabled,
    /// Fatal device fault
    DeviceError(String),
    /// Camera service fault
    ServiceError(String),
    /// Stream could not be configured for the requested sink
    ConfigurationFailed(String),
    /// Enumeration returned no cameras
    NoCameraAvailable,
    /// `start()` called while a session is already running
    AlreadyStarted,
}

/// GPU and renderer errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Shader source failed to compile
    ShaderCompileFailed(String),
    /// Shader stages failed to link into a program
    ProgramLinkFailed(String),
    /// Offscreen render target could not be completed
    FramebufferIncomplete(String),
    /// Latching or uploading a frame failed, retry next tick
    TextureUpdateTransientFailure(String),
    /// Reading back rendered pixels failed
    ReadbackFailed(String),
    /// Handle does not name a live resource
    InvalidHandle(String),
}

/// Debug snapshot errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// Pixel buffer could not be encoded
    Encode(String),
    /// Encoded image could not be written
    Io(String),
}

impl CaptureError {
    /// Whether this error belongs to the "device unavailable" family
    ///
    /// Covers missing devices, devices in use, open limits, disabled devices
    /// and device or service faults.
    pub fn is_device_unavailable(&self) -> bool {
        matches!(
            self,
            CaptureError::DeviceInUse
                | CaptureError::TooManyOpenDevices
                | CaptureError::DeviceDisabled
                | CaptureError::DeviceError(_)
                | CaptureError::ServiceError(_)
                | CaptureError::NoCameraAvailable
        )
    }

    /// Short stable code for logs and the CLI summary
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::PermissionDenied => "permission-denied",
            CaptureError::DeviceInUse => "device-in-use",
            CaptureError::TooManyOpenDevices => "too-many-open-devices",
            CaptureError::DeviceDisabled => "device-disabled",
            CaptureError::DeviceError(_) => "device-error",
            CaptureError::ServiceError(_) => "service-error",
            CaptureError::ConfigurationFailed(_) => "configuration-failed",
            CaptureError::NoCameraAvailable => "no-camera",
            CaptureError::AlreadyStarted => "already-started",
        }
    }
}

impl RenderError {
    /// Transient errors leave the pending frame in place for the next tick
    pub fn is_transient(&self) -> bool {
        matches!(self, RenderError::TextureUpdateTransientFailure(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Capture(e) => write!(f, "Capture error: {}", e),
            AppError::Render(e) => write!(f, "Render error: {}", e),
            AppError::Snapshot(e) => write!(f, "Snapshot error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::PermissionDenied => write!(f, "Camera permission denied"),
            CaptureError::DeviceInUse => write!(f, "Camera is already in use"),
            CaptureError::TooManyOpenDevices => write!(f, "Too many cameras open"),
            CaptureError::DeviceDisabled => write!(f, "Camera is disabled"),
            CaptureError::DeviceError(msg) => write!(f, "Camera device error: {}", msg),
            CaptureError::ServiceError(msg) => write!(f, "Camera service error: {}", msg),
            CaptureError::ConfigurationFailed(msg) => {
                write!(f, "Session configuration failed: {}", msg)
            }
            CaptureError::NoCameraAvailable => write!(f, "No camera devices found"),
            CaptureError::AlreadyStarted => write!(f, "Capture session already started"),
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::ShaderCompileFailed(msg) => write!(f, "Shader compile failed: {}", msg),
            RenderError::ProgramLinkFailed(msg) => write!(f, "Program link failed: {}", msg),
            RenderError::FramebufferIncomplete(msg) => {
                write!(f, "Framebuffer incomplete: {}", msg)
            }
            RenderError::TextureUpdateTransientFailure(msg) => {
                write!(f, "Texture update failed (transient): {}", msg)
            }
            RenderError::ReadbackFailed(msg) => write!(f, "Pixel readback failed: {}", msg),
            RenderError::InvalidHandle(msg) => write!(f, "Invalid GPU handle: {}", msg),
        }
    }
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::Encode(msg) => write!(f, "Snapshot encoding failed: {}", msg),
            SnapshotError::Io(msg) => write!(f, "Snapshot write failed: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for CaptureError {}
impl std::error::Error for RenderError {}
impl std::error::Error for SnapshotError {}

// Conversions from sub-errors to AppError
impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        AppError::Capture(err)
    }
}

impl From<RenderError> for AppError {
    fn from(err: RenderError) -> Self {
        AppError::Render(err)
    }
}

impl From<SnapshotError> for AppError {
    fn from(err: SnapshotError) -> Self {
        AppError::Snapshot(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for SnapshotError {
    fn from(err: std::io::Error) -> Self {
        SnapshotError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_unavailable_family() {
        assert!(CaptureError::DeviceInUse.is_device_unavailable());
        assert!(CaptureError::ServiceError("gone".into()).is_device_unavailable());
        assert!(CaptureError::NoCameraAvailable.is_device_unavailable());
        assert!(!CaptureError::PermissionDenied.is_device_unavailable());
        assert!(!CaptureError::ConfigurationFailed("x".into()).is_device_unavailable());
    }

    #[test]
    fn test_transient_render_errors() {
        assert!(RenderError::TextureUpdateTransientFailure("busy".into()).is_transient());
        assert!(!RenderError::ShaderCompileFailed("syntax".into()).is_transient());
    }

    #[test]
    fn test_app_error_wraps_sub_errors() {
        let err: AppError = CaptureError::DeviceDisabled.into();
        assert_eq!(err.to_string(), "Capture error: Camera is disabled");
    }
}
