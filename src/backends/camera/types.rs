// SPDX-License-Identifier: MPL-2.0

//! Shared types for camera backends and capture sessions

use crate::frame::{FrameHandoff, PlanarFrame, SurfaceProducer};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Camera backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackendType {
    /// Real devices through GStreamer
    GStreamer,
    /// Generated test pattern, no hardware needed
    Synthetic,
}

impl Default for CameraBackendType {
    fn default() -> Self {
        if cfg!(feature = "gstreamer") {
            CameraBackendType::GStreamer
        } else {
            CameraBackendType::Synthetic
        }
    }
}

impl std::fmt::Display for CameraBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraBackendType::GStreamer => write!(f, "gstreamer"),
            CameraBackendType::Synthetic => write!(f, "synthetic"),
        }
    }
}

impl FromStr for CameraBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gstreamer" | "gst" => Ok(CameraBackendType::GStreamer),
            "synthetic" | "test" => Ok(CameraBackendType::Synthetic),
            other => Err(format!("unknown camera backend '{}'", other)),
        }
    }
}

/// Which way a camera points
///
/// `External` is reported for devices without a location attribute. It is
/// never matched by a front/back request and uses the back-camera tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LensFacing {
    Front,
    #[default]
    Back,
    External,
}

impl LensFacing {
    /// Parse a camera location attribute ("front", "back", "external")
    pub fn from_location(location: &str) -> Self {
        match location.to_ascii_lowercase().as_str() {
            "front" | "user" => LensFacing::Front,
            "back" | "rear" | "environment" => LensFacing::Back,
            _ => LensFacing::External,
        }
    }

    pub fn is_front(self) -> bool {
        self == LensFacing::Front
    }
}

impl std::fmt::Display for LensFacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LensFacing::Front => write!(f, "front"),
            LensFacing::Back => write!(f, "back"),
            LensFacing::External => write!(f, "external"),
        }
    }
}

impl FromStr for LensFacing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "front" => Ok(LensFacing::Front),
            "back" => Ok(LensFacing::Back),
            "external" => Ok(LensFacing::External),
            other => Err(format!("unknown lens facing '{}'", other)),
        }
    }
}

/// Output resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn distance(&self, other: &Resolution) -> u32 {
        self.width.abs_diff(other.width) + self.height.abs_diff(other.height)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
        let width = w
            .trim()
            .parse()
            .map_err(|_| format!("invalid width in '{}'", s))?;
        let height = h
            .trim()
            .parse()
            .map_err(|_| format!("invalid height in '{}'", s))?;
        if width == 0 || height == 0 {
            return Err(format!("resolution must be non-zero, got '{}'", s));
        }
        Ok(Resolution { width, height })
    }
}

/// Pick the capture resolution for `target`
///
/// Exact match if offered, otherwise the candidate minimising
/// `|Δwidth| + |Δheight|`. Ties keep the first candidate in enumeration order.
pub fn select_resolution(target: Resolution, candidates: &[Resolution]) -> Option<Resolution> {
    if candidates.contains(&target) {
        return Some(target);
    }

    candidates
        .iter()
        .copied()
        .fold(None, |best: Option<Resolution>, candidate| match best {
            Some(b) if b.distance(&target) <= candidate.distance(&target) => Some(b),
            _ => Some(candidate),
        })
}

/// A camera as reported by enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDescriptor {
    /// Stable identifier within the backend
    pub id: String,
    pub name: String,
    pub facing: LensFacing,
    pub backend: CameraBackendType,
}

impl std::fmt::Display for CameraDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.id, self.facing)
    }
}

/// Form of the frames a capture session produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    /// GPU-importable RGBA buffers through the opaque surface
    Surface,
    /// 4:2:0 planar buffers, compacted on the CPU
    Planar,
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkKind::Surface => write!(f, "surface"),
            SinkKind::Planar => write!(f, "planar"),
        }
    }
}

/// Destination of a repeating capture
#[derive(Clone)]
pub enum FrameSink {
    Surface(SurfaceProducer),
    Planar(Arc<FrameHandoff<PlanarFrame>>),
}

impl FrameSink {
    pub fn kind(&self) -> SinkKind {
        match self {
            FrameSink::Surface(_) => SinkKind::Surface,
            FrameSink::Planar(_) => SinkKind::Planar,
        }
    }
}

impl std::fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FrameSink::{}", self.kind())
    }
}

/// What a session ended up streaming, reported once per start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub camera_id: String,
    pub camera_name: String,
    pub resolution: Resolution,
    pub lens_facing: LensFacing,
    pub sink: SinkKind,
}

/// Capture session lifecycle
///
/// ```text
/// Idle → Opening → Configuring → Streaming → Stopping → Closed
///   any non-terminal state ──fault──▶ Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Opening,
    Configuring,
    Streaming,
    Stopping,
    Closed,
    Error,
}

impl SessionState {
    /// States from which `start()` is accepted
    pub fn can_start(self) -> bool {
        matches!(
            self,
            SessionState::Idle | SessionState::Closed | SessionState::Error
        )
    }

    /// States the worker may no longer move out of
    pub fn is_final(self) -> bool {
        matches!(
            self,
            SessionState::Stopping | SessionState::Closed | SessionState::Error
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Opening => "opening",
            SessionState::Configuring => "configuring",
            SessionState::Streaming => "streaming",
            SessionState::Stopping => "stopping",
            SessionState::Closed => "closed",
            SessionState::Error => "error",
        };
        write!(f, "{}", name)
    }
}
