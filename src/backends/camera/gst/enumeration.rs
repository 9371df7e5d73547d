// SPDX-License-Identifier: GPL-3.0-only

//! Camera discovery through the GStreamer device monitor

use super::super::{CameraBackendType, CameraDescriptor, LensFacing, Resolution};
use crate::errors::{CaptureError, CaptureResult};
use gstreamer::prelude::*;
use tracing::{debug, warn};

/// Properties that identify a device node, in order of preference
const ID_PROPERTIES: &[&str] = &[
    "api.v4l2.path",
    "device.path",
    "api.libcamera.path",
    "object.path",
];

/// Properties carrying the mounting location of a camera
const LOCATION_PROPERTIES: &[&str] = &["api.libcamera.location", "camera.location"];

/// Offered when a device reports caps without fixed sizes
const FALLBACK_RESOLUTIONS: &[Resolution] = &[
    Resolution::new(1920, 1080),
    Resolution::new(1280, 720),
    Resolution::new(640, 480),
];

/// A camera together with the GStreamer device it was found on
pub struct DiscoveredCamera {
    pub descriptor: CameraDescriptor,
    pub device: gstreamer::Device,
    pub resolutions: Vec<Resolution>,
}

/// List all video sources currently visible
pub fn discover() -> CaptureResult<Vec<DiscoveredCamera>> {
    let monitor = gstreamer::DeviceMonitor::new();
    monitor.add_filter(Some("Video/Source"), None);
    monitor
        .start()
        .map_err(|e| CaptureError::ServiceError(format!("device monitor: {}", e)))?;
    let devices = monitor.devices();
    monitor.stop();

    let mut cameras: Vec<DiscoveredCamera> = Vec::new();
    for device in devices {
        let descriptor = describe(&device);
        // PipeWire and V4L2 providers may both report the same node
        if cameras.iter().any(|c| c.descriptor.id == descriptor.id) {
            debug!(id = %descriptor.id, "Skipping duplicate device");
            continue;
        }

        let resolutions = device
            .caps()
            .map(|caps| resolutions_from_caps(&caps))
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| {
                warn!(id = %descriptor.id, "No fixed sizes in caps, using fallback list");
                FALLBACK_RESOLUTIONS.to_vec()
            });

        debug!(camera = %descriptor, resolutions = resolutions.len(), "Found camera");
        cameras.push(DiscoveredCamera {
            descriptor,
            device,
            resolutions,
        });
    }
    Ok(cameras)
}

fn describe(device: &gstreamer::Device) -> CameraDescriptor {
    let name = device.display_name().to_string();
    let properties = device.properties();
    let property = |key: &str| {
        properties
            .as_ref()
            .and_then(|p| p.get::<String>(key).ok())
            .filter(|v| !v.is_empty())
    };

    let id = ID_PROPERTIES
        .iter()
        .find_map(|key| property(key))
        .unwrap_or_else(|| name.clone());
    let facing = LOCATION_PROPERTIES
        .iter()
        .find_map(|key| property(key))
        .map(|location| LensFacing::from_location(&location))
        .unwrap_or(LensFacing::External);

    CameraDescriptor {
        id,
        name,
        facing,
        backend: CameraBackendType::GStreamer,
    }
}

/// Fixed raw sizes advertised in caps, deduplicated, in caps order
fn resolutions_from_caps(caps: &gstreamer::CapsRef) -> Vec<Resolution> {
    let mut resolutions = Vec::new();
    for structure in caps.iter() {
        let (Ok(width), Ok(height)) = (structure.get::<i32>("width"), structure.get::<i32>("height"))
        else {
            continue;
        };
        if width <= 0 || height <= 0 {
            continue;
        }
        let resolution = Resolution::new(width as u32, height as u32);
        if !resolutions.contains(&resolution) {
            resolutions.push(resolution);
        }
    }
    resolutions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolutions_from_caps() {
        gstreamer::init().unwrap();
        let caps: gstreamer::Caps = "video/x-raw, width=(int)1280, height=(int)720; \
             image/jpeg, width=(int)1280, height=(int)720; \
             video/x-raw, width=(int)640, height=(int)480; \
             video/x-raw, width=(int)[ 1, 4096 ], height=(int)[ 1, 2160 ]"
            .parse()
            .unwrap();

        assert_eq!(
            resolutions_from_caps(&caps),
            vec![Resolution::new(1280, 720), Resolution::new(640, 480)]
        );
    }
}
