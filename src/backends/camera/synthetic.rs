// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic camera backend
//!
//! Produces a moving test pattern without hardware. Buffers are laid out the
//! way real camera stacks deliver them: surface buffers are padded to a row
//! alignment (so the crop transform matters) and planar images use padded
//! rows with interleaved chroma (so compaction matters). Faults can be
//! injected to exercise the session error paths.

use super::planar::{PlanarImage, PlaneView};
use super::{
    CameraBackend, CameraBackendType, CameraDescriptor, CameraDevice, FrameSink, LensFacing,
    Resolution, SinkKind,
};
use crate::constants::synthetic as defaults;
use crate::errors::{CaptureError, CaptureResult};
use crate::frame::SurfaceBuffer;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Default, Clone)]
struct Faults {
    enumerate: Option<CaptureError>,
    open: Option<CaptureError>,
    /// Fail the stream once this many frames were produced
    after_frames: Option<(u64, CaptureError)>,
}

/// Test-pattern camera backend
#[derive(Clone)]
pub struct SyntheticBackend {
    cameras: Vec<CameraDescriptor>,
    resolutions: Vec<Resolution>,
    fps: u32,
    faults: Arc<Mutex<Faults>>,
}

impl SyntheticBackend {
    /// A back and a front camera advertising the default resolutions
    pub fn new() -> Self {
        Self::empty()
            .with_camera("synthetic-0", "Synthetic Back Camera", LensFacing::Back)
            .with_camera("synthetic-1", "Synthetic Front Camera", LensFacing::Front)
    }

    /// Backend without cameras
    pub fn empty() -> Self {
        Self {
            cameras: Vec::new(),
            resolutions: defaults::RESOLUTIONS
                .iter()
                .map(|&(w, h)| Resolution::new(w, h))
                .collect(),
            fps: defaults::FPS,
            faults: Arc::new(Mutex::new(Faults::default())),
        }
    }

    pub fn with_camera(mut self, id: &str, name: &str, facing: LensFacing) -> Self {
        self.cameras.push(CameraDescriptor {
            id: id.to_string(),
            name: name.to_string(),
            facing,
            backend: CameraBackendType::Synthetic,
        });
        self
    }

    pub fn with_resolutions(mut self, resolutions: Vec<Resolution>) -> Self {
        self.resolutions = resolutions;
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make enumeration fail (or succeed again with `None`)
    pub fn set_enumerate_error(&self, error: Option<CaptureError>) {
        self.faults().enumerate = error;
    }

    /// Make opening any camera fail (or succeed again with `None`)
    pub fn set_open_error(&self, error: Option<CaptureError>) {
        self.faults().open = error;
    }

    /// Make streams fail after producing `frames` frames
    pub fn set_stream_error_after(&self, frames: u64, error: CaptureError) {
        self.faults().after_frames = Some((frames, error));
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraBackend for SyntheticBackend {
    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::Synthetic
    }

    fn enumerate_cameras(&self) -> CaptureResult<Vec<CameraDescriptor>> {
        if let Some(error) = self.faults().enumerate.clone() {
            return Err(error);
        }
        Ok(self.cameras.clone())
    }

    fn open(&self, camera: &CameraDescriptor) -> CaptureResult<Box<dyn CameraDevice>> {
        let faults = self.faults().clone();
        if let Some(error) = faults.open {
            return Err(error);
        }
        if !self.cameras.iter().any(|c| c.id == camera.id) {
            return Err(CaptureError::DeviceError(format!(
                "unknown camera '{}'",
                camera.id
            )));
        }

        info!(camera = %camera, fps = self.fps, "Opening synthetic camera");
        Ok(Box::new(SyntheticDevice {
            camera: camera.clone(),
            resolutions: self.resolutions.clone(),
            frame_interval: Duration::from_secs(1) / self.fps,
            fail_after: faults.after_frames,
            stream: None,
            sequence: 0,
            closed: false,
        }))
    }
}

struct Stream {
    sink: FrameSink,
    resolution: Resolution,
    next_frame_at: Instant,
}

struct SyntheticDevice {
    camera: CameraDescriptor,
    resolutions: Vec<Resolution>,
    frame_interval: Duration,
    fail_after: Option<(u64, CaptureError)>,
    stream: Option<Stream>,
    sequence: u64,
    closed: bool,
}

impl CameraDevice for SyntheticDevice {
    fn output_resolutions(&self, _sink: SinkKind) -> CaptureResult<Vec<Resolution>> {
        Ok(self.resolutions.clone())
    }

    fn start_repeating(&mut self, resolution: Resolution, sink: FrameSink) -> CaptureResult<()> {
        if self.closed {
            return Err(CaptureError::DeviceError("camera closed".to_string()));
        }
        if !self.resolutions.contains(&resolution) {
            return Err(CaptureError::ConfigurationFailed(format!(
                "{} not offered by {}",
                resolution, self.camera.id
            )));
        }

        debug!(camera = %self.camera.id, %resolution, sink = %sink.kind(), "Synthetic capture started");
        self.stream = Some(Stream {
            sink,
            resolution,
            next_frame_at: Instant::now(),
        });
        Ok(())
    }

    fn poll_frame(&mut self, timeout: Duration) -> CaptureResult<bool> {
        if self.closed {
            return Err(CaptureError::DeviceError("camera closed".to_string()));
        }
        if let Some((frames, error)) = &self.fail_after
            && self.sequence >= *frames
        {
            return Err(error.clone());
        }

        let frame_interval = self.frame_interval;
        let Some(stream) = self.stream.as_mut() else {
            return Err(CaptureError::ConfigurationFailed(
                "capture not started".to_string(),
            ));
        };

        let now = Instant::now();
        if stream.next_frame_at > now {
            let wait = stream.next_frame_at - now;
            if wait > timeout {
                std::thread::sleep(timeout);
                return Ok(false);
            }
            std::thread::sleep(wait);
        }
        stream.next_frame_at = (stream.next_frame_at + frame_interval).max(Instant::now());

        self.sequence += 1;
        let sequence = self.sequence;
        let Resolution { width, height } = stream.resolution;
        match &stream.sink {
            FrameSink::Surface(producer) => {
                producer.queue_buffer(surface_pattern(width, height, sequence)?);
            }
            FrameSink::Planar(handoff) => {
                handoff.publish(planar_pattern(width, height, sequence)?);
            }
        }
        Ok(true)
    }

    fn close(&mut self) {
        if !self.closed {
            debug!(camera = %self.camera.id, frames = self.sequence, "Synthetic camera closed");
        }
        self.closed = true;
        self.stream = None;
    }
}

fn align_up(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

/// RGBA gradient moving with the frame counter, padding painted magenta
fn surface_pattern(width: u32, height: u32, sequence: u64) -> CaptureResult<SurfaceBuffer> {
    let buffer_width = align_up(width, defaults::ROW_ALIGNMENT);
    let shift = (sequence * 4) as u32;
    let mut data = vec![0u8; buffer_width as usize * height as usize * 4];

    for (y, row) in data.chunks_exact_mut(buffer_width as usize * 4).enumerate() {
        for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
            let x = x as u32;
            if x >= width {
                pixel.copy_from_slice(&[255, 0, 255, 255]);
                continue;
            }
            pixel[0] = ((x + shift) * 255 / width.max(1)) as u8;
            pixel[1] = (y as u32 * 255 / height.max(1)) as u8;
            pixel[2] = (sequence & 0xFF) as u8;
            pixel[3] = 255;
        }
    }

    SurfaceBuffer::new(
        width,
        height,
        buffer_width,
        height,
        Arc::from(data),
        sequence,
    )
    .ok_or_else(|| CaptureError::DeviceError(format!("bad surface size {}x{}", width, height)))
}

/// Planar test image with padded rows and interleaved chroma
fn planar_pattern(
    width: u32,
    height: u32,
    sequence: u64,
) -> CaptureResult<crate::frame::PlanarFrame> {
    let (chroma_width, chroma_height) = crate::frame::chroma_size(width, height);
    let row_stride = align_up(width, defaults::ROW_ALIGNMENT) as usize;
    let shift = (sequence * 2) as usize;

    let mut luma = vec![0u8; row_stride * height as usize];
    for (y, row) in luma.chunks_exact_mut(row_stride).enumerate() {
        for (x, sample) in row.iter_mut().take(width as usize).enumerate() {
            *sample = ((x + y + shift) & 0xFF) as u8;
        }
    }

    // U and V interleaved in one buffer, pixel stride 2
    let mut chroma = vec![128u8; row_stride * chroma_height as usize];
    for (y, row) in chroma.chunks_exact_mut(row_stride).enumerate() {
        for x in 0..chroma_width as usize {
            row[2 * x] = ((x * 255) / chroma_width.max(1) as usize) as u8;
            row[2 * x + 1] = ((y * 255) / chroma_height.max(1) as usize) as u8;
        }
    }

    let image = PlanarImage {
        width,
        height,
        y: PlaneView::new(&luma, row_stride, 1),
        u: PlaneView::new(&chroma, row_stride, 2),
        v: PlaneView::new(&chroma[1..], row_stride, 2),
    };
    image.to_frame(sequence)
}
