// SPDX-License-Identifier: MPL-2.0

//! Capture pipeline for one opened GStreamer camera

use super::super::planar::{PlanarImage, PlaneView};
use super::super::{CameraDevice, FrameSink, Resolution, SinkKind};
use super::enumeration::DiscoveredCamera;
use super::map_gst_error;
use crate::constants::timing;
use crate::errors::{CaptureError, CaptureResult};
use crate::frame::SurfaceBuffer;
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::{VideoFormat, VideoFrameRef, VideoInfo};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Samples queued in the appsink before old ones are dropped
const APPSINK_MAX_BUFFERS: u32 = 2;

struct Stream {
    pipeline: gstreamer::Pipeline,
    appsink: AppSink,
    sink: FrameSink,
}

pub struct GStreamerDevice {
    camera: DiscoveredCamera,
    stream: Option<Stream>,
    sequence: u64,
}

impl GStreamerDevice {
    pub fn new(camera: DiscoveredCamera) -> Self {
        Self {
            camera,
            stream: None,
            sequence: 0,
        }
    }

    fn build_pipeline(
        &self,
        resolution: Resolution,
        kind: SinkKind,
    ) -> CaptureResult<(gstreamer::Pipeline, AppSink)> {
        let make = |factory: &str| {
            gstreamer::ElementFactory::make(factory)
                .build()
                .map_err(|e| CaptureError::ServiceError(format!("{}: {}", factory, e)))
        };

        let source = self
            .camera
            .device
            .create_element(Some("source"))
            .map_err(|e| CaptureError::DeviceError(e.to_string()))?;
        let convert = make("videoconvert")?;
        let scale = make("videoscale")?;

        let format = match kind {
            SinkKind::Planar => VideoFormat::I420,
            SinkKind::Surface => VideoFormat::Rgba,
        };
        let caps = gstreamer_video::VideoCapsBuilder::new()
            .format(format)
            .width(resolution.width as i32)
            .height(resolution.height as i32)
            .build();
        let appsink = AppSink::builder()
            .name("sink")
            .caps(&caps)
            .max_buffers(APPSINK_MAX_BUFFERS)
            .drop(true)
            .sync(false)
            .build();

        let pipeline = gstreamer::Pipeline::builder()
            .name("camera-preview")
            .build();
        let elements = [&source, &convert, &scale, appsink.upcast_ref()];
        pipeline
            .add_many(elements)
            .map_err(|e| CaptureError::ConfigurationFailed(e.to_string()))?;
        gstreamer::Element::link_many(elements)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("link failed: {}", e)))?;

        debug!(%resolution, ?format, "Pipeline built");
        Ok((pipeline, appsink))
    }
}

impl CameraDevice for GStreamerDevice {
    fn output_resolutions(&self, _sink: SinkKind) -> CaptureResult<Vec<Resolution>> {
        // videoconvert produces either sink format from every raw size
        Ok(self.camera.resolutions.clone())
    }

    fn start_repeating(&mut self, resolution: Resolution, sink: FrameSink) -> CaptureResult<()> {
        if self.stream.is_some() {
            return Err(CaptureError::ConfigurationFailed(
                "capture already running".to_string(),
            ));
        }

        let (pipeline, appsink) = self.build_pipeline(resolution, sink.kind())?;

        debug!("Setting pipeline to PLAYING state");
        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            let error = pending_error(&pipeline).unwrap_or_else(|| {
                CaptureError::DeviceError(format!("failed to start pipeline: {}", e))
            });
            shutdown(&pipeline);
            return Err(error);
        }

        let (result, state, pending) = pipeline.state(gstreamer::ClockTime::from_seconds(
            timing::START_TIMEOUT_SECS,
        ));
        debug!(?result, ?state, ?pending, "Pipeline state");
        if let Some(error) = pending_error(&pipeline) {
            shutdown(&pipeline);
            return Err(error);
        }
        if state != gstreamer::State::Playing {
            warn!("Pipeline is not in PLAYING state yet");
        }

        info!(camera = %self.camera.descriptor, %resolution, "GStreamer capture started");
        self.stream = Some(Stream {
            pipeline,
            appsink,
            sink,
        });
        Ok(())
    }

    fn poll_frame(&mut self, timeout: Duration) -> CaptureResult<bool> {
        let Some(stream) = self.stream.as_ref() else {
            return Err(CaptureError::ConfigurationFailed(
                "capture not started".to_string(),
            ));
        };

        if let Some(error) = pending_error(&stream.pipeline) {
            return Err(error);
        }

        let timeout = gstreamer::ClockTime::from_nseconds(timeout.as_nanos() as u64);
        let Some(sample) = stream.appsink.try_pull_sample(timeout) else {
            if stream.appsink.is_eos() {
                return Err(CaptureError::DeviceError("camera stream ended".to_string()));
            }
            return Ok(false);
        };

        self.sequence += 1;
        deliver(&sample, &stream.sink, self.sequence)?;
        Ok(true)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            info!(camera = %self.camera.descriptor.id, "Stopping GStreamer capture");
            shutdown(&stream.pipeline);
        }
    }
}

impl Drop for GStreamerDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Pop the first error posted on the pipeline bus, if any
fn pending_error(pipeline: &gstreamer::Pipeline) -> Option<CaptureError> {
    let bus = pipeline.bus()?;
    let message = bus.pop_filtered(&[gstreamer::MessageType::Error])?;
    match message.view() {
        gstreamer::MessageView::Error(err) => {
            warn!(
                source = ?err.src().map(|s| s.path_string()),
                error = %err.error(),
                debug = ?err.debug(),
                "Pipeline error"
            );
            Some(map_gst_error(&err.error()))
        }
        _ => None,
    }
}

/// Set the pipeline to NULL, releasing the camera
fn shutdown(pipeline: &gstreamer::Pipeline) {
    if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
        warn!(error = %e, "Failed to stop pipeline");
        return;
    }
    let (result, state, _) = pipeline.state(gstreamer::ClockTime::from_seconds(
        timing::STOP_TIMEOUT_SECS,
    ));
    debug!(?result, ?state, "Pipeline stopped");
}

fn plane_view<'a>(
    frame: &'a VideoFrameRef<&gstreamer::BufferRef>,
    index: u32,
) -> CaptureResult<PlaneView<'a>> {
    let data = frame
        .plane_data(index)
        .map_err(|e| CaptureError::DeviceError(format!("plane {}: {}", index, e)))?;
    let stride = frame.plane_stride()[index as usize];
    Ok(PlaneView::new(data, stride.max(0) as usize, 1))
}

/// Hand one sample to the sink in the form it expects
fn deliver(sample: &gstreamer::Sample, sink: &FrameSink, sequence: u64) -> CaptureResult<()> {
    let buffer = sample
        .buffer()
        .ok_or_else(|| CaptureError::DeviceError("sample without buffer".to_string()))?;
    let caps = sample
        .caps()
        .ok_or_else(|| CaptureError::DeviceError("sample without caps".to_string()))?;
    let info = VideoInfo::from_caps(caps).map_err(|e| CaptureError::DeviceError(e.to_string()))?;
    let frame = VideoFrameRef::from_buffer_ref_readable(buffer, &info)
        .map_err(|e| CaptureError::DeviceError(e.to_string()))?;

    match sink {
        FrameSink::Planar(handoff) => {
            let image = PlanarImage {
                width: frame.width(),
                height: frame.height(),
                y: plane_view(&frame, 0)?,
                u: plane_view(&frame, 1)?,
                v: plane_view(&frame, 2)?,
            };
            handoff.publish(image.to_frame(sequence)?);
        }
        FrameSink::Surface(producer) => {
            let plane = plane_view(&frame, 0)?;
            let (width, height) = (frame.width(), frame.height());
            let buffer_width = (plane.row_stride / 4) as u32;
            let size = buffer_width as usize * height as usize * 4;

            // The last row may stop short of its stride
            let mut pixels = plane.data[..plane.data.len().min(size)].to_vec();
            pixels.resize(size, 0);

            let buffer =
                SurfaceBuffer::new(width, height, buffer_width, height, Arc::from(pixels), sequence)
                    .ok_or_else(|| {
                        CaptureError::DeviceError(format!(
                            "bad RGBA layout: {}x{} stride {}",
                            width, height, plane.row_stride
                        ))
                    })?;
            producer.queue_buffer(buffer);
        }
    }
    Ok(())
}
