// SPDX-License-Identifier: GPL-3.0-only

//! Compaction of strided camera planes into tightly packed buffers
//!
//! Camera stacks hand out planes whose rows are padded (`row_stride > width`)
//! and whose chroma samples may be interleaved (`pixel_stride == 2`, U and V
//! sharing one buffer). Renderers need exactly `width * height` bytes per
//! plane.

use crate::errors::{CaptureError, CaptureResult};
use crate::frame::{PlanarFrame, chroma_size};

/// Borrowed view of one plane as delivered by the camera
#[derive(Debug, Clone, Copy)]
pub struct PlaneView<'a> {
    pub data: &'a [u8],
    /// Bytes between the starts of two rows
    pub row_stride: usize,
    /// Bytes between two samples of the same row
    pub pixel_stride: usize,
}

impl<'a> PlaneView<'a> {
    pub fn new(data: &'a [u8], row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }
}

/// Borrowed 4:2:0 image straight from a capture buffer
#[derive(Debug, Clone, Copy)]
pub struct PlanarImage<'a> {
    pub width: u32,
    pub height: u32,
    pub y: PlaneView<'a>,
    pub u: PlaneView<'a>,
    pub v: PlaneView<'a>,
}

impl PlanarImage<'_> {
    /// Copy all three planes out, honoring their strides
    pub fn to_frame(&self, sequence: u64) -> CaptureResult<PlanarFrame> {
        let (chroma_width, chroma_height) = chroma_size(self.width, self.height);
        let y = compact_plane(&self.y, self.width, self.height)?;
        let u = compact_plane(&self.u, chroma_width, chroma_height)?;
        let v = compact_plane(&self.v, chroma_width, chroma_height)?;

        PlanarFrame::from_planes(self.width, self.height, y, u, v, sequence).ok_or_else(|| {
            CaptureError::DeviceError(format!(
                "inconsistent plane sizes for {}x{}",
                self.width, self.height
            ))
        })
    }
}

/// Copy a `width × height` plane into a packed buffer
///
/// Fails with [`CaptureError::DeviceError`] when the source is shorter than
/// its strides claim.
pub fn compact_plane(plane: &PlaneView<'_>, width: u32, height: u32) -> CaptureResult<Vec<u8>> {
    let width = width as usize;
    let height = height as usize;
    if width == 0 || height == 0 {
        return Ok(Vec::new());
    }

    if plane.pixel_stride == 0 || plane.row_stride < (width - 1) * plane.pixel_stride + 1 {
        return Err(CaptureError::DeviceError(format!(
            "invalid plane strides: row {} pixel {} for width {}",
            plane.row_stride, plane.pixel_stride, width
        )));
    }

    let required = (height - 1) * plane.row_stride + (width - 1) * plane.pixel_stride + 1;
    if plane.data.len() < required {
        return Err(CaptureError::DeviceError(format!(
            "short plane: {} bytes, {} required for {}x{}",
            plane.data.len(),
            required,
            width,
            height
        )));
    }

    let mut out = Vec::with_capacity(width * height);
    for row in 0..height {
        let start = row * plane.row_stride;
        if plane.pixel_stride == 1 {
            out.extend_from_slice(&plane.data[start..start + width]);
        } else {
            out.extend(
                plane.data[start..]
                    .iter()
                    .step_by(plane.pixel_stride)
                    .take(width),
            );
        }
    }
    Ok(out)
}
