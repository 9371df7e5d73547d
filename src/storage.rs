// SPDX-License-Identifier: MPL-2.0

//! PNG persistence for debug snapshots

use crate::constants::snapshot::DIR_NAME;
use crate::errors::SnapshotError;
use crate::snapshot::DebugFrameSink;
use image::{ImageBuffer, Rgba};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default snapshot directory: `~/Pictures/camera-preview`
///
/// Falls back to the current directory when no pictures directory is known.
pub fn default_snapshot_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DIR_NAME)
}

/// File name for one snapshot, e.g. `snapshot_20250102_030405_001.png`
pub fn snapshot_filename(sequence: u64) -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    format!("snapshot_{}_{:03}.png", timestamp, sequence)
}

/// Writes each snapshot as a PNG file into one directory
#[derive(Debug, Clone)]
pub struct PngSnapshotSink {
    dir: PathBuf,
}

impl PngSnapshotSink {
    /// Create the sink, creating `dir` if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        info!(dir = %dir.display(), "Snapshot directory ready");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DebugFrameSink for PngSnapshotSink {
    fn write_snapshot(
        &self,
        rgba: &[u8],
        width: u32,
        height: u32,
        sequence: u64,
    ) -> Result<(), SnapshotError> {
        let img: ImageBuffer<Rgba<u8>, _> = ImageBuffer::from_raw(width, height, rgba.to_vec())
            .ok_or_else(|| {
                SnapshotError::Encode(format!(
                    "{} bytes do not hold a {}x{} RGBA image",
                    rgba.len(),
                    width,
                    height
                ))
            })?;

        let path = self.dir.join(snapshot_filename(sequence));
        img.save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| match e {
                image::ImageError::IoError(io) => SnapshotError::from(io),
                other => SnapshotError::Encode(other.to_string()),
            })?;

        debug!(path = %path.display(), sequence, "Snapshot saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("camera-preview-{}-{}", name, std::process::id()))
    }

    #[test]
    fn test_filename_carries_sequence() {
        let name = snapshot_filename(7);
        assert!(name.starts_with("snapshot_"));
        assert!(name.ends_with("_007.png"));
    }

    #[test]
    fn test_writes_png() {
        let dir = scratch_dir("png");
        let sink = PngSnapshotSink::new(&dir).unwrap();
        sink.write_snapshot(&[255u8; 4 * 3 * 2], 3, 2, 1).unwrap();

        let files: Vec<_> = std::fs::read_dir(&dir).unwrap().flatten().collect();
        assert_eq!(files.len(), 1);
        let img = image::open(files[0].path()).unwrap();
        assert_eq!((img.width(), img.height()), (3, 2));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_short_buffer_is_encode_error() {
        let dir = scratch_dir("short");
        let sink = PngSnapshotSink::new(&dir).unwrap();
        let err = sink.write_snapshot(&[0u8; 8], 3, 2, 1).unwrap_err();
        assert!(matches!(err, SnapshotError::Encode(_)));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
