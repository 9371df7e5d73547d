// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// Capture resolution the session asks for first
pub const TARGET_WIDTH: u32 = 1280;
pub const TARGET_HEIGHT: u32 = 720;

/// Portrait display aspect (width / height) the preview is fitted to
pub const TARGET_ASPECT_RATIO: f32 = 9.0 / 16.0;

/// Picture-in-picture overlay settings for the offscreen compositor
pub mod pip {
    /// Fraction of the offscreen target covered by the overlay on each axis
    pub const FRACTION: f32 = 1.0 / 3.0;

    /// Overlay tint (RGBA). Alpha is the blend weight of the tint.
    pub const TINT_COLOR: [f32; 4] = [0.0, 0.45, 1.0, 0.2];
}

/// Clear color for both the screen and offscreen targets
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Debug snapshot defaults
pub mod snapshot {
    use std::time::Duration;

    /// Maximum number of snapshots pushed to the sink per pipeline
    pub const DEFAULT_LIMIT: u32 = 5;

    /// Interval between snapshot requests
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

    /// Sub-directory created under the pictures directory
    pub const DIR_NAME: &str = "camera-preview";
}

/// Timing constants
pub mod timing {
    use std::time::Duration;

    /// How long the capture worker waits for one frame before re-checking stop
    pub const FRAME_POLL_TIMEOUT: Duration = Duration::from_millis(100);

    /// Log frame statistics every N frames
    pub const FRAME_LOG_INTERVAL: u64 = 120;

    /// Pipeline state change timeout (GStreamer)
    pub const START_TIMEOUT_SECS: u64 = 5;
    pub const STOP_TIMEOUT_SECS: u64 = 2;

    /// Default draw loop rate for the CLI host
    pub const DEFAULT_FPS: u32 = 30;
}

/// Synthetic camera defaults
pub mod synthetic {
    /// Frame rate of the generated test pattern
    pub const FPS: u32 = 30;

    /// Row alignment used for planar buffers, forces stride > width
    pub const ROW_ALIGNMENT: u32 = 64;

    /// Resolutions advertised by synthetic cameras
    pub const RESOLUTIONS: [(u32, u32); 5] =
        [(1920, 1080), (1280, 720), (960, 540), (640, 480), (320, 240)];
}
