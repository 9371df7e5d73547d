// SPDX-License-Identifier: GPL-3.0-only

//! Helpers shared by the integration tests

#![allow(dead_code)]

use camera_preview::backends::camera::{LensFacing, Resolution, SyntheticBackend};
use std::time::{Duration, Instant};

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Small outputs keep the generated patterns cheap
pub const TEST_RESOLUTIONS: [Resolution; 2] = [Resolution::new(320, 240), Resolution::new(160, 120)];

/// Synthetic backend with one camera whose id no other test uses
///
/// Camera claims are process wide and tests run in parallel.
pub fn backend_with(id: &str, facing: LensFacing) -> SyntheticBackend {
    SyntheticBackend::empty()
        .with_camera(id, &format!("Test camera {}", id), facing)
        .with_resolutions(TEST_RESOLUTIONS.to_vec())
        .with_fps(120)
}
