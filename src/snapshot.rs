// SPDX-License-Identifier: GPL-3.0-only

//! Periodic debug snapshots of the rendered preview
//!
//! A tokio interval task only raises a request flag. The drawing context
//! checks the flag after each tick, reads the fitted viewport back and hands
//! the pixels to a blocking task that calls the [`DebugFrameSink`]. After
//! `limit` snapshots the timer task is aborted.

use crate::errors::SnapshotError;
use crate::gpu::GpuDevice;
use crate::viewport::ViewportRect;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Receives rendered frames for external persistence
///
/// Called from a blocking worker, never from the drawing context.
pub trait DebugFrameSink: Send + Sync {
    /// `rgba` holds `width * height * 4` bytes, rows top to bottom
    fn write_snapshot(
        &self,
        rgba: &[u8],
        width: u32,
        height: u32,
        sequence: u64,
    ) -> Result<(), SnapshotError>;
}

#[derive(Debug, Default)]
struct SnapshotStats {
    written: AtomicU32,
    failed: AtomicU32,
}

/// Drives snapshot requests and dispatches readbacks to the sink
pub struct SnapshotScheduler {
    sink: Arc<dyn DebugFrameSink>,
    runtime: Handle,
    limit: u32,
    taken: u32,
    requested: Arc<AtomicBool>,
    timer: Option<JoinHandle<()>>,
    writes: Vec<JoinHandle<()>>,
    stats: Arc<SnapshotStats>,
}

impl SnapshotScheduler {
    /// Start the request timer on `runtime`
    ///
    /// The first request fires one `interval` after creation.
    pub fn new(
        runtime: Handle,
        sink: Arc<dyn DebugFrameSink>,
        limit: u32,
        interval: Duration,
    ) -> Self {
        let requested = Arc::new(AtomicBool::new(false));
        let timer = (limit > 0).then(|| {
            let requested = Arc::clone(&requested);
            runtime.spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                // The first tick completes immediately
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    requested.store(true, Ordering::Release);
                }
            })
        });

        debug!(limit, ?interval, "Snapshot scheduler started");
        Self {
            sink,
            runtime,
            limit,
            taken: 0,
            requested,
            timer,
            writes: Vec::new(),
            stats: Arc::new(SnapshotStats::default()),
        }
    }

    /// Ask for a snapshot on the next tick regardless of the timer
    pub fn request_now(&self) {
        if !self.is_finished() {
            self.requested.store(true, Ordering::Release);
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Read back `viewport` if a snapshot is due
    ///
    /// Runs on the drawing context after the frame was drawn. Returns whether
    /// a snapshot was dispatched. Readback failures are logged and the
    /// request is dropped.
    pub fn capture_if_requested(&mut self, gpu: &mut dyn GpuDevice, viewport: ViewportRect) -> bool {
        if self.is_finished() || viewport.is_empty() {
            return false;
        }
        if !self.requested.swap(false, Ordering::AcqRel) {
            return false;
        }

        let pixels = match gpu.read_pixels(viewport) {
            Ok(pixels) => pixels,
            Err(e) => {
                warn!(error = %e, "Snapshot readback failed");
                return false;
            }
        };

        self.taken += 1;
        let sequence = u64::from(self.taken);
        let sink = Arc::clone(&self.sink);
        let stats = Arc::clone(&self.stats);
        let (width, height) = (viewport.width, viewport.height);

        self.writes.push(self.runtime.spawn_blocking(move || {
            match sink.write_snapshot(&pixels, width, height, sequence) {
                Ok(()) => {
                    stats.written.fetch_add(1, Ordering::Relaxed);
                    debug!(sequence, width, height, "Snapshot written");
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(sequence, error = %e, "Snapshot sink failed");
                }
            }
        }));

        if self.is_finished() {
            info!(limit = self.limit, "Snapshot limit reached");
            self.cancel();
        }
        true
    }

    /// Stop the timer; no further snapshots are requested
    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.requested.store(false, Ordering::Release);
    }

    /// Wait for every dispatched snapshot to reach the sink
    pub async fn flush(&mut self) {
        for write in self.writes.drain(..) {
            if let Err(e) = write.await {
                warn!(error = %e, "Snapshot task failed");
            }
        }
    }

    /// Snapshots dispatched so far
    pub fn taken(&self) -> u32 {
        self.taken
    }

    pub fn written(&self) -> u32 {
        self.stats.written.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u32 {
        self.stats.failed.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.taken >= self.limit
    }

    pub fn is_timer_running(&self) -> bool {
        self.timer.as_ref().is_some_and(|timer| !timer.is_finished())
    }
}

impl Drop for SnapshotScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(usize, u32, u32, u64)>>,
        fail: bool,
    }

    impl DebugFrameSink for RecordingSink {
        fn write_snapshot(
            &self,
            rgba: &[u8],
            width: u32,
            height: u32,
            sequence: u64,
        ) -> Result<(), SnapshotError> {
            self.calls
                .lock()
                .unwrap()
                .push((rgba.len(), width, height, sequence));
            if self.fail {
                return Err(SnapshotError::Io("disk full".to_string()));
            }
            Ok(())
        }
    }

    fn scheduler(sink: Arc<RecordingSink>, limit: u32) -> SnapshotScheduler {
        // Long interval: tests drive requests through request_now
        SnapshotScheduler::new(Handle::current(), sink, limit, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_no_snapshot_without_request() {
        let sink = Arc::new(RecordingSink::default());
        let mut scheduler = scheduler(Arc::clone(&sink), 5);
        let mut gpu = HeadlessDevice::new(1080, 1920);

        assert!(!scheduler.capture_if_requested(&mut gpu, ViewportRect::full(1080, 1920)));
        scheduler.flush().await;
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_limit_caps_sink_calls() {
        let sink = Arc::new(RecordingSink::default());
        let mut scheduler = scheduler(Arc::clone(&sink), 2);
        let mut gpu = HeadlessDevice::new(1080, 1920);
        let viewport = ViewportRect::new(0, 0, 90, 160);

        for _ in 0..5 {
            scheduler.request_now();
            scheduler.capture_if_requested(&mut gpu, viewport);
        }
        scheduler.flush().await;

        let calls = sink.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        for (i, (len, width, height, sequence)) in calls.iter().enumerate() {
            assert_eq!(*len, 90 * 160 * 4);
            assert_eq!((*width, *height), (90, 160));
            assert_eq!(*sequence, i as u64 + 1);
        }
        assert!(scheduler.is_finished());
        assert!(!scheduler.is_timer_running());
        assert_eq!(scheduler.written(), 2);
    }

    #[tokio::test]
    async fn test_sink_failure_is_isolated() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let mut scheduler = scheduler(Arc::clone(&sink), 3);
        let mut gpu = HeadlessDevice::new(64, 64);

        scheduler.request_now();
        assert!(scheduler.capture_if_requested(&mut gpu, ViewportRect::full(64, 64)));
        scheduler.request_now();
        assert!(scheduler.capture_if_requested(&mut gpu, ViewportRect::full(64, 64)));
        scheduler.flush().await;

        assert_eq!(scheduler.failed(), 2);
        assert_eq!(scheduler.written(), 0);
        assert!(!scheduler.is_finished());
    }

    #[tokio::test]
    async fn test_empty_viewport_keeps_request() {
        let sink = Arc::new(RecordingSink::default());
        let mut scheduler = scheduler(Arc::clone(&sink), 1);
        let mut gpu = HeadlessDevice::new(64, 64);

        scheduler.request_now();
        assert!(!scheduler.capture_if_requested(&mut gpu, ViewportRect::default()));
        assert!(scheduler.is_requested());
    }

    #[tokio::test]
    async fn test_timer_raises_request() {
        let sink = Arc::new(RecordingSink::default());
        let scheduler =
            SnapshotScheduler::new(Handle::current(), sink, 1, Duration::from_millis(50));
        assert!(!scheduler.is_requested());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(scheduler.is_requested());
    }
}
