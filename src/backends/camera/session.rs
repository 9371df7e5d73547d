// SPDX-License-Identifier: GPL-3.0-only

//! Capture session: owns one camera and streams it into a frame sink
//!
//! ```text
//! start()  ──▶ Opening ──▶ Configuring ──▶ Streaming
//!                 │             │              │
//!                 └─────────────┴──── fault ───┴──▶ Error
//! stop()   ──▶ Stopping ──▶ Closed
//! ```
//!
//! Opening, configuring and frame polling all happen on the session's worker
//! thread. Results reach the caller only through the [`SessionListener`].

use super::frame_loop::{CaptureLoopController, LoopAction};
use super::{
    CameraBackend, CameraBackendType, CameraDevice, FrameSink, LensFacing, Resolution,
    SessionState, SinkKind, StreamInfo, choose_camera, select_resolution,
};
use crate::constants::{TARGET_HEIGHT, TARGET_WIDTH, timing};
use crate::errors::{CaptureError, CaptureResult};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Receives session results on the worker thread
pub trait SessionListener: Send + Sync {
    /// Stream configured, called before the repeating capture starts
    fn on_configured(&self, info: &StreamInfo);

    /// The session entered `Error`
    fn on_error(&self, error: &CaptureError);

    fn on_state_changed(&self, _state: SessionState) {}
}

/// Session notification as a value, for forwarding across threads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Configured(StreamInfo),
    Error(CaptureError),
    StateChanged(SessionState),
}

/// Listener that forwards every notification into a channel
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelListener {
    pub fn new(sender: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { sender }
    }

    /// Create a listener together with the receiving end of its channel
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self::new(sender)), receiver)
    }

    fn send(&self, event: SessionEvent) {
        // The receiver going away just means nobody is interested anymore
        if self.sender.send(event).is_err() {
            debug!("Session event receiver dropped");
        }
    }
}

impl SessionListener for ChannelListener {
    fn on_configured(&self, info: &StreamInfo) {
        self.send(SessionEvent::Configured(info.clone()));
    }

    fn on_error(&self, error: &CaptureError) {
        self.send(SessionEvent::Error(error.clone()));
    }

    fn on_state_changed(&self, state: SessionState) {
        self.send(SessionEvent::StateChanged(state));
    }
}

/// Camera ids currently held by a session in this process
static CLAIMED_CAMERAS: LazyLock<Mutex<HashSet<String>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Exclusive claim on one camera id, released on drop
struct CameraClaim {
    key: String,
}

impl CameraClaim {
    fn acquire(backend: CameraBackendType, camera_id: &str) -> CaptureResult<Self> {
        let key = format!("{}:{}", backend, camera_id);
        let mut claimed = CLAIMED_CAMERAS
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !claimed.insert(key.clone()) {
            return Err(CaptureError::DeviceInUse);
        }
        debug!(camera = %key, "Camera claimed");
        Ok(Self { key })
    }
}

impl Drop for CameraClaim {
    fn drop(&mut self) {
        CLAIMED_CAMERAS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        debug!(camera = %self.key, "Camera released");
    }
}

/// State visible to both the session handle and its worker
struct SessionShared {
    state: Mutex<SessionState>,
    stream_info: Mutex<Option<StreamInfo>>,
    listener: Arc<dyn SessionListener>,
}

impl SessionShared {
    fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: SessionState) {
        let previous = std::mem::replace(
            &mut *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            next,
        );
        if previous != next {
            debug!(from = %previous, to = %next, "Session state changed");
            self.listener.on_state_changed(next);
        }
    }

    /// Move forward unless a stop or fault already won
    fn advance(&self, next: SessionState) -> bool {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.is_final() {
                return false;
            }
            *state = next;
        }
        debug!(to = %next, "Session state changed");
        self.listener.on_state_changed(next);
        true
    }

    /// Enter `Error` and report, unless the session is being stopped
    fn fail(&self, error: CaptureError) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.is_final() {
                debug!(state = %*state, %error, "Ignoring capture error");
                return;
            }
            *state = SessionState::Error;
        }
        warn!(%error, code = error.code(), "Capture session failed");
        self.listener.on_state_changed(SessionState::Error);
        self.listener.on_error(&error);
    }

    /// Atomically enter `Stopping`, returning the state stop() started from
    fn begin_stop(&self) -> SessionState {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = *state;
        if !matches!(
            previous,
            SessionState::Idle | SessionState::Closed | SessionState::Error
        ) {
            *state = SessionState::Stopping;
        }
        previous
    }
}

/// Worker-owned stream. Dropping it closes the device, then releases the claim.
struct ActiveStream {
    device: Box<dyn CameraDevice>,
    _claim: CameraClaim,
    camera_id: String,
    frames: u64,
}

impl ActiveStream {
    fn poll(&mut self, shared: &SessionShared) -> LoopAction {
        match self.device.poll_frame(timing::FRAME_POLL_TIMEOUT) {
            Ok(true) => {
                self.frames += 1;
                if self.frames % timing::FRAME_LOG_INTERVAL == 0 {
                    debug!(camera = %self.camera_id, frames = self.frames, "Capture progress");
                }
                LoopAction::Continue
            }
            Ok(false) => LoopAction::Continue,
            Err(error) => {
                shared.fail(error);
                LoopAction::Stop
            }
        }
    }
}

impl Drop for ActiveStream {
    fn drop(&mut self) {
        self.device.close();
        info!(camera = %self.camera_id, frames = self.frames, "Capture stream closed");
    }
}

/// Everything the worker needs to open a stream
struct StreamRequest {
    backend: Arc<dyn CameraBackend>,
    sink: FrameSink,
    facing: LensFacing,
    target: Resolution,
}

fn open_stream(request: StreamRequest, shared: &SessionShared) -> CaptureResult<ActiveStream> {
    let cameras = request.backend.enumerate_cameras()?;
    let camera = choose_camera(&cameras, request.facing)
        .ok_or(CaptureError::NoCameraAvailable)?
        .clone();

    let claim = CameraClaim::acquire(request.backend.backend_type(), &camera.id)?;
    let device = request.backend.open(&camera)?;
    let mut stream = ActiveStream {
        device,
        _claim: claim,
        camera_id: camera.id.clone(),
        frames: 0,
    };

    if !shared.advance(SessionState::Configuring) {
        return Err(CaptureError::ConfigurationFailed(
            "session stopped while opening".to_string(),
        ));
    }

    let sink_kind = request.sink.kind();
    let offered = stream.device.output_resolutions(sink_kind)?;
    let resolution = select_resolution(request.target, &offered).ok_or_else(|| {
        CaptureError::ConfigurationFailed(format!("{} offers no {} outputs", camera.id, sink_kind))
    })?;

    let info = StreamInfo {
        camera_id: camera.id.clone(),
        camera_name: camera.name.clone(),
        resolution,
        lens_facing: camera.facing,
        sink: sink_kind,
    };
    *shared
        .stream_info
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = Some(info.clone());
    shared.listener.on_configured(&info);

    stream.device.start_repeating(resolution, request.sink)?;
    if !shared.advance(SessionState::Streaming) {
        return Err(CaptureError::ConfigurationFailed(
            "session stopped while configuring".to_string(),
        ));
    }

    info!(
        camera = %camera,
        %resolution,
        sink = %sink_kind,
        "Capture session streaming"
    );
    Ok(stream)
}

/// Handle to one camera stream feeding one frame sink
pub struct CaptureSession {
    backend: Arc<dyn CameraBackend>,
    sink: FrameSink,
    shared: Arc<SessionShared>,
    target: Resolution,
    facing: LensFacing,
    worker: Option<CaptureLoopController>,
}

impl CaptureSession {
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        sink: FrameSink,
        listener: Arc<dyn SessionListener>,
    ) -> Self {
        Self {
            backend,
            sink,
            shared: Arc::new(SessionShared {
                state: Mutex::new(SessionState::Idle),
                stream_info: Mutex::new(None),
                listener,
            }),
            target: Resolution::new(TARGET_WIDTH, TARGET_HEIGHT),
            facing: LensFacing::default(),
            worker: None,
        }
    }

    /// Resolution to aim for when picking an output size
    pub fn with_target_resolution(mut self, target: Resolution) -> Self {
        self.target = target;
        self
    }

    /// Open the camera facing `facing` and start streaming
    ///
    /// Returns once the worker is spawned; the outcome is reported through
    /// the listener.
    pub fn start(&mut self, facing: LensFacing) -> CaptureResult<()> {
        let state = self.shared.state();
        if !state.can_start() {
            return Err(CaptureError::AlreadyStarted);
        }

        // A failed stream's worker exits on its own; reap it before reuse
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }

        self.facing = facing;
        *self
            .shared
            .stream_info
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.shared.set_state(SessionState::Opening);

        info!(backend = %self.backend.backend_type(), %facing, sink = %self.sink.kind(), "Starting capture session");

        let request = StreamRequest {
            backend: Arc::clone(&self.backend),
            sink: self.sink.clone(),
            facing,
            target: self.target,
        };
        let init_shared = Arc::clone(&self.shared);
        let loop_shared = Arc::clone(&self.shared);

        self.worker = Some(CaptureLoopController::start_with_init(
            "capture-session",
            move || {
                open_stream(request, &init_shared).inspect_err(|error| {
                    init_shared.fail(error.clone());
                })
            },
            move |stream: &mut ActiveStream| stream.poll(&loop_shared),
        ));
        Ok(())
    }

    /// Stop streaming and release the camera. Idempotent.
    pub fn stop(&mut self) {
        match self.shared.begin_stop() {
            SessionState::Idle | SessionState::Closed => {}
            SessionState::Error => {
                if let Some(mut worker) = self.worker.take() {
                    worker.stop();
                }
            }
            previous => {
                debug!(from = %previous, "Stopping capture session");
                self.shared.listener.on_state_changed(SessionState::Stopping);
                if let Some(mut worker) = self.worker.take() {
                    worker.stop();
                }
                self.shared.set_state(SessionState::Closed);
                info!("Capture session closed");
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// What the current or last stream was configured with
    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.shared
            .stream_info
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Facing of the opened camera, or the requested facing before configuration
    pub fn lens_facing(&self) -> LensFacing {
        self.stream_info()
            .map(|info| info.lens_facing)
            .unwrap_or(self.facing)
    }

    pub fn sink_kind(&self) -> SinkKind {
        self.sink.kind()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive_until_dropped() {
        let first = CameraClaim::acquire(CameraBackendType::Synthetic, "claim-unit").unwrap();
        assert!(matches!(
            CameraClaim::acquire(CameraBackendType::Synthetic, "claim-unit"),
            Err(CaptureError::DeviceInUse)
        ));
        // Same id on another backend is a different camera
        let _other = CameraClaim::acquire(CameraBackendType::GStreamer, "claim-unit").unwrap();

        drop(first);
        assert!(CameraClaim::acquire(CameraBackendType::Synthetic, "claim-unit").is_ok());
    }

    #[test]
    fn test_channel_listener_forwards_events() {
        let (listener, mut receiver) = ChannelListener::channel();
        listener.on_state_changed(SessionState::Opening);
        listener.on_error(&CaptureError::DeviceDisabled);

        assert_eq!(
            receiver.try_recv().unwrap(),
            SessionEvent::StateChanged(SessionState::Opening)
        );
        assert_eq!(
            receiver.try_recv().unwrap(),
            SessionEvent::Error(CaptureError::DeviceDisabled)
        );
        assert!(receiver.try_recv().is_err());
    }
}
