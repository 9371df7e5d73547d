// SPDX-License-Identifier: GPL-3.0-only

//! Capture session state machine against the synthetic backend

mod common;

use camera_preview::backends::camera::{
    CaptureSession, ChannelListener, FrameSink, LensFacing, Resolution, SessionEvent,
    SessionState, SinkKind, SyntheticBackend,
};
use camera_preview::errors::CaptureError;
use camera_preview::frame::{FrameHandoff, PlanarFrame};
use common::{backend_with, wait_for};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

const TIMEOUT: Duration = Duration::from_secs(5);

fn planar_session(
    backend: SyntheticBackend,
) -> (
    CaptureSession,
    Arc<FrameHandoff<PlanarFrame>>,
    UnboundedReceiver<SessionEvent>,
) {
    let handoff = Arc::new(FrameHandoff::new());
    let (listener, events) = ChannelListener::channel();
    let session = CaptureSession::new(
        Arc::new(backend),
        FrameSink::Planar(Arc::clone(&handoff)),
        listener,
    );
    (session, handoff, events)
}

fn drain(events: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}

#[test]
fn test_start_streams_and_reports_configuration() {
    let (mut session, handoff, mut events) =
        planar_session(backend_with("session-stream", LensFacing::Back));
    handoff.set_camera_active(true);

    session.start(LensFacing::Back).unwrap();
    assert!(wait_for(TIMEOUT, || session.state() == SessionState::Streaming));
    assert!(wait_for(TIMEOUT, || handoff.frames_published() >= 3));

    let frame = handoff.consume_if_available().unwrap();
    assert_eq!((frame.width, frame.height), (320, 240));

    let info = session.stream_info().unwrap();
    assert_eq!(info.camera_id, "session-stream");
    assert_eq!(info.resolution, Resolution::new(320, 240));
    assert_eq!(info.sink, SinkKind::Planar);

    let events = drain(&mut events);
    assert_eq!(events[0], SessionEvent::StateChanged(SessionState::Opening));
    assert_eq!(events[1], SessionEvent::StateChanged(SessionState::Configuring));
    assert!(events.contains(&SessionEvent::Configured(info)));
    assert!(events.contains(&SessionEvent::StateChanged(SessionState::Streaming)));

    session.stop();
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_exact_target_resolution_is_used() {
    let (session, _handoff, _events) =
        planar_session(backend_with("session-target", LensFacing::Back));
    let mut session = session.with_target_resolution(Resolution::new(160, 120));

    session.start(LensFacing::Back).unwrap();
    assert!(wait_for(TIMEOUT, || session.stream_info().is_some()));
    assert_eq!(
        session.stream_info().unwrap().resolution,
        Resolution::new(160, 120)
    );
}

#[test]
fn test_start_while_streaming_is_rejected() {
    let (mut session, _handoff, _events) =
        planar_session(backend_with("session-twice", LensFacing::Back));
    session.start(LensFacing::Back).unwrap();
    assert!(wait_for(TIMEOUT, || session.state() == SessionState::Streaming));

    assert_eq!(
        session.start(LensFacing::Back),
        Err(CaptureError::AlreadyStarted)
    );
    assert_eq!(session.state(), SessionState::Streaming);
}

#[test]
fn test_stop_is_idempotent() {
    let (mut session, _handoff, _events) =
        planar_session(backend_with("session-stop", LensFacing::Back));
    session.stop();
    assert_eq!(session.state(), SessionState::Idle);

    session.start(LensFacing::Back).unwrap();
    assert!(wait_for(TIMEOUT, || session.state() == SessionState::Streaming));
    session.stop();
    session.stop();
    assert_eq!(session.state(), SessionState::Closed);

    // The camera was released and can be opened again
    session.start(LensFacing::Back).unwrap();
    assert!(wait_for(TIMEOUT, || session.state() == SessionState::Streaming));
}

#[test]
fn test_open_failure_lands_in_error() {
    let backend = backend_with("session-denied", LensFacing::Back);
    backend.set_open_error(Some(CaptureError::PermissionDenied));
    let (mut session, _handoff, mut events) = planar_session(backend);

    session.start(LensFacing::Back).unwrap();
    assert!(wait_for(TIMEOUT, || session.state() == SessionState::Error));

    let events = drain(&mut events);
    assert!(events.contains(&SessionEvent::Error(CaptureError::PermissionDenied)));
    assert_eq!(CaptureError::PermissionDenied.code(), "permission-denied");
}

#[test]
fn test_no_cameras_reports_unavailable() {
    let (mut session, _handoff, mut events) = planar_session(SyntheticBackend::empty());

    session.start(LensFacing::Front).unwrap();
    assert!(wait_for(TIMEOUT, || session.state() == SessionState::Error));
    let events = drain(&mut events);
    assert!(events.contains(&SessionEvent::Error(CaptureError::NoCameraAvailable)));
    assert!(CaptureError::NoCameraAvailable.is_device_unavailable());
}

#[test]
fn test_second_session_on_same_camera_is_in_use() {
    let backend = backend_with("session-shared", LensFacing::Back);
    let (mut first, _h1, _e1) = planar_session(backend.clone());
    let (mut second, _h2, mut events) = planar_session(backend);

    first.start(LensFacing::Back).unwrap();
    assert!(wait_for(TIMEOUT, || first.state() == SessionState::Streaming));

    second.start(LensFacing::Back).unwrap();
    assert!(wait_for(TIMEOUT, || second.state() == SessionState::Error));
    assert!(drain(&mut events).contains(&SessionEvent::Error(CaptureError::DeviceInUse)));
    assert_eq!(first.state(), SessionState::Streaming);
}

#[test]
fn test_stream_fault_then_restart() {
    let backend = backend_with("session-fault", LensFacing::Back);
    backend.set_stream_error_after(2, CaptureError::DeviceError("unplugged".to_string()));
    let (mut session, _handoff, mut events) = planar_session(backend.clone());

    session.start(LensFacing::Back).unwrap();
    assert!(wait_for(TIMEOUT, || session.state() == SessionState::Error));
    assert!(
        drain(&mut events)
            .contains(&SessionEvent::Error(CaptureError::DeviceError("unplugged".to_string())))
    );

    // Stopping a failed session keeps the error state
    session.stop();
    assert_eq!(session.state(), SessionState::Error);

    // Faults are read when a camera is opened; a fresh start recovers
    backend.set_stream_error_after(u64::MAX, CaptureError::DeviceDisabled);
    session.start(LensFacing::Back).unwrap();
    assert!(wait_for(TIMEOUT, || session.state() == SessionState::Streaming));
}

#[test]
fn test_facing_falls_back_to_first_camera() {
    let (mut session, _handoff, _events) =
        planar_session(backend_with("session-fallback", LensFacing::Back));

    session.start(LensFacing::Front).unwrap();
    assert!(wait_for(TIMEOUT, || session.stream_info().is_some()));
    assert_eq!(session.lens_facing(), LensFacing::Back);
}

#[test]
fn test_surface_sink_publishes_buffers() {
    let surface = camera_preview::frame::SurfaceTexture::new();
    surface.set_camera_active(true);
    let (listener, _events) = ChannelListener::channel();
    let mut session = CaptureSession::new(
        Arc::new(backend_with("session-surface", LensFacing::Front)),
        FrameSink::Surface(surface.producer()),
        listener,
    );

    session.start(LensFacing::Front).unwrap();
    assert!(wait_for(TIMEOUT, || surface.is_frame_available()));
    assert_eq!(session.sink_kind(), SinkKind::Surface);
    assert_eq!(session.lens_facing(), LensFacing::Front);
}
