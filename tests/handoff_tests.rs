// SPDX-License-Identifier: GPL-3.0-only

//! Frame handoff under a real producer thread

use camera_preview::frame::FrameHandoff;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

const FRAMES: u64 = 20_000;

#[test]
fn test_latest_frame_wins_under_contention() {
    let handoff = Arc::new(FrameHandoff::<u64>::new());
    handoff.set_camera_active(true);

    let producer = {
        let handoff = Arc::clone(&handoff);
        thread::spawn(move || {
            for frame in 1..=FRAMES {
                handoff.publish(frame);
            }
        })
    };

    let mut consumed = Vec::new();
    while !producer.is_finished() || handoff.is_frame_available() {
        if let Some(frame) = handoff.consume_if_available() {
            consumed.push(frame);
        }
    }
    producer.join().unwrap();

    // Frames arrive in order, none twice
    assert!(consumed.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(consumed.last(), Some(&FRAMES));
    assert_eq!(handoff.frames_published(), FRAMES);
    assert_eq!(consumed.len() as u64 + handoff.frames_dropped(), FRAMES);
}

#[test]
fn test_no_frame_after_deactivation() {
    let handoff = Arc::new(FrameHandoff::<u64>::new());
    handoff.set_camera_active(true);
    let running = Arc::new(AtomicBool::new(true));

    let producer = {
        let handoff = Arc::clone(&handoff);
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut frame = 0;
            while running.load(Ordering::Relaxed) {
                frame += 1;
                handoff.publish(frame);
            }
        })
    };

    for _ in 0..100 {
        handoff.set_camera_active(false);
        // The producer keeps publishing, the consumer sees nothing
        for _ in 0..50 {
            assert_eq!(handoff.consume_if_available(), None);
            assert!(handoff.pending().is_none());
        }
        handoff.set_camera_active(true);
    }

    running.store(false, Ordering::Relaxed);
    producer.join().unwrap();
}

#[test]
fn test_frames_published_while_inactive_are_not_drawn() {
    let handoff = FrameHandoff::<u64>::new();
    handoff.publish(1);
    handoff.set_camera_active(true);
    assert_eq!(handoff.consume_if_available(), None);

    handoff.publish(2);
    assert_eq!(handoff.consume_if_available(), Some(2));
}

#[test]
fn test_callback_runs_for_every_publish() {
    let handoff = Arc::new(FrameHandoff::<u64>::new());
    let calls = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&calls);
    handoff.set_on_frame_available(Some(Arc::new(move || {
        counter.fetch_add(1, Ordering::Relaxed);
    })));

    let producer = {
        let handoff = Arc::clone(&handoff);
        thread::spawn(move || {
            for frame in 0..1_000 {
                handoff.publish(frame);
            }
        })
    };
    producer.join().unwrap();
    assert_eq!(calls.load(Ordering::Relaxed), 1_000);

    handoff.set_on_frame_available(None);
    handoff.publish(0);
    assert_eq!(calls.load(Ordering::Relaxed), 1_000);
}
