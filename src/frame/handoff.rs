// SPDX-License-Identifier: GPL-3.0-only

//! Single-slot, latest-frame-wins mailbox between capture and drawing
//!
//! The slot and the two flags the contexts share (`camera_active`,
//! `available`) live behind one mutex, so deactivating the camera and
//! dropping the pending frame happen atomically with respect to `publish`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Callback fired (outside the lock) after every publish
pub type FrameCallback = Arc<dyn Fn() + Send + Sync>;

struct Slot<F> {
    frame: Option<F>,
    available: bool,
    camera_active: bool,
    /// Incremented on every publish, identifies the frame in the slot
    sequence: u64,
    dropped: u64,
}

/// Thread-safe single-slot mailbox
///
/// `publish` never waits for the consumer and never queues: a frame that has
/// not been consumed when the next one arrives is discarded.
pub struct FrameHandoff<F> {
    slot: Mutex<Slot<F>>,
    on_frame_available: Mutex<Option<FrameCallback>>,
}

impl<F: Clone> FrameHandoff<F> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                frame: None,
                available: false,
                camera_active: false,
                sequence: 0,
                dropped: 0,
            }),
            on_frame_available: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot<F>> {
        // A panicking holder cannot leave the slot half-written, keep going
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `frame` as the latest frame, replacing any unconsumed one
    pub fn publish(&self, frame: F) {
        {
            let mut slot = self.slot();
            // Frames published while inactive were never drawable
            if slot.available && slot.camera_active {
                slot.dropped += 1;
            }
            slot.frame = Some(frame);
            slot.available = true;
            slot.sequence += 1;
            trace!(sequence = slot.sequence, "Frame published");
        }

        let callback = self
            .on_frame_available
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Take the pending frame if the camera is active and one is available
    pub fn consume_if_available(&self) -> Option<F> {
        let mut slot = self.slot();
        if !slot.camera_active || !slot.available {
            return None;
        }
        slot.available = false;
        slot.frame.take()
    }

    /// Look at the pending frame without consuming it
    ///
    /// Used by consumers whose update step can fail: they call
    /// [`acknowledge`](Self::acknowledge) with the returned sequence only
    /// after the update succeeded.
    pub fn pending(&self) -> Option<(u64, F)> {
        let slot = self.slot();
        if !slot.camera_active || !slot.available {
            return None;
        }
        slot.frame.clone().map(|frame| (slot.sequence, frame))
    }

    /// Clear the pending flag if no newer frame arrived since `sequence`
    pub fn acknowledge(&self, sequence: u64) -> bool {
        let mut slot = self.slot();
        if slot.sequence != sequence || !slot.available {
            return false;
        }
        slot.available = false;
        slot.frame = None;
        true
    }

    /// Drop the pending frame and clear the flag
    pub fn reset(&self) {
        let mut slot = self.slot();
        slot.frame = None;
        slot.available = false;
    }

    /// Set whether the consumer may take frames
    ///
    /// Both transitions drop whatever is in the slot: on deactivation so a
    /// stale frame is never drawn afterwards, on activation so frames
    /// published while inactive are not drawn either.
    pub fn set_camera_active(&self, active: bool) {
        let mut slot = self.slot();
        if slot.camera_active != active {
            slot.frame = None;
            slot.available = false;
        }
        slot.camera_active = active;
    }

    pub fn is_camera_active(&self) -> bool {
        self.slot().camera_active
    }

    pub fn is_frame_available(&self) -> bool {
        self.slot().available
    }

    /// Total number of frames published
    pub fn frames_published(&self) -> u64 {
        self.slot().sequence
    }

    /// Frames replaced, while the camera was active, before the consumer took them
    pub fn frames_dropped(&self) -> u64 {
        self.slot().dropped
    }

    /// Install (or clear) the frame-available callback
    pub fn set_on_frame_available(&self, callback: Option<FrameCallback>) {
        *self
            .on_frame_available
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = callback;
    }
}

impl<F: Clone> Default for FrameHandoff<F> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn active() -> FrameHandoff<u32> {
        let handoff = FrameHandoff::new();
        handoff.set_camera_active(true);
        handoff
    }

    #[test]
    fn test_latest_frame_wins() {
        let handoff = active();
        handoff.publish(1);
        handoff.publish(2);

        assert_eq!(handoff.consume_if_available(), Some(2));
        assert_eq!(handoff.consume_if_available(), None);
        assert_eq!(handoff.frames_dropped(), 1);
    }

    #[test]
    fn test_inactive_camera_never_yields() {
        let handoff = FrameHandoff::new();
        handoff.publish(7u32);
        assert_eq!(handoff.consume_if_available(), None);
        assert!(handoff.pending().is_none());
    }

    #[test]
    fn test_drops_counted_only_while_active() {
        let handoff = FrameHandoff::new();
        handoff.publish(1u32);
        handoff.publish(2);
        handoff.publish(3);
        assert_eq!(handoff.frames_dropped(), 0);

        handoff.set_camera_active(true);
        handoff.publish(4);
        handoff.publish(5);
        assert_eq!(handoff.frames_dropped(), 1);
        assert_eq!(handoff.consume_if_available(), Some(5));
    }

    #[test]
    fn test_deactivation_clears_pending() {
        let handoff = active();
        handoff.publish(3);
        handoff.set_camera_active(false);
        assert!(!handoff.is_frame_available());

        handoff.set_camera_active(true);
        assert_eq!(handoff.consume_if_available(), None);
    }

    #[test]
    fn test_acknowledge_ignores_stale_sequence() {
        let handoff = active();
        handoff.publish(10);
        let (sequence, frame) = handoff.pending().unwrap();
        assert_eq!(frame, 10);

        handoff.publish(11);
        assert!(!handoff.acknowledge(sequence));
        assert!(handoff.is_frame_available());

        let (sequence, frame) = handoff.pending().unwrap();
        assert_eq!(frame, 11);
        assert!(handoff.acknowledge(sequence));
        assert!(!handoff.is_frame_available());
    }

    #[test]
    fn test_reset() {
        let handoff = active();
        handoff.publish(1);
        handoff.reset();
        assert_eq!(handoff.consume_if_available(), None);
    }

    #[test]
    fn test_callback_fires_per_publish() {
        let handoff = active();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        handoff.set_on_frame_available(Some(Arc::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        })));

        handoff.publish(1);
        handoff.publish(2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        handoff.set_on_frame_available(None);
        handoff.publish(3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
