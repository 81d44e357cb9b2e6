use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for traffic the session dropped or could not deliver.
#[derive(Debug, Default)]
pub struct Diagnostics {
    malformed_frames: AtomicU64,
    unhandled_frames: AtomicU64,
    dropped_frames: AtomicU64,
    send_failures: AtomicU64,
    heartbeat_timeouts: AtomicU64,
}

/// Point-in-time copy of [`Diagnostics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
    /// Inbound bytes that did not parse, plus commands with an invalid
    /// payload. Neither reaches a subscriber.
    pub malformed_frames: u64,
    /// Frames of a kind nobody subscribed to.
    pub unhandled_frames: u64,
    /// Frames dropped because a subscriber's queue was full.
    pub dropped_frames: u64,
    /// Sends rejected because the channel was down or the write failed.
    pub send_failures: u64,
    pub heartbeat_timeouts: u64,
}

impl Diagnostics {
    pub(crate) fn malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unhandled_frame(&self) {
        self.unhandled_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dropped_frame(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn heartbeat_timeout(&self) {
        self.heartbeat_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            unhandled_frames: self.unhandled_frames.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            heartbeat_timeouts: self.heartbeat_timeouts.load(Ordering::Relaxed),
        }
    }
}
