//! Conversation session statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Statistics about one conversation session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    /// Frames read from the device.
    pub frames_captured: u64,
    /// Frames forwarded to the remote session.
    pub frames_sent: u64,
    /// Audio payloads received from the remote session.
    pub frames_received: u64,
    /// Frames submitted to the device for playback.
    pub frames_played: u64,
    /// Interruption events received.
    pub interruptions: u64,
    /// Turn-complete events received.
    pub turns_completed: u64,
    /// Frames skipped and stage failures, summed.
    pub errors: u64,
    /// Time since the session started.
    pub duration: Duration,
}

impl SessionStats {
    /// Frames sent per second over the session.
    pub fn input_rate(&self) -> f64 {
        per_second(self.frames_sent, self.duration)
    }

    /// Frames received per second over the session.
    pub fn output_rate(&self) -> f64 {
        per_second(self.frames_received, self.duration)
    }
}

fn per_second(count: u64, duration: Duration) -> f64 {
    let secs = duration.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

/// Counters shared between the pipeline stages.
///
/// Each counter has exactly one writing stage:
/// - capture: `frames_captured`, `capture_errors`
/// - uplink: `frames_sent`
/// - downlink: `frames_received`, `interruptions`, `turns_completed`
/// - playback: `frames_played`, `playback_errors`
/// - supervisor: `stage_errors`
pub(crate) struct SessionState {
    pub frames_captured: AtomicU64,
    pub frames_sent: AtomicU64,
    pub frames_received: AtomicU64,
    pub frames_played: AtomicU64,
    pub interruptions: AtomicU64,
    pub turns_completed: AtomicU64,
    pub capture_errors: AtomicU64,
    pub playback_errors: AtomicU64,
    pub stage_errors: AtomicU64,
    started_at: Mutex<Instant>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            frames_captured: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_played: AtomicU64::new(0),
            interruptions: AtomicU64::new(0),
            turns_completed: AtomicU64::new(0),
            capture_errors: AtomicU64::new(0),
            playback_errors: AtomicU64::new(0),
            stage_errors: AtomicU64::new(0),
            started_at: Mutex::new(Instant::now()),
        }
    }

    /// Zeroes every counter and restarts the session clock.
    pub fn reset(&self) {
        for counter in [
            &self.frames_captured,
            &self.frames_sent,
            &self.frames_received,
            &self.frames_played,
            &self.interruptions,
            &self.turns_completed,
            &self.capture_errors,
            &self.playback_errors,
            &self.stage_errors,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
        *self.started_at.lock() = Instant::now();
    }

    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            frames_captured: self.frames_captured.load(Ordering::SeqCst),
            frames_sent: self.frames_sent.load(Ordering::SeqCst),
            frames_received: self.frames_received.load(Ordering::SeqCst),
            frames_played: self.frames_played.load(Ordering::SeqCst),
            interruptions: self.interruptions.load(Ordering::SeqCst),
            turns_completed: self.turns_completed.load(Ordering::SeqCst),
            errors: self.capture_errors.load(Ordering::SeqCst)
                + self.playback_errors.load(Ordering::SeqCst)
                + self.stage_errors.load(Ordering::SeqCst),
            duration: self.started_at.lock().elapsed(),
        }
    }
}
