//! Rate limiting for flood protection.
//!
//! Per-session sliding window: timestamps older than the window are dropped,
//! then the event is refused if the window already holds `max_count` entries,
//! otherwise recorded and admitted. Sessions never race each other's window;
//! each session's events are checked under its own ordering.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

/// Session identifier.
type SessionId = String;

/// Window parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPreset {
    pub max_count: usize,
    pub window: Duration,
}

impl RateLimitPreset {
    /// General session-multiplexed events: 25 per 5 seconds.
    pub const GENERAL: Self = Self {
        max_count: 25,
        window: Duration::from_millis(5_000),
    };

    /// Classical-compat endpoint: 10 per 5 seconds.
    pub const CLASSIC: Self = Self {
        max_count: 10,
        window: Duration::from_millis(5_000),
    };
}

#[derive(Debug, Default)]
struct SlidingWindow {
    timestamps: VecDeque<Instant>,
}

impl SlidingWindow {
    fn check(&mut self, now: Instant, preset: RateLimitPreset) -> bool {
        while self
            .timestamps
            .front()
            .is_some_and(|t| now.duration_since(*t) >= preset.window)
        {
            self.timestamps.pop_front();
        }
        if self.timestamps.len() >= preset.max_count {
            return false;
        }
        self.timestamps.push_back(now);
        true
    }
}

/// Thread-safe per-session rate limiter.
#[derive(Debug, Default)]
pub struct RateLimitManager {
    windows: DashMap<SessionId, Mutex<SlidingWindow>>,
}

impl RateLimitManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a session may perform another event under `preset`.
    ///
    /// Returns `true` if admitted (and records the event), `false` if the
    /// window is full.
    pub fn check(&self, session_id: &str, preset: RateLimitPreset) -> bool {
        let entry = self
            .windows
            .entry(session_id.to_string())
            .or_default();
        let allowed = entry.lock().check(Instant::now(), preset);
        if !allowed {
            debug!(session = %session_id, "rate limit exceeded");
        }
        allowed
    }

    /// Drop a session's window (on disconnect).
    pub fn remove_session(&self, session_id: &str) {
        self.windows.remove(session_id);
    }

    /// Number of tracked sessions.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no sessions are tracked.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
