//! Deferred scheduling for collaboration writes
//!
//! Three timers drive traffic toward the document store:
//! - **Autosave**: debounced, every mutation pushes the deadline back (500ms)
//! - **Cursor updates**: throttled to one write per interval (100ms)
//! - **Presence heartbeat**: fixed interval refresh of `last_seen` (30s)
//!
//! None of them sleep or spawn; the host drives them with the current
//! [`Instant`], which keeps them usable from any event loop and from tests.
//!
//! ```rust
//! use schemaboard::core::collab::throttling::SaveDebouncer;
//! use std::time::{Duration, Instant};
//!
//! let start = Instant::now();
//! let mut debouncer = SaveDebouncer::new();
//! debouncer.schedule(start);
//! assert!(!debouncer.take_due(start + Duration::from_millis(100)));
//! assert!(debouncer.take_due(start + Duration::from_millis(500)));
//! ```

use std::time::{Duration, Instant};

/// Default autosave debounce delay
pub const DEFAULT_AUTOSAVE_MS: u64 = 500;

/// Default throttle interval for cursor updates
pub const DEFAULT_CURSOR_THROTTLE_MS: u64 = 100;

/// Default presence heartbeat interval
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;

/// Debouncer for persistence writes
///
/// Each `schedule` call replaces the pending deadline, so a burst of edits
/// collapses into a single write `delay` after the last one.
#[derive(Debug, Clone)]
pub struct SaveDebouncer {
    due_at: Option<Instant>,
    delay: Duration,
}

impl SaveDebouncer {
    pub fn new() -> Self {
        Self::with_delay(Duration::from_millis(DEFAULT_AUTOSAVE_MS))
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            due_at: None,
            delay,
        }
    }

    /// Schedule (or reschedule) a write
    pub fn schedule(&mut self, now: Instant) {
        self.due_at = Some(now + self.delay);
    }

    pub fn is_pending(&self) -> bool {
        self.due_at.is_some()
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.due_at.is_some_and(|due| now >= due)
    }

    /// Returns `true` once the deadline has passed and clears it
    pub fn take_due(&mut self, now: Instant) -> bool {
        if self.is_due(now) {
            self.due_at = None;
            true
        } else {
            false
        }
    }

    /// Time left before the pending write fires
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.due_at.map(|due| due.saturating_duration_since(now))
    }

    pub fn cancel(&mut self) {
        self.due_at = None;
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for SaveDebouncer {
    fn default() -> Self {
        Self::new()
    }
}

/// Throttler for cursor position updates
///
/// # Example
/// ```
/// # use schemaboard::core::collab::throttling::CursorThrottler;
/// # use std::time::Instant;
/// let now = Instant::now();
/// let mut throttler = CursorThrottler::new();
///
/// // First call always passes
/// assert!(throttler.try_send(now));
/// // Immediate subsequent call is dropped
/// assert!(!throttler.try_send(now));
/// ```
#[derive(Debug, Clone)]
pub struct CursorThrottler {
    last_sent: Option<Instant>,
    interval: Duration,
}

impl CursorThrottler {
    /// Create a new cursor throttler with default interval (100ms)
    pub fn new() -> Self {
        Self::with_interval(Duration::from_millis(DEFAULT_CURSOR_THROTTLE_MS))
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            last_sent: None,
            interval,
        }
    }

    /// Check if a cursor update may be sent at `now`
    pub fn should_send(&self, now: Instant) -> bool {
        match self.last_sent {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        }
    }

    pub fn mark_sent(&mut self, now: Instant) {
        self.last_sent = Some(now);
    }

    /// `should_send` + `mark_sent` in one step
    pub fn try_send(&mut self, now: Instant) -> bool {
        if self.should_send(now) {
            self.mark_sent(now);
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.last_sent = None;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for CursorThrottler {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed interval heartbeat
#[derive(Debug, Clone)]
pub struct Heartbeat {
    last_beat: Option<Instant>,
    interval: Duration,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self::with_interval(Duration::from_secs(DEFAULT_HEARTBEAT_SECS))
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            last_beat: None,
            interval,
        }
    }

    /// Start counting from `now`, e.g. right after the join write
    pub fn start(&mut self, now: Instant) {
        self.last_beat = Some(now);
    }

    pub fn stop(&mut self) {
        self.last_beat = None;
    }

    pub fn is_running(&self) -> bool {
        self.last_beat.is_some()
    }

    /// Returns `true` and records the beat when an interval has elapsed
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.last_beat {
            Some(last) if now.saturating_duration_since(last) >= self.interval => {
                self.last_beat = Some(now);
                true
            }
            _ => false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}
