//! Transient status banner.
//!
//! A status shown after an operation clears itself after [`STATUS_TTL`]
//! and is replaced immediately by the next one. Time is passed in
//! explicitly so the lifecycle can be tested without sleeping.

use std::time::{Duration, Instant};

/// How long a status stays visible.
pub const STATUS_TTL: Duration = Duration::from_secs(3);

/// Banner tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Success,
    Critical,
}

/// A status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub tone: Tone,
    pub message: String,
}

impl Status {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            tone: Tone::Success,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn critical(message: impl Into<String>) -> Self {
        Self {
            tone: Tone::Critical,
            message: message.into(),
        }
    }
}

/// The banner slot. Holds at most one status.
#[derive(Debug)]
pub struct StatusBanner {
    current: Option<(Status, Instant)>,
    ttl: Duration,
}

impl Default for StatusBanner {
    fn default() -> Self {
        Self::new(STATUS_TTL)
    }
}

impl StatusBanner {
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self { current: None, ttl }
    }

    /// Show `status`, replacing whatever was visible.
    pub fn show(&mut self, status: Status, now: Instant) {
        self.current = Some((status, now));
    }

    /// The visible status at `now`, if it has not expired.
    #[must_use]
    pub fn current(&self, now: Instant) -> Option<&Status> {
        self.current
            .as_ref()
            .filter(|(_, shown_at)| now.saturating_duration_since(*shown_at) < self.ttl)
            .map(|(status, _)| status)
    }

    pub fn dismiss(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_expires_after_ttl() {
        let mut banner = StatusBanner::default();
        let t0 = Instant::now();
        banner.show(Status::success("Product deleted."), t0);

        assert_eq!(
            banner.current(t0 + Duration::from_millis(2999)),
            Some(&Status::success("Product deleted."))
        );
        assert_eq!(banner.current(t0 + STATUS_TTL), None);
    }

    #[test]
    fn test_new_status_supersedes_and_restarts_timer() {
        let mut banner = StatusBanner::default();
        let t0 = Instant::now();
        banner.show(Status::success("Product updated."), t0);

        let t1 = t0 + Duration::from_secs(2);
        banner.show(Status::critical("Product not found."), t1);

        let later = t0 + Duration::from_secs(4);
        assert_eq!(
            banner.current(later).map(|s| s.message.as_str()),
            Some("Product not found.")
        );
        assert_eq!(banner.current(t1 + STATUS_TTL), None);
    }

    #[test]
    fn test_dismiss() {
        let mut banner = StatusBanner::default();
        let now = Instant::now();
        banner.show(Status::critical("x"), now);
        banner.dismiss();
        assert_eq!(banner.current(now), None);
    }
}
