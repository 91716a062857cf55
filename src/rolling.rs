//! # Rolling Window
//! Sliding window of publication timestamps used by the rate limiter.
//!
//! Time is always passed in by the caller, so the window has no clock of its
//! own and tests can drive it deterministically.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone)]
pub struct PublishWindow {
    window: Duration,
    /// Oldest at the front.
    stamps: VecDeque<DateTime<Utc>>,
}

impl PublishWindow {
    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            stamps: VecDeque::new(),
        }
    }

    /// Convenience constructor for the one-hour quota window.
    pub fn one_hour() -> Self {
        Self::with_window(Duration::hours(1))
    }

    /// Drop every stamp whose age is at least the window length.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        while let Some(&t) = self.stamps.front() {
            if now - t >= self.window {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record a publication at `at`. Out-of-order stamps are inserted in place
    /// so the front always holds the oldest one.
    pub fn record(&mut self, at: DateTime<Utc>) {
        let pos = self
            .stamps
            .iter()
            .rposition(|&t| t <= at)
            .map(|p| p + 1)
            .unwrap_or(0);
        self.stamps.insert(pos, at);
    }

    /// Number of stamps inside the window at `now`.
    pub fn count(&mut self, now: DateTime<Utc>) -> usize {
        self.prune(now);
        self.stamps.len()
    }

    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.stamps.front().copied()
    }

    /// When the oldest stamp leaves the window.
    pub fn next_slot(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.prune(now);
        self.oldest().map(|t| t + self.window)
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 26, 12, 0, 0).unwrap()
    }

    #[test]
    fn stamps_expire_after_exactly_one_window() {
        let mut w = PublishWindow::one_hour();
        w.record(t0());
        assert_eq!(w.count(t0() + Duration::minutes(59)), 1);
        assert_eq!(w.count(t0() + Duration::hours(1)), 0);
    }

    #[test]
    fn out_of_order_records_keep_oldest_in_front() {
        let mut w = PublishWindow::one_hour();
        w.record(t0() + Duration::minutes(10));
        w.record(t0());
        assert_eq!(w.oldest(), Some(t0()));
        assert_eq!(
            w.next_slot(t0() + Duration::minutes(20)),
            Some(t0() + Duration::hours(1))
        );
    }
}
