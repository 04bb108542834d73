//! Heartbeat supervision.
//!
//! A heartbeat may only be sent once the previous one has been
//! acknowledged and the remote-supplied interval has elapsed, unless the
//! remote explicitly requests an immediate beat. An unacknowledged
//! heartbeat therefore blocks further sends until the ack arrives.

use std::time::{Duration, Instant};

/// Timer state for one shard's heartbeat loop.
#[derive(Clone, Debug)]
pub struct HeartbeatTimer {
    interval: Duration,
    last_reset: Instant,
    acked: bool,
}

impl HeartbeatTimer {
    /// Start a timer with the interval supplied at hello.
    ///
    /// The first beat is considered pre-acknowledged so it can go out as
    /// soon as the interval elapses.
    #[must_use]
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_reset: now,
            acked: true,
        }
    }

    /// Whether the interval has elapsed since the last send.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_reset) >= self.interval
    }

    /// Whether a beat may be sent now without being forced.
    #[must_use]
    pub fn may_send(&self, now: Instant) -> bool { self.acked && self.is_due(now) }

    /// Record a sent heartbeat: clears the ack flag and restarts the
    /// interval.
    pub fn sent(&mut self, now: Instant) {
        self.acked = false;
        self.last_reset = now;
    }

    /// Record an acknowledgement from the remote.
    pub fn acknowledged(&mut self) { self.acked = true; }

    /// Time remaining until the next beat is due.
    #[must_use]
    pub fn time_to_next(&self, now: Instant) -> Duration {
        self.interval
            .saturating_sub(now.saturating_duration_since(self.last_reset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(45_000);

    #[test]
    fn not_due_before_interval_elapses() {
        let start = Instant::now();
        let timer = HeartbeatTimer::new(INTERVAL, start);
        assert!(!timer.may_send(start));
        assert!(!timer.may_send(start + INTERVAL / 2));
        assert!(timer.may_send(start + INTERVAL));
    }

    #[test]
    fn unacked_beat_blocks_the_next_one() {
        let start = Instant::now();
        let mut timer = HeartbeatTimer::new(INTERVAL, start);
        let due = start + INTERVAL;
        assert!(timer.may_send(due));
        timer.sent(due);
        // Due again, but the prior beat was never acknowledged.
        assert!(!timer.may_send(due + INTERVAL));
        timer.acknowledged();
        assert!(timer.may_send(due + INTERVAL));
    }

    #[test]
    fn time_to_next_counts_down_from_send() {
        let start = Instant::now();
        let mut timer = HeartbeatTimer::new(INTERVAL, start);
        timer.sent(start);
        assert_eq!(timer.time_to_next(start), INTERVAL);
        assert_eq!(timer.time_to_next(start + INTERVAL / 3), INTERVAL - INTERVAL / 3);
    }
}
