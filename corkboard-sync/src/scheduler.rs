//! Timer primitives for the sync engine.
//!
//! All timers are plain deadlines compared against a caller-supplied
//! `Instant`, so the engine stays deterministic under test. The async driver
//! sleeps until [`earliest`] of the armed deadlines.

use std::time::{Duration, Instant};

/// Fires once, `delay` after the most recent poke.
#[derive(Debug, Clone)]
pub struct Debounce {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Restart the countdown.
    pub fn poke(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    /// True exactly once per countdown, when it has elapsed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(at) if now >= at => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Fixed-period ticker. Missed periods collapse into a single fire.
#[derive(Debug, Clone)]
pub struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    pub fn new(period: Duration, now: Instant) -> Self {
        Self {
            period,
            next: now + period,
        }
    }

    pub fn fire(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next = now + self.period;
        true
    }

    pub fn reset(&mut self, now: Instant) {
        self.next = now + self.period;
    }

    pub fn deadline(&self) -> Instant {
        self.next
    }
}

/// A single fallback deadline, armed and disarmed explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeout {
    deadline: Option<Instant>,
}

impl Timeout {
    pub fn arm(&mut self, now: Instant, after: Duration) {
        self.deadline = Some(now + after);
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(at) if now >= at => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Earliest of a set of optional deadlines.
pub fn earliest(deadlines: impl IntoIterator<Item = Option<Instant>>) -> Option<Instant> {
    deadlines.into_iter().flatten().min()
}

/// Exponential reconnect backoff: `base * 2^attempt`, capped.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempts: 0,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u32.saturating_pow(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn debounce_restarts_on_poke() {
        let t0 = Instant::now();
        let mut d = Debounce::new(1000 * MS);
        d.poke(t0);
        d.poke(t0 + 600 * MS);
        assert!(!d.fire(t0 + 1000 * MS));
        assert!(d.fire(t0 + 1600 * MS));
        assert!(!d.fire(t0 + 5000 * MS));
    }

    #[test]
    fn ticker_collapses_missed_periods() {
        let t0 = Instant::now();
        let mut t = Ticker::new(15_000 * MS, t0);
        assert!(!t.fire(t0 + 14_999 * MS));
        assert!(t.fire(t0 + 60_000 * MS));
        assert_eq!(t.deadline(), t0 + 75_000 * MS);
    }

    #[test]
    fn timeout_fires_once() {
        let t0 = Instant::now();
        let mut t = Timeout::default();
        assert!(!t.fire(t0));
        t.arm(t0, 500 * MS);
        assert!(t.is_armed());
        assert!(t.fire(t0 + 500 * MS));
        assert!(!t.fire(t0 + 501 * MS));
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let mut b = Backoff::new(1000 * MS, 15_000 * MS);
        let delays: Vec<u128> = (0..6).map(|_| b.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 15_000, 15_000]);
        b.reset();
        assert_eq!(b.next_delay(), 1000 * MS);
    }

    #[test]
    fn earliest_ignores_unarmed() {
        let t0 = Instant::now();
        assert_eq!(earliest([None, Some(t0 + MS), Some(t0)]), Some(t0));
        assert_eq!(earliest([None, None]), None);
    }
}
