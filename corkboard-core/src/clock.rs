//! Millisecond clock used for box ids, z-indices and note timestamps.

use chrono::{DateTime, TimeZone, Utc};

/// Wall clock in milliseconds whose stamps never repeat or go backwards.
///
/// A manual clock can be used in tests; it only moves when advanced.
#[derive(Debug, Clone)]
pub struct StampClock {
    last: i64,
    manual: Option<i64>,
}

impl Default for StampClock {
    fn default() -> Self {
        Self::system()
    }
}

impl StampClock {
    pub fn system() -> Self {
        Self {
            last: i64::MIN,
            manual: None,
        }
    }

    pub fn manual(start_millis: i64) -> Self {
        Self {
            last: i64::MIN,
            manual: Some(start_millis),
        }
    }

    pub fn advance(&mut self, millis: i64) {
        if let Some(now) = self.manual.as_mut() {
            *now += millis;
        }
    }

    pub fn now_millis(&self) -> i64 {
        self.manual
            .unwrap_or_else(|| Utc::now().timestamp_millis())
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        match self.manual {
            Some(ms) => Utc.timestamp_millis_opt(ms).single().unwrap_or_default(),
            None => Utc::now(),
        }
    }

    /// Current time, bumped past the previous stamp when the clock has not
    /// moved.
    pub fn next_stamp(&mut self) -> i64 {
        let now = self.now_millis();
        let stamp = if self.last == i64::MIN {
            now
        } else {
            now.max(self.last + 1)
        };
        self.last = stamp;
        stamp
    }
}
