//! Time sources for the monitoring core
//!
//! Every time-dependent decision (cooldowns, windows, retention) takes `now`
//! from a [`Clock`], so evaluation logic can be driven by a virtual clock in
//! tests instead of waiting on the wall clock.

use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Source of the current time
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Start of the span of length `span` ending at `now`
///
/// Saturates at the earliest representable instant instead of overflowing.
pub fn cutoff(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock
///
/// Clones share the same underlying instant, so a test can hand one clone to
/// the monitor and keep another to advance time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Clock positioned `millis` after the unix epoch
    pub fn at_millis(millis: i64) -> Self {
        Self::new(Utc.timestamp_millis_opt(millis).single().unwrap_or_default())
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = instant;
        }
    }

    pub fn set_millis(&self, millis: i64) {
        self.set(Utc.timestamp_millis_opt(millis).single().unwrap_or_default());
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}
