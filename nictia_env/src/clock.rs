// Wall-clock access and calendar breakdown.
//
// Every time-dependent computation in the crate (solar position, season,
// the day/night hour) works from a `ClockReading`: day of year, hour and
// minute in the location's local time. Readings are derived from a Unix
// timestamp plus a fixed UTC offset through `chrono`, so no timezone
// database is involved. The offset comes from the forecast
// response; daylight saving is whatever the provider reports at fetch time.
//
// `WallClock` is the only way the crate learns the current time.
// `SystemClock` reads the OS; `FixedClock` is a settable clock shared
// between clones, for tests and offline renders.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Local calendar position used by the solar and seasonal models.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockReading {
    /// 1-based ordinal day: January 1 is day 1.
    pub day_of_year: u32,
    pub hour: u32,
    pub minute: u32,
}

impl ClockReading {
    pub fn new(day_of_year: u32, hour: u32, minute: u32) -> Self {
        Self {
            day_of_year,
            hour,
            minute,
        }
    }

    /// Break a Unix timestamp down into local time at `utc_offset_seconds`.
    ///
    /// Offsets outside a day fall back to UTC. Timestamps outside chrono's
    /// range read as the epoch.
    pub fn from_unix(unix_seconds: i64, utc_offset_seconds: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_seconds).unwrap_or_else(|| {
            log::warn!("utc offset {utc_offset_seconds}s out of range, using UTC");
            Utc.fix()
        });
        let local = DateTime::from_timestamp(unix_seconds, 0)
            .unwrap_or_default()
            .with_timezone(&offset);
        Self {
            day_of_year: local.ordinal(),
            hour: local.hour(),
            minute: local.minute(),
        }
    }

    /// Fractional hours since local midnight.
    pub fn fractional_hour(&self) -> f64 {
        f64::from(self.hour) + f64::from(self.minute) / 60.0
    }
}

// ---------------------------------------------------------------------------
// Clocks
// ---------------------------------------------------------------------------

/// Source of "now" as a Unix timestamp in seconds.
pub trait WallClock: Send + Sync {
    fn now_unix(&self) -> i64;

    fn reading(&self, utc_offset_seconds: i32) -> ClockReading {
        ClockReading::from_unix(self.now_unix(), utc_offset_seconds)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_unix(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Manually driven clock. Clones share the same instant.
#[derive(Clone, Debug)]
pub struct FixedClock {
    now: Arc<AtomicI64>,
}

impl FixedClock {
    pub fn new(unix_seconds: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(unix_seconds)),
        }
    }

    pub fn set(&self, unix_seconds: i64) {
        self.now.store(unix_seconds, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl WallClock for FixedClock {
    fn now_unix(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
