//! Wall-clock access and duration helpers.
//!
//! All timing in the engine is derived from absolute timestamps plus "now".
//! The [`Clock`] trait is the only place "now" comes from, so tests and
//! simulations can move time arbitrarily (including across a simulated
//! process restart).

use std::cell::Cell;

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveTime, Offset, TimeZone, Utc};

/// Source of the current time and of the local calendar offset.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// UTC offset used to bucket timestamps into local calendar days.
    fn utc_offset_at(&self, at: DateTime<Utc>) -> FixedOffset;
}

/// The real clock, bucketing days by the system time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn utc_offset_at(&self, at: DateTime<Utc>) -> FixedOffset {
        at.with_timezone(&Local).offset().fix()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Cell<DateTime<Utc>>,
    offset: FixedOffset,
}

impl ManualClock {
    /// Manual clock at `now`, bucketing days in UTC.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_offset(now, Utc.fix())
    }

    pub fn with_offset(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: Cell::new(now),
            offset,
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.now.set(now);
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }

    pub fn advance_mins(&self, mins: i64) {
        self.advance(Duration::minutes(mins));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    fn utc_offset_at(&self, _at: DateTime<Utc>) -> FixedOffset {
        self.offset
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }

    fn utc_offset_at(&self, at: DateTime<Utc>) -> FixedOffset {
        (**self).utc_offset_at(at)
    }
}

// ── Pure helpers ─────────────────────────────────────────────────────

/// Signed whole seconds from `from` to `to`.
pub fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds()
}

pub fn minutes_to_seconds(minutes: u32) -> i64 {
    i64::from(minutes) * 60
}

/// Round seconds to whole minutes, half up. Negative input rounds to 0.
pub fn round_seconds_to_minutes(secs: i64) -> u32 {
    if secs <= 0 {
        return 0;
    }
    u32::try_from((secs + 30) / 60).unwrap_or(u32::MAX)
}

/// `[start, end)` of the local calendar day containing `now`.
pub fn local_day_bounds(
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let local = now.with_timezone(&offset);
    let midnight = local.date_naive().and_time(NaiveTime::MIN);
    let start = offset
        .from_local_datetime(&midnight)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now);
    (start, start + Duration::days(1))
}

pub fn same_local_day(a: DateTime<Utc>, b: DateTime<Utc>, offset: FixedOffset) -> bool {
    a.with_timezone(&offset).date_naive() == b.with_timezone(&offset).date_naive()
}

/// Countdown display: `MM:SS`, or `H:MM:SS` from one hour up.
pub fn format_clock(secs: i64) -> String {
    let secs = secs.max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
