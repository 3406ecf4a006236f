//! Wall-clock sources and display formatting.
//!
//! All accounting works on UTC instants. Local time only shows up in the
//! labels handed to the dashboard, via [`DisplayZone`].

use std::sync::Mutex;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, FixedOffset, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used by tests and replay tooling.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard += by;
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Fixed UTC offset used to render human-readable time labels.
#[derive(Debug, Clone, Copy)]
pub struct DisplayZone {
    offset: FixedOffset,
}

impl DisplayZone {
    pub fn from_offset_minutes(minutes: i32) -> Result<Self> {
        let offset = FixedOffset::east_opt(minutes.saturating_mul(60))
            .ok_or_else(|| anyhow!("utc offset of {minutes} minutes is out of range"))?;
        Ok(Self { offset })
    }

    /// Time of day, e.g. `2:05:09 PM`.
    pub fn time_label(&self, instant: DateTime<Utc>) -> String {
        instant
            .with_timezone(&self.offset)
            .format("%-I:%M:%S %p")
            .to_string()
    }

    pub fn date_time_label(&self, instant: DateTime<Utc>) -> String {
        instant
            .with_timezone(&self.offset)
            .format("%Y-%m-%d %H:%M:%S %:z")
            .to_string()
    }
}
