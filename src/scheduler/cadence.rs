// src/scheduler/cadence.rs
//! Hour-of-day cadence table and jitter.

use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use rand::Rng;
use std::time::Duration;

use crate::error::{MonitorError, MonitorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HourBucket {
    /// [0, 6)
    LowTraffic,
    /// [6, 12)
    Midday,
    /// [12, 24)
    Peak,
}

impl HourBucket {
    pub fn of(hour: u32) -> Self {
        match hour % 24 {
            0..=5 => Self::LowTraffic,
            6..=11 => Self::Midday,
            _ => Self::Peak,
        }
    }
}

/// Base polling interval per hour bucket. Must be non-increasing from
/// low traffic to peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CadenceTable {
    pub extended: Duration,
    pub normal: Duration,
    pub intensive: Duration,
}

impl Default for CadenceTable {
    fn default() -> Self {
        Self {
            extended: Duration::from_secs(3600),
            normal: Duration::from_secs(300),
            intensive: Duration::from_secs(60),
        }
    }
}

impl CadenceTable {
    pub fn validate(&self) -> MonitorResult<()> {
        if self.intensive.is_zero() {
            return Err(MonitorError::config("intensive interval must be > 0"));
        }
        if !(self.extended >= self.normal && self.normal >= self.intensive) {
            return Err(MonitorError::config(format!(
                "cadence must be non-increasing from low traffic to peak (got {}s / {}s / {}s)",
                self.extended.as_secs(),
                self.normal.as_secs(),
                self.intensive.as_secs()
            )));
        }
        Ok(())
    }

    pub fn base_for(&self, bucket: HourBucket) -> Duration {
        match bucket {
            HourBucket::LowTraffic => self.extended,
            HourBucket::Midday => self.normal,
            HourBucket::Peak => self.intensive,
        }
    }

    pub fn base_for_hour(&self, hour: u32) -> Duration {
        self.base_for(HourBucket::of(hour))
    }

    /// Base interval for `now` seen in the given fixed offset.
    pub fn base_at(&self, now: DateTime<Utc>, offset: FixedOffset) -> Duration {
        self.base_for_hour(now.with_timezone(&offset).hour())
    }
}

/// `base * U[1 - band, 1 + band]`. A band of 0 returns `base` unchanged.
pub fn jittered<R: Rng + ?Sized>(base: Duration, band: f64, rng: &mut R) -> Duration {
    if band <= 0.0 {
        return base;
    }
    let factor = rng.random_range((1.0 - band)..=(1.0 + band));
    base.mul_f64(factor)
}

/// Out-of-range offsets fall back to UTC; config validation rejects them first.
pub fn fixed_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| Utc.fix())
}
