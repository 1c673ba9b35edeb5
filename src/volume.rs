//! # Swap volume windows
//!
//! Volume queries arrive as `(from, to)` pairs of unix seconds where a `to` of
//! `0` has always meant "up to now". [`VolumeWindow::from_legacy`] turns that
//! sentinel into an explicit open upper bound so nothing below the repository
//! ever sees the magic value.
//!
//! Stores keep swap volume pre-aggregated per [`VolumeResolution`] bucket.
//! [`WindowPlan`] splits an arbitrary inclusive window into the run of whole
//! buckets that can be read from those aggregates plus at most two partial
//! edges that need an index-ranged scan of raw swaps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Latest timestamp a window may name, 9999-12-31T23:59:59Z.
pub const MAX_TIMESTAMP: i64 = 253_402_300_799;

/// Bucket sizes maintained by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeResolution {
    Hour,
    FourHours,
    Day,
    Week,
}

impl VolumeResolution {
    pub const ALL: [VolumeResolution; 4] = [
        VolumeResolution::Hour,
        VolumeResolution::FourHours,
        VolumeResolution::Day,
        VolumeResolution::Week,
    ];

    /// Bucket length in seconds.
    pub fn seconds(&self) -> i64 {
        match self {
            VolumeResolution::Hour => 3_600,
            VolumeResolution::FourHours => 14_400,
            VolumeResolution::Day => 86_400,
            VolumeResolution::Week => 604_800,
        }
    }

    /// Start of the bucket containing `ts`.
    ///
    /// Buckets are aligned to the unix epoch, so weekly buckets start on
    /// Thursdays.
    pub fn bucket_start(&self, ts: i64) -> i64 {
        ts.div_euclid(self.seconds()).saturating_mul(self.seconds())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeResolution::Hour => "1h",
            VolumeResolution::FourHours => "4h",
            VolumeResolution::Day => "1d",
            VolumeResolution::Week => "1w",
        }
    }
}

impl fmt::Display for VolumeResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VolumeResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1h" | "hour" | "hourly" => Ok(VolumeResolution::Hour),
            "4h" | "4hours" => Ok(VolumeResolution::FourHours),
            "1d" | "day" | "daily" => Ok(VolumeResolution::Day),
            "1w" | "week" | "weekly" => Ok(VolumeResolution::Week),
            other => Err(format!("unknown volume resolution '{}'", other)),
        }
    }
}

/// Inclusive time window over swap timestamps, unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeWindow {
    pub from: i64,
    /// Upper bound; `None` means "up to now".
    pub to: Option<i64>,
}

impl VolumeWindow {
    pub fn new(from: i64, to: Option<i64>) -> Self {
        Self { from, to }
    }

    /// Build a window from the `(from, to)` pair used by API callers, where
    /// `to == 0` is the open-ended marker rather than the epoch.
    pub fn from_legacy(from: i64, to: i64) -> Self {
        Self {
            from,
            to: if to == 0 { None } else { Some(to) },
        }
    }

    pub fn is_open_ended(&self) -> bool {
        self.to.is_none()
    }

    /// Concrete upper bound, substituting `now` for an open end.
    pub fn resolve_to(&self, now: i64) -> i64 {
        self.to.unwrap_or(now)
    }

    pub fn contains(&self, ts: i64, now: i64) -> bool {
        ts >= self.from && ts <= self.resolve_to(now)
    }

    /// Checks both bounds lie in `[0, MAX_TIMESTAMP]` and are ordered; an
    /// open end is always valid.
    pub fn validate(&self) -> Result<(), String> {
        if !(0..=MAX_TIMESTAMP).contains(&self.from) {
            return Err(format!("window start {} is out of range", self.from));
        }
        match self.to {
            Some(to) if !(0..=MAX_TIMESTAMP).contains(&to) => {
                Err(format!("window end {} is out of range", to))
            }
            Some(to) if to < self.from => Err(format!(
                "window end {} precedes window start {}",
                to, self.from
            )),
            _ => Ok(()),
        }
    }
}

/// Decomposition of an inclusive `[from, to]` window into aggregate buckets and
/// raw-scan edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlan {
    pub resolution: VolumeResolution,
    /// Partial range before the first whole bucket, inclusive.
    pub head: Option<(i64, i64)>,
    /// First and last whole bucket start, inclusive.
    pub buckets: Option<(i64, i64)>,
    /// Partial range after the last whole bucket, inclusive.
    pub tail: Option<(i64, i64)>,
}

impl WindowPlan {
    pub fn new(from: i64, to: i64, resolution: VolumeResolution) -> Self {
        let size = resolution.seconds();
        if to < from {
            return Self {
                resolution,
                head: None,
                buckets: None,
                tail: None,
            };
        }

        let first_full = if from.rem_euclid(size) == 0 {
            from
        } else {
            resolution.bucket_start(from).saturating_add(size)
        };
        // start of the bucket that holds to + 1; every bucket before it ends at or before `to`
        let boundary = resolution.bucket_start(to.saturating_add(1));

        if first_full >= boundary {
            return Self {
                resolution,
                head: Some((from, to)),
                buckets: None,
                tail: None,
            };
        }

        Self {
            resolution,
            head: (from < first_full).then_some((from, first_full - 1)),
            buckets: Some((first_full, boundary - size)),
            tail: (boundary <= to).then_some((boundary, to)),
        }
    }
}
