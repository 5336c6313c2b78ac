//! Price range and bar timespan definitions.
//!
//! This module defines [`PriceRange`] for the lookback windows callers ask for,
//! [`Timespan`] for bar granularity, and the fixed table mapping one onto the
//! other via [`PriceRange::window`].

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FeedError;

/// Lookback window for a price series request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceRange {
    /// One trading day.
    #[serde(rename = "1D")]
    OneDay,
    /// Five days.
    #[serde(rename = "5D")]
    FiveDays,
    /// One month.
    #[default]
    #[serde(rename = "1M")]
    OneMonth,
    /// Three months.
    #[serde(rename = "3M")]
    ThreeMonths,
    /// Six months.
    #[serde(rename = "6M")]
    SixMonths,
    /// One year.
    #[serde(rename = "1Y")]
    OneYear,
    /// Five years.
    #[serde(rename = "5Y")]
    FiveYears,
}

/// Bar granularity understood by aggregate endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timespan {
    /// Minute bars.
    Minute,
    /// Daily bars.
    Day,
    /// Weekly bars.
    Week,
}

impl Timespan {
    /// Wire name of the timespan.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Day => "day",
            Self::Week => "week",
        }
    }
}

/// Concrete request window derived from a [`PriceRange`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeWindow {
    /// First date of the window (inclusive).
    pub from: NaiveDate,
    /// Last date of the window (inclusive).
    pub to: NaiveDate,
    /// Number of timespans per bar.
    pub multiplier: u32,
    /// Bar granularity.
    pub timespan: Timespan,
}

impl PriceRange {
    /// All supported ranges, shortest first.
    pub const ALL: [Self; 7] = [
        Self::OneDay,
        Self::FiveDays,
        Self::OneMonth,
        Self::ThreeMonths,
        Self::SixMonths,
        Self::OneYear,
        Self::FiveYears,
    ];

    /// Short label, e.g. `"1M"`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OneDay => "1D",
            Self::FiveDays => "5D",
            Self::OneMonth => "1M",
            Self::ThreeMonths => "3M",
            Self::SixMonths => "6M",
            Self::OneYear => "1Y",
            Self::FiveYears => "5Y",
        }
    }

    /// Calendar days covered by the range.
    #[must_use]
    pub const fn lookback_days(&self) -> i64 {
        match self {
            Self::OneDay => 1,
            Self::FiveDays => 5,
            Self::OneMonth => 30,
            Self::ThreeMonths => 90,
            Self::SixMonths => 180,
            Self::OneYear => 365,
            Self::FiveYears => 1825,
        }
    }

    /// Bar size used for the range as `(multiplier, timespan)`.
    #[must_use]
    pub const fn bar_size(&self) -> (u32, Timespan) {
        match self {
            Self::OneDay => (5, Timespan::Minute),
            Self::FiveDays => (30, Timespan::Minute),
            Self::OneMonth | Self::ThreeMonths | Self::SixMonths | Self::OneYear => {
                (1, Timespan::Day)
            }
            Self::FiveYears => (1, Timespan::Week),
        }
    }

    /// Builds the request window ending on `today`.
    #[must_use]
    pub fn window(&self, today: NaiveDate) -> RangeWindow {
        let (multiplier, timespan) = self.bar_size();
        RangeWindow {
            from: today - Duration::days(self.lookback_days()),
            to: today,
            multiplier,
            timespan,
        }
    }
}

impl fmt::Display for PriceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceRange {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                FeedError::InvalidParameter(format!(
                    "Unknown range: {s}. Supported: 1D, 5D, 1M, 3M, 6M, 1Y, 5Y"
                ))
            })
    }
}
