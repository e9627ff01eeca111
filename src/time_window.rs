//! Symbolic time buckets for feed filtering.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A feed time bucket, always anchored to "now" in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Day,
    Week,
    Month,
    Year,
    #[default]
    All,
}

impl TimeWindow {
    /// Every accepted token, in the order shown to callers.
    pub const ALL_TOKENS: [&'static str; 5] = ["day", "week", "month", "year", "all"];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
            Self::All => "all",
        }
    }

    /// Strict token lookup. Returns `None` for anything not in [`Self::ALL_TOKENS`].
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    /// Span covered by the bucket, or `None` for [`TimeWindow::All`].
    #[must_use]
    pub fn span(&self) -> Option<Duration> {
        match self {
            Self::Day => Some(Duration::days(1)),
            Self::Week => Some(Duration::days(7)),
            Self::Month => Some(Duration::days(30)),
            Self::Year => Some(Duration::days(365)),
            Self::All => None,
        }
    }

    /// Inclusive lower bound on `created_at` relative to `now`.
    #[must_use]
    pub fn lower_bound(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.span().map(|span| now - span)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
