//! Query-parameter validation for feed requests.

use serde::Deserialize;
use thiserror::Error;

use crate::time_window::TimeWindow;

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 100;

/// Raw, unparsed feed query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub time_filter: Option<String>,
}

/// Validated paging and filtering parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedParams {
    /// Always in `1..=MAX_LIMIT`.
    pub limit: usize,
    pub offset: usize,
    pub time_window: TimeWindow,
}

impl Default for FeedParams {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
            time_window: TimeWindow::All,
        }
    }
}

/// A rejected query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl FeedQuery {
    /// Parse and bound the parameters.
    ///
    /// `limit` above [`MAX_LIMIT`] is clamped rather than rejected.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] naming the first offending field.
    pub fn validate(&self) -> Result<FeedParams, ValidationError> {
        let limit = match self.limit.as_deref() {
            None => DEFAULT_LIMIT,
            Some(raw) => {
                let value = parse_int(raw)
                    .ok_or_else(|| ValidationError::new("limit", "limit must be a valid integer"))?;
                if value <= 0 {
                    return Err(ValidationError::new(
                        "limit",
                        "limit must be a positive integer",
                    ));
                }
                usize::try_from(value).map_or(MAX_LIMIT, |v| v.min(MAX_LIMIT))
            }
        };

        let offset = match self.offset.as_deref() {
            None => 0,
            Some(raw) => {
                let value = parse_int(raw).ok_or_else(|| {
                    ValidationError::new("offset", "offset must be a valid integer")
                })?;
                usize::try_from(value).map_err(|_| {
                    ValidationError::new("offset", "offset must be a non-negative integer")
                })?
            }
        };

        let time_window = match self.time_filter.as_deref() {
            None => TimeWindow::All,
            Some(raw) => TimeWindow::from_token(raw).ok_or_else(|| {
                ValidationError::new(
                    "time_filter",
                    format!(
                        "time_filter must be one of: {}",
                        TimeWindow::ALL_TOKENS.join(", ")
                    ),
                )
            })?,
        };

        Ok(FeedParams {
            limit,
            offset,
            time_window,
        })
    }
}

fn parse_int(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}
