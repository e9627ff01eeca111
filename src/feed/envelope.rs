use serde::Serialize;

use super::validate::FeedParams;
use crate::time_window::TimeWindow;

/// One page of a feed plus cursors to its neighbours.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedPage<T> {
    /// Items in this page, not the total matching the filter.
    pub count: usize,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> FeedPage<T> {
    /// Wrap `results` fetched with `params`.
    ///
    /// `next` is offered whenever the page came back full, which means
    /// "may have more", not "has more".
    #[must_use]
    pub fn build(results: Vec<T>, params: &FeedParams) -> Self {
        let next = (results.len() == params.limit).then(|| {
            cursor(
                params.limit,
                params.offset + params.limit,
                params.time_window,
            )
        });

        let previous = (params.offset > 0).then(|| {
            cursor(
                params.limit,
                params.offset.saturating_sub(params.limit),
                params.time_window,
            )
        });

        Self {
            count: results.len(),
            next,
            previous,
            results,
        }
    }
}

/// Relative query string addressing one page. Always carries the time filter.
#[must_use]
pub fn cursor(limit: usize, offset: usize, time_window: TimeWindow) -> String {
    format!("?limit={limit}&offset={offset}&time_filter={time_window}")
}
