//! Ranked, paginated feed views.

mod aggregator;
mod envelope;
mod validate;

pub use aggregator::{FeedItem, FeedService, FeedView, DEFAULT_FANOUT};
pub use envelope::{cursor, FeedPage};
pub use validate::{FeedParams, FeedQuery, ValidationError, DEFAULT_LIMIT, MAX_LIMIT};
