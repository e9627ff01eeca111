//! Feed ranking and aggregation service.
//!
//! Serves three ranked, paginated, time-windowed views over user posts:
//! top-liked, most-recent and most-discussed. Like and comment counts and
//! author/template display fields are joined at read time from the
//! document collections.

pub mod config;
pub mod db;
pub mod feed;
pub mod id;
pub mod time_window;
pub mod web;
