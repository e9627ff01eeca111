//! Read-side access to the document collections.
//!
//! The feed engine only ever reads through [`DocumentStore`]; writes go
//! through the helpers in `queries` and belong to other collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::models::{AuthorSummary, Post, TemplateSummary};
use super::{queries, Database};
use crate::id::DocId;
use crate::time_window::TimeWindow;

/// Failure reading from the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
    #[error("malformed {collection} document: {reason}")]
    MalformedDocument {
        collection: &'static str,
        reason: String,
    },
}

impl StoreError {
    pub(crate) fn malformed(collection: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            collection,
            reason: reason.into(),
        }
    }
}

/// Constraints on the `posts` collection. Unset fields do not constrain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostFilter {
    pub public: Option<bool>,
    /// Inclusive lower bound on `created_at`.
    pub created_since: Option<DateTime<Utc>>,
    pub creator_id: Option<DocId>,
}

impl PostFilter {
    /// Public posts inside `window`, measured back from `now`.
    #[must_use]
    pub fn public_within(window: TimeWindow, now: DateTime<Utc>) -> Self {
        Self {
            public: Some(true),
            created_since: window.lower_bound(now),
            creator_id: None,
        }
    }

    #[must_use]
    pub fn with_creator(mut self, creator_id: DocId) -> Self {
        self.creator_id = Some(creator_id);
        self
    }
}

/// Sort order for post lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostSort {
    /// Insertion order.
    #[default]
    Natural,
    /// `created_at` descending, then id descending.
    NewestFirst,
}

/// Which likes to count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeFilter {
    /// Likes attached directly to a post, not to one of its comments.
    Post(DocId),
    /// Likes attached to a comment.
    Comment(DocId),
}

/// Which comments to count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentFilter {
    pub post_id: DocId,
}

/// Typed read access to posts, likes, comments, users and templates.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Find posts matching `filter`, skipping `skip` and returning at most `limit`.
    async fn find_posts(
        &self,
        filter: &PostFilter,
        sort: PostSort,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Post>, StoreError>;

    async fn find_post(&self, id: &DocId) -> Result<Option<Post>, StoreError>;

    async fn count_likes(&self, filter: &LikeFilter) -> Result<u64, StoreError>;

    async fn count_comments(&self, filter: &CommentFilter) -> Result<u64, StoreError>;

    async fn find_user(&self, id: &DocId) -> Result<Option<AuthorSummary>, StoreError>;

    async fn find_template(&self, id: &DocId) -> Result<Option<TemplateSummary>, StoreError>;
}

#[async_trait]
impl DocumentStore for Database {
    async fn find_posts(
        &self,
        filter: &PostFilter,
        sort: PostSort,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Post>, StoreError> {
        queries::find_posts(self.pool(), filter, sort, skip, limit).await
    }

    async fn find_post(&self, id: &DocId) -> Result<Option<Post>, StoreError> {
        queries::find_post(self.pool(), id).await
    }

    async fn count_likes(&self, filter: &LikeFilter) -> Result<u64, StoreError> {
        queries::count_likes(self.pool(), filter).await
    }

    async fn count_comments(&self, filter: &CommentFilter) -> Result<u64, StoreError> {
        queries::count_comments(self.pool(), filter).await
    }

    async fn find_user(&self, id: &DocId) -> Result<Option<AuthorSummary>, StoreError> {
        queries::find_user(self.pool(), id).await
    }

    async fn find_template(&self, id: &DocId) -> Result<Option<TemplateSummary>, StoreError> {
        queries::find_template(self.pool(), id).await
    }
}
