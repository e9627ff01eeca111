//! Ranked feed views over the document store.
//!
//! Each view filters public posts by time window, attaches like and comment
//! counts plus author and template display fields, and orders the result
//! with a deterministic tie-break:
//!
//! - top-liked: `likes_count` desc, then `created_at` desc
//! - most-recent: `created_at` desc
//! - most-discussed: `comments_count` desc, then `created_at` desc
//!
//! Most-recent sorts on a stored column, so the store sorts and pages it and
//! only the final page is enriched. The other two rank on derived counts, so
//! every candidate is counted before sorting and paging; author and template
//! lookups still run only for the final page.
//!
//! Store failures never escape a view call: they are logged and the view
//! degrades to an empty page.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, error, info};

use super::validate::FeedParams;
use crate::db::{
    AuthorSummary, CommentFilter, DocumentStore, LikeFilter, Post, PostFilter, PostSort,
    StoreError, TemplateSummary,
};
use crate::id::{DocId, InvalidIdentifier};

/// Default bound on concurrently enriched items per request.
pub const DEFAULT_FANOUT: usize = 8;

/// A ranking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedView {
    TopLiked,
    MostRecent,
    MostDiscussed,
}

impl FeedView {
    pub const ALL: [FeedView; 3] = [Self::TopLiked, Self::MostRecent, Self::MostDiscussed];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopLiked => "top-liked",
            Self::MostRecent => "most-recent",
            Self::MostDiscussed => "most-discussed",
        }
    }

    /// Primary ranking key, if the view ranks on a derived count.
    fn derived_key(self, counts: Counts) -> Option<u64> {
        match self {
            Self::TopLiked => Some(counts.likes),
            Self::MostDiscussed => Some(counts.comments),
            Self::MostRecent => None,
        }
    }

    fn compare(self, a: &Counted, b: &Counted) -> Ordering {
        let by_key = match (self.derived_key(a.counts), self.derived_key(b.counts)) {
            (Some(ka), Some(kb)) => kb.cmp(&ka),
            _ => Ordering::Equal,
        };
        by_key.then_with(|| b.post.created_at.cmp(&a.post.created_at))
    }
}

impl fmt::Display for FeedView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A post enriched for a ranked view. Identifiers serialize as canonical strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedItem {
    pub id: DocId,
    pub template_id: DocId,
    pub creator_id: DocId,
    pub creator_username: Option<String>,
    pub template_title: Option<String>,
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub public: bool,
    pub likes_count: u64,
    pub comments_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl FeedItem {
    fn assemble(
        post: Post,
        counts: Counts,
        author: Option<AuthorSummary>,
        template: Option<TemplateSummary>,
    ) -> Self {
        Self {
            id: post.id,
            template_id: post.template_id,
            creator_id: post.creator_id,
            creator_username: author.map(|a| a.username),
            template_title: template.map(|t| t.title),
            content: post.content,
            created_at: post.created_at,
            updated_at: post.updated_at,
            public: post.public,
            likes_count: counts.likes,
            comments_count: counts.comments,
            image_url: post.image_url,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counts {
    likes: u64,
    comments: u64,
}

#[derive(Debug)]
struct Counted {
    post: Post,
    counts: Counts,
}

/// Computes ranked feed pages. Holds no per-request state.
#[derive(Clone)]
pub struct FeedService {
    store: Arc<dyn DocumentStore>,
    fanout: usize,
}

impl FeedService {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_fanout(store, DEFAULT_FANOUT)
    }

    /// `fanout` bounds how many items are enriched concurrently; zero is treated as one.
    #[must_use]
    pub fn with_fanout(store: Arc<dyn DocumentStore>, fanout: usize) -> Self {
        Self {
            store,
            fanout: fanout.max(1),
        }
    }

    #[must_use]
    pub fn fanout(&self) -> usize {
        self.fanout
    }

    pub async fn top_liked(&self, params: &FeedParams) -> Vec<FeedItem> {
        self.page(FeedView::TopLiked, params).await
    }

    pub async fn most_recent(&self, params: &FeedParams) -> Vec<FeedItem> {
        self.page(FeedView::MostRecent, params).await
    }

    pub async fn most_discussed(&self, params: &FeedParams) -> Vec<FeedItem> {
        self.page(FeedView::MostDiscussed, params).await
    }

    /// One page of `view`. Empty on any store failure.
    pub async fn page(&self, view: FeedView, params: &FeedParams) -> Vec<FeedItem> {
        debug!(
            view = %view,
            limit = params.limit,
            offset = params.offset,
            time_filter = %params.time_window,
            "Computing feed page"
        );

        let filter = PostFilter::public_within(params.time_window, Utc::now());
        self.run(view, &filter, params).await
    }

    /// Public posts by one creator, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidIdentifier`] if `creator_id` is not a canonical id.
    /// Store failures yield an empty page instead.
    pub async fn by_creator(
        &self,
        creator_id: &str,
        params: &FeedParams,
    ) -> Result<Vec<FeedItem>, InvalidIdentifier> {
        let creator_id = DocId::parse_str(creator_id)?;
        debug!(creator_id = %creator_id, limit = params.limit, offset = params.offset, "Computing creator feed");

        let filter =
            PostFilter::public_within(params.time_window, Utc::now()).with_creator(creator_id);
        Ok(self.run(FeedView::MostRecent, &filter, params).await)
    }

    /// A single public post as a feed item.
    ///
    /// Private and missing posts are `None`, as is any store failure.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidIdentifier`] if `id` is not a canonical id.
    pub async fn item(&self, id: &str) -> Result<Option<FeedItem>, InvalidIdentifier> {
        let id = DocId::parse_str(id)?;

        Ok(self.try_item(&id).await.unwrap_or_else(|e| {
            error!(post_id = %id, error = %e, "Failed to load feed item");
            None
        }))
    }

    async fn try_item(&self, id: &DocId) -> Result<Option<FeedItem>, StoreError> {
        match self.store.find_post(id).await? {
            Some(post) if post.public => self.enrich(post).await.map(Some),
            _ => Ok(None),
        }
    }

    async fn run(&self, view: FeedView, filter: &PostFilter, params: &FeedParams) -> Vec<FeedItem> {
        match self.try_run(view, filter, params).await {
            Ok(items) => {
                info!(view = %view, count = items.len(), "Retrieved feed page");
                items
            }
            Err(e) => {
                error!(view = %view, error = %e, "Feed query failed, returning empty page");
                Vec::new()
            }
        }
    }

    async fn try_run(
        &self,
        view: FeedView,
        filter: &PostFilter,
        params: &FeedParams,
    ) -> Result<Vec<FeedItem>, StoreError> {
        if view == FeedView::MostRecent {
            let posts = self
                .store
                .find_posts(filter, PostSort::NewestFirst, params.offset, Some(params.limit))
                .await?;
            return self.enrich_all(posts).await;
        }

        // Newest-first input plus a stable sort keeps full ties in id order.
        let candidates = self
            .store
            .find_posts(filter, PostSort::NewestFirst, 0, None)
            .await?;
        debug!(view = %view, candidates = candidates.len(), "Counting feed candidates");

        let mut counted = self.count_all(candidates).await?;
        counted.sort_by(|a, b| view.compare(a, b));

        let page: Vec<Counted> = counted
            .into_iter()
            .skip(params.offset)
            .take(params.limit)
            .collect();
        self.attach_all(page).await
    }

    async fn count_all(&self, posts: Vec<Post>) -> Result<Vec<Counted>, StoreError> {
        stream::iter(posts)
            .map(|post| async move {
                let counts = self.counts(&post.id).await?;
                Ok::<_, StoreError>(Counted { post, counts })
            })
            .buffered(self.fanout)
            .try_collect()
            .await
    }

    async fn attach_all(&self, page: Vec<Counted>) -> Result<Vec<FeedItem>, StoreError> {
        stream::iter(page)
            .map(|Counted { post, counts }| async move {
                let (author, template) = self.references(&post).await?;
                Ok::<_, StoreError>(FeedItem::assemble(post, counts, author, template))
            })
            .buffered(self.fanout)
            .try_collect()
            .await
    }

    async fn enrich_all(&self, posts: Vec<Post>) -> Result<Vec<FeedItem>, StoreError> {
        stream::iter(posts)
            .map(|post| self.enrich(post))
            .buffered(self.fanout)
            .try_collect()
            .await
    }

    async fn enrich(&self, post: Post) -> Result<FeedItem, StoreError> {
        let (counts, (author, template)) =
            tokio::try_join!(self.counts(&post.id), self.references(&post))?;
        Ok(FeedItem::assemble(post, counts, author, template))
    }

    async fn counts(&self, post_id: &DocId) -> Result<Counts, StoreError> {
        let likes = LikeFilter::Post(*post_id);
        let comments = CommentFilter { post_id: *post_id };
        let (likes, comments) = tokio::try_join!(
            self.store.count_likes(&likes),
            self.store.count_comments(&comments),
        )?;
        Ok(Counts { likes, comments })
    }

    /// Author and template, each `None` when the reference does not resolve.
    async fn references(
        &self,
        post: &Post,
    ) -> Result<(Option<AuthorSummary>, Option<TemplateSummary>), StoreError> {
        tokio::try_join!(
            self.store.find_user(&post.creator_id),
            self.store.find_template(&post.template_id),
        )
    }
}
