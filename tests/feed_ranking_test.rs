//! Integration tests for ranked feed views.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use crowdlib_feed::db::{
    add_comment, insert_post, insert_template, insert_user, like_comment, like_post,
    set_post_visibility, AuthorSummary, CommentFilter, Database, DocumentStore, LikeFilter,
    NewPost, NewTemplate, NewUser, Post, PostFilter, PostSort, StoreError, TemplateSummary,
};
use crowdlib_feed::feed::{FeedItem, FeedParams, FeedService, FeedView};
use crowdlib_feed::id::DocId;
use crowdlib_feed::time_window::TimeWindow;
use tempfile::TempDir;

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

struct Fixture {
    db: Database,
    user: DocId,
    template: DocId,
    _temp_dir: TempDir,
}

impl Fixture {
    async fn new() -> Self {
        let (db, temp_dir) = setup_db().await;
        let user = insert_user(
            db.pool(),
            &NewUser {
                username: "storyteller".to_string(),
                email: None,
            },
        )
        .await
        .unwrap();
        let template = insert_template(
            db.pool(),
            &NewTemplate {
                title: "Space Opera".to_string(),
            },
        )
        .await
        .unwrap();
        Self {
            db,
            user,
            template,
            _temp_dir: temp_dir,
        }
    }

    fn service(&self) -> FeedService {
        FeedService::new(Arc::new(self.db.clone()))
    }

    /// Insert a public post `age_minutes` old with the given numbers of likes and comments.
    async fn post(&self, age_minutes: i64, likes: usize, comments: usize) -> DocId {
        let new_post = NewPost {
            created_at: Some(Utc::now() - Duration::minutes(age_minutes)),
            ..NewPost::new(self.template, self.user, serde_json::json!(["a", "b"]))
        };
        let id = insert_post(self.db.pool(), &new_post).await.unwrap();
        for _ in 0..likes {
            like_post(self.db.pool(), &DocId::new(), &id).await.unwrap();
        }
        for i in 0..comments {
            add_comment(self.db.pool(), &self.user, &id, &format!("comment {i}"))
                .await
                .unwrap();
        }
        id
    }
}

fn params(limit: usize, offset: usize, time_window: TimeWindow) -> FeedParams {
    FeedParams {
        limit,
        offset,
        time_window,
    }
}

fn ids(items: &[FeedItem]) -> Vec<DocId> {
    items.iter().map(|i| i.id).collect()
}

#[tokio::test]
async fn test_two_post_scenario() {
    let fx = Fixture::new().await;
    let p1 = fx.post(60, 5, 1).await;
    let p2 = fx.post(120, 2, 9).await;
    let feed = fx.service();
    let all = FeedParams::default();

    let top = feed.top_liked(&all).await;
    assert_eq!(ids(&top), vec![p1, p2]);
    assert_eq!(top[0].likes_count, 5);
    assert_eq!(top[0].comments_count, 1);
    assert_eq!(top[1].likes_count, 2);
    assert_eq!(top[1].comments_count, 9);

    assert_eq!(ids(&feed.most_discussed(&all).await), vec![p2, p1]);
    assert_eq!(ids(&feed.most_recent(&all).await), vec![p1, p2]);
}

#[tokio::test]
async fn test_items_are_enriched() {
    let fx = Fixture::new().await;
    let id = fx.post(5, 1, 0).await;

    let items = fx.service().most_recent(&FeedParams::default()).await;
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item.id, id);
    assert_eq!(item.creator_id, fx.user);
    assert_eq!(item.template_id, fx.template);
    assert_eq!(item.creator_username.as_deref(), Some("storyteller"));
    assert_eq!(item.template_title.as_deref(), Some("Space Opera"));
    assert_eq!(item.content, serde_json::json!(["a", "b"]));
    assert!(item.public);
}

#[tokio::test]
async fn test_missing_references_render_as_null() {
    let fx = Fixture::new().await;
    let orphan = NewPost::new(DocId::new(), DocId::new(), serde_json::json!([]));
    let id = insert_post(fx.db.pool(), &orphan).await.unwrap();

    for view in FeedView::ALL {
        let items = fx.service().page(view, &FeedParams::default()).await;
        assert_eq!(ids(&items), vec![id], "view {view}");
        assert_eq!(items[0].creator_username, None);
        assert_eq!(items[0].template_title, None);
    }
}

#[tokio::test]
async fn test_private_posts_are_excluded() {
    let fx = Fixture::new().await;
    let visible = fx.post(10, 0, 0).await;
    let hidden = fx.post(5, 10, 10).await;
    set_post_visibility(fx.db.pool(), &hidden, false).await.unwrap();

    for view in FeedView::ALL {
        let items = fx.service().page(view, &FeedParams::default()).await;
        assert_eq!(ids(&items), vec![visible], "view {view}");
    }
}

#[tokio::test]
async fn test_comment_likes_do_not_count_toward_post() {
    let fx = Fixture::new().await;
    let post = fx.post(10, 1, 0).await;
    let comment = add_comment(fx.db.pool(), &fx.user, &post, "hi").await.unwrap();
    for _ in 0..4 {
        like_comment(fx.db.pool(), &DocId::new(), &comment).await.unwrap();
    }

    let items = fx.service().top_liked(&FeedParams::default()).await;
    assert_eq!(items[0].likes_count, 1);
    assert_eq!(items[0].comments_count, 1);
}

#[tokio::test]
async fn test_day_filter_excludes_older_posts() {
    let fx = Fixture::new().await;
    let fresh = fx.post(60, 0, 0).await;
    let stale = fx.post(60 * 25, 50, 50).await;

    for view in FeedView::ALL {
        let day = fx.service().page(view, &params(50, 0, TimeWindow::Day)).await;
        assert_eq!(ids(&day), vec![fresh], "view {view}");

        let all = fx.service().page(view, &params(50, 0, TimeWindow::All)).await;
        assert_eq!(all.len(), 2, "view {view}");
        assert!(ids(&all).contains(&stale));
    }
}

#[tokio::test]
async fn test_week_and_year_windows() {
    let fx = Fixture::new().await;
    let three_days = fx.post(60 * 24 * 3, 0, 0).await;
    let two_months = fx.post(60 * 24 * 60, 0, 0).await;
    let feed = fx.service();

    let week = feed.most_recent(&params(50, 0, TimeWindow::Week)).await;
    assert_eq!(ids(&week), vec![three_days]);
    let month = feed.most_recent(&params(50, 0, TimeWindow::Month)).await;
    assert_eq!(ids(&month), vec![three_days]);
    let year = feed.most_recent(&params(50, 0, TimeWindow::Year)).await;
    assert_eq!(ids(&year), vec![three_days, two_months]);
}

async fn seed_varied(fx: &Fixture) {
    let shape = [
        (1, 3, 0),
        (2, 0, 4),
        (3, 3, 4),
        (4, 1, 1),
        (5, 0, 0),
        (6, 3, 2),
        (7, 2, 4),
        (8, 0, 1),
    ];
    for (age, likes, comments) in shape {
        fx.post(age * 10, likes, comments).await;
    }
}

#[tokio::test]
async fn test_ordering_laws_hold() {
    let fx = Fixture::new().await;
    seed_varied(&fx).await;
    let feed = fx.service();
    let all = FeedParams::default();

    let top = feed.top_liked(&all).await;
    assert_eq!(top.len(), 8);
    for pair in top.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(
            a.likes_count > b.likes_count
                || (a.likes_count == b.likes_count && a.created_at >= b.created_at)
        );
    }

    let discussed = feed.most_discussed(&all).await;
    for pair in discussed.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(
            a.comments_count > b.comments_count
                || (a.comments_count == b.comments_count && a.created_at >= b.created_at)
        );
    }

    let recent = feed.most_recent(&all).await;
    for pair in recent.windows(2) {
        assert!(pair[0].created_at >= pair[1].created_at);
    }
}

#[tokio::test]
async fn test_results_never_exceed_limit() {
    let fx = Fixture::new().await;
    seed_varied(&fx).await;
    let feed = fx.service();

    for view in FeedView::ALL {
        for limit in [1, 3, 8, 20] {
            let items = feed.page(view, &params(limit, 0, TimeWindow::All)).await;
            assert!(items.len() <= limit);
            assert_eq!(items.len(), limit.min(8));
        }
        let tail = feed.page(view, &params(5, 6, TimeWindow::All)).await;
        assert_eq!(tail.len(), 2);
        let past_end = feed.page(view, &params(5, 100, TimeWindow::All)).await;
        assert!(past_end.is_empty());
    }
}

#[tokio::test]
async fn test_pages_concatenate() {
    let fx = Fixture::new().await;
    seed_varied(&fx).await;
    let feed = fx.service();

    for view in FeedView::ALL {
        let first = feed.page(view, &params(3, 0, TimeWindow::All)).await;
        let second = feed.page(view, &params(3, 3, TimeWindow::All)).await;
        let both = feed.page(view, &params(6, 0, TimeWindow::All)).await;

        let mut joined = ids(&first);
        joined.extend(ids(&second));
        assert_eq!(joined, ids(&both), "view {view}");
    }
}

#[tokio::test]
async fn test_repeated_requests_are_identical() {
    let fx = Fixture::new().await;
    seed_varied(&fx).await;
    // Exact ties on every key fall back to id order.
    let tie_time = Utc::now() - Duration::minutes(500);
    for _ in 0..3 {
        let new_post = NewPost {
            created_at: Some(tie_time),
            ..NewPost::new(fx.template, fx.user, serde_json::json!([]))
        };
        insert_post(fx.db.pool(), &new_post).await.unwrap();
    }
    let feed = fx.service();

    for view in FeedView::ALL {
        let a = feed.page(view, &FeedParams::default()).await;
        let b = feed.page(view, &FeedParams::default()).await;
        assert_eq!(a, b, "view {view}");
    }
}

#[tokio::test]
async fn test_fanout_does_not_change_results() {
    let fx = Fixture::new().await;
    seed_varied(&fx).await;
    let narrow = FeedService::with_fanout(Arc::new(fx.db.clone()), 1);
    let wide = FeedService::with_fanout(Arc::new(fx.db.clone()), 16);
    assert_eq!(FeedService::with_fanout(Arc::new(fx.db.clone()), 0).fanout(), 1);

    for view in FeedView::ALL {
        let p = params(5, 1, TimeWindow::All);
        assert_eq!(narrow.page(view, &p).await, wide.page(view, &p).await);
    }
}

#[tokio::test]
async fn test_by_creator() {
    let fx = Fixture::new().await;
    let mine_old = fx.post(30, 0, 0).await;
    let mine_new = fx.post(10, 0, 0).await;
    let hidden = fx.post(5, 0, 0).await;
    set_post_visibility(fx.db.pool(), &hidden, false).await.unwrap();
    let someone_else = NewPost::new(fx.template, DocId::new(), serde_json::json!([]));
    insert_post(fx.db.pool(), &someone_else).await.unwrap();

    let feed = fx.service();
    let items = feed
        .by_creator(&fx.user.to_string(), &FeedParams::default())
        .await
        .unwrap();
    assert_eq!(ids(&items), vec![mine_new, mine_old]);

    let upper = fx.user.to_string().to_uppercase();
    let items = feed.by_creator(&upper, &FeedParams::default()).await.unwrap();
    assert_eq!(items.len(), 2);

    let unknown = feed
        .by_creator(&DocId::new().to_string(), &FeedParams::default())
        .await
        .unwrap();
    assert!(unknown.is_empty());

    let err = feed
        .by_creator("not-an-id", &FeedParams::default())
        .await
        .unwrap_err();
    assert_eq!(err.value, "not-an-id");
}

#[tokio::test]
async fn test_single_item_lookup() {
    let fx = Fixture::new().await;
    let visible = fx.post(10, 2, 1).await;
    let hidden = fx.post(5, 0, 0).await;
    set_post_visibility(fx.db.pool(), &hidden, false).await.unwrap();
    let feed = fx.service();

    let item = feed.item(&visible.to_string()).await.unwrap().expect("item");
    assert_eq!(item.likes_count, 2);
    assert_eq!(item.comments_count, 1);

    assert!(feed.item(&hidden.to_string()).await.unwrap().is_none());
    assert!(feed.item(&DocId::new().to_string()).await.unwrap().is_none());
    assert!(feed.item("12345").await.is_err());
}

#[tokio::test]
async fn test_unavailable_store_degrades_to_empty() {
    let fx = Fixture::new().await;
    seed_varied(&fx).await;
    let feed = fx.service();
    fx.db.close().await;

    for view in FeedView::ALL {
        assert!(feed.page(view, &FeedParams::default()).await.is_empty());
    }
    assert!(feed.item(&DocId::new().to_string()).await.unwrap().is_none());
}

/// Serves posts normally but fails every Nth lookup after the base query.
struct FlakyStore {
    inner: Database,
    fail_after: usize,
    calls: AtomicUsize,
}

impl FlakyStore {
    fn check(&self) -> Result<(), StoreError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.fail_after {
            Err(StoreError::MalformedDocument {
                collection: "likes",
                reason: "injected failure".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn find_posts(
        &self,
        filter: &PostFilter,
        sort: PostSort,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Post>, StoreError> {
        self.inner.find_posts(filter, sort, skip, limit).await
    }

    async fn find_post(&self, id: &DocId) -> Result<Option<Post>, StoreError> {
        self.inner.find_post(id).await
    }

    async fn count_likes(&self, filter: &LikeFilter) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.count_likes(filter).await
    }

    async fn count_comments(&self, filter: &CommentFilter) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.count_comments(filter).await
    }

    async fn find_user(&self, id: &DocId) -> Result<Option<AuthorSummary>, StoreError> {
        self.check()?;
        self.inner.find_user(id).await
    }

    async fn find_template(&self, id: &DocId) -> Result<Option<TemplateSummary>, StoreError> {
        self.check()?;
        self.inner.find_template(id).await
    }
}

#[tokio::test]
async fn test_failed_sub_query_empties_the_view() {
    let fx = Fixture::new().await;
    seed_varied(&fx).await;

    for view in FeedView::ALL {
        let store = FlakyStore {
            inner: fx.db.clone(),
            fail_after: 5,
            calls: AtomicUsize::new(0),
        };
        let feed = FeedService::new(Arc::new(store));
        assert!(feed.page(view, &FeedParams::default()).await.is_empty(), "view {view}");
    }

    let healthy = FlakyStore {
        inner: fx.db.clone(),
        fail_after: usize::MAX,
        calls: AtomicUsize::new(0),
    };
    let feed = FeedService::new(Arc::new(healthy));
    assert_eq!(feed.top_liked(&FeedParams::default()).await.len(), 8);
}
