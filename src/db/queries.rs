use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::models::{
    format_timestamp, AuthorSummary, NewPost, NewTemplate, NewUser, Post, PostRow, SummaryRow,
    TemplateSummary,
};
use super::store::{CommentFilter, LikeFilter, PostFilter, PostSort, StoreError};
use crate::id::DocId;

const POST_COLUMNS: &str =
    "id, template_id, creator_id, content, public, created_at, updated_at, image_url";

// ========== Users & Templates ==========

/// Insert a new user, returning its ID.
pub async fn insert_user(pool: &SqlitePool, user: &NewUser) -> Result<DocId> {
    let id = DocId::new();
    sqlx::query("INSERT INTO users (id, username, email, created_at) VALUES (?, ?, ?, ?)")
        .bind(id.as_bytes().as_slice())
        .bind(&user.username)
        .bind(&user.email)
        .bind(format_timestamp(Utc::now()))
        .execute(pool)
        .await
        .context("Failed to insert user")?;

    Ok(id)
}

/// Insert a new template, returning its ID.
pub async fn insert_template(pool: &SqlitePool, template: &NewTemplate) -> Result<DocId> {
    let id = DocId::new();
    sqlx::query("INSERT INTO templates (id, title, created_at) VALUES (?, ?, ?)")
        .bind(id.as_bytes().as_slice())
        .bind(&template.title)
        .bind(format_timestamp(Utc::now()))
        .execute(pool)
        .await
        .context("Failed to insert template")?;

    Ok(id)
}

// ========== Posts ==========

/// Insert a new post, returning its ID.
pub async fn insert_post(pool: &SqlitePool, post: &NewPost) -> Result<DocId> {
    let created_at = post.created_at.unwrap_or_else(Utc::now);
    let id = DocId::with_timestamp(created_at);
    let stamp = format_timestamp(created_at);

    sqlx::query(
        r"
        INSERT INTO posts (id, template_id, creator_id, content, public, created_at, updated_at, image_url)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(id.as_bytes().as_slice())
    .bind(post.template_id.as_bytes().as_slice())
    .bind(post.creator_id.as_bytes().as_slice())
    .bind(post.content.to_string())
    .bind(post.public)
    .bind(&stamp)
    .bind(&stamp)
    .bind(&post.image_url)
    .execute(pool)
    .await
    .context("Failed to insert post")?;

    Ok(id)
}

/// Change a post's visibility. Returns whether a post was updated.
pub async fn set_post_visibility(pool: &SqlitePool, id: &DocId, public: bool) -> Result<bool> {
    let result = sqlx::query("UPDATE posts SET public = ?, updated_at = ? WHERE id = ?")
        .bind(public)
        .bind(format_timestamp(Utc::now()))
        .bind(id.as_bytes().as_slice())
        .execute(pool)
        .await
        .context("Failed to update post visibility")?;

    Ok(result.rows_affected() > 0)
}

/// Delete a post. Its likes and comments are left in place.
pub async fn delete_post(pool: &SqlitePool, id: &DocId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id.as_bytes().as_slice())
        .execute(pool)
        .await
        .context("Failed to delete post")?;

    Ok(result.rows_affected() > 0)
}

/// Find posts matching a filter.
pub async fn find_posts(
    pool: &SqlitePool,
    filter: &PostFilter,
    sort: PostSort,
    skip: usize,
    limit: Option<usize>,
) -> Result<Vec<Post>, StoreError> {
    let mut qb: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new(format!("SELECT {POST_COLUMNS} FROM posts WHERE 1 = 1"));

    if let Some(public) = filter.public {
        qb.push(" AND public = ").push_bind(public);
    }
    if let Some(since) = filter.created_since {
        qb.push(" AND created_at >= ").push_bind(format_timestamp(since));
    }
    if let Some(creator_id) = filter.creator_id {
        qb.push(" AND creator_id = ")
            .push_bind(creator_id.as_bytes().to_vec());
    }

    qb.push(match sort {
        PostSort::Natural => " ORDER BY rowid",
        PostSort::NewestFirst => " ORDER BY created_at DESC, id DESC",
    });

    // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
    qb.push(" LIMIT ")
        .push_bind(limit.map_or(-1, |l| l as i64))
        .push(" OFFSET ")
        .push_bind(skip as i64);

    let rows: Vec<PostRow> = qb.build_query_as().fetch_all(pool).await?;
    rows.into_iter().map(Post::try_from).collect()
}

/// Get a single post by ID, regardless of visibility.
pub async fn find_post(pool: &SqlitePool, id: &DocId) -> Result<Option<Post>, StoreError> {
    let row: Option<PostRow> =
        sqlx::query_as(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?"))
            .bind(id.as_bytes().as_slice())
            .fetch_optional(pool)
            .await?;

    row.map(Post::try_from).transpose()
}

// ========== Likes ==========

/// Record a like on a post.
pub async fn like_post(pool: &SqlitePool, user_id: &DocId, post_id: &DocId) -> Result<DocId> {
    insert_like(pool, user_id, Some(post_id), None).await
}

/// Record a like on a comment.
pub async fn like_comment(pool: &SqlitePool, user_id: &DocId, comment_id: &DocId) -> Result<DocId> {
    insert_like(pool, user_id, None, Some(comment_id)).await
}

async fn insert_like(
    pool: &SqlitePool,
    user_id: &DocId,
    post_id: Option<&DocId>,
    comment_id: Option<&DocId>,
) -> Result<DocId> {
    let id = DocId::new();
    sqlx::query(
        "INSERT INTO likes (id, user_id, post_id, comment_id, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id.as_bytes().as_slice())
    .bind(user_id.as_bytes().as_slice())
    .bind(post_id.map(|p| p.as_bytes().as_slice()))
    .bind(comment_id.map(|c| c.as_bytes().as_slice()))
    .bind(format_timestamp(Utc::now()))
    .execute(pool)
    .await
    .context("Failed to insert like")?;

    Ok(id)
}

/// Count likes. Uniqueness of (user, target) is not enforced; every row counts.
pub async fn count_likes(pool: &SqlitePool, filter: &LikeFilter) -> Result<u64, StoreError> {
    let (sql, target) = match filter {
        LikeFilter::Post(post_id) => (
            "SELECT COUNT(*) FROM likes WHERE post_id = ? AND comment_id IS NULL",
            post_id,
        ),
        LikeFilter::Comment(comment_id) => {
            ("SELECT COUNT(*) FROM likes WHERE comment_id = ?", comment_id)
        }
    };

    let count: i64 = sqlx::query_scalar(sql)
        .bind(target.as_bytes().as_slice())
        .fetch_one(pool)
        .await?;

    Ok(count.max(0) as u64)
}

// ========== Comments ==========

/// Add a comment to a post, returning its ID.
pub async fn add_comment(
    pool: &SqlitePool,
    user_id: &DocId,
    post_id: &DocId,
    text: &str,
) -> Result<DocId> {
    let id = DocId::new();
    sqlx::query(
        "INSERT INTO comments (id, post_id, user_id, text, created_at, likes_count) VALUES (?, ?, ?, ?, ?, 0)",
    )
    .bind(id.as_bytes().as_slice())
    .bind(post_id.as_bytes().as_slice())
    .bind(user_id.as_bytes().as_slice())
    .bind(text)
    .bind(format_timestamp(Utc::now()))
    .execute(pool)
    .await
    .context("Failed to insert comment")?;

    Ok(id)
}

/// Count comments on a post.
pub async fn count_comments(pool: &SqlitePool, filter: &CommentFilter) -> Result<u64, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE post_id = ?")
        .bind(filter.post_id.as_bytes().as_slice())
        .fetch_one(pool)
        .await?;

    Ok(count.max(0) as u64)
}

// ========== Lookups ==========

/// Get a user's display projection.
pub async fn find_user(pool: &SqlitePool, id: &DocId) -> Result<Option<AuthorSummary>, StoreError> {
    let row: Option<SummaryRow> =
        sqlx::query_as("SELECT id, username AS display FROM users WHERE id = ?")
            .bind(id.as_bytes().as_slice())
            .fetch_optional(pool)
            .await?;

    row.map(SummaryRow::into_author).transpose()
}

/// Get a template's display projection.
pub async fn find_template(
    pool: &SqlitePool,
    id: &DocId,
) -> Result<Option<TemplateSummary>, StoreError> {
    let row: Option<SummaryRow> =
        sqlx::query_as("SELECT id, title AS display FROM templates WHERE id = ?")
            .bind(id.as_bytes().as_slice())
            .fetch_optional(pool)
            .await?;

    row.map(SummaryRow::into_template).transpose()
}
