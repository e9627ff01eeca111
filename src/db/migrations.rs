use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    if current_version < 2 {
        debug!("Running migration v2");
        run_migration_v2(pool).await?;
        set_schema_version(pool, 2).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v1: creating collections");

    // References between collections are unconstrained. A post may outlive
    // its author or template.
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS users (
            id BLOB PRIMARY KEY NOT NULL,
            username TEXT UNIQUE NOT NULL,
            email TEXT,
            created_at TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS templates (
            id BLOB PRIMARY KEY NOT NULL,
            title TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create templates table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS posts (
            id BLOB PRIMARY KEY NOT NULL,
            template_id BLOB NOT NULL,
            creator_id BLOB NOT NULL,
            content TEXT NOT NULL DEFAULT '[]',
            public INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            image_url TEXT
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create posts table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS likes (
            id BLOB PRIMARY KEY NOT NULL,
            user_id BLOB NOT NULL,
            post_id BLOB,
            comment_id BLOB,
            created_at TEXT NOT NULL,
            CHECK ((post_id IS NULL) <> (comment_id IS NULL))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create likes table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS comments (
            id BLOB PRIMARY KEY NOT NULL,
            post_id BLOB NOT NULL,
            user_id BLOB NOT NULL,
            text TEXT NOT NULL,
            created_at TEXT NOT NULL,
            likes_count INTEGER NOT NULL DEFAULT 0
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create comments table")?;

    Ok(())
}

async fn run_migration_v2(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v2: feed indexes");

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_posts_public_created_at ON posts(public, created_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_posts_creator_id ON posts(creator_id)",
        "CREATE INDEX IF NOT EXISTS idx_likes_post_comment ON likes(post_id, comment_id)",
        "CREATE INDEX IF NOT EXISTS idx_likes_comment_id ON likes(comment_id)",
        "CREATE INDEX IF NOT EXISTS idx_comments_post_created_at ON comments(post_id, created_at DESC)",
    ];

    for sql in indexes {
        sqlx::query(sql)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create index: {sql}"))?;
    }

    Ok(())
}
