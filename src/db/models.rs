use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::id::DocId;

/// Format a timestamp the way it is stored.
///
/// Fixed-width microsecond precision keeps lexical order equal to
/// chronological order, which the `created_at` indexes rely on.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
///
/// # Errors
///
/// Returns an error if `value` is not RFC 3339.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
}

/// A user-filled post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: DocId,
    pub template_id: DocId,
    pub creator_id: DocId,
    /// Ordered fill-in answers, opaque to the feed.
    pub content: serde_json::Value,
    pub public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub image_url: Option<String>,
}

/// Raw `posts` row.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostRow {
    pub id: Vec<u8>,
    pub template_id: Vec<u8>,
    pub creator_id: Vec<u8>,
    pub content: String,
    pub public: bool,
    pub created_at: String,
    pub updated_at: String,
    pub image_url: Option<String>,
}

impl TryFrom<PostRow> for Post {
    type Error = StoreError;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: stored_id("posts", &row.id)?,
            template_id: stored_id("posts", &row.template_id)?,
            creator_id: stored_id("posts", &row.creator_id)?,
            content: serde_json::from_str(&row.content)
                .map_err(|e| StoreError::malformed("posts", format!("content: {e}")))?,
            public: row.public,
            created_at: stored_timestamp("posts", &row.created_at)?,
            updated_at: stored_timestamp("posts", &row.updated_at)?,
            image_url: row.image_url,
        })
    }
}

/// Display projection of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub id: DocId,
    pub username: String,
}

/// Display projection of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub id: DocId,
    pub title: String,
}

/// Raw `(id, display)` row for users and templates.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SummaryRow {
    pub id: Vec<u8>,
    pub display: String,
}

impl SummaryRow {
    pub(crate) fn into_author(self) -> Result<AuthorSummary, StoreError> {
        Ok(AuthorSummary {
            id: stored_id("users", &self.id)?,
            username: self.display,
        })
    }

    pub(crate) fn into_template(self) -> Result<TemplateSummary, StoreError> {
        Ok(TemplateSummary {
            id: stored_id("templates", &self.id)?,
            title: self.display,
        })
    }
}

/// Data for inserting a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
}

/// Data for inserting a new template.
#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub title: String,
}

/// Data for inserting a new post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub template_id: DocId,
    pub creator_id: DocId,
    pub content: serde_json::Value,
    pub public: bool,
    pub image_url: Option<String>,
    /// Defaults to the insertion time.
    pub created_at: Option<DateTime<Utc>>,
}

impl NewPost {
    /// A public post with no image, created now.
    #[must_use]
    pub fn new(template_id: DocId, creator_id: DocId, content: serde_json::Value) -> Self {
        Self {
            template_id,
            creator_id,
            content,
            public: true,
            image_url: None,
            created_at: None,
        }
    }
}

fn stored_id(collection: &'static str, bytes: &[u8]) -> Result<DocId, StoreError> {
    DocId::from_slice(bytes).map_err(|e| StoreError::malformed(collection, e.to_string()))
}

fn stored_timestamp(collection: &'static str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    parse_timestamp(value)
        .map_err(|e| StoreError::malformed(collection, format!("timestamp {value:?}: {e}")))
}
