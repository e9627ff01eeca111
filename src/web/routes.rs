use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tracing::{debug, info};

use super::AppState;
use crate::feed::{FeedPage, FeedParams, FeedQuery, FeedView};

type FeedQueryResult = Result<Query<FeedQuery>, QueryRejection>;

/// Create the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/feed/top-liked/", get(top_liked))
        .route("/api/feed/top-liked", get(top_liked))
        .route("/api/feed/recent/", get(recent))
        .route("/api/feed/recent", get(recent))
        .route("/api/feed/discussed/", get(discussed))
        .route("/api/feed/discussed", get(discussed))
        .route("/api/feed/creator/:creator_id/", get(creator_feed))
        .route("/api/feed/creator/:creator_id", get(creator_feed))
        .route("/api/feed/posts/:id/", get(feed_item))
        .route("/api/feed/posts/:id", get(feed_item))
        .route("/healthz", get(health))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// JSON `{"error": ...}` response.
pub(super) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

fn validated(query: FeedQueryResult) -> Result<FeedParams, Response> {
    let Query(query) = query.map_err(|e| {
        debug!(error = %e, "Rejected malformed feed query");
        error_response(StatusCode::BAD_REQUEST, e.body_text())
    })?;

    query.validate().map_err(|e| {
        debug!(field = e.field, error = %e, "Rejected feed parameters");
        error_response(StatusCode::BAD_REQUEST, e.message)
    })
}

// ========== Feed Views ==========

async fn top_liked(State(state): State<AppState>, query: FeedQueryResult) -> Response {
    view_page(&state, FeedView::TopLiked, query).await
}

async fn recent(State(state): State<AppState>, query: FeedQueryResult) -> Response {
    view_page(&state, FeedView::MostRecent, query).await
}

async fn discussed(State(state): State<AppState>, query: FeedQueryResult) -> Response {
    view_page(&state, FeedView::MostDiscussed, query).await
}

async fn view_page(state: &AppState, view: FeedView, query: FeedQueryResult) -> Response {
    let params = match validated(query) {
        Ok(p) => p,
        Err(response) => return response,
    };

    let results = state.feed.page(view, &params).await;

    info!(
        view = %view,
        count = results.len(),
        limit = params.limit,
        offset = params.offset,
        time_filter = %params.time_window,
        "Served feed page"
    );

    Json(FeedPage::build(results, &params)).into_response()
}

async fn creator_feed(
    State(state): State<AppState>,
    Path(creator_id): Path<String>,
    query: FeedQueryResult,
) -> Response {
    let params = match validated(query) {
        Ok(p) => p,
        Err(response) => return response,
    };

    match state.feed.by_creator(&creator_id, &params).await {
        Ok(results) => Json(FeedPage::build(results, &params)).into_response(),
        Err(e) => {
            debug!(error = %e, "Rejected creator feed request");
            error_response(StatusCode::BAD_REQUEST, "Invalid creator_id format")
        }
    }
}

// ========== Single Item ==========

async fn feed_item(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.feed.item(&id).await {
        Ok(Some(item)) => Json(item).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Post not found"),
        Err(e) => {
            debug!(error = %e, "Rejected feed item request");
            error_response(StatusCode::BAD_REQUEST, "Invalid post ID format")
        }
    }
}

async fn health() -> &'static str {
    "OK"
}
