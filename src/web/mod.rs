mod routes;

use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::DocumentStore;
use crate::feed::FeedService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub feed: FeedService,
    pub config: Arc<Config>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, config: Config) -> Self {
        Self {
            feed: FeedService::with_fanout(store, config.feed_fanout),
            config: Arc::new(config),
        }
    }
}

/// Run the web server until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails to bind or exits abnormally.
pub async fn serve<F>(state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = format!("{}:{}", state.config.web_host, state.config.web_port)
        .parse()
        .context("Invalid web server address")?;

    let app = create_app(state);

    info!(addr = %addr, "Starting HTTP web server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind web server")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Web server error")?;

    Ok(())
}

/// Create the main application router.
pub fn create_app(state: AppState) -> Router {
    let timeout = state.config.request_timeout;

    Router::new()
        .merge(routes::router())
        .layer(middleware::from_fn_with_state(timeout, enforce_timeout))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Abandon a request that outlives `timeout` with a JSON 504.
async fn enforce_timeout(State(timeout): State<Duration>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    match tokio::time::timeout(timeout, next.run(req)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(path = %path, timeout_secs = timeout.as_secs(), "Request timed out");
            routes::error_response(StatusCode::GATEWAY_TIMEOUT, "Request timed out")
        }
    }
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = %detail, "Request handler panicked");

    routes::error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}
