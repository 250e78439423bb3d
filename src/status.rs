//! HTTP surface for health checks, metrics and dashboard control
//!
//! Exposes what the sidebar and trading page would render, and lets a client
//! edit the watchlist or switch the viewed pair.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::consumer::{
    ConsumerState, DetailConsumer, Extrema, HistoryEntry, RateSummary, WatchlistConsumer,
};
use crate::currency::PairKey;
use crate::error::FeedError;
use crate::feed::FeedSource;
use crate::parser::Tick;

/// State shared by the status handlers
pub struct AppState<S: FeedSource> {
    pub watchlist: Mutex<WatchlistConsumer<S>>,
    pub detail: Mutex<DetailConsumer<S>>,
    pub registry: Registry,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

/// Error response for the control endpoints
pub struct ApiError(FeedError);

impl From<FeedError> for ApiError {
    fn from(err: FeedError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            FeedError::InvalidPair(_) => StatusCode::BAD_REQUEST,
            FeedError::ConsumerClosed => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            code: self.0.kind(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct WatchlistBody {
    state: ConsumerState,
    pairs: Vec<PairKey>,
    ticks: Vec<Tick>,
}

#[derive(Debug, Serialize)]
struct DetailBody {
    state: ConsumerState,
    pair: Option<PairKey>,
    extrema: Extrema,
    summary: Option<RateSummary>,
    history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
struct EditBody {
    pair: PairKey,
    changed: bool,
}

/// Build the status router
pub fn router<S: FeedSource>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::<S>))
        .route("/watchlist", get(watchlist::<S>))
        .route("/watchlist/:pair", post(add_pair::<S>).delete(remove_pair::<S>))
        .route("/detail", get(detail::<S>))
        .route("/detail/:pair", put(view_pair::<S>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the status router until `shutdown` resolves
pub async fn serve<S, F>(addr: SocketAddr, state: Arc<AppState<S>>, shutdown: F) -> std::io::Result<()>
where
    S: FeedSource,
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Starting status server");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "component": "fx-rates-stream",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics<S: FeedSource>(State(state): State<Arc<AppState<S>>>) -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&state.registry.gather(), &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    match String::from_utf8(buffer) {
        Ok(text) => text.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn watchlist<S: FeedSource>(State(state): State<Arc<AppState<S>>>) -> Json<WatchlistBody> {
    let consumer = state.watchlist.lock().await;
    Json(WatchlistBody {
        state: consumer.state(),
        pairs: consumer.watchlist().pairs(),
        ticks: consumer.visible_ticks(),
    })
}

async fn add_pair<S: FeedSource>(
    State(state): State<Arc<AppState<S>>>,
    Path(pair): Path<String>,
) -> Result<Json<EditBody>, ApiError> {
    let pair: PairKey = pair.parse()?;
    let changed = state.watchlist.lock().await.add_pair(pair).await?;
    Ok(Json(EditBody { pair, changed }))
}

async fn remove_pair<S: FeedSource>(
    State(state): State<Arc<AppState<S>>>,
    Path(pair): Path<String>,
) -> Result<Json<EditBody>, ApiError> {
    let pair: PairKey = pair.parse()?;
    let changed = state.watchlist.lock().await.remove_pair(&pair).await?;
    Ok(Json(EditBody { pair, changed }))
}

async fn detail<S: FeedSource>(State(state): State<Arc<AppState<S>>>) -> Json<DetailBody> {
    let consumer = state.detail.lock().await;
    let view = consumer.snapshot();
    Json(DetailBody {
        state: consumer.state(),
        pair: view.pair,
        extrema: view.extrema,
        summary: view.summary(),
        history: view.history.iter().cloned().collect(),
    })
}

async fn view_pair<S: FeedSource>(
    State(state): State<Arc<AppState<S>>>,
    Path(pair): Path<String>,
) -> Result<StatusCode, ApiError> {
    let pair: PairKey = pair.parse()?;
    state.detail.lock().await.view_pair(pair).await?;
    Ok(StatusCode::NO_CONTENT)
}
