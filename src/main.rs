//! FX Rates Stream - dashboard feed service
//!
//! Restores the watchlist, keeps the watchlist and trading detail streams
//! running, and serves their state over HTTP until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;

use prometheus::Registry;
use tokio::sync::Mutex;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fx_rates_stream::{
    status, AppState, Config, DetailConsumer, FeedMetrics, FilePreferenceStore, HttpFeedSource,
    LogNotifier, StreamContext, WatchlistConsumer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting FX rates stream");

    let config = Config::load()?;
    info!(
        endpoint = %config.feed_endpoint,
        history_capacity = config.history_capacity,
        "Configuration loaded"
    );

    let registry = Registry::new();
    let metrics = Arc::new(FeedMetrics::new(&registry)?);
    let source = Arc::new(HttpFeedSource::new(&config.feed_endpoint, &config.feed_token));
    let ctx = StreamContext::new(source, Arc::new(LogNotifier), metrics);

    let preferences = Arc::new(FilePreferenceStore::new(&config.preferences_path));
    let mut watchlist = WatchlistConsumer::restore(ctx.clone(), preferences, config.default_watchlist());
    watchlist.mount().await?;

    let mut detail = DetailConsumer::new(ctx, config.history_capacity);
    if let Some(pair) = config.detail_pair()? {
        detail.view_pair(pair).await?;
    }

    let state = Arc::new(AppState {
        watchlist: Mutex::new(watchlist),
        detail: Mutex::new(detail),
        registry,
    });

    let addr: SocketAddr = config.status_addr.parse()?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
    };
    status::serve(addr, state.clone(), shutdown).await?;

    info!("Shutting down consumers");
    state.watchlist.lock().await.shutdown().await;
    state.detail.lock().await.shutdown().await;

    Ok(())
}
