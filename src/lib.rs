//! FX Rates Stream - dashboard feed consumers
//!
//! This crate streams currency exchange rates from a chunked HTTP feed and
//! keeps the state behind the dashboard views: the latest tick for every
//! watched pair, and a bounded history with session high/low for the pair
//! shown on the trading page.

pub mod config;
pub mod consumer;
pub mod currency;
pub mod error;
pub mod feed;
pub mod metrics;
pub mod notify;
pub mod parser;
pub mod preferences;
pub mod status;

pub use config::Config;
pub use consumer::{
    ConsumerState, DetailConsumer, DetailView, Extrema, LatestTicks, TickHistory, Watchlist,
    WatchlistConsumer,
};
pub use currency::{CurrencyCode, PairKey};
pub use error::{FeedError, Result};
pub use feed::{FeedSource, FrameReader, HttpFeedSource, ReadError, StreamContext, Subscription};
pub use metrics::FeedMetrics;
pub use notify::{ChannelNotifier, LogNotifier, Notifier};
pub use parser::{Frame, FrameDecoder, Tick};
pub use preferences::{FilePreferenceStore, MemoryPreferenceStore, PreferenceStore};
pub use status::AppState;
