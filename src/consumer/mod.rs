//! Stream consumers behind the dashboard views
//!
//! The watchlist consumer feeds the sidebar, the detail consumer feeds the
//! trading page. Both hold at most one live subscription at a time.

mod detail;
mod history;
mod watchlist;

pub use detail::{DetailConsumer, DetailView};
pub use history::{
    round_price, Direction, Extrema, HistoryEntry, RateSummary, TickHistory, PRICE_DECIMALS,
};
pub use watchlist::{LatestTicks, Watchlist, WatchlistConsumer};

use serde::Serialize;

/// Whether a consumer currently has a reading subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerState {
    Idle,
    Streaming,
}
