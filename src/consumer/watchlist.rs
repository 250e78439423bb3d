//! Watchlist stream consumer
//!
//! Keeps one multi-pair subscription for the sidebar watchlist and the latest
//! tick per pair. Every watchlist edit replaces the subscription.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ConsumerState;
use crate::currency::PairKey;
use crate::error::{FeedError, Result};
use crate::feed::{FeedSource, StreamContext, Subscription};
use crate::parser::{Frame, Tick};
use crate::preferences::{PreferenceStore, WATCHLIST_KEY};

const CONSUMER: &str = "watchlist";

/// The set of pairs shown in the sidebar
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watchlist {
    pairs: BTreeSet<PairKey>,
}

impl Watchlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the persisted comma-joined form, skipping entries that do not parse
    pub fn from_preference(value: &str) -> Self {
        let pairs = value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| match entry.parse::<PairKey>() {
                Ok(pair) => Some(pair),
                Err(e) => {
                    warn!(entry, error = %e, "Ignoring stored watchlist entry");
                    None
                }
            })
            .collect();
        Self { pairs }
    }

    /// Comma-joined form for persistence
    pub fn to_preference(&self) -> String {
        self.pairs
            .iter()
            .map(PairKey::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn insert(&mut self, pair: PairKey) -> bool {
        self.pairs.insert(pair)
    }

    pub fn remove(&mut self, pair: &PairKey) -> bool {
        self.pairs.remove(pair)
    }

    pub fn contains(&self, pair: &PairKey) -> bool {
        self.pairs.contains(pair)
    }

    pub fn pairs(&self) -> Vec<PairKey> {
        self.pairs.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl FromIterator<PairKey> for Watchlist {
    fn from_iter<I: IntoIterator<Item = PairKey>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

/// Latest tick per pair, as received from the feed
///
/// Entries for pairs that left the watchlist are kept; [`LatestTicks::visible`]
/// filters them out when rendering.
#[derive(Debug, Clone, Default)]
pub struct LatestTicks {
    ticks: HashMap<PairKey, Tick>,
}

impl LatestTicks {
    pub fn upsert_frame(&mut self, frame: Frame) {
        for tick in frame {
            self.ticks.insert(tick.pair(), tick);
        }
    }

    pub fn get(&self, pair: &PairKey) -> Option<&Tick> {
        self.ticks.get(pair)
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Ticks for pairs in `watchlist`, ordered by pair
    pub fn visible(&self, watchlist: &Watchlist) -> Vec<Tick> {
        watchlist
            .pairs
            .iter()
            .filter_map(|pair| self.ticks.get(pair).cloned())
            .collect()
    }
}

/// Drives the sidebar's multi-pair subscription
pub struct WatchlistConsumer<S: FeedSource> {
    ctx: StreamContext<S>,
    preferences: Arc<dyn PreferenceStore>,
    watchlist: Watchlist,
    latest: Arc<watch::Sender<LatestTicks>>,
    subscription: Option<Subscription>,
    closed: bool,
}

impl<S: FeedSource> WatchlistConsumer<S> {
    /// Create an unmounted consumer for `watchlist`
    pub fn new(
        ctx: StreamContext<S>,
        preferences: Arc<dyn PreferenceStore>,
        watchlist: Watchlist,
    ) -> Self {
        let (latest, _) = watch::channel(LatestTicks::default());
        Self {
            ctx,
            preferences,
            watchlist,
            latest: Arc::new(latest),
            subscription: None,
            closed: false,
        }
    }

    /// Create a consumer with the persisted watchlist, or `default` if none is stored
    pub fn restore(
        ctx: StreamContext<S>,
        preferences: Arc<dyn PreferenceStore>,
        default: Watchlist,
    ) -> Self {
        let watchlist = match preferences.load(WATCHLIST_KEY) {
            Ok(Some(stored)) => Watchlist::from_preference(&stored),
            Ok(None) => default,
            Err(e) => {
                warn!(error = %e, "Failed to load stored watchlist, using default");
                default
            }
        };
        info!(pairs = %watchlist.to_preference(), "Watchlist restored");
        Self::new(ctx, preferences, watchlist)
    }

    /// Open the initial subscription
    pub async fn mount(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.resubscribe().await;
        Ok(())
    }

    /// Add a pair; returns false if it was already watched
    pub async fn add_pair(&mut self, pair: PairKey) -> Result<bool> {
        self.ensure_open()?;
        if !self.watchlist.insert(pair) {
            return Ok(false);
        }
        info!(pair = %pair, "Pair added to watchlist");
        self.persist().await;
        self.resubscribe().await;
        Ok(true)
    }

    /// Remove a pair; returns false if it was not watched
    pub async fn remove_pair(&mut self, pair: &PairKey) -> Result<bool> {
        self.ensure_open()?;
        if !self.watchlist.remove(pair) {
            return Ok(false);
        }
        info!(pair = %pair, "Pair removed from watchlist");
        self.persist().await;
        self.resubscribe().await;
        Ok(true)
    }

    pub fn watchlist(&self) -> &Watchlist {
        &self.watchlist
    }

    /// Receiver notified on every latest-tick update
    pub fn subscribe(&self) -> watch::Receiver<LatestTicks> {
        self.latest.subscribe()
    }

    /// Latest ticks for the pairs currently watched
    pub fn visible_ticks(&self) -> Vec<Tick> {
        self.latest.borrow().visible(&self.watchlist)
    }

    pub fn state(&self) -> ConsumerState {
        match &self.subscription {
            Some(subscription) if subscription.is_active() => ConsumerState::Streaming,
            _ => ConsumerState::Idle,
        }
    }

    /// Pairs requested by the current subscription
    pub fn subscribed_pairs(&self) -> Option<&[PairKey]> {
        self.subscription.as_ref().map(Subscription::pairs)
    }

    /// Cancel the subscription; the consumer accepts no further changes
    pub async fn shutdown(&mut self) {
        self.closed = true;
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel().await;
        }
        debug!("Watchlist consumer shut down");
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(FeedError::ConsumerClosed)
        } else {
            Ok(())
        }
    }

    async fn resubscribe(&mut self) {
        if let Some(previous) = self.subscription.take() {
            previous.cancel().await;
        }

        if self.watchlist.is_empty() {
            debug!("Watchlist is empty, not subscribing");
            return;
        }

        let latest = self.latest.clone();
        self.subscription = Some(Subscription::spawn(
            &self.ctx,
            CONSUMER,
            self.watchlist.pairs(),
            CancellationToken::new(),
            move |frame| latest.send_modify(|ticks| ticks.upsert_frame(frame)),
        ));
    }

    // Best effort: a failed write never fails the edit. Writes run on the
    // blocking pool and are awaited so they land in edit order.
    async fn persist(&self) {
        let preferences = self.preferences.clone();
        let value = self.watchlist.to_preference();
        let saved =
            tokio::task::spawn_blocking(move || preferences.save(WATCHLIST_KEY, &value)).await;
        match saved {
            Ok(Ok(())) => debug!("Watchlist persisted"),
            Ok(Err(e)) => warn!(error = %e, "Failed to persist watchlist"),
            Err(e) => warn!(error = %e, "Watchlist persistence task failed"),
        }
    }
}
