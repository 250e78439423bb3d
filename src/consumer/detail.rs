//! Trading detail stream consumer
//!
//! Follows a single pair: bounded tick history for the table and chart, plus
//! the session high and low. Viewing another pair starts a fresh session.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::history::{Extrema, HistoryEntry, RateSummary, TickHistory};
use super::ConsumerState;
use crate::currency::PairKey;
use crate::error::{FeedError, Result};
use crate::feed::{FeedSource, StreamContext, Subscription};
use crate::parser::Frame;

const CONSUMER: &str = "detail";

/// Everything the detail page renders
#[derive(Debug, Clone, Serialize)]
pub struct DetailView {
    pub pair: Option<PairKey>,
    pub history: TickHistory,
    pub extrema: Extrema,
}

impl DetailView {
    fn new(capacity: usize) -> Self {
        Self {
            pair: None,
            history: TickHistory::new(capacity),
            extrema: Extrema::default(),
        }
    }

    /// Start a new session for `pair`
    pub fn reset(&mut self, pair: PairKey) {
        self.pair = Some(pair);
        self.history.clear();
        self.extrema.reset();
    }

    /// Apply one frame; only its first tick is used
    pub fn apply_frame(&mut self, frame: Frame) {
        let Some(tick) = frame.first() else {
            trace!("Empty frame on detail stream");
            return;
        };

        if frame.len() > 1 {
            debug!(ticks = frame.len(), "Detail frame carried extra ticks, using the first");
        }

        match HistoryEntry::from_tick(tick) {
            Some(entry) => {
                self.extrema.observe(entry.price);
                self.history.push(entry);
            }
            None => warn!(pair = %tick.pair(), "Dropping tick with unrepresentable price"),
        }
    }

    pub fn summary(&self) -> Option<RateSummary> {
        RateSummary::compute(&self.history, &self.extrema)
    }
}

/// Drives the detail page's single-pair subscription
pub struct DetailConsumer<S: FeedSource> {
    ctx: StreamContext<S>,
    view: Arc<watch::Sender<DetailView>>,
    subscription: Option<Subscription>,
    closed: bool,
}

impl<S: FeedSource> DetailConsumer<S> {
    /// Create an idle consumer keeping up to `capacity` ticks
    pub fn new(ctx: StreamContext<S>, capacity: usize) -> Self {
        let (view, _) = watch::channel(DetailView::new(capacity));
        Self {
            ctx,
            view: Arc::new(view),
            subscription: None,
            closed: false,
        }
    }

    /// Switch the view to `pair`, dropping the previous session
    ///
    /// Viewing the pair that is already streaming keeps its session.
    pub async fn view_pair(&mut self, pair: PairKey) -> Result<()> {
        if self.closed {
            return Err(FeedError::ConsumerClosed);
        }

        if self.pair() == Some(pair) && self.state() == ConsumerState::Streaming {
            debug!(pair = %pair, "Already viewing pair");
            return Ok(());
        }

        if let Some(previous) = self.subscription.take() {
            previous.cancel().await;
        }

        self.view.send_modify(|view| view.reset(pair));
        info!(pair = %pair, "Viewing pair");

        let view = self.view.clone();
        self.subscription = Some(Subscription::spawn(
            &self.ctx,
            CONSUMER,
            vec![pair],
            CancellationToken::new(),
            move |frame| view.send_modify(|state| state.apply_frame(frame)),
        ));
        Ok(())
    }

    /// Receiver notified on every history update
    pub fn subscribe(&self) -> watch::Receiver<DetailView> {
        self.view.subscribe()
    }

    /// Snapshot of the current view
    pub fn snapshot(&self) -> DetailView {
        self.view.borrow().clone()
    }

    pub fn pair(&self) -> Option<PairKey> {
        self.view.borrow().pair
    }

    pub fn state(&self) -> ConsumerState {
        match &self.subscription {
            Some(subscription) if subscription.is_active() => ConsumerState::Streaming,
            _ => ConsumerState::Idle,
        }
    }

    /// Cancel the subscription; the consumer accepts no further changes
    pub async fn shutdown(&mut self) {
        self.closed = true;
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel().await;
        }
        debug!("Detail consumer shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::testing::{context, frame_bytes, ScriptedSource};
    use crate::notify::MockNotifier;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn pair(key: &str) -> PairKey {
        key.parse().unwrap()
    }

    fn quiet_notifier() -> Arc<MockNotifier> {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().never();
        Arc::new(notifier)
    }

    async fn wait_for_len(rx: &mut watch::Receiver<DetailView>, len: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if rx.borrow_and_update().history.len() >= len {
                    return;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("history did not fill in time");
    }

    #[tokio::test]
    async fn test_history_and_extrema() {
        let source = Arc::new(ScriptedSource::default());
        let mut consumer = DetailConsumer::new(context(source.clone(), quiet_notifier()), 30);
        let mut rx = consumer.subscribe();

        consumer.view_pair(pair("USDEUR")).await.unwrap();
        source.wait_for_opens(1).await;
        assert_eq!(source.requested(0), vec![pair("USDEUR")]);

        let body = source.sender(0);
        for (i, price) in [1.2, 1.15, 1.3].into_iter().enumerate() {
            body.send(frame_bytes("USD", "EUR", price, &format!("t{}", i)))
                .unwrap();
        }
        wait_for_len(&mut rx, 3).await;

        let view = consumer.snapshot();
        assert_eq!(view.history.prices(), vec![dec!(1.300), dec!(1.150), dec!(1.200)]);
        assert_eq!(view.extrema.high, Some(dec!(1.300)));
        assert_eq!(view.extrema.low, Some(dec!(1.150)));
        assert_eq!(view.history.latest().unwrap().timestamp, "t2");
        consumer.shutdown().await;
    }

    #[tokio::test]
    async fn test_prices_are_rounded() {
        let source = Arc::new(ScriptedSource::default());
        let mut consumer = DetailConsumer::new(context(source.clone(), quiet_notifier()), 30);
        let mut rx = consumer.subscribe();

        consumer.view_pair(pair("JPYUSD")).await.unwrap();
        source.wait_for_opens(1).await;
        source
            .sender(0)
            .send(frame_bytes("JPY", "USD", 110.12345, "t"))
            .unwrap();
        wait_for_len(&mut rx, 1).await;

        let view = consumer.snapshot();
        let latest = view.history.latest().unwrap();
        assert_eq!(latest.price, dec!(110.123));
        assert_eq!(view.extrema.high, Some(dec!(110.123)));
        consumer.shutdown().await;
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let source = Arc::new(ScriptedSource::default());
        let mut consumer = DetailConsumer::new(context(source.clone(), quiet_notifier()), 5);
        let mut rx = consumer.subscribe();

        consumer.view_pair(pair("GBPUSD")).await.unwrap();
        source.wait_for_opens(1).await;
        let body = source.sender(0);
        for i in 0..12 {
            body.send(frame_bytes("GBP", "USD", 1.0 + i as f64, "t"))
                .unwrap();
        }
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if rx.borrow_and_update().history.latest().map(|e| e.price) == Some(dec!(12)) {
                    return;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        let view = consumer.snapshot();
        assert_eq!(view.history.len(), 5);
        assert_eq!(
            view.history.prices(),
            vec![dec!(12), dec!(11), dec!(10), dec!(9), dec!(8)]
        );
        // Extrema cover the whole session, not only the retained rows
        assert_eq!(view.extrema.low, Some(dec!(1)));
        consumer.shutdown().await;
    }

    #[tokio::test]
    async fn test_switching_pair_resets_session() {
        let source = Arc::new(ScriptedSource::default());
        let mut consumer = DetailConsumer::new(context(source.clone(), quiet_notifier()), 30);
        let mut rx = consumer.subscribe();

        consumer.view_pair(pair("USDEUR")).await.unwrap();
        source.wait_for_opens(1).await;
        let old = source.sender(0);
        old.send(frame_bytes("USD", "EUR", 1.2, "t")).unwrap();
        wait_for_len(&mut rx, 1).await;

        consumer.view_pair(pair("AUDCAD")).await.unwrap();
        let view = consumer.snapshot();
        assert_eq!(view.pair, Some(pair("AUDCAD")));
        assert!(view.history.is_empty());
        assert_eq!(view.extrema, Extrema::default());

        source.wait_for_opens(2).await;
        assert!(old.send(frame_bytes("USD", "EUR", 9.9, "t")).is_err());
        assert_eq!(source.requested(1), vec![pair("AUDCAD")]);
        consumer.shutdown().await;
    }

    #[tokio::test]
    async fn test_viewing_same_pair_keeps_session() {
        let source = Arc::new(ScriptedSource::default());
        let mut consumer = DetailConsumer::new(context(source.clone(), quiet_notifier()), 30);
        let mut rx = consumer.subscribe();

        consumer.view_pair(pair("USDEUR")).await.unwrap();
        source.wait_for_opens(1).await;
        source
            .sender(0)
            .send(frame_bytes("USD", "EUR", 1.2, "t"))
            .unwrap();
        wait_for_len(&mut rx, 1).await;

        consumer.view_pair(pair("USDEUR")).await.unwrap();
        tokio::task::yield_now().await;

        let view = consumer.snapshot();
        assert_eq!(view.history.len(), 1);
        assert_eq!(view.extrema.high, Some(dec!(1.200)));
        assert_eq!(source.open_count(), 1);
        assert!(!source.sender(0).is_closed());
        consumer.shutdown().await;
    }

    #[tokio::test]
    async fn test_viewing_same_pair_after_failure_reopens() {
        let source = Arc::new(ScriptedSource::default());
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(1).return_const(());
        let mut consumer = DetailConsumer::new(context(source.clone(), Arc::new(notifier)), 30);

        consumer.view_pair(pair("USDEUR")).await.unwrap();
        source.wait_for_opens(1).await;
        source
            .sender(0)
            .send(Err(FeedError::Transport("reset".to_string())))
            .unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while consumer.state() == ConsumerState::Streaming {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        consumer.view_pair(pair("USDEUR")).await.unwrap();
        source.wait_for_opens(2).await;
        assert_eq!(source.requested(1), vec![pair("USDEUR")]);
        consumer.shutdown().await;
    }

    #[tokio::test]
    async fn test_dropped_consumer_stops_reading() {
        let source = Arc::new(ScriptedSource::default());
        let mut consumer = DetailConsumer::new(context(source.clone(), quiet_notifier()), 30);
        let mut rx = consumer.subscribe();

        consumer.view_pair(pair("USDEUR")).await.unwrap();
        source.wait_for_opens(1).await;
        let body = source.sender(0);
        rx.borrow_and_update();

        drop(consumer);
        tokio::time::timeout(Duration::from_secs(2), async {
            while !body.is_closed() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("reader kept running after drop");

        assert!(body.send(frame_bytes("USD", "EUR", 7.0, "t")).is_err());
        // Every sender is gone once the task has finished
        assert!(rx.changed().await.is_err());
        assert!(rx.borrow().history.is_empty());
    }

    #[tokio::test]
    async fn test_decode_failure_notifies_once() {
        let source = Arc::new(ScriptedSource::default());
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|message: &str| message.starts_with("Error while reading"))
            .times(1)
            .return_const(());
        let mut consumer = DetailConsumer::new(context(source.clone(), Arc::new(notifier)), 30);

        consumer.view_pair(pair("USDEUR")).await.unwrap();
        source.wait_for_opens(1).await;
        let body = source.sender(0);
        body.send(Ok(bytes::Bytes::from_static(b"[{oops}]"))).unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while consumer.state() == ConsumerState::Streaming {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        consumer.shutdown().await;
    }

    #[test]
    fn test_empty_frame_is_skipped() {
        let mut view = DetailView::new(3);
        view.reset(pair("USDEUR"));
        view.apply_frame(Vec::new());
        assert!(view.history.is_empty());
        assert!(view.summary().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_blocks_further_views() {
        let source = Arc::new(ScriptedSource::default());
        let mut consumer = DetailConsumer::new(context(source.clone(), quiet_notifier()), 30);
        consumer.view_pair(pair("USDEUR")).await.unwrap();
        source.wait_for_opens(1).await;

        consumer.shutdown().await;
        assert!(source.sender(0).is_closed());
        assert!(matches!(
            consumer.view_pair(pair("USDJPY")).await,
            Err(FeedError::ConsumerClosed)
        ));
        assert_eq!(consumer.pair(), Some(pair("USDEUR")));
    }
}
