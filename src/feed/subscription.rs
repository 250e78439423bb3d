//! A single cancellable subscription to the rates feed
//!
//! Each subscription runs one [`FrameReader`] on its own task and owns the
//! cancellation token for it. Owners replace a subscription by cancelling it,
//! awaiting its task, and only then spawning the next one, so two readers
//! never update the same state. Dropping a subscription cancels it too.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use super::{FeedSource, FrameReader, ReadError};
use crate::currency::PairKey;
use crate::error::FeedError;
use crate::metrics::FeedMetrics;
use crate::notify::Notifier;
use crate::parser::Frame;

const CONNECT_FAILED_MESSAGE: &str = "Unable to connect to server. Please try again later.";
const READ_FAILED_MESSAGE: &str = "Error while reading data from the server. Please try again later.";

/// Collaborators shared by every subscription a consumer opens
pub struct StreamContext<S> {
    pub source: Arc<S>,
    pub notifier: Arc<dyn Notifier>,
    pub metrics: Arc<FeedMetrics>,
}

impl<S> Clone for StreamContext<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            notifier: self.notifier.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: FeedSource> StreamContext<S> {
    pub fn new(source: Arc<S>, notifier: Arc<dyn Notifier>, metrics: Arc<FeedMetrics>) -> Self {
        Self {
            source,
            notifier,
            metrics,
        }
    }
}

/// How a subscription finished
#[derive(Debug)]
pub enum SubscriptionEnd {
    /// The feed closed the response normally
    Completed,
    /// Cancelled by its owner
    Cancelled,
    /// The request could not be opened
    ConnectFailed(FeedError),
    /// The response failed part way through
    ReadFailed(FeedError),
}

/// Handle to a running subscription task
pub struct Subscription {
    pairs: Vec<PairKey>,
    token: CancellationToken,
    handle: JoinHandle<SubscriptionEnd>,
    _cancel_on_drop: DropGuard,
}

impl Subscription {
    /// Open the feed for `pairs` and feed every frame into `on_frame`
    ///
    /// `on_frame` runs on the subscription task and is never called once
    /// `token` has been cancelled.
    pub fn spawn<S, F>(
        ctx: &StreamContext<S>,
        consumer: &'static str,
        pairs: Vec<PairKey>,
        token: CancellationToken,
        on_frame: F,
    ) -> Self
    where
        S: FeedSource,
        F: FnMut(Frame) + Send + 'static,
    {
        ctx.metrics.subscriptions.with_label_values(&[consumer]).inc();

        let handle = tokio::spawn(run(
            ctx.clone(),
            consumer,
            pairs.clone(),
            token.clone(),
            on_frame,
        ));

        Self {
            pairs,
            _cancel_on_drop: token.clone().drop_guard(),
            token,
            handle,
        }
    }

    /// Pairs this subscription requested
    pub fn pairs(&self) -> &[PairKey] {
        &self.pairs
    }

    /// Whether the task is still reading
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel the subscription and wait for its task to stop
    pub async fn cancel(self) -> SubscriptionEnd {
        self.token.cancel();
        match self.handle.await {
            Ok(end) => end,
            Err(e) => {
                warn!(error = %e, "Subscription task did not shut down cleanly");
                SubscriptionEnd::Cancelled
            }
        }
    }
}

async fn run<S, F>(
    ctx: StreamContext<S>,
    consumer: &'static str,
    pairs: Vec<PairKey>,
    token: CancellationToken,
    mut on_frame: F,
) -> SubscriptionEnd
where
    S: FeedSource,
    F: FnMut(Frame) + Send + 'static,
{
    let active = ctx.metrics.active.with_label_values(&[consumer]);
    active.inc();
    let end = read_to_end(&ctx, consumer, &pairs, &token, &mut on_frame).await;
    active.dec();

    match &end {
        SubscriptionEnd::Completed => info!(consumer, "Rates stream ended"),
        SubscriptionEnd::Cancelled => debug!(consumer, "Rates stream cancelled"),
        SubscriptionEnd::ConnectFailed(e) | SubscriptionEnd::ReadFailed(e) => {
            error!(consumer, error = %e, kind = e.kind(), "Rates stream failed");
            ctx.metrics
                .failures
                .with_label_values(&[consumer, e.kind()])
                .inc();
            let message = match end {
                SubscriptionEnd::ConnectFailed(_) => CONNECT_FAILED_MESSAGE,
                _ => READ_FAILED_MESSAGE,
            };
            ctx.notifier.notify(message);
        }
    }

    end
}

async fn read_to_end<S, F>(
    ctx: &StreamContext<S>,
    consumer: &'static str,
    pairs: &[PairKey],
    token: &CancellationToken,
    on_frame: &mut F,
) -> SubscriptionEnd
where
    S: FeedSource,
    F: FnMut(Frame),
{
    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        result = ctx.source.open(pairs) => Some(result),
    };

    let stream = match opened {
        None => return SubscriptionEnd::Cancelled,
        Some(Err(_)) if token.is_cancelled() => return SubscriptionEnd::Cancelled,
        Some(Err(e)) => return SubscriptionEnd::ConnectFailed(e),
        Some(Ok(stream)) => stream,
    };

    let mut reader = FrameReader::new(stream, token.clone());
    loop {
        match reader.next_frame().await {
            Ok(Some(frame)) => {
                if token.is_cancelled() {
                    return SubscriptionEnd::Cancelled;
                }
                ctx.metrics.frames.with_label_values(&[consumer]).inc();
                ctx.metrics
                    .ticks
                    .with_label_values(&[consumer])
                    .inc_by(frame.len() as u64);
                on_frame(frame);
            }
            Ok(None) => return SubscriptionEnd::Completed,
            Err(ReadError::Cancelled) => return SubscriptionEnd::Cancelled,
            Err(ReadError::Failed(_)) if token.is_cancelled() => return SubscriptionEnd::Cancelled,
            Err(ReadError::Failed(e)) => return SubscriptionEnd::ReadFailed(e),
        }
    }
}
