//! Prometheus metrics for the feed consumers

use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};

/// Counters shared by the watchlist and detail consumers, labelled by consumer
#[derive(Debug, Clone)]
pub struct FeedMetrics {
    /// Subscriptions opened
    pub subscriptions: IntCounterVec,

    /// Subscriptions currently reading
    pub active: IntGaugeVec,

    /// Frames received
    pub frames: IntCounterVec,

    /// Ticks received
    pub ticks: IntCounterVec,

    /// Failed subscriptions, by error kind
    pub failures: IntCounterVec,
}

impl FeedMetrics {
    /// Create the metrics and register them with `registry`
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let metrics = Self {
            subscriptions: IntCounterVec::new(
                Opts::new("fx_subscriptions_total", "Rates subscriptions opened"),
                &["consumer"],
            )?,
            active: IntGaugeVec::new(
                Opts::new("fx_subscriptions_active", "Rates subscriptions currently reading"),
                &["consumer"],
            )?,
            frames: IntCounterVec::new(
                Opts::new("fx_frames_total", "Frames decoded from the rates feed"),
                &["consumer"],
            )?,
            ticks: IntCounterVec::new(
                Opts::new("fx_ticks_total", "Ticks decoded from the rates feed"),
                &["consumer"],
            )?,
            failures: IntCounterVec::new(
                Opts::new("fx_stream_failures_total", "Rates subscriptions that failed"),
                &["consumer", "kind"],
            )?,
        };

        registry.register(Box::new(metrics.subscriptions.clone()))?;
        registry.register(Box::new(metrics.active.clone()))?;
        registry.register(Box::new(metrics.frames.clone()))?;
        registry.register(Box::new(metrics.ticks.clone()))?;
        registry.register(Box::new(metrics.failures.clone()))?;

        Ok(metrics)
    }
}
