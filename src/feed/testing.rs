//! In-memory feed used by consumer tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::{stream, FutureExt, StreamExt};
use prometheus::Registry;
use tokio::sync::mpsc;

use super::{ByteStream, FeedSource, StreamContext};
use crate::currency::PairKey;
use crate::error::FeedError;
use crate::metrics::FeedMetrics;
use crate::notify::Notifier;

pub(crate) type ChunkSender = mpsc::UnboundedSender<Result<Bytes, FeedError>>;

/// Records every request and hands the test a sender for its body
#[derive(Default)]
pub(crate) struct ScriptedSource {
    opened: Mutex<Vec<(Vec<PairKey>, ChunkSender)>>,
    refuse: Mutex<Option<u16>>,
}

impl ScriptedSource {
    /// Fail the next opens with the given HTTP status
    pub(crate) fn refuse_with(&self, status: u16) {
        *self.refuse.lock().unwrap() = Some(status);
    }

    pub(crate) fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub(crate) fn requested(&self, index: usize) -> Vec<PairKey> {
        self.opened.lock().unwrap()[index].0.clone()
    }

    pub(crate) fn sender(&self, index: usize) -> ChunkSender {
        self.opened.lock().unwrap()[index].1.clone()
    }

    /// Wait until `count` requests have been opened
    pub(crate) async fn wait_for_opens(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.open_count() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscription was not opened in time");
    }
}

impl FeedSource for ScriptedSource {
    fn open(&self, pairs: &[PairKey]) -> BoxFuture<'static, Result<ByteStream, FeedError>> {
        if let Some(status) = *self.refuse.lock().unwrap() {
            return async move { Err(FeedError::Status(status)) }.boxed();
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        self.opened.lock().unwrap().push((pairs.to_vec(), tx));
        let body: ByteStream = stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed();
        async move { Ok(body) }.boxed()
    }
}

pub(crate) fn context(
    source: Arc<ScriptedSource>,
    notifier: Arc<dyn Notifier>,
) -> StreamContext<ScriptedSource> {
    let metrics = FeedMetrics::new(&Registry::new()).unwrap();
    StreamContext::new(source, notifier, Arc::new(metrics))
}

pub(crate) fn frame_bytes(from: &str, to: &str, price: f64, stamp: &str) -> Result<Bytes, FeedError> {
    Ok(Bytes::from(format!(
        r#"[{{"from":"{}","to":"{}","bid":{},"ask":{},"price":{},"time_stamp":"{}"}}]"#,
        from,
        to,
        price - 0.01,
        price + 0.01,
        price,
        stamp
    )))
}
