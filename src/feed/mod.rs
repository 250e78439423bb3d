//! Streaming rates feed: transport, incremental reading and subscriptions

mod client;
mod reader;
mod subscription;

#[cfg(test)]
pub(crate) mod testing;

pub use client::HttpFeedSource;
pub use reader::{FrameReader, ReadError};
pub use subscription::{StreamContext, Subscription, SubscriptionEnd};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;

use crate::currency::PairKey;
use crate::error::FeedError;

/// Raw body chunks of one feed response
pub type ByteStream = BoxStream<'static, Result<Bytes, FeedError>>;

/// Something that can open a rates stream for a set of pairs
///
/// The returned future resolves once the response headers are in; the body
/// is then read chunk by chunk through a [`FrameReader`].
pub trait FeedSource: Send + Sync + 'static {
    fn open(&self, pairs: &[PairKey]) -> BoxFuture<'static, Result<ByteStream, FeedError>>;
}
