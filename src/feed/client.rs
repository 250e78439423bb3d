//! HTTP client for the streaming rates endpoint

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt, TryStreamExt};
use tracing::{debug, info};

use super::{ByteStream, FeedSource};
use crate::currency::PairKey;
use crate::error::{FeedError, Result};

/// Path of the streaming endpoint below the configured base URL
const STREAMING_PATH: &str = "/streaming/rates";
/// Header carrying the access token
const TOKEN_HEADER: &str = "token";

/// Opens `GET /streaming/rates?pair=..&pair=..` against the rates service
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HttpFeedSource {
    /// Create a new feed source
    pub fn new(endpoint: &str, token: &str) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint, token)
    }

    /// Create a feed source sharing an existing HTTP client
    pub fn with_client(client: reqwest::Client, endpoint: &str, token: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.endpoint, STREAMING_PATH)
    }

    async fn connect(
        client: reqwest::Client,
        url: String,
        token: String,
        pairs: Vec<PairKey>,
    ) -> Result<ByteStream> {
        let query: Vec<(&str, String)> = pairs.iter().map(|p| ("pair", p.to_string())).collect();

        info!(url = %url, pairs = ?query, "Opening rates stream");

        let response = client
            .get(&url)
            .query(&query)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(TOKEN_HEADER, token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        debug!(status = %status, "Rates stream connected");

        Ok(response.bytes_stream().map_err(FeedError::from).boxed())
    }
}

impl FeedSource for HttpFeedSource {
    fn open(&self, pairs: &[PairKey]) -> BoxFuture<'static, Result<ByteStream>> {
        Self::connect(
            self.client.clone(),
            self.url(),
            self.token.clone(),
            pairs.to_vec(),
        )
        .boxed()
    }
}
