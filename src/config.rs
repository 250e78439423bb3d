//! Configuration module for the rates dashboard
//!
//! Values are layered: built-in defaults, then an optional `fx-dashboard`
//! file (toml, json or yaml), then `FX_*` environment variables. A `.env`
//! file is loaded into the environment first.

use serde::Deserialize;

use crate::consumer::Watchlist;
use crate::currency::PairKey;
use crate::error::{FeedError, Result};

const DEFAULT_FEED_ENDPOINT: &str = "http://localhost:8080";
const DEFAULT_PAIRS: &str = "JPYUSD";
const DEFAULT_PREFERENCES_PATH: &str = "fx-preferences.json";
const DEFAULT_HISTORY_CAPACITY: usize = 30;
const DEFAULT_STATUS_ADDR: &str = "0.0.0.0:9090";

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the rates service
    pub feed_endpoint: String,

    /// Access token sent with every stream request; has no default
    pub feed_token: String,

    /// Watchlist used when no preference has been stored (comma-joined pair keys)
    pub default_pairs: String,

    /// File holding persisted preferences
    pub preferences_path: String,

    /// Ticks kept by the detail view
    pub history_capacity: usize,

    /// Pair opened in the detail view at startup
    #[serde(default)]
    pub detail_pair: Option<String>,

    /// Listen address for the status server
    pub status_addr: String,
}

impl Config {
    /// Load configuration from defaults, optional file and environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config: Config = config::Config::builder()
            .set_default("feed_endpoint", DEFAULT_FEED_ENDPOINT)?
            .set_default("feed_token", "")?
            .set_default("default_pairs", DEFAULT_PAIRS)?
            .set_default("preferences_path", DEFAULT_PREFERENCES_PATH)?
            .set_default("history_capacity", DEFAULT_HISTORY_CAPACITY as i64)?
            .set_default("status_addr", DEFAULT_STATUS_ADDR)?
            .add_source(config::File::with_name("fx-dashboard").required(false))
            .add_source(config::Environment::with_prefix("FX").try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the consumers cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.feed_endpoint.trim().is_empty() {
            return Err(FeedError::Config("feed_endpoint must not be empty".to_string()));
        }
        if self.feed_token.trim().is_empty() {
            return Err(FeedError::Config(
                "feed_token must be set (FX_FEED_TOKEN)".to_string(),
            ));
        }
        if self.history_capacity == 0 {
            return Err(FeedError::Config("history_capacity must be at least 1".to_string()));
        }
        self.detail_pair()?;
        Ok(())
    }

    /// Parsed default watchlist
    pub fn default_watchlist(&self) -> Watchlist {
        Watchlist::from_preference(&self.default_pairs)
    }

    /// Parsed startup detail pair, if configured
    pub fn detail_pair(&self) -> Result<Option<PairKey>> {
        self.detail_pair
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(str::parse::<PairKey>)
            .transpose()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_endpoint: DEFAULT_FEED_ENDPOINT.to_string(),
            feed_token: String::new(),
            default_pairs: DEFAULT_PAIRS.to_string(),
            preferences_path: DEFAULT_PREFERENCES_PATH.to_string(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            detail_pair: None,
            status_addr: DEFAULT_STATUS_ADDR.to_string(),
        }
    }
}
