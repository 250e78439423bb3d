//! Tick history, extrema and rate summary for the trading detail view

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::parser::Tick;

/// Decimal places shown for prices in the detail view
pub const PRICE_DECIMALS: u32 = 3;

/// Round a feed price for display
pub fn round_price(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(PRICE_DECIMALS, RoundingStrategy::MidpointAwayFromZero))
}

/// One row of the tick table / one point of the price chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    /// Parsed timestamp for the chart x-axis
    pub time: Option<DateTime<Utc>>,
    pub price: Decimal,
    pub ask: Decimal,
    pub bid: Decimal,
}

impl HistoryEntry {
    /// Build a rounded entry, `None` if a price cannot be represented
    pub fn from_tick(tick: &Tick) -> Option<Self> {
        Some(Self {
            timestamp: tick.timestamp.clone(),
            time: tick.time(),
            price: round_price(tick.price)?,
            ask: round_price(tick.ask)?,
            bid: round_price(tick.bid)?,
        })
    }
}

/// Most-recent-first bounded history
#[derive(Debug, Clone, Serialize)]
pub struct TickHistory {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl TickHistory {
    /// Create an empty history; capacity is at least one entry
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Prepend an entry, dropping the oldest beyond capacity
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Prices, most recent first
    pub fn prices(&self) -> Vec<Decimal> {
        self.entries.iter().map(|e| e.price).collect()
    }
}

/// Running high / low since the subscription began; `None` until a tick arrives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Extrema {
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
}

impl Extrema {
    pub fn observe(&mut self, price: Decimal) {
        if self.high.map_or(true, |high| price > high) {
            self.high = Some(price);
        }
        if self.low.map_or(true, |low| price < low) {
            self.low = Some(price);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Direction of the latest price against the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Flat,
}

/// Headline figures next to the pair title
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateSummary {
    pub price: Decimal,
    pub direction: Direction,
    /// Distance of the latest price from the session high, relative to their
    /// mean and scaled to percent: `(latest - high) / mean * 100`, 2 dp.
    /// A raw ratio at 2 dp would read `0.00` for most FX moves.
    pub from_high_pct: Decimal,
}

impl RateSummary {
    pub fn compute(history: &TickHistory, extrema: &Extrema) -> Option<Self> {
        let mut recent = history.iter();
        let latest = recent.next()?;

        let direction = match recent.next() {
            Some(previous) if latest.price > previous.price => Direction::Up,
            Some(previous) if latest.price < previous.price => Direction::Down,
            _ => Direction::Flat,
        };

        let from_high_pct = match extrema.high {
            Some(high) if !(latest.price + high).is_zero() => {
                let mean = (latest.price + high) / Decimal::TWO;
                ((latest.price - high) / mean * Decimal::ONE_HUNDRED).round_dp(2)
            }
            _ => Decimal::ZERO,
        };

        Some(Self {
            price: latest.price,
            direction,
            from_high_pct,
        })
    }
}
