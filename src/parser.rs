//! Parser module for the streaming rates feed
//!
//! The feed writes JSON arrays of ticks onto a chunked HTTP body. Chunk
//! boundaries carry no meaning: a chunk may hold several arrays, or only part
//! of one, so bytes are buffered until a complete top-level value is available.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::currency::{CurrencyCode, PairKey};
use crate::error::FeedError;

/// One price observation for a pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Base currency
    pub from: CurrencyCode,

    /// Quote currency
    pub to: CurrencyCode,

    pub bid: f64,

    pub ask: f64,

    pub price: f64,

    /// Feed timestamp, kept verbatim
    #[serde(rename = "time_stamp")]
    pub timestamp: String,
}

/// A single decoded frame. The feed may emit zero or more ticks per frame.
pub type Frame = Vec<Tick>;

impl Tick {
    /// Key used to index the tick in watchlist state
    pub fn pair(&self) -> PairKey {
        PairKey {
            from: self.from,
            to: self.to,
        }
    }

    /// Feed timestamp as a UTC instant, when it is RFC 3339
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    fn validate(&self) -> Result<(), FeedError> {
        for (field, value) in [("bid", self.bid), ("ask", self.ask), ("price", self.price)] {
            if !value.is_finite() || value < 0.0 {
                return Err(FeedError::Decode(format!(
                    "{}{} has invalid {}: {}",
                    self.from, self.to, field, value
                )));
            }
        }
        Ok(())
    }
}

/// Error payload the feed sends instead of ticks (e.g. for a bad token)
#[derive(Debug, Deserialize)]
struct RemoteError {
    error: String,
}

/// Interpret one complete top-level JSON value from the feed
pub fn parse_frame(value: Value) -> Result<Frame, FeedError> {
    if value.is_object() {
        if let Ok(remote) = serde_json::from_value::<RemoteError>(value.clone()) {
            return Err(FeedError::Remote(remote.error));
        }
    }

    let ticks: Frame = serde_json::from_value(value)?;
    for tick in &ticks {
        tick.validate()?;
    }
    Ok(ticks)
}

/// Incremental byte-to-frame decoder
///
/// New bytes are scanned once to track nesting; JSON is only parsed up to the
/// end of the last complete top-level value, so a large frame arriving in
/// many small chunks is not re-parsed on every chunk.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already scanned
    scanned: usize,
    /// End of the last complete top-level value in `buffer`
    complete: usize,
    /// Closers expected for the currently open arrays and objects
    open: Vec<u8>,
    in_string: bool,
    escaped: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completes
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Frame>, FeedError> {
        self.buffer.extend_from_slice(chunk);
        self.scan();

        let mut frames = Vec::new();
        if self.complete == 0 {
            return Ok(frames);
        }

        let mut values =
            serde_json::Deserializer::from_slice(&self.buffer[..self.complete]).into_iter::<Value>();
        loop {
            match values.next() {
                Some(Ok(value)) => frames.push(parse_frame(value)?),
                // Incomplete value; wait for the rest of it
                Some(Err(e)) if e.is_eof() => break,
                Some(Err(e)) => return Err(FeedError::Decode(e.to_string())),
                None => break,
            }
        }

        let consumed = values.byte_offset();
        self.buffer.drain(..consumed);
        self.scanned -= consumed;
        self.complete -= consumed;
        Ok(frames)
    }

    fn scan(&mut self) {
        for (offset, &byte) in self.buffer[self.scanned..].iter().enumerate() {
            let end = self.scanned + offset + 1;
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                    if self.open.is_empty() {
                        self.complete = end;
                    }
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'[' => self.open.push(b']'),
                b'{' => self.open.push(b'}'),
                b']' | b'}' => {
                    if self.open.pop() != Some(byte) {
                        // Mismatched closer; let the parser report it
                        self.open.clear();
                    }
                    if self.open.is_empty() {
                        self.complete = end;
                    }
                }
                // Scalars and stray bytes at the top level go to the parser,
                // which reports them
                b if self.open.is_empty() && !b.is_ascii_whitespace() => self.complete = end,
                _ => {}
            }
        }
        self.scanned = self.buffer.len();
    }

    /// Bytes held back waiting for the remainder of a frame
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Check that the stream did not stop in the middle of a frame
    pub fn finish(&self) -> Result<(), FeedError> {
        if self.buffer.iter().all(u8::is_ascii_whitespace) {
            Ok(())
        } else {
            Err(FeedError::Decode(format!(
                "stream ended inside a frame ({} bytes unparsed)",
                self.buffer.len()
            )))
        }
    }
}
