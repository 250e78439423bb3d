//! Incremental frame reader
//!
//! Turns a response body into a lazy, non-restartable sequence of tick
//! frames. Reading stops silently on cancellation and reports any other
//! failure exactly once.

use std::collections::VecDeque;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::ByteStream;
use crate::error::FeedError;
use crate::parser::{Frame, FrameDecoder};

/// Why a reader stopped before the stream completed
#[derive(Debug)]
pub enum ReadError {
    /// The owner cancelled the subscription. Expected and never surfaced.
    Cancelled,
    /// Transport or decode failure; the subscription is over.
    Failed(FeedError),
}

/// Reads tick frames from one feed response
pub struct FrameReader {
    stream: ByteStream,
    cancel: CancellationToken,
    decoder: FrameDecoder,
    pending: VecDeque<Frame>,
    finished: bool,
}

impl FrameReader {
    pub fn new(stream: ByteStream, cancel: CancellationToken) -> Self {
        Self {
            stream,
            cancel,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Next frame, `Ok(None)` once the stream is complete
    ///
    /// After any terminal outcome the reader stays exhausted and keeps
    /// returning `Ok(None)`.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, ReadError> {
        loop {
            if self.finished {
                return Ok(None);
            }

            if self.cancel.is_cancelled() {
                return Err(self.terminate(ReadError::Cancelled));
            }

            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }

            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                chunk = self.stream.next() => Some(chunk),
            };

            match next {
                None => return Err(self.terminate(ReadError::Cancelled)),
                Some(None) => {
                    self.finished = true;
                    self.decoder.finish().map_err(ReadError::Failed)?;
                    debug!("Rates stream completed");
                    return Ok(None);
                }
                Some(Some(Err(e))) => return Err(self.terminate(ReadError::Failed(e))),
                Some(Some(Ok(chunk))) => {
                    trace!(len = chunk.len(), "Received chunk");
                    match self.decoder.push(&chunk) {
                        Ok(frames) => self.pending.extend(frames),
                        Err(e) => return Err(self.terminate(ReadError::Failed(e))),
                    }
                }
            }
        }
    }

    fn terminate(&mut self, reason: ReadError) -> ReadError {
        self.finished = true;
        self.pending.clear();
        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::stream;
    use tokio::sync::mpsc;

    const TICK: &str = r#"[{"from":"USD","to":"EUR","bid":1.1,"ask":1.3,"price":1.2,"time_stamp":"2024-05-01T10:00:00Z"}]"#;

    fn chunks(parts: Vec<&'static str>) -> ByteStream {
        stream::iter(
            parts
                .into_iter()
                .map(|p| Ok::<_, FeedError>(Bytes::from_static(p.as_bytes()))),
        )
        .boxed()
    }

    #[tokio::test]
    async fn test_reads_frames_until_completion() {
        let mut reader = FrameReader::new(chunks(vec![TICK, TICK]), CancellationToken::new());

        assert_eq!(reader.next_frame().await.unwrap().unwrap().len(), 1);
        assert_eq!(reader.next_frame().await.unwrap().unwrap().len(), 1);
        assert!(reader.next_frame().await.unwrap().is_none());
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reassembles_split_frames() {
        let (head, tail) = TICK.split_at(17);
        let mut reader = FrameReader::new(chunks(vec![head, tail]), CancellationToken::new());

        let frame = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(frame[0].price, 1.2);
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_stream_fails() {
        let (head, _) = TICK.split_at(17);
        let mut reader = FrameReader::new(chunks(vec![head]), CancellationToken::new());

        assert!(matches!(
            reader.next_frame().await,
            Err(ReadError::Failed(FeedError::Decode(_)))
        ));
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_payload_fails_once() {
        let mut reader = FrameReader::new(chunks(vec!["not json", TICK]), CancellationToken::new());

        assert!(matches!(
            reader.next_frame().await,
            Err(ReadError::Failed(FeedError::Decode(_)))
        ));
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transport_error_fails() {
        let body = stream::iter(vec![
            Ok(Bytes::from_static(TICK.as_bytes())),
            Err(FeedError::Transport("connection reset".to_string())),
        ])
        .boxed();
        let mut reader = FrameReader::new(body, CancellationToken::new());

        assert!(reader.next_frame().await.unwrap().is_some());
        assert!(matches!(
            reader.next_frame().await,
            Err(ReadError::Failed(FeedError::Transport(_)))
        ));
    }

    #[tokio::test]
    async fn test_cancel_abandons_pending_read() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Result<Bytes, FeedError>>();
        let body = stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed();
        let token = CancellationToken::new();
        let mut reader = FrameReader::new(body, token.clone());

        let pending = tokio::spawn(async move { reader.next_frame().await });
        tokio::task::yield_now().await;
        token.cancel();

        let outcome = pending.await.unwrap();
        assert!(matches!(outcome, Err(ReadError::Cancelled)));
        drop(tx);
    }

    #[tokio::test]
    async fn test_cancelled_reader_yields_no_buffered_frames() {
        let two = format!("{}{}", TICK, TICK);
        let body = stream::iter(vec![Ok::<_, FeedError>(Bytes::from(two))]).boxed();
        let token = CancellationToken::new();
        let mut reader = FrameReader::new(body, token.clone());

        assert!(reader.next_frame().await.unwrap().is_some());
        token.cancel();
        assert!(matches!(reader.next_frame().await, Err(ReadError::Cancelled)));
    }
}
