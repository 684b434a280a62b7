//! Event Frame Decoder
//!
//! Responsibilities:
//! - Split a `text/event-stream` body into lines, whatever the chunk boundaries
//! - Track the pending `event:` type per block
//! - Parse each `data:` line as JSON and emit one frame
//!
//! Chunks are raw bytes: a boundary may fall inside a line or inside a UTF-8
//! sequence. Only complete lines are ever interpreted. Data lines that are not
//! JSON (heartbeats, comments, `[DONE]` markers) are dropped, not reported.

use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Event type used when a block carries no `event:` line.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    pub event_type: String,
    pub payload: serde_json::Value,
}

/// Incremental SSE decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    pending_event: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every frame completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            start = end + 1;
            if let Some(frame) = self.process_line(line.strip_suffix('\r').unwrap_or(&line)) {
                frames.push(frame);
            }
        }
        // Keep the unterminated tail for the next chunk.
        self.buffer.drain(..start);
        frames
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<SseFrame> {
        self.push(chunk.as_bytes())
    }

    /// Bytes held back waiting for a line terminator.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// End of stream. A trailing unterminated line is discarded, never parsed.
    pub fn finish(self) {
        if !self.buffer.is_empty() {
            debug!(
                bytes = self.buffer.len(),
                "discarding unterminated trailing SSE line"
            );
        }
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            self.pending_event = None;
            return None;
        }

        if let Some(rest) = line.strip_prefix("event:") {
            self.pending_event = Some(rest.trim().to_string());
            return None;
        }

        let data = line.strip_prefix("data:")?;
        match serde_json::from_str::<serde_json::Value>(data.trim()) {
            Ok(payload) => Some(SseFrame {
                event_type: self
                    .pending_event
                    .clone()
                    .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string()),
                payload,
            }),
            Err(e) => {
                trace!("dropping non-JSON data line: {}", e);
                None
            }
        }
    }
}

/// Turn a stream of body chunks into a lazy, finite stream of frames.
///
/// A transport error is yielded once and ends the stream.
pub fn decode_stream<S, B, E>(chunks: S) -> impl Stream<Item = Result<SseFrame, E>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    let state = (chunks, Some(SseDecoder::new()), VecDeque::new());
    stream::unfold(state, |(mut chunks, mut decoder, mut ready)| async move {
        loop {
            if let Some(frame) = ready.pop_front() {
                return Some((Ok(frame), (chunks, decoder, ready)));
            }
            let active = decoder.as_mut()?;
            match chunks.next().await {
                Some(Ok(chunk)) => ready.extend(active.push(chunk.as_ref())),
                Some(Err(e)) => {
                    decoder = None;
                    return Some((Err(e), (chunks, decoder, ready)));
                }
                None => {
                    if let Some(finished) = decoder.take() {
                        finished.finish();
                    }
                }
            }
        }
    })
}
