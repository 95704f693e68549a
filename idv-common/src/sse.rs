//! Incremental server-sent-event decoding
//!
//! The recognition backend delivers asynchronous job results as a
//! `text/event-stream` body. Blocks are separated by a blank line (LF or
//! CRLF); a terminal block looks like:
//!
//! ```text
//! event: complete
//! data: [{"data": { ... }}]
//! ```
//!
//! `SseDecoder` buffers incoming byte chunks and yields complete blocks as
//! they become available, so callers never hold the whole stream in memory.

use serde_json::Value;
use tracing::warn;

const COMPLETE_EVENT_PREFIX: &str = "event: complete";
const DATA_MARKER: &str = "data: ";

/// Incremental decoder for a blank-line-delimited event stream.
///
/// Feed it chunks in arrival order; it returns every complete event block
/// found so far and retains the trailing fragment as buffer state.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain all complete event blocks from the buffer.
    ///
    /// Accepts both `\n\n` and `\r\n\r\n` as block delimiters, in any mix
    /// within one stream. Chunk boundaries may fall anywhere, including
    /// inside a delimiter.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut blocks = Vec::new();
        loop {
            let lf = self.buffer.find("\n\n");
            let crlf = self.buffer.find("\r\n\r\n");

            // Earliest delimiter wins so interleaved LF/CRLF streams decode
            // in order.
            let (at, len) = match (lf, crlf) {
                (Some(l), Some(c)) if c < l => (c, 4),
                (Some(l), _) => (l, 2),
                (None, Some(c)) => (c, 4),
                (None, None) => break,
            };

            let block = self.buffer[..at].to_string();
            self.buffer.drain(..at + len);
            if !block.trim().is_empty() {
                blocks.push(block);
            }
        }
        blocks
    }

    /// Returns the retained incomplete fragment (mainly for diagnostics).
    pub fn pending(&self) -> &str {
        &self.buffer
    }
}

/// Extract the JSON payload from a `complete` event block.
///
/// Returns `None` for any other event name. A malformed `data:` payload is
/// logged and skipped rather than terminating the stream; the caller keeps
/// reading and waits for the next block.
pub fn complete_payload(block: &str) -> Option<Value> {
    if !block.starts_with(COMPLETE_EVENT_PREFIX) {
        return None;
    }

    let (_, data) = block.split_once(DATA_MARKER)?;
    match serde_json::from_str(data) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "discarding malformed completion payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPLETE_BLOCK: &str =
        "event: complete\ndata: [{\"data\": {\"documentName\": \"PASSPORT\"}}]\n\n";

    #[test]
    fn single_chunk_yields_block() {
        let mut decoder = SseDecoder::new();
        let blocks = decoder.feed(COMPLETE_BLOCK.as_bytes());
        assert_eq!(blocks.len(), 1);

        let payload = complete_payload(&blocks[0]).expect("payload should parse");
        assert_eq!(
            payload[0]["data"]["documentName"],
            Value::String("PASSPORT".into())
        );
    }

    #[test]
    fn arbitrary_chunk_boundaries_yield_identical_payload() {
        let bytes = COMPLETE_BLOCK.as_bytes();

        // Split the block at every possible boundary, including inside the
        // trailing delimiter.
        for split in 1..bytes.len() {
            let mut decoder = SseDecoder::new();
            let mut blocks = decoder.feed(&bytes[..split]);
            blocks.extend(decoder.feed(&bytes[split..]));

            assert_eq!(blocks.len(), 1, "split at {}", split);
            let payload = complete_payload(&blocks[0]).expect("payload should parse");
            assert_eq!(payload[0]["data"]["documentName"], "PASSPORT");
        }
    }

    #[test]
    fn crlf_delimiters_are_accepted() {
        let mut decoder = SseDecoder::new();
        let blocks =
            decoder.feed(b"event: complete\r\ndata: [{\"data\": {\"ok\": true}}]\r\n\r\n");
        assert_eq!(blocks.len(), 1);
        assert!(complete_payload(&blocks[0]).is_some());
    }

    #[test]
    fn mixed_delimiters_decode_in_order() {
        let mut decoder = SseDecoder::new();
        let blocks = decoder.feed(b"event: a\ndata: 1\n\nevent: b\r\ndata: 2\r\n\r\nevent: c\ndata: 3\n\n");
        assert_eq!(blocks.len(), 3);
        assert!(blocks[0].starts_with("event: a"));
        assert!(blocks[1].starts_with("event: b"));
        assert!(blocks[2].starts_with("event: c"));
    }

    #[test]
    fn incomplete_fragment_is_retained() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: complete\ndata: [1").is_empty());
        assert_eq!(decoder.pending(), "event: complete\ndata: [1");

        let blocks = decoder.feed(b", 2]\n\n");
        assert_eq!(blocks.len(), 1);
        assert!(decoder.pending().is_empty());
    }

    #[test]
    fn non_complete_events_are_ignored() {
        assert!(complete_payload("event: generating\ndata: null").is_none());
        assert!(complete_payload("event: heartbeat").is_none());
    }

    #[test]
    fn malformed_payload_is_skipped_not_fatal() {
        let mut decoder = SseDecoder::new();
        let blocks = decoder.feed(
            b"event: complete\ndata: {not json\n\nevent: complete\ndata: [{\"data\": {\"ok\": 1}}]\n\n",
        );
        assert_eq!(blocks.len(), 2);

        // First block is malformed and yields nothing; the second still
        // resolves correctly.
        assert!(complete_payload(&blocks[0]).is_none());
        let payload = complete_payload(&blocks[1]).expect("second payload should parse");
        assert_eq!(payload[0]["data"]["ok"], 1);
    }

    #[test]
    fn complete_block_without_data_marker_yields_nothing() {
        assert!(complete_payload("event: complete").is_none());
    }
}
