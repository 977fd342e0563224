//! Server-sent event decoding for chat completion streams.
//!
//! The decoder is line oriented: every complete line that starts with
//! `data: ` carries either a JSON chunk or the `[DONE]` sentinel. Lines are
//! split on raw bytes before UTF-8 decoding, so where the transport happens to
//! cut the body into chunks never changes what comes out.
//!
//! Malformed JSON frames are skipped and logged rather than treated as
//! errors, and a body that ends without `[DONE]` is a normal completion.

use std::pin::Pin;

use async_stream::stream;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::Stream;

use crate::{error::Result, transport::ByteStream};

/// Prefix of an event line carrying a payload
pub const DATA_PREFIX: &str = "data: ";

/// Payload that ends the stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// An incremental fragment of assistant output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDelta(pub String);

impl ContentDelta {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// A lazy, single-pass sequence of deltas
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<ContentDelta>> + Send>>;

/// Incremental SSE line decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    finished: bool,
    skipped_frames: usize,
}

impl SseDecoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `[DONE]` sentinel (or `finish`) has been seen
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of `data:` frames dropped because they were not valid JSON
    pub fn skipped_frames(&self) -> usize {
        self.skipped_frames
    }

    /// Feed the next chunk of bytes and collect the deltas it completes.
    ///
    /// A trailing partial line stays buffered until its newline arrives.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ContentDelta> {
        let mut deltas = Vec::new();
        if self.finished {
            return deltas;
        }

        self.buffer.extend_from_slice(chunk);

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.process_line(&line[..pos], &mut deltas);
            if self.finished {
                self.buffer.clear();
                break;
            }
        }

        deltas
    }

    /// Flush at end of input: a final unterminated line is decoded best-effort.
    pub fn finish(&mut self) -> Vec<ContentDelta> {
        let mut deltas = Vec::new();
        if !self.finished && !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.process_line(&line, &mut deltas);
        }
        self.finished = true;
        deltas
    }

    fn process_line(&mut self, raw: &[u8], deltas: &mut Vec<ContentDelta>) {
        let decoded = String::from_utf8_lossy(raw);
        let line = decoded.strip_suffix('\r').unwrap_or(&*decoded);

        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };

        if payload.trim() == DONE_SENTINEL {
            self.finished = true;
            return;
        }

        match serde_json::from_str::<StreamChunk>(payload) {
            Ok(chunk) => {
                if let Some(text) = chunk.into_first_content() {
                    if !text.is_empty() {
                        deltas.push(ContentDelta(text));
                    }
                }
            }
            Err(e) => {
                self.skipped_frames += 1;
                tracing::warn!(error = %e, frame = %payload, "Skipping malformed SSE frame");
            }
        }
    }
}

/// Decode a response body into content deltas.
///
/// The sequence ends at `[DONE]`, at end of body, or after yielding the first
/// transport error. Dropping it releases the underlying body.
pub fn decode_stream(mut bytes: ByteStream) -> DeltaStream {
    Box::pin(stream! {
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for delta in decoder.feed(&chunk) {
                        yield Ok(delta);
                    }
                    if decoder.is_finished() {
                        tracing::debug!(skipped = decoder.skipped_frames(), "Stream finished");
                        return;
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        for delta in decoder.finish() {
            yield Ok(delta);
        }
        tracing::debug!(
            skipped = decoder.skipped_frames(),
            "Stream closed without [DONE], treating as complete"
        );
    })
}

// Streaming response types

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

impl StreamChunk {
    fn into_first_content(self) -> Option<String> {
        self.choices.into_iter().next()?.delta?.content
    }
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn frame(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    fn texts(deltas: Vec<ContentDelta>) -> Vec<String> {
        deltas.into_iter().map(ContentDelta::into_string).collect()
    }

    fn byte_stream(chunks: Vec<Result<Vec<u8>>>) -> ByteStream {
        Box::pin(futures::stream::iter(chunks))
    }

    #[test]
    fn test_single_frame() {
        let mut decoder = SseDecoder::new();
        let out = decoder.feed(frame("Hello").as_bytes());
        assert_eq!(texts(out), vec!["Hello"]);
    }

    #[test]
    fn test_chunk_boundary_invariance() {
        let body = format!(
            "{}{}: keep-alive\n{}data: [DONE]\n",
            frame("Hel"),
            frame("lo, wörld ✓"),
            frame(" again")
        );
        let bytes = body.as_bytes();

        let mut whole = SseDecoder::new();
        let expected = texts(whole.feed(bytes));
        assert_eq!(expected, vec!["Hel", "lo, wörld ✓", " again"]);

        // Every split point, including inside multi-byte characters
        for split in 0..=bytes.len() {
            let mut decoder = SseDecoder::new();
            let mut out = texts(decoder.feed(&bytes[..split]));
            out.extend(texts(decoder.feed(&bytes[split..])));
            out.extend(texts(decoder.finish()));
            assert_eq!(out, expected, "split at {split}");
        }

        // One byte at a time
        let mut decoder = SseDecoder::new();
        let mut out = Vec::new();
        for b in bytes {
            out.extend(texts(decoder.feed(std::slice::from_ref(b))));
        }
        assert_eq!(out, expected);
    }

    #[test]
    fn test_done_stops_output() {
        let mut decoder = SseDecoder::new();
        let body = format!("{}data: [DONE]\n{}", frame("a"), frame("b"));
        let out = decoder.feed(body.as_bytes());
        assert_eq!(texts(out), vec!["a"]);
        assert!(decoder.is_finished());
        assert!(decoder.feed(frame("c").as_bytes()).is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_malformed_frame_skipped() {
        let mut decoder = SseDecoder::new();
        let body = format!("{}data: {{not json\n{}", frame("first"), frame("second"));
        let out = decoder.feed(body.as_bytes());
        assert_eq!(texts(out), vec!["first", "second"]);
        assert_eq!(decoder.skipped_frames(), 1);
    }

    #[test]
    fn test_partial_line_stays_buffered() {
        let mut decoder = SseDecoder::new();
        let f = frame("x");
        let (head, tail) = f.split_at(f.len() - 2);
        assert!(decoder.feed(head.as_bytes()).is_empty());
        assert_eq!(texts(decoder.feed(tail.as_bytes())), vec!["x"]);
    }

    #[test]
    fn test_crlf_lines() {
        let mut decoder = SseDecoder::new();
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\r\n\r\ndata: [DONE]\r\n";
        assert_eq!(texts(decoder.feed(body.as_bytes())), vec!["hi"]);
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_empty_and_missing_content_ignored() {
        let mut decoder = SseDecoder::new();
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n",
            "data: {\"choices\":[]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":null},\"finish_reason\":\"stop\"}]}\n",
        );
        assert!(decoder.feed(body.as_bytes()).is_empty());
        assert_eq!(decoder.skipped_frames(), 0);
    }

    #[test]
    fn test_non_data_lines_ignored() {
        let mut decoder = SseDecoder::new();
        let body = "event: message\nid: 4\n: comment\nretry: 100\ndata:{\"choices\":[]}\n";
        assert!(decoder.feed(body.as_bytes()).is_empty());
        assert_eq!(decoder.skipped_frames(), 0);
    }

    #[test]
    fn test_finish_decodes_unterminated_last_line() {
        let mut decoder = SseDecoder::new();
        let f = frame("tail");
        let unterminated = f.trim_end();
        assert!(decoder.feed(unterminated.as_bytes()).is_empty());
        assert_eq!(texts(decoder.finish()), vec!["tail"]);
        assert!(decoder.is_finished());
    }

    #[tokio::test]
    async fn test_decode_stream_hel_lo_done() {
        let body = format!("{}{}data: [DONE]\n\n", frame("Hel"), frame("lo"));
        let bytes = body.into_bytes();
        let (a, b) = bytes.split_at(7);
        let mut deltas = decode_stream(byte_stream(vec![Ok(a.to_vec()), Ok(b.to_vec())]));

        let mut out = Vec::new();
        while let Some(delta) = deltas.next().await {
            out.push(delta.unwrap().into_string());
        }
        assert_eq!(out, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_decode_stream_done_ignores_trailing_bytes() {
        let body = format!("{}data: [DONE]\n{}", frame("only"), frame("ignored"));
        let mut deltas = decode_stream(byte_stream(vec![Ok(body.into_bytes())]));
        assert_eq!(deltas.next().await.unwrap().unwrap().as_str(), "only");
        assert!(deltas.next().await.is_none());
    }

    #[tokio::test]
    async fn test_decode_stream_without_done_completes() {
        let mut deltas = decode_stream(byte_stream(vec![Ok(frame("partial").into_bytes())]));
        assert_eq!(deltas.next().await.unwrap().unwrap().as_str(), "partial");
        assert!(deltas.next().await.is_none());
    }

    #[tokio::test]
    async fn test_decode_stream_surfaces_transport_error_once() {
        let mut deltas = decode_stream(byte_stream(vec![
            Ok(frame("a").into_bytes()),
            Err(Error::Cancelled),
            Ok(frame("b").into_bytes()),
        ]));
        assert_eq!(deltas.next().await.unwrap().unwrap().as_str(), "a");
        assert!(matches!(deltas.next().await, Some(Err(Error::Cancelled))));
        assert!(deltas.next().await.is_none());
    }
}
