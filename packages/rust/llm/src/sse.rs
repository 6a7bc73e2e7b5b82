//! SSE decoding for streamed chat completions.
//!
//! Turns a raw byte stream into the text deltas of a single completion.
//! Lines are split on raw bytes so multi-byte characters that straddle network
//! chunks decode correctly.

use bytes::Bytes;
use courtscout_shared::{CourtScoutError, Result};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::trace;

#[derive(Debug, Deserialize)]
struct ChunkRaw {
    #[serde(default)]
    choices: Vec<ChoiceRaw>,
}

#[derive(Debug, Deserialize)]
struct ChoiceRaw {
    #[serde(default)]
    delta: Option<DeltaRaw>,
}

#[derive(Debug, Deserialize)]
struct DeltaRaw {
    #[serde(default)]
    content: Option<String>,
}

/// Outcome of decoding one buffered line.
enum Line {
    Fragment(String),
    Skip,
    Done,
}

/// Stream of non-empty text fragments, ending at `data: [DONE]` or end of body.
pub struct SseFragments {
    inner: Pin<Box<dyn Stream<Item = std::result::Result<Bytes, String>> + Send>>,
    buffer: Vec<u8>,
    done: bool,
}

impl SseFragments {
    pub fn new<S, E>(byte_stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: std::fmt::Display,
    {
        Self {
            inner: Box::pin(byte_stream.map(|r| r.map_err(|e| e.to_string()))),
            buffer: Vec::new(),
            done: false,
        }
    }

    /// Pop the next complete line and decode it. `None` when no full line is buffered.
    fn next_line(&mut self, flush: bool) -> Option<Result<Line>> {
        let line: Vec<u8> = match self.buffer.iter().position(|b| *b == b'\n') {
            Some(pos) => self.buffer.drain(..=pos).collect(),
            None if flush && !self.buffer.is_empty() => std::mem::take(&mut self.buffer),
            None => return None,
        };
        Some(decode_line(&line))
    }
}

fn decode_line(line: &[u8]) -> Result<Line> {
    let line = std::str::from_utf8(line)
        .map_err(|e| CourtScoutError::transient(format!("invalid UTF-8 in stream: {e}")))?
        .trim();

    // Blank separators and non-data fields ("event:", "id:", ": keepalive")
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(Line::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(Line::Done);
    }

    let chunk: ChunkRaw = serde_json::from_str(data).map_err(|e| {
        CourtScoutError::transient(format!(
            "failed to parse stream chunk: {e} (data: {})",
            data.chars().take(200).collect::<String>()
        ))
    })?;

    // Usage-only chunks carry no choices.
    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .unwrap_or_default();

    if content.is_empty() {
        Ok(Line::Skip)
    } else {
        Ok(Line::Fragment(content))
    }
}

impl Stream for SseFragments {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.done {
                return Poll::Ready(None);
            }

            match this.next_line(false) {
                Some(Ok(Line::Fragment(text))) => return Poll::Ready(Some(Ok(text))),
                Some(Ok(Line::Skip)) => continue,
                Some(Ok(Line::Done)) => {
                    trace!("stream done marker");
                    this.done = true;
                    return Poll::Ready(None);
                }
                Some(Err(e)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {}
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(e))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(CourtScoutError::transient(format!(
                        "stream transport error: {e}"
                    )))));
                }
                Poll::Ready(None) => {
                    // Body ended without [DONE]; decode whatever is left.
                    this.done = true;
                    while let Some(line) = this.next_line(true) {
                        match line {
                            Ok(Line::Fragment(text)) => return Poll::Ready(Some(Ok(text))),
                            Ok(Line::Skip) => continue,
                            Ok(Line::Done) => break,
                            Err(e) => return Poll::Ready(Some(Err(e))),
                        }
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&[u8]]) -> Vec<std::result::Result<Bytes, String>> {
        parts.iter().map(|p| Ok(Bytes::copy_from_slice(p))).collect()
    }

    async fn collect(stream: SseFragments) -> Vec<Result<String>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn yields_deltas_until_done() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"[{\\\"a\\\"\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\":1}]\"}}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"total_tokens\":12}}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"after done\"}}]}\n\n",
        );
        let out = collect(SseFragments::new(futures::stream::iter(chunks(&[
            body.as_bytes()
        ]))))
        .await;
        let text: Vec<String> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(text, vec!["[{\"a\"", ":1}]"]);
    }

    #[tokio::test]
    async fn multibyte_char_split_across_chunks() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"没有了\"}}]}\n";
        let bytes = line.as_bytes();
        let split = line.find('没').unwrap() + 1;
        let out = collect(SseFragments::new(futures::stream::iter(chunks(&[
            &bytes[..split],
            &bytes[split..],
        ]))))
        .await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), "没有了");
    }

    #[tokio::test]
    async fn skips_comments_and_event_fields() {
        let body = ": keepalive\nevent: message\nid: 3\ndata:{\"choices\":[{\"delta\":{\"content\":\"x\"}}]}";
        let out = collect(SseFragments::new(futures::stream::iter(chunks(&[
            body.as_bytes()
        ]))))
        .await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), "x");
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let items: Vec<std::result::Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\"part\"}}]}\n",
            )),
            Err("connection reset".to_string()),
            Ok(Bytes::from_static(b"data: [DONE]\n")),
        ];
        let out = collect(SseFragments::new(futures::stream::iter(items))).await;
        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        assert!(matches!(out[1], Err(CourtScoutError::TransientFetch(_))));
    }

    #[tokio::test]
    async fn malformed_chunk_is_an_error() {
        let out = collect(SseFragments::new(futures::stream::iter(chunks(&[
            &b"data: {not json}\n"[..],
        ]))))
        .await;
        assert_eq!(out.len(), 1);
        assert!(out[0].is_err());
    }
}
