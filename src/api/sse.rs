//! Line-oriented decoder for OpenAI-style server-sent events.
//!
//! Each event is a `data: {json}` line; the stream ends with `data: [DONE]`.
//! Chunks from the network may split lines anywhere, so incomplete lines are
//! buffered until the rest arrives.

use crate::api::{ApiError, ChatStream};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Delta(String),
    Done,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a network chunk; returns the events completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a final line that arrived without a trailing newline.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
            .into_iter()
            .collect()
    }
}

fn parse_line(line: &str) -> Option<SseEvent> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }
    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::debug!("Skipping malformed SSE line: {}", e);
            return None;
        }
    };
    let choice = chunk.choices.into_iter().next()?;
    choice
        .delta
        .and_then(|d| d.content)
        .or(choice.text)
        .filter(|t| !t.is_empty())
        .map(SseEvent::Delta)
}

struct DeltaState<S> {
    bytes: S,
    decoder: SseDecoder,
    pending: VecDeque<SseEvent>,
    ended: bool,
}

/// Turns a raw byte stream into a stream of content deltas that stops at
/// `[DONE]`.
pub fn sse_deltas<S, B, E>(bytes: S) -> ChatStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    let state = DeltaState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        ended: false,
    };

    let stream = futures::stream::unfold(state, |mut state| async move {
        loop {
            match state.pending.pop_front() {
                Some(SseEvent::Delta(text)) => return Some((Ok(text), state)),
                Some(SseEvent::Done) => return None,
                None if state.ended => return None,
                None => {}
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(chunk.as_ref());
                    state.pending.extend(events);
                }
                Some(Err(e)) => {
                    state.ended = true;
                    return Some((Err(e.into()), state));
                }
                None => {
                    state.ended = true;
                    let events = state.decoder.finish();
                    state.pending.extend(events);
                }
            }
        }
    });

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(text: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":{}}}}}]}}\n",
            serde_json::to_string(text).unwrap()
        )
    }

    #[test]
    fn test_decodes_complete_lines() {
        let mut decoder = SseDecoder::new();
        let input = format!("{}\n{}data: [DONE]\n", delta("Hel"), delta("lo"));
        assert_eq!(
            decoder.push(input.as_bytes()),
            vec![
                SseEvent::Delta("Hel".to_string()),
                SseEvent::Delta("lo".to_string()),
                SseEvent::Done
            ]
        );
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let line = delta("żółw");
        let bytes = line.as_bytes();
        let split = bytes.len() / 2;
        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(
            decoder.push(&bytes[split..]),
            vec![SseEvent::Delta("żółw".to_string())]
        );
    }

    #[test]
    fn test_skips_noise() {
        let mut decoder = SseDecoder::new();
        let input = ": keep-alive\n\ndata: {not json}\nevent: ping\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n";
        assert!(decoder.push(input.as_bytes()).is_empty());
    }

    #[test]
    fn test_completion_style_text_and_crlf() {
        let mut decoder = SseDecoder::new();
        let input = "data: {\"choices\":[{\"text\":\"abc\"}]}\r\n";
        assert_eq!(
            decoder.push(input.as_bytes()),
            vec![SseEvent::Delta("abc".to_string())]
        );
    }

    #[test]
    fn test_finish_flushes_trailing_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), vec![SseEvent::Done]);
        assert!(decoder.finish().is_empty());
    }

    #[tokio::test]
    async fn test_sse_deltas_stops_at_done() {
        let body = format!("{}{}data: [DONE]\n{}", delta("a"), delta("b"), delta("ignored"));
        let (first, second) = body.split_at(10);
        let chunks: Vec<Result<Vec<u8>, ApiError>> =
            vec![Ok(first.as_bytes().to_vec()), Ok(second.as_bytes().to_vec())];
        let deltas: Vec<String> = sse_deltas(futures::stream::iter(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(deltas, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_sse_deltas_surfaces_transport_error() {
        let chunks: Vec<Result<Vec<u8>, ApiError>> = vec![
            Ok(delta("a").into_bytes()),
            Err(ApiError::Stream("reset".to_string())),
        ];
        let items: Vec<Result<String, ApiError>> =
            sse_deltas(futures::stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "a");
        assert!(items[1].is_err());
    }
}
