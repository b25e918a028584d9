//! Server-sent-event reader over a POST request with a chunked response body.
//!
//! Only `data: <json>` lines are meaningful. Every other line (comments,
//! keep-alives, blank separators) is ignored, and a `data:` line that fails
//! to parse is logged and skipped without ending the stream.

use crate::error::ApiError;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

const DATA_PREFIX: &str = "data: ";

// Alias for the stream type we return
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Value, ApiError>> + Send>>;

/// Incremental decoder turning raw body chunks into parsed event payloads.
#[derive(Debug, Default)]
pub struct EventLineDecoder {
    // Bytes of a multi-byte character split across chunks
    pending: Vec<u8>,
    // Decoded text not yet terminated by a newline
    buffer: String,
}

impl EventLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the events completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.pending.extend_from_slice(chunk);
        self.decode_pending();

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches('\n').trim_end_matches('\r');
            if let Some(event) = parse_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Text received after the last newline.
    pub fn remainder(&self) -> &str {
        &self.buffer
    }

    fn decode_pending(&mut self) {
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&self.pending[..valid]) {
                        self.buffer.push_str(text);
                    }
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for the next chunk
                        None => {
                            self.pending.drain(..valid);
                            return;
                        }
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }
}

fn parse_line(line: &str) -> Option<Value> {
    let payload = line.strip_prefix(DATA_PREFIX)?;
    match serde_json::from_str(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            log::error!("Failed to parse SSE data: {} ({})", line, e);
            None
        }
    }
}

/// Client for one streaming endpoint.
///
/// Each call to [`SseClient::stream`] opens a new request; [`SseClient::cancel`]
/// aborts the most recent one.
pub struct SseClient {
    http: reqwest::Client,
    url: String,
    active: Mutex<Option<CancellationToken>>,
}

impl SseClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            active: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Posts `body` and returns the event stream once response headers arrive.
    ///
    /// A non-success status fails here, before any event is produced.
    pub async fn stream<B>(&self, body: &B, bearer: Option<&str>) -> Result<EventStream, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let token = CancellationToken::new();
        if let Some(previous) = self.replace_active(Some(token.clone())) {
            previous.cancel();
        }

        let mut request = self.http.post(&self.url).json(body);
        if let Some(bearer) = bearer {
            request = request.bearer_auth(bearer);
        }

        log::debug!("Opening event stream: {}", self.url);
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => {
                log::info!("SSE connection aborted by client");
                return Ok(Box::pin(futures::stream::empty()));
            }
            result = request.send() => result.map_err(|source| {
                log::error!("SSE streaming error: {}", source);
                let message = "Failed to open event stream".to_string();
                if source.is_builder() {
                    ApiError::Request { message, source }
                } else {
                    ApiError::Transport { message, source }
                }
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<Failed to read error body>".to_string());
            log::error!("Event stream request failed with status {}: {}", status, body);
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut chunks = Box::pin(response.bytes_stream());
        let events = async_stream::stream! {
            let mut decoder = EventLineDecoder::new();
            loop {
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        log::info!("SSE connection aborted by client");
                        break;
                    }
                    next = chunks.next() => next,
                };
                match next {
                    Some(Ok(chunk)) => {
                        log::debug!("Received {} byte chunk", chunk.len());
                        for event in decoder.push(&chunk) {
                            yield Ok(event);
                        }
                    }
                    Some(Err(source)) => {
                        log::error!("SSE streaming error: {}", source);
                        yield Err(ApiError::Transport {
                            message: "Event stream interrupted".to_string(),
                            source,
                        });
                        break;
                    }
                    None => break,
                }
            }
            if !decoder.remainder().is_empty() {
                log::debug!("Discarding unterminated stream line: {}", decoder.remainder());
            }
        };

        Ok(Box::pin(events))
    }

    /// Aborts the in-flight stream, if any. The stream then ends without error.
    pub fn cancel(&self) {
        if let Some(token) = self.replace_active(None) {
            token.cancel();
        }
    }

    fn replace_active(&self, token: Option<CancellationToken>) -> Option<CancellationToken> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *active, token)
    }
}
