//! Transport that talks to the answering service over HTTP and reads the reply
//! as Server-Sent Events.

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use memchr::memchr;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{ChunkKind, RegenerateRequest, SendPayload, StreamChunk};
use crate::core::transport::{ChunkStream, StreamError, StreamResponse, Transport, TransportError};
use crate::utils::url::{construct_api_url, validate_base_url};

const MESSAGE_ID_HEADER: &str = "x-message-id";
const CONVERSATION_ID_HEADER: &str = "x-conversation-id";
/// Longest SSE line accepted before the stream is treated as malformed.
const MAX_SSE_LINE_BYTES: usize = 1024 * 1024;

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    native_regenerate: bool,
}

impl HttpTransport {
    pub fn new(
        base_url: &str,
        connect_timeout: Duration,
        native_regenerate: bool,
    ) -> Result<Self, TransportError> {
        let base_url = validate_base_url(base_url).map_err(TransportError::Request)?;
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|err| TransportError::Request(err.to_string()))?;
        Ok(Self {
            client,
            base_url,
            native_regenerate,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn open<T: serde::Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<StreamResponse, TransportError> {
        let url = construct_api_url(&self.base_url, endpoint);
        debug!(%url, "opening reply stream");

        let response = self
            .client
            .post(url)
            .header("Accept", "text/event-stream")
            .json(body)
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: format_api_error(&body),
            });
        }

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
        };
        let message_id =
            header(MESSAGE_ID_HEADER).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let conversation_id =
            header(CONVERSATION_ID_HEADER).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(StreamResponse {
            message_id,
            conversation_id,
            stream: decode_sse(response.bytes_stream()),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_message(&self, payload: SendPayload) -> Result<StreamResponse, TransportError> {
        self.open("api/chat", &payload).await
    }

    async fn regenerate_response(
        &self,
        request: RegenerateRequest,
    ) -> Result<StreamResponse, TransportError> {
        if !self.native_regenerate {
            return Err(TransportError::Unsupported("regenerateResponse"));
        }
        self.open("api/chat/regenerate", &request).await
    }

    fn supports_regenerate(&self) -> bool {
        self.native_regenerate
    }

    fn stop_streaming(&self, handle: &CancellationToken) {
        // Dropping the body stream is what closes the connection; the consumer
        // does that as soon as it sees the token.
        handle.cancel();
    }
}

struct SseState<S> {
    bytes: S,
    buffer: Vec<u8>,
    last_sequence: u64,
    finished: bool,
}

/// Turns an SSE byte stream into chunks. Reading stops after the first
/// transport error.
pub fn decode_sse<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = SseState {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        last_sequence: 0,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            if let Some(newline_pos) = memchr(b'\n', &state.buffer) {
                let line: Vec<u8> = state.buffer.drain(..=newline_pos).collect();
                if let Some(item) = decode_line(&line, &mut state.last_sequence) {
                    return Some((item, state));
                }
                continue;
            }

            if state.buffer.len() > MAX_SSE_LINE_BYTES {
                state.finished = true;
                state.buffer.clear();
                let message = format!("line exceeds {MAX_SSE_LINE_BYTES} bytes");
                return Some((Err(StreamError::Malformed(message)), state));
            }

            match state.bytes.next().await {
                Some(Ok(bytes)) => state.buffer.extend_from_slice(bytes.as_ref()),
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(StreamError::Network(err.to_string())), state));
                }
                None => {
                    state.finished = true;
                    let line = std::mem::take(&mut state.buffer);
                    return decode_line(&line, &mut state.last_sequence)
                        .map(|item| (item, state));
                }
            }
        }
    })
    .boxed()
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Decodes one SSE line. Comments, `event:`/`id:` fields and blank lines
/// yield `None`.
fn decode_line(
    line: &[u8],
    last_sequence: &mut u64,
) -> Option<Result<StreamChunk, StreamError>> {
    let line = match std::str::from_utf8(line) {
        Ok(line) => line.trim(),
        Err(err) => return Some(Err(StreamError::Malformed(format!("invalid UTF-8: {err}")))),
    };

    let payload = extract_data_payload(line)?;
    if payload.is_empty() {
        return None;
    }

    if payload == "[DONE]" {
        *last_sequence = last_sequence.saturating_add(1);
        return Some(Ok(StreamChunk::new(*last_sequence, ChunkKind::Done)));
    }

    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => {
            *last_sequence = chunk.sequence;
            Some(Ok(chunk))
        }
        Err(parse_err) => {
            let summary = serde_json::from_str::<serde_json::Value>(payload)
                .ok()
                .and_then(|value| extract_error_summary(&value));
            match summary {
                Some(message) if !message.is_empty() => {
                    *last_sequence = last_sequence.saturating_add(1);
                    Some(Ok(StreamChunk::new(
                        *last_sequence,
                        ChunkKind::error(message),
                    )))
                }
                _ => Some(Err(StreamError::Malformed(parse_err.to_string()))),
            }
        }
    }
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// One-line description of an error body returned before streaming began.
fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();
    if trimmed.is_empty() {
        return "<empty response body>".to_string();
    }

    serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|value| extract_error_summary(&value))
        .filter(|summary| !summary.is_empty())
        .unwrap_or_else(|| trimmed.split_whitespace().collect::<Vec<_>>().join(" "))
}
