//! The boundary between the orchestrator and whatever answers messages.

use std::error::Error as StdError;
use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::api::{RegenerateRequest, SendPayload, StreamChunk};

/// Failure while reading an already open stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The connection dropped or the body could not be read.
    Network(String),
    /// A chunk arrived that does not decode.
    Malformed(String),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Network(message) => write!(f, "Stream interrupted: {message}"),
            StreamError::Malformed(message) => write!(f, "Malformed stream chunk: {message}"),
        }
    }
}

impl StdError for StreamError {}

/// Failure to open a stream at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request never got an answer (DNS, refused connection, timeout).
    Request(String),
    /// The service answered with a non-success status before streaming.
    Status { status: u16, message: String },
    /// The transport does not implement the requested capability.
    Unsupported(&'static str),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Request(message) => f.write_str(message),
            TransportError::Status { status, message } => write!(f, "HTTP {status}: {message}"),
            TransportError::Unsupported(operation) => {
                write!(f, "{operation} is not supported by this transport")
            }
        }
    }
}

impl StdError for TransportError {}

pub type ChunkStream = BoxStream<'static, Result<StreamChunk, StreamError>>;

/// An open reply stream plus the identifiers the service assigned to it.
pub struct StreamResponse {
    pub message_id: String,
    pub conversation_id: String,
    pub stream: ChunkStream,
}

impl fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamResponse")
            .field("message_id", &self.message_id)
            .field("conversation_id", &self.conversation_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(&self, payload: SendPayload) -> Result<StreamResponse, TransportError>;

    /// Asks the service to replace the answer it knows as
    /// `request.message_id`.
    async fn regenerate_response(
        &self,
        request: RegenerateRequest,
    ) -> Result<StreamResponse, TransportError> {
        let _ = request;
        Err(TransportError::Unsupported("regenerateResponse"))
    }

    fn supports_regenerate(&self) -> bool {
        false
    }

    /// Fire-and-forget abort of the request tied to `handle`.
    fn stop_streaming(&self, handle: &CancellationToken);
}
