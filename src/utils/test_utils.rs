//! Scripted transport for driving the orchestrator without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::api::{ChunkKind, RegenerateRequest, SendPayload, StreamChunk};
use crate::core::transport::{
    ChunkStream, StreamError, StreamResponse, Transport, TransportError,
};

pub const MOCK_CONVERSATION_ID: &str = "mock-conversation";

/// Server-side id the mock gives the `n`th stream it opens, counting from 1.
pub fn mock_message_id(n: usize) -> String {
    format!("mock-message-{n}")
}

type Item = Result<StreamChunk, StreamError>;

/// What the mock answers with for one request.
pub enum Reply {
    /// A finite stream; sequence numbers are assigned in order from 1.
    Items(Vec<Result<ChunkKind, StreamError>>),
    /// A stream fed by a [`StreamFeeder`]; it stays open until the feeder drops.
    Channel(mpsc::UnboundedReceiver<Item>),
    /// The request fails before any stream exists.
    Fail(TransportError),
    /// Holds the request open until the gate fires (or its sender drops).
    Gated(oneshot::Receiver<()>, Box<Reply>),
}

impl Reply {
    pub fn chunks(kinds: Vec<ChunkKind>) -> Self {
        Reply::Items(kinds.into_iter().map(Ok).collect())
    }

    pub fn channel() -> (Self, StreamFeeder) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Reply::Channel(rx),
            StreamFeeder {
                tx,
                next_sequence: 1,
            },
        )
    }

    pub fn gated(self) -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        (Reply::Gated(rx, Box::new(self)), tx)
    }
}

pub struct StreamFeeder {
    tx: mpsc::UnboundedSender<Item>,
    next_sequence: u64,
}

impl StreamFeeder {
    /// Returns `false` once the reading side has been dropped.
    pub fn send(&mut self, kind: ChunkKind) -> bool {
        let chunk = StreamChunk::new(self.next_sequence, kind);
        self.next_sequence += 1;
        self.tx.send(Ok(chunk)).is_ok()
    }

    pub fn token(&mut self, content: &str) -> bool {
        self.send(ChunkKind::token(content))
    }

    pub fn fail(&self, error: StreamError) -> bool {
        self.tx.send(Err(error)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

struct ReleaseGuard(Arc<AtomicUsize>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<Reply>>,
    payloads: Mutex<Vec<SendPayload>>,
    regenerate_calls: Mutex<Vec<RegenerateRequest>>,
    stopped: Mutex<Vec<CancellationToken>>,
    opened: AtomicUsize,
    released: Arc<AtomicUsize>,
    native_regenerate: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_native_regenerate() -> Self {
        Self {
            native_regenerate: true,
            ..Self::default()
        }
    }

    /// Queues the answer for the next request. An empty queue answers `done`.
    pub fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn payloads(&self) -> Vec<SendPayload> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn regenerate_calls(&self) -> Vec<RegenerateRequest> {
        self.regenerate_calls.lock().unwrap().clone()
    }

    pub fn stop_calls(&self) -> usize {
        self.stopped.lock().unwrap().len()
    }

    pub fn stopped_handles(&self) -> Vec<CancellationToken> {
        self.stopped.lock().unwrap().clone()
    }

    /// Number of streams handed out that have since been dropped.
    pub fn released_readers(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    async fn respond(&self) -> Result<StreamResponse, TransportError> {
        let mut reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::chunks(vec![ChunkKind::Done]));

        while let Reply::Gated(gate, inner) = reply {
            let _ = gate.await;
            reply = *inner;
        }

        let stream: ChunkStream = match reply {
            Reply::Items(items) => {
                let sequenced: Vec<Item> = items
                    .into_iter()
                    .zip(1u64..)
                    .map(|(item, sequence)| item.map(|kind| StreamChunk::new(sequence, kind)))
                    .collect();
                stream::iter(sequenced).boxed()
            }
            Reply::Channel(rx) => {
                stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
                    .boxed()
            }
            Reply::Fail(error) => return Err(error),
            Reply::Gated(..) => unreachable!("gates are unwrapped above"),
        };

        let guard = ReleaseGuard(self.released.clone());
        let stream = stream
            .map(move |item| {
                let _held = &guard;
                item
            })
            .boxed();

        let opened = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(StreamResponse {
            message_id: mock_message_id(opened),
            conversation_id: MOCK_CONVERSATION_ID.to_string(),
            stream,
        })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_message(&self, payload: SendPayload) -> Result<StreamResponse, TransportError> {
        self.payloads.lock().unwrap().push(payload);
        self.respond().await
    }

    async fn regenerate_response(
        &self,
        request: RegenerateRequest,
    ) -> Result<StreamResponse, TransportError> {
        if !self.native_regenerate {
            return Err(TransportError::Unsupported("regenerateResponse"));
        }
        self.regenerate_calls.lock().unwrap().push(request);
        self.respond().await
    }

    fn supports_regenerate(&self) -> bool {
        self.native_regenerate
    }

    fn stop_streaming(&self, handle: &CancellationToken) {
        self.stopped.lock().unwrap().push(handle.clone());
    }
}
