//! Reads one reply stream into one assistant turn.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::StreamChunk;
use crate::core::events::ChatEvent;
use crate::core::message::{ChunkEffect, TurnStatus};
use crate::core::store::MessageStore;
use crate::core::transport::ChunkStream;

pub type SharedStore = Arc<Mutex<MessageStore>>;

pub(crate) fn lock_store(store: &SharedStore) -> MutexGuard<'_, MessageStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How a stream ended, from the point of view of its target turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// A `done` chunk arrived, or the stream closed cleanly.
    Completed,
    /// An `error` chunk arrived or the read failed; the turn is `error`.
    Failed(String),
    /// The cancellation handle fired; the turn is `stopped`.
    Stopped,
    /// The target turn left the log while the stream was open.
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Reading,
    Terminated,
}

pub struct StreamConsumer {
    store: SharedStore,
    turn_id: String,
    stream_id: u64,
    cancel_token: CancellationToken,
    events: Option<mpsc::UnboundedSender<ChatEvent>>,
    state: ConsumerState,
    last_sequence: Option<u64>,
}

impl StreamConsumer {
    pub fn new(
        store: SharedStore,
        turn_id: impl Into<String>,
        stream_id: u64,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            store,
            turn_id: turn_id.into(),
            stream_id,
            cancel_token,
            events: None,
            state: ConsumerState::Idle,
            last_sequence: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<ChatEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn turn_id(&self) -> &str {
        &self.turn_id
    }

    /// Drains `stream` into the target turn until a terminal chunk, a read
    /// failure, closure, or cancellation.
    ///
    /// The stream is owned here and dropped on return, whichever way the read
    /// ends. A consumer runs once; later calls return `Abandoned` untouched.
    pub async fn consume(&mut self, mut stream: ChunkStream) -> StreamOutcome {
        if self.state != ConsumerState::Idle {
            return StreamOutcome::Abandoned;
        }
        self.state = ConsumerState::Reading;
        debug!(stream_id = self.stream_id, turn_id = %self.turn_id, "stream reading");

        let outcome = loop {
            if self.cancel_token.is_cancelled() {
                break self.finish_cancelled();
            }

            let next = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => break self.finish_cancelled(),
                next = stream.next() => next,
            };

            match next {
                None => break self.finish_closed(),
                Some(Err(err)) => break self.finish_failed(err.to_string()),
                Some(Ok(chunk)) => match self.apply(&chunk) {
                    None => break StreamOutcome::Abandoned,
                    Some(ChunkEffect::Updated) => continue,
                    Some(ChunkEffect::Completed) => break StreamOutcome::Completed,
                    Some(ChunkEffect::Failed(message)) => break StreamOutcome::Failed(message),
                    Some(ChunkEffect::Ignored) => break self.finish_cancelled(),
                },
            }
        };

        drop(stream);
        self.state = ConsumerState::Terminated;
        debug!(
            stream_id = self.stream_id,
            turn_id = %self.turn_id,
            ?outcome,
            "stream terminated"
        );
        outcome
    }

    fn apply(&mut self, chunk: &StreamChunk) -> Option<ChunkEffect> {
        if let Some(last) = self.last_sequence {
            if chunk.sequence <= last {
                warn!(
                    stream_id = self.stream_id,
                    sequence = chunk.sequence,
                    last,
                    "chunk sequence did not increase"
                );
            }
        }
        self.last_sequence = Some(chunk.sequence);

        let effect = lock_store(&self.store).apply_chunk(&self.turn_id, &chunk.kind);
        if matches!(
            effect,
            Some(ChunkEffect::Updated | ChunkEffect::Completed | ChunkEffect::Failed(_))
        ) {
            self.emit(ChatEvent::TurnUpdated {
                turn_id: self.turn_id.clone(),
                sequence: chunk.sequence,
            });
        }
        effect
    }

    /// Cancellation, or the turn was settled by someone else.
    fn finish_cancelled(&self) -> StreamOutcome {
        let mut store = lock_store(&self.store);
        match store.get(&self.turn_id).map(|turn| turn.status) {
            None => StreamOutcome::Abandoned,
            Some(TurnStatus::Streaming) => {
                store.settle(&self.turn_id, TurnStatus::Stopped);
                StreamOutcome::Stopped
            }
            Some(TurnStatus::Stopped) => StreamOutcome::Stopped,
            Some(TurnStatus::Completed) => StreamOutcome::Completed,
            Some(TurnStatus::Error) => StreamOutcome::Failed("stream failed".to_string()),
        }
    }

    /// The stream ended without a terminal chunk.
    fn finish_closed(&self) -> StreamOutcome {
        let mut store = lock_store(&self.store);
        match store.get(&self.turn_id).map(|turn| turn.status) {
            None => StreamOutcome::Abandoned,
            Some(TurnStatus::Streaming) => {
                store.settle(&self.turn_id, TurnStatus::Completed);
                StreamOutcome::Completed
            }
            Some(TurnStatus::Stopped) => StreamOutcome::Stopped,
            Some(TurnStatus::Completed) => StreamOutcome::Completed,
            Some(TurnStatus::Error) => StreamOutcome::Failed("stream failed".to_string()),
        }
    }

    fn finish_failed(&self, message: String) -> StreamOutcome {
        warn!(
            stream_id = self.stream_id,
            turn_id = %self.turn_id,
            error = %message,
            "stream read failed"
        );
        let mut store = lock_store(&self.store);
        match store.get(&self.turn_id).map(|turn| turn.status) {
            None => StreamOutcome::Abandoned,
            Some(TurnStatus::Stopped) => StreamOutcome::Stopped,
            Some(_) => {
                store.settle(&self.turn_id, TurnStatus::Error);
                StreamOutcome::Failed(message)
            }
        }
    }

    fn emit(&self, event: ChatEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
