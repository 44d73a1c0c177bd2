//! Public surface for sending messages and managing the single in-flight reply.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{RegenerateRequest, SendPayload};
use crate::core::chat_stream::{lock_store, SharedStore, StreamConsumer, StreamOutcome};
use crate::core::error::{ChatError, ChatResult, ErrorContext};
use crate::core::events::ChatEvent;
use crate::core::message::{ChatMessage, TurnStatus};
use crate::core::store::MessageStore;
use crate::core::transport::{StreamResponse, Transport, TransportError};

/// How `regenerate_response` rebuilds the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegeneratePolicy {
    /// Drop the answer and everything after it, then send the user text again
    /// as a brand new user turn.
    #[default]
    Resend,
    /// Drop the answer and everything after it, keep the original user turn
    /// and attach a fresh answer to it.
    ReuseUserTurn,
}

/// What happens when a request starts while another reply is streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlapPolicy {
    #[default]
    Reject,
    CancelPrevious,
}

impl RegeneratePolicy {
    pub const ALL: [RegeneratePolicy; 2] =
        [RegeneratePolicy::Resend, RegeneratePolicy::ReuseUserTurn];

    pub fn as_str(self) -> &'static str {
        match self {
            RegeneratePolicy::Resend => "resend",
            RegeneratePolicy::ReuseUserTurn => "reuse-user-turn",
        }
    }
}

impl OverlapPolicy {
    pub const ALL: [OverlapPolicy; 2] = [OverlapPolicy::Reject, OverlapPolicy::CancelPrevious];

    pub fn as_str(self) -> &'static str {
        match self {
            OverlapPolicy::Reject => "reject",
            OverlapPolicy::CancelPrevious => "cancel-previous",
        }
    }
}

macro_rules! policy_text {
    ($policy:ty) => {
        impl fmt::Display for $policy {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $policy {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().to_ascii_lowercase();
                <$policy>::ALL
                    .into_iter()
                    .find(|policy| policy.as_str() == wanted)
                    .ok_or_else(|| {
                        let names: Vec<_> = <$policy>::ALL.iter().map(|p| p.as_str()).collect();
                        format!("expected one of: {}", names.join(", "))
                    })
            }
        }
    };
}

policy_text!(RegeneratePolicy);
policy_text!(OverlapPolicy);

#[derive(Debug, Clone, Default)]
pub struct OrchestratorSettings {
    pub model: String,
    pub data_sources: Vec<String>,
    pub regenerate: RegeneratePolicy,
    pub overlap: OverlapPolicy,
}

impl OrchestratorSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }
}

pub type ErrorHook = Arc<dyn Fn(&ChatError, ErrorContext) + Send + Sync>;

fn default_error_hook() -> ErrorHook {
    Arc::new(|error, context| {
        warn!(context = %context, error = %error, "chat operation failed");
    })
}

struct ActiveStream {
    token: CancellationToken,
    stream_id: u64,
    turn_id: String,
}

struct SessionState {
    active: Option<ActiveStream>,
    error: Option<ChatError>,
    error_hook: ErrorHook,
    next_stream_id: u64,
    conversation_id: Option<String>,
    model: String,
    data_sources: Vec<String>,
}

enum Opening {
    Send { content: String },
    Regenerate { turn_id: String },
}

enum Plan {
    Send { content: String },
    Regenerate {
        turn_id: String,
        remote_id: Option<String>,
        user: ChatMessage,
    },
}

enum Request {
    Send(SendPayload),
    Native(RegenerateRequest),
}

/// A stream slot that has been claimed but not yet opened.
struct Claimed {
    token: CancellationToken,
    stream_id: u64,
    turn_id: String,
    request: Request,
    context: ErrorContext,
}

/// Owns one conversation log and at most one reply stream writing into it.
///
/// Clones are handles onto the same conversation, so `stop_streaming` can be
/// called from another task while `send_message` is still awaiting. Separate
/// `new` calls never share anything.
#[derive(Clone)]
pub struct ChatOrchestrator {
    transport: Arc<dyn Transport>,
    store: SharedStore,
    session: Arc<Mutex<SessionState>>,
    regenerate_policy: RegeneratePolicy,
    overlap_policy: OverlapPolicy,
    events: mpsc::UnboundedSender<ChatEvent>,
}

impl ChatOrchestrator {
    pub fn new(
        transport: Arc<dyn Transport>,
        settings: OrchestratorSettings,
    ) -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let session = SessionState {
            active: None,
            error: None,
            error_hook: default_error_hook(),
            next_stream_id: 0,
            conversation_id: None,
            model: settings.model,
            data_sources: settings.data_sources,
        };
        let orchestrator = Self {
            transport,
            store: Arc::new(Mutex::new(MessageStore::new())),
            session: Arc::new(Mutex::new(session)),
            regenerate_policy: settings.regenerate,
            overlap_policy: settings.overlap,
            events,
        };
        (orchestrator, rx)
    }

    pub fn with_error_hook<F>(self, hook: F) -> Self
    where
        F: Fn(&ChatError, ErrorContext) + Send + Sync + 'static,
    {
        self.set_error_hook(hook);
        self
    }

    /// Replaces the callback invoked with every surfaced failure.
    pub fn set_error_hook<F>(&self, hook: F)
    where
        F: Fn(&ChatError, ErrorContext) + Send + Sync + 'static,
    {
        self.lock_session().error_hook = Arc::new(hook);
    }

    pub fn set_model(&self, model: impl Into<String>) {
        self.lock_session().model = model.into();
    }

    pub fn model(&self) -> String {
        self.lock_session().model.clone()
    }

    pub fn set_data_sources(&self, data_sources: Vec<String>) {
        self.lock_session().data_sources = data_sources;
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        lock_store(&self.store).turns().to_vec()
    }

    pub fn turn(&self, turn_id: &str) -> Option<ChatMessage> {
        lock_store(&self.store).get(turn_id).cloned()
    }

    pub fn last_assistant_id(&self) -> Option<String> {
        lock_store(&self.store)
            .last_assistant()
            .map(|turn| turn.id.clone())
    }

    pub fn error(&self) -> Option<ChatError> {
        self.lock_session().error.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.lock_session().active.is_some()
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.lock_session().conversation_id.clone()
    }

    /// Sends `content` as a new user turn and streams the answer into a fresh
    /// assistant turn. Resolves once the answer has settled.
    pub async fn send_message(&self, content: impl Into<String>) -> ChatResult<StreamOutcome> {
        let opening = Opening::Send {
            content: content.into(),
        };
        let claimed = self
            .claim(opening)
            .map_err(|(error, context)| self.fail(error, context))?;
        self.run(claimed).await
    }

    /// Replaces the assistant turn `turn_id` with a new answer to the user turn
    /// right before it.
    pub async fn regenerate_response(&self, turn_id: &str) -> ChatResult<StreamOutcome> {
        let opening = Opening::Regenerate {
            turn_id: turn_id.to_string(),
        };
        let claimed = self
            .claim(opening)
            .map_err(|(error, context)| self.fail(error, context))?;
        self.run(claimed).await
    }

    /// Stops the active reply, if any. Returns whether there was one.
    pub fn stop_streaming(&self) -> bool {
        let mut session = self.lock_session();
        let Some(active) = session.active.take() else {
            return false;
        };
        let mut store = lock_store(&self.store);
        self.retire(active, &mut store);
        true
    }

    pub fn clear_error(&self) {
        let had_error = self.lock_session().error.take().is_some();
        if had_error {
            self.emit(ChatEvent::ErrorCleared);
        }
    }

    /// Empties the log. A reply still streaming is cut off without asking the
    /// transport to stop, and ends as `Abandoned`.
    pub fn clear_messages(&self) {
        let mut session = self.lock_session();
        if let Some(active) = session.active.take() {
            debug!(stream_id = active.stream_id, "abandoning stream on clear");
            active.token.cancel();
        }
        session.conversation_id = None;
        lock_store(&self.store).clear();
        self.emit(ChatEvent::LogCleared);
    }

    fn lock_session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.events.send(event);
    }

    /// Stops `active` the way a user stop does: transport stop once, token
    /// cancelled, turn settled as stopped.
    fn retire(&self, active: ActiveStream, store: &mut MessageStore) {
        debug!(stream_id = active.stream_id, turn_id = %active.turn_id, "stopping stream");
        self.transport.stop_streaming(&active.token);
        active.token.cancel();
        store.settle(&active.turn_id, TurnStatus::Stopped);
    }

    /// Validates the request, rewrites the log and takes the stream slot in
    /// one critical section.
    fn claim(&self, opening: Opening) -> Result<Claimed, (ChatError, ErrorContext)> {
        let mut session = self.lock_session();
        let mut store = lock_store(&self.store);

        let context = match &opening {
            Opening::Send { .. } => ErrorContext::SendMessage,
            Opening::Regenerate { .. } => ErrorContext::RegenerateResponse,
        };

        // Validation happens before anything is touched.
        let plan = match opening {
            Opening::Send { content } => Plan::Send { content },
            Opening::Regenerate { turn_id } => {
                let Some(target) = store.get(&turn_id) else {
                    return Err((ChatError::RegenerateTargetNotFound { turn_id }, context));
                };
                let remote_id = target.remote_id.clone();
                match store.preceding(&turn_id) {
                    Some(user) if user.is_user() => Plan::Regenerate {
                        user: user.clone(),
                        remote_id,
                        turn_id,
                    },
                    _ => {
                        return Err((
                            ChatError::RegeneratePrecedingUserTurnMissing { turn_id },
                            context,
                        ))
                    }
                }
            }
        };

        if session.active.is_some() {
            match self.overlap_policy {
                OverlapPolicy::Reject => return Err((ChatError::StreamInProgress, context)),
                OverlapPolicy::CancelPrevious => {
                    if let Some(previous) = session.active.take() {
                        self.retire(previous, &mut store);
                    }
                }
            }
        }

        if session.error.take().is_some() {
            self.emit(ChatEvent::ErrorCleared);
        }

        let model = session.model.clone();
        let payload = |message: String, conversation_history: Vec<ChatMessage>| SendPayload {
            message,
            data_sources: session.data_sources.clone(),
            model: model.clone(),
            conversation_history,
            conversation_id: session.conversation_id.clone(),
        };

        let (request, context) = match plan {
            Plan::Send { content } => {
                let history = store.turns().to_vec();
                let user = store.append_user_turn(content.clone());
                self.emit(ChatEvent::TurnAppended { turn_id: user.id });
                (
                    Request::Send(payload(content, history)),
                    ErrorContext::SendMessage,
                )
            }
            Plan::Regenerate {
                turn_id,
                remote_id,
                user,
            } => {
                store.truncate_from(&turn_id);
                self.emit(ChatEvent::LogTruncated { len: store.len() });
                match self.regenerate_policy {
                    RegeneratePolicy::Resend => {
                        let history = store.turns().to_vec();
                        let resent = store.append_user_turn(user.content.clone());
                        self.emit(ChatEvent::TurnAppended { turn_id: resent.id });
                        (
                            Request::Send(payload(user.content, history)),
                            ErrorContext::SendMessage,
                        )
                    }
                    RegeneratePolicy::ReuseUserTurn => {
                        let native = remote_id.filter(|_| self.transport.supports_regenerate());
                        match native {
                            Some(message_id) => {
                                let request = RegenerateRequest {
                                    message_id,
                                    conversation_id: session.conversation_id.clone(),
                                };
                                (Request::Native(request), ErrorContext::RegenerateResponse)
                            }
                            // Never acknowledged by the service: resend the
                            // user turn with the history before it.
                            None => {
                                let history = store.history_before(&user.id);
                                (
                                    Request::Send(payload(user.content, history)),
                                    ErrorContext::SendMessage,
                                )
                            }
                        }
                    }
                }
            }
        };

        let placeholder = store.append_assistant_placeholder(model);
        self.emit(ChatEvent::TurnAppended {
            turn_id: placeholder.id.clone(),
        });

        session.next_stream_id += 1;
        let active = ActiveStream {
            token: CancellationToken::new(),
            stream_id: session.next_stream_id,
            turn_id: placeholder.id,
        };
        let claimed = Claimed {
            token: active.token.clone(),
            stream_id: active.stream_id,
            turn_id: active.turn_id.clone(),
            request,
            context,
        };
        session.active = Some(active);
        Ok(claimed)
    }

    async fn run(&self, claimed: Claimed) -> ChatResult<StreamOutcome> {
        let Claimed {
            token,
            stream_id,
            turn_id,
            request,
            context,
        } = claimed;

        debug!(stream_id, turn_id = %turn_id, context = %context, "opening stream");
        let opening = async {
            match request {
                Request::Send(payload) => self.transport.send_message(payload).await,
                Request::Native(request) => self.transport.regenerate_response(request).await,
            }
        };

        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = opening => Some(result),
        };

        let response = match opened {
            None => {
                let outcome = self.cancelled_before_streaming(&turn_id);
                return Ok(self.finish(stream_id, &turn_id, outcome));
            }
            Some(Err(error)) => return Err(self.open_failed(stream_id, &turn_id, error, context)),
            Some(Ok(response)) => response,
        };

        let StreamResponse {
            message_id,
            conversation_id,
            stream,
        } = response;
        debug!(stream_id, %message_id, %conversation_id, "stream opened");
        self.adopt_conversation(stream_id, conversation_id);
        lock_store(&self.store).set_remote_id(&turn_id, message_id);
        self.emit(ChatEvent::StreamStarted {
            stream_id,
            turn_id: turn_id.clone(),
        });

        let mut consumer = StreamConsumer::new(self.store.clone(), &turn_id, stream_id, token)
            .with_events(self.events.clone());
        let outcome = consumer.consume(stream).await;
        let outcome = self.finish(stream_id, &turn_id, outcome);

        match outcome {
            StreamOutcome::Failed(message) => Err(self.fail(
                ChatError::StreamFailure { message },
                ErrorContext::Stream,
            )),
            other => Ok(other),
        }
    }

    /// Frees the stream slot if this stream still holds it and announces the
    /// outcome.
    fn finish(&self, stream_id: u64, turn_id: &str, outcome: StreamOutcome) -> StreamOutcome {
        self.release(stream_id);
        self.emit(ChatEvent::StreamFinished {
            stream_id,
            turn_id: turn_id.to_string(),
            outcome: outcome.clone(),
        });
        outcome
    }

    fn release(&self, stream_id: u64) {
        let mut session = self.lock_session();
        if session
            .active
            .as_ref()
            .is_some_and(|active| active.stream_id == stream_id)
        {
            session.active = None;
        }
    }

    fn adopt_conversation(&self, stream_id: u64, conversation_id: String) {
        let mut session = self.lock_session();
        if session
            .active
            .as_ref()
            .is_some_and(|active| active.stream_id == stream_id)
        {
            session.conversation_id = Some(conversation_id);
        }
    }

    fn cancelled_before_streaming(&self, turn_id: &str) -> StreamOutcome {
        let mut store = lock_store(&self.store);
        match store.get(turn_id).map(|turn| turn.status) {
            None => StreamOutcome::Abandoned,
            Some(_) => {
                store.settle(turn_id, TurnStatus::Stopped);
                StreamOutcome::Stopped
            }
        }
    }

    fn open_failed(
        &self,
        stream_id: u64,
        turn_id: &str,
        error: TransportError,
        context: ErrorContext,
    ) -> ChatError {
        let message = error.to_string();
        lock_store(&self.store).settle(turn_id, TurnStatus::Error);
        self.finish(stream_id, turn_id, StreamOutcome::Failed(message.clone()));
        self.fail(ChatError::SendFailure { message }, context)
    }

    /// Records `error` in the error slot and hands it to the hook.
    fn fail(&self, error: ChatError, context: ErrorContext) -> ChatError {
        let hook = {
            let mut session = self.lock_session();
            session.error = Some(error.clone());
            session.error_hook.clone()
        };
        self.emit(ChatEvent::ErrorRaised {
            context,
            message: error.message(),
        });
        hook(&error, context);
        error
    }
}
