use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{ChunkKind, Citation, TokenUsage, ToolCall};

pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";
pub const ROLE_SYSTEM: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => ROLE_USER,
            Role::Assistant => ROLE_ASSISTANT,
            Role::System => ROLE_SYSTEM,
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }

    pub fn is_assistant(self) -> bool {
        self == Role::Assistant
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            ROLE_USER => Ok(Role::User),
            ROLE_ASSISTANT => Ok(Role::Assistant),
            ROLE_SYSTEM => Ok(Role::System),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// Lifecycle of a turn.
///
/// Assistant turns start in `Streaming` and settle in exactly one of the other
/// three states. User and system turns are created `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Streaming,
    Completed,
    Error,
    Stopped,
}

impl TurnStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TurnStatus::Streaming)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TurnStatus::Streaming => "streaming",
            TurnStatus::Completed => "completed",
            TurnStatus::Error => "error",
            TurnStatus::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotations {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// One turn of the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub status: TurnStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub annotations: Annotations,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Id the service gave this answer when its stream opened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>, status: TurnStatus) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            status,
            timestamp: Utc::now(),
            annotations: Annotations::default(),
            tool_calls: Vec::new(),
            remote_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, TurnStatus::Completed)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content, TurnStatus::Completed)
    }

    /// Empty assistant turn waiting for a stream to fill it.
    pub fn assistant_placeholder(model_id: impl Into<String>) -> Self {
        let mut message = Self::new(Role::Assistant, String::new(), TurnStatus::Streaming);
        message.annotations.model = Some(model_id.into());
        message
    }

    pub fn is_user(&self) -> bool {
        self.role.is_user()
    }

    pub fn is_assistant(&self) -> bool {
        self.role.is_assistant()
    }

    pub fn is_streaming(&self) -> bool {
        self.status == TurnStatus::Streaming
    }
}

/// What a single chunk did to its turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkEffect {
    /// Content or annotations changed; the turn is still streaming.
    Updated,
    /// The turn reached `Completed`.
    Completed,
    /// The turn reached `Error`; carries the remote message.
    Failed(String),
    /// The turn had already settled, so the chunk was dropped.
    Ignored,
}

impl ChunkEffect {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChunkEffect::Completed | ChunkEffect::Failed(_))
    }
}

/// Folds one chunk into a turn.
///
/// Total over [`ChunkKind`] and free of hidden state: the result depends only on
/// the turn and the chunk. A turn that has left `Streaming` is never touched.
pub fn apply_chunk(turn: &mut ChatMessage, chunk: &ChunkKind) -> ChunkEffect {
    if !turn.is_streaming() {
        return ChunkEffect::Ignored;
    }

    match chunk {
        ChunkKind::Token { content } => {
            turn.content.push_str(content);
            ChunkEffect::Updated
        }
        ChunkKind::Citation { citation } => {
            turn.annotations.citations.push(citation.clone());
            ChunkEffect::Updated
        }
        ChunkKind::Reasoning { text } => {
            turn.annotations.reasoning = Some(text.clone());
            ChunkEffect::Updated
        }
        ChunkKind::ToolCall { tool_call } => {
            turn.tool_calls.push(tool_call.clone());
            ChunkEffect::Updated
        }
        ChunkKind::Usage { usage } => {
            turn.annotations.usage = Some(*usage);
            ChunkEffect::Updated
        }
        ChunkKind::Error { message } => {
            turn.status = TurnStatus::Error;
            ChunkEffect::Failed(message.clone())
        }
        ChunkKind::Done => {
            turn.status = TurnStatus::Completed;
            ChunkEffect::Completed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fresh() -> ChatMessage {
        ChatMessage::assistant_placeholder("test-model")
    }

    #[test]
    fn placeholder_starts_streaming_with_model() {
        let turn = fresh();
        assert_eq!(turn.role, Role::Assistant);
        assert!(turn.content.is_empty());
        assert_eq!(turn.status, TurnStatus::Streaming);
        assert_eq!(turn.annotations.model.as_deref(), Some("test-model"));
    }

    #[test]
    fn token_chunking_does_not_change_content() {
        let text = "The quick brown fox jumps over the lazy dog";
        for width in [1, 2, 3, 7, text.len()] {
            let mut turn = fresh();
            let pieces: Vec<String> = text
                .as_bytes()
                .chunks(width)
                .map(|piece| String::from_utf8(piece.to_vec()).unwrap())
                .collect();
            for piece in pieces {
                apply_chunk(&mut turn, &ChunkKind::token(piece));
            }
            assert_eq!(turn.content, text, "width {width}");
        }
    }

    #[test]
    fn reasoning_replaces_instead_of_appending() {
        let mut turn = fresh();
        apply_chunk(&mut turn, &ChunkKind::reasoning("Looking"));
        apply_chunk(&mut turn, &ChunkKind::reasoning("Looking at the FAQ"));
        assert_eq!(
            turn.annotations.reasoning.as_deref(),
            Some("Looking at the FAQ")
        );
    }

    #[test]
    fn citations_and_tool_calls_append_in_order() {
        let mut turn = fresh();
        apply_chunk(
            &mut turn,
            &ChunkKind::Citation {
                citation: Citation::new("a.pdf"),
            },
        );
        apply_chunk(
            &mut turn,
            &ChunkKind::ToolCall {
                tool_call: ToolCall::new("search", json!({"q": "x"})),
            },
        );
        apply_chunk(
            &mut turn,
            &ChunkKind::Citation {
                citation: Citation::new("b.pdf"),
            },
        );
        let sources: Vec<_> = turn
            .annotations
            .citations
            .iter()
            .map(|c| c.source.as_str())
            .collect();
        assert_eq!(sources, ["a.pdf", "b.pdf"]);
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].name, "search");
    }

    #[test]
    fn terminal_chunks_set_exactly_one_status() {
        let mut done = fresh();
        assert_eq!(apply_chunk(&mut done, &ChunkKind::Done), ChunkEffect::Completed);
        assert_eq!(done.status, TurnStatus::Completed);

        let mut failed = fresh();
        assert_eq!(
            apply_chunk(&mut failed, &ChunkKind::error("rate limited")),
            ChunkEffect::Failed("rate limited".into())
        );
        assert_eq!(failed.status, TurnStatus::Error);
    }

    #[test]
    fn settled_turn_ignores_further_chunks() {
        let mut turn = fresh();
        apply_chunk(&mut turn, &ChunkKind::token("Hi"));
        apply_chunk(&mut turn, &ChunkKind::Done);

        assert_eq!(
            apply_chunk(&mut turn, &ChunkKind::token(" again")),
            ChunkEffect::Ignored
        );
        assert_eq!(
            apply_chunk(&mut turn, &ChunkKind::error("late")),
            ChunkEffect::Ignored
        );
        assert_eq!(turn.content, "Hi");
        assert_eq!(turn.status, TurnStatus::Completed);
    }

    #[test]
    fn same_chunks_on_independent_turns_give_same_state() {
        let chunks = [
            ChunkKind::token("Hello"),
            ChunkKind::Citation {
                citation: Citation::new("faq.pdf"),
            },
            ChunkKind::Done,
        ];
        let mut first = fresh();
        let mut second = fresh();
        for chunk in &chunks {
            apply_chunk(&mut first, chunk);
        }
        for chunk in &chunks {
            apply_chunk(&mut second, chunk);
        }
        assert_eq!(first.content, second.content);
        assert_eq!(first.status, second.status);
        assert_eq!(first.annotations, second.annotations);
        assert_eq!(first.tool_calls, second.tool_calls);
    }

    #[test]
    fn role_round_trips_through_strings() {
        assert_eq!(Role::try_from("assistant"), Ok(Role::Assistant));
        assert!(Role::try_from("tool").is_err());
        assert_eq!(String::from(Role::System), "system");
    }

    #[test]
    fn history_serializes_in_camel_case() {
        let turn = ChatMessage::user("Hello");
        let value = serde_json::to_value(&turn).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["status"], "completed");
        assert!(value.get("toolCalls").is_none());
        assert!(value.get("timestamp").is_some());
    }
}
