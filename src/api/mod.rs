//! Wire vocabulary shared with the answering service.
//!
//! A reply arrives as an ordered stream of [`StreamChunk`]s. Every chunk carries
//! a per-stream `sequence` number and one [`ChunkKind`]; the JSON encoding is
//! flat, with the kind selected by the `type` field:
//!
//! ```json
//! {"type":"token","sequence":3,"content":"Hi"}
//! {"type":"done","sequence":4}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::message::ChatMessage;

/// One discrete unit of a streamed reply.
///
/// `sequence` is diagnostic only. Consumers apply chunks in delivery order and
/// never reorder by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub sequence: u64,
    #[serde(flatten)]
    pub kind: ChunkKind,
}

impl StreamChunk {
    pub fn new(sequence: u64, kind: ChunkKind) -> Self {
        Self { sequence, kind }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChunkKind {
    /// Text appended to the answer.
    Token { content: String },
    /// A source document backing the answer.
    Citation { citation: Citation },
    /// The model's reasoning so far. Each chunk replaces the previous text.
    Reasoning { text: String },
    ToolCall {
        #[serde(rename = "toolCall")]
        tool_call: ToolCall,
    },
    /// Token accounting, usually sent once just before `done`.
    Usage { usage: TokenUsage },
    /// The remote side gave up. Terminal.
    Error { message: String },
    /// The answer is complete. Terminal.
    Done,
}

impl ChunkKind {
    pub fn token(content: impl Into<String>) -> Self {
        ChunkKind::Token {
            content: content.into(),
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        ChunkKind::Reasoning { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ChunkKind::Error {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ChunkKind::Error { .. } | ChunkKind::Done)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ChunkKind::Token { .. } => "token",
            ChunkKind::Citation { .. } => "citation",
            ChunkKind::Reasoning { .. } => "reasoning",
            ChunkKind::ToolCall { .. } => "tool_call",
            ChunkKind::Usage { .. } => "usage",
            ChunkKind::Error { .. } => "error",
            ChunkKind::Done => "done",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    /// Document name or URL the passage came from.
    #[serde(alias = "document", alias = "doc")]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Citation {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            title: None,
            snippet: None,
            page: None,
            score: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallState {
    #[default]
    Pending,
    Executing,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default)]
    pub state: ToolCallState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: None,
            name: name.into(),
            arguments,
            state: ToolCallState::Pending,
            result: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Body of a send request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    pub message: String,
    pub data_sources: Vec<String>,
    pub model: String,
    /// Every turn that preceded `message`, captured when the send started.
    pub conversation_history: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// Body of a native regenerate request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateRequest {
    /// Id the service assigned to the answer being replaced.
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_flat_tagged_chunks() {
        let token: StreamChunk =
            serde_json::from_str(r#"{"type":"token","sequence":3,"content":"Hi"}"#).unwrap();
        assert_eq!(token, StreamChunk::new(3, ChunkKind::token("Hi")));

        let done: StreamChunk = serde_json::from_str(r#"{"type":"done","sequence":9}"#).unwrap();
        assert_eq!(done.kind, ChunkKind::Done);
        assert!(done.is_terminal());
    }

    #[test]
    fn sequence_defaults_to_zero() {
        let chunk: StreamChunk =
            serde_json::from_str(r#"{"type":"reasoning","text":"thinking"}"#).unwrap();
        assert_eq!(chunk.sequence, 0);
        assert_eq!(chunk.kind, ChunkKind::reasoning("thinking"));
    }

    #[test]
    fn citation_accepts_doc_alias() {
        let chunk: StreamChunk = serde_json::from_str(
            r#"{"type":"citation","sequence":1,"citation":{"doc":"faq.pdf","page":2}}"#,
        )
        .unwrap();
        match chunk.kind {
            ChunkKind::Citation { citation } => {
                assert_eq!(citation.source, "faq.pdf");
                assert_eq!(citation.page, Some(2));
            }
            other => panic!("expected citation, got {:?}", other),
        }
    }

    #[test]
    fn tool_call_uses_camel_case_field() {
        let value = serde_json::to_value(StreamChunk::new(
            2,
            ChunkKind::ToolCall {
                tool_call: ToolCall::new("search", json!({"q": "refunds"})),
            },
        ))
        .unwrap();
        assert_eq!(value["type"], "tool_call");
        assert_eq!(value["toolCall"]["name"], "search");
        assert_eq!(value["toolCall"]["state"], "pending");
    }

    #[test]
    fn regenerate_request_names_the_server_ids() {
        let value = serde_json::to_value(RegenerateRequest {
            message_id: "srv-1".into(),
            conversation_id: Some("conv-9".into()),
        })
        .unwrap();
        assert_eq!(value, json!({"messageId": "srv-1", "conversationId": "conv-9"}));

        let value = serde_json::to_value(RegenerateRequest {
            message_id: "srv-1".into(),
            conversation_id: None,
        })
        .unwrap();
        assert_eq!(value, json!({"messageId": "srv-1"}));
    }

    #[test]
    fn unknown_chunk_type_is_rejected() {
        let result = serde_json::from_str::<StreamChunk>(r#"{"type":"mystery","sequence":1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn only_error_and_done_are_terminal() {
        assert!(ChunkKind::error("boom").is_terminal());
        assert!(ChunkKind::Done.is_terminal());
        assert!(!ChunkKind::token("x").is_terminal());
        assert!(!ChunkKind::Usage {
            usage: TokenUsage::default()
        }
        .is_terminal());
    }
}
