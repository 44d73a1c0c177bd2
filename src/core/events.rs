use crate::core::chat_stream::StreamOutcome;
use crate::core::error::ErrorContext;

/// Change notifications for whatever renders the conversation.
///
/// Events name what changed; the current state is read back from the
/// orchestrator, so a renderer that drops events only loses intermediate
/// frames, never data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    TurnAppended {
        turn_id: String,
    },
    /// A chunk was applied to a streaming turn.
    TurnUpdated {
        turn_id: String,
        sequence: u64,
    },
    StreamStarted {
        stream_id: u64,
        turn_id: String,
    },
    StreamFinished {
        stream_id: u64,
        turn_id: String,
        outcome: StreamOutcome,
    },
    LogTruncated {
        len: usize,
    },
    LogCleared,
    ErrorRaised {
        context: ErrorContext,
        message: String,
    },
    ErrorCleared,
}
