use std::error::Error as StdError;
use std::fmt;

/// Operation that raised a [`ChatError`], as passed to the error hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorContext {
    SendMessage,
    Stream,
    RegenerateResponse,
}

impl ErrorContext {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorContext::SendMessage => "sendMessage",
            ErrorContext::Stream => "stream",
            ErrorContext::RegenerateResponse => "regenerateResponse",
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures surfaced by the chat orchestrator.
///
/// A stopped answer is a normal outcome and has no variant here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// The transport could not start a stream.
    SendFailure { message: String },
    /// The stream broke mid-read or the remote side sent an `error` chunk.
    StreamFailure { message: String },
    /// No turn with this id is in the log.
    RegenerateTargetNotFound { turn_id: String },
    /// The turn to regenerate is not directly preceded by a user turn.
    RegeneratePrecedingUserTurnMissing { turn_id: String },
    /// Another answer is still streaming and the overlap policy refuses to
    /// start a second one.
    StreamInProgress,
}

impl ChatError {
    /// Text of the failure without any prefix, suitable for showing inline.
    pub fn message(&self) -> String {
        match self {
            ChatError::SendFailure { message } | ChatError::StreamFailure { message } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::SendFailure { message } => write!(f, "Failed to send message: {message}"),
            ChatError::StreamFailure { message } => f.write_str(message),
            ChatError::RegenerateTargetNotFound { turn_id } => {
                write!(f, "Cannot regenerate: message {turn_id} not found")
            }
            ChatError::RegeneratePrecedingUserTurnMissing { turn_id } => write!(
                f,
                "Cannot regenerate: message {turn_id} does not follow a user message"
            ),
            ChatError::StreamInProgress => f.write_str("A response is already streaming"),
        }
    }
}

impl StdError for ChatError {}

pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_failure_displays_the_remote_message_verbatim() {
        let err = ChatError::StreamFailure {
            message: "rate limited".into(),
        };
        assert_eq!(err.to_string(), "rate limited");
        assert_eq!(err.message(), "rate limited");
    }

    #[test]
    fn send_failure_message_drops_the_prefix() {
        let err = ChatError::SendFailure {
            message: "connection refused".into(),
        };
        assert_eq!(err.to_string(), "Failed to send message: connection refused");
        assert_eq!(err.message(), "connection refused");
    }

    #[test]
    fn contexts_use_operation_names() {
        assert_eq!(ErrorContext::SendMessage.as_str(), "sendMessage");
        assert_eq!(ErrorContext::Stream.to_string(), "stream");
        assert_eq!(
            ErrorContext::RegenerateResponse.as_str(),
            "regenerateResponse"
        );
    }
}
