//! Ordered conversation log.

use crate::api::ChunkKind;
use crate::core::message::{apply_chunk, ChatMessage, ChunkEffect, TurnStatus};

#[derive(Debug, Default, Clone)]
pub struct MessageStore {
    turns: Vec<ChatMessage>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_user_turn(&mut self, content: impl Into<String>) -> ChatMessage {
        let turn = ChatMessage::user(content);
        self.turns.push(turn.clone());
        turn
    }

    pub fn append_assistant_placeholder(&mut self, model_id: impl Into<String>) -> ChatMessage {
        let turn = ChatMessage::assistant_placeholder(model_id);
        self.turns.push(turn.clone());
        turn
    }

    /// Applies one chunk to the turn with `turn_id`.
    ///
    /// Returns `None` when no such turn exists. The whole effect of the chunk
    /// lands in one call, so observers never see half of it.
    pub fn apply_chunk(&mut self, turn_id: &str, chunk: &ChunkKind) -> Option<ChunkEffect> {
        let turn = self.get_mut(turn_id)?;
        Some(apply_chunk(turn, chunk))
    }

    /// Moves a still-streaming turn into a terminal status.
    ///
    /// Returns `false` if the turn is missing or has already settled.
    pub fn settle(&mut self, turn_id: &str, status: TurnStatus) -> bool {
        match self.get_mut(turn_id) {
            Some(turn) if turn.is_streaming() => {
                turn.status = status;
                true
            }
            _ => false,
        }
    }

    /// Records the service-side id of a turn. Returns `false` if the turn is gone.
    pub fn set_remote_id(&mut self, turn_id: &str, remote_id: impl Into<String>) -> bool {
        match self.get_mut(turn_id) {
            Some(turn) => {
                turn.remote_id = Some(remote_id.into());
                true
            }
            None => false,
        }
    }

    /// Removes every turn after `turn_id`, keeping the turn itself.
    pub fn truncate_after(&mut self, turn_id: &str) -> bool {
        match self.position(turn_id) {
            Some(index) => {
                self.turns.truncate(index + 1);
                true
            }
            None => false,
        }
    }

    /// Removes `turn_id` and every turn after it.
    pub fn truncate_from(&mut self, turn_id: &str) -> bool {
        match self.position(turn_id) {
            Some(index) => {
                self.turns.truncate(index);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn position(&self, turn_id: &str) -> Option<usize> {
        self.turns.iter().position(|turn| turn.id == turn_id)
    }

    pub fn get(&self, turn_id: &str) -> Option<&ChatMessage> {
        self.turns.iter().find(|turn| turn.id == turn_id)
    }

    fn get_mut(&mut self, turn_id: &str) -> Option<&mut ChatMessage> {
        self.turns.iter_mut().find(|turn| turn.id == turn_id)
    }

    /// The turn immediately before `turn_id`, if both exist.
    pub fn preceding(&self, turn_id: &str) -> Option<&ChatMessage> {
        let index = self.position(turn_id)?;
        index.checked_sub(1).and_then(|prev| self.turns.get(prev))
    }

    pub fn turns(&self) -> &[ChatMessage] {
        &self.turns
    }

    /// Snapshot of every turn before `turn_id`, or of the whole log when the id
    /// is unknown.
    pub fn history_before(&self, turn_id: &str) -> Vec<ChatMessage> {
        let end = self.position(turn_id).unwrap_or(self.turns.len());
        self.turns[..end].to_vec()
    }

    pub fn last_assistant(&self) -> Option<&ChatMessage> {
        self.turns.iter().rev().find(|turn| turn.is_assistant())
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
