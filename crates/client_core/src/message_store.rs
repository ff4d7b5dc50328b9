use chrono::{DateTime, Utc};
use shared::domain::{MessageId, RoomId};

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub username: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemMessage {
    pub id: MessageId,
    pub content: String,
    /// Wall clock at receipt; join/leave frames carry no authoritative time.
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoomMessage {
    Chat(ChatMessage),
    System(SystemMessage),
}

/// Append-only ordered view over one session's conversation. History always
/// precedes live entries; nothing is deduplicated or reordered after insert.
#[derive(Debug, Default)]
pub struct MessageStore {
    entries: Vec<RoomMessage>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the chronological history in front of anything already present.
    pub fn seed_history(&mut self, history: Vec<RoomMessage>) {
        self.entries.splice(0..0, history);
    }

    pub fn append_live(&mut self, message: RoomMessage) {
        self.entries.push(message);
    }

    pub fn current_view(&self) -> &[RoomMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
