use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{MessageId, RoomId, UserId};

/// Inbound frames on the live room connection. A closed enum over the wire's
/// `type` discriminator; servers may emit kinds this client does not know,
/// which land in `Unknown` and are ignored rather than rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Message {
        message_id: MessageId,
        room_id: RoomId,
        sender_id: UserId,
        username: String,
        content: String,
        timestamp: DateTime<Utc>,
    },
    Typing {
        username: String,
        is_typing: bool,
    },
    UserJoined {
        username: String,
    },
    UserLeft {
        username: String,
    },
    #[serde(other)]
    Unknown,
}

/// Outbound frames the client is allowed to write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Message { content: String },
    Typing { is_typing: bool },
}

/// One entry of `GET /rooms/{id}/messages`, served reverse-chronologically.
/// Older server builds do not join the author username onto history rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One entry of `GET /users/online`. The roster is replaced wholesale on
/// every poll; entries are unique by user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub user_id: UserId,
    pub username: String,
}
