use std::time::Duration;

use chrono::Utc;
use shared::domain::RoomId;

use crate::message_store::ChatMessage;

/// How long the presentation layer keeps a toast on screen before it
/// auto-expires. Expiry and early dismissal are owned by that layer.
pub const TOAST_DURATION: Duration = Duration::from_secs(4);

const EXCERPT_MAX_CHARS: usize = 80;

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Generation timestamp, unix milliseconds.
    pub id: i64,
    pub username: String,
    pub excerpt: String,
    pub room_id: RoomId,
    pub room_name: String,
}

/// What the presentation layer should do for one inbound chat message. The
/// audible/OS alert is unconditional once an intent exists; the toast is
/// populated only for rooms other than the one currently open.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationIntent {
    pub notification: Notification,
    pub show_toast: bool,
}

pub struct NotificationRouter {
    local_username: String,
}

impl NotificationRouter {
    pub fn new(local_username: impl Into<String>) -> Self {
        Self {
            local_username: local_username.into(),
        }
    }

    pub fn on_chat_message(
        &self,
        message: &ChatMessage,
        room_name: &str,
        active_room_id: &RoomId,
    ) -> Option<NotificationIntent> {
        if message.username == self.local_username {
            return None;
        }
        Some(NotificationIntent {
            notification: Notification {
                id: Utc::now().timestamp_millis(),
                username: message.username.clone(),
                excerpt: excerpt(&message.content),
                room_id: message.room_id.clone(),
                room_name: room_name.to_string(),
            },
            show_toast: &message.room_id != active_room_id,
        })
    }
}

fn excerpt(content: &str) -> String {
    match content.char_indices().nth(EXCERPT_MAX_CHARS) {
        Some((idx, _)) => format!("{}…", &content[..idx]),
        None => content.to_string(),
    }
}

#[cfg(test)]
#[path = "tests/notify_tests.rs"]
mod tests;
