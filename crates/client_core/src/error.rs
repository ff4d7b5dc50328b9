use shared::domain::RoomId;
use thiserror::Error;

/// Failures the session core can surface. Everything else (stale async
/// completions, roster poll misses) degrades silently by design.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("live connection failed for room {room_id}: {source}")]
    Transport {
        room_id: RoomId,
        #[source]
        source: anyhow::Error,
    },
    #[error("history fetch failed for room {room_id}: {source}")]
    HistoryFetch {
        room_id: RoomId,
        #[source]
        source: anyhow::Error,
    },
    #[error("no live connection for the active session")]
    NotConnected,
}
