pub mod error;
pub mod mentions;
pub mod message_store;
pub mod notify;
pub mod roster;
pub mod transport;
pub mod typing;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use anyhow::{anyhow, Context};
use chrono::Utc;
use shared::{
    domain::{MessageId, RoomId, RoomSummary},
    error::ApiError,
    protocol::{ClientFrame, HistoryMessage, ServerFrame},
};
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{info, trace, warn};
use uuid::Uuid;

use crate::{
    error::SessionError,
    message_store::{ChatMessage, MessageStore, RoomMessage, SystemMessage},
    notify::{NotificationIntent, NotificationRouter},
    transport::{RoomTransport, TransportEvent, WebSocketTransport},
    typing::TypingController,
};

/// Lifecycle of the active room session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    HistoryLoading,
    Live,
    Closed,
}

/// Outcome of the history fetch for the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryStatus {
    Loading,
    Ready,
    Failed,
}

/// Returned by [`RoomSessionClient::open_session`]; required to close the
/// session it opened. A handle from a superseded session is inert.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    epoch: u64,
    pub room_id: RoomId,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    HistoryLoaded { room_id: RoomId, count: usize },
    MessageAppended(RoomMessage),
    TypingChanged(Option<String>),
    Notified(NotificationIntent),
    TransportDown { room_id: RoomId, reason: Option<String> },
}

struct SessionState {
    epoch: u64,
    phase: SessionPhase,
    history_status: HistoryStatus,
    room: Option<RoomSummary>,
    store: MessageStore,
    /// Live frames that arrived while history was still in flight.
    pending_live: Vec<RoomMessage>,
    outbound: Option<mpsc::UnboundedSender<ClientFrame>>,
    reader_task: Option<tokio::task::JoinHandle<()>>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            epoch: 0,
            phase: SessionPhase::Idle,
            history_status: HistoryStatus::Loading,
            room: None,
            store: MessageStore::new(),
            pending_live: Vec::new(),
            outbound: None,
            reader_task: None,
        }
    }
}

/// Synchronizes one room at a time: history over REST, live traffic over the
/// room socket, typing and notification side-channels. Opening a new session
/// supersedes the previous one; completions from a superseded session are
/// discarded on arrival.
///
/// Lock order where both are held: `inner` before `typing`.
pub struct RoomSessionClient {
    http: reqwest::Client,
    server_url: String,
    local_username: String,
    transport: Arc<dyn RoomTransport>,
    epochs: AtomicU64,
    inner: Mutex<SessionState>,
    typing: Mutex<TypingController>,
    notifier: NotificationRouter,
    events: broadcast::Sender<SessionEvent>,
}

impl RoomSessionClient {
    pub fn new(server_url: impl Into<String>, local_username: impl Into<String>) -> Arc<Self> {
        let server_url = server_url.into();
        let transport = Arc::new(WebSocketTransport::new(server_url.clone()));
        Self::new_with_transport(server_url, local_username, transport)
    }

    pub fn new_with_transport(
        server_url: impl Into<String>,
        local_username: impl Into<String>,
        transport: Arc<dyn RoomTransport>,
    ) -> Arc<Self> {
        let local_username = local_username.into();
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            http: reqwest::Client::new(),
            server_url: server_url.into(),
            local_username: local_username.clone(),
            transport,
            epochs: AtomicU64::new(0),
            inner: Mutex::new(SessionState::new()),
            typing: Mutex::new(TypingController::new(local_username.clone())),
            notifier: NotificationRouter::new(local_username),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Identity the whole subsystem filters against (typing echo, mention
    /// candidates, notification suppression).
    pub fn local_username(&self) -> &str {
        &self.local_username
    }

    /// Switches the client to `room`, tearing down whatever session came
    /// before. History fetch and socket connect run concurrently; live
    /// frames that beat the history response are buffered and flushed once
    /// it lands.
    pub async fn open_session(
        self: &Arc<Self>,
        room: RoomSummary,
        auth_token: &str,
    ) -> SessionHandle {
        let epoch = self.epochs.fetch_add(1, Ordering::SeqCst) + 1;
        let room_id = room.id.clone();
        info!(room_id = %room_id, epoch, "opening room session");

        {
            let mut inner = self.inner.lock().await;
            Self::teardown_locked(&mut inner);
            inner.epoch = epoch;
            inner.phase = SessionPhase::HistoryLoading;
            inner.history_status = HistoryStatus::Loading;
            inner.room = Some(room);
            inner.store = MessageStore::new();
            inner.pending_live = Vec::new();
        }
        self.typing.lock().await.reset();

        let auth_token = auth_token.to_string();
        {
            let client = Arc::clone(self);
            let room_id = room_id.clone();
            let token = auth_token.clone();
            tokio::spawn(async move { client.load_history(epoch, room_id, token).await });
        }
        {
            let client = Arc::clone(self);
            let room_id = room_id.clone();
            tokio::spawn(async move { client.connect_live(epoch, room_id, auth_token).await });
        }

        SessionHandle { epoch, room_id }
    }

    /// Closes the session `handle` refers to. A handle from a superseded
    /// session is a no-op, as is closing twice.
    pub async fn close_session(&self, handle: &SessionHandle) {
        if self.epochs.load(Ordering::SeqCst) != handle.epoch {
            trace!(epoch = handle.epoch, "ignoring close for superseded session");
            return;
        }
        let epoch = self.epochs.fetch_add(1, Ordering::SeqCst) + 1;
        info!(room_id = %handle.room_id, epoch = handle.epoch, "closing room session");
        {
            let mut inner = self.inner.lock().await;
            Self::teardown_locked(&mut inner);
            // Invalidate the session token too, or in-flight completions
            // (history response, socket connect) would still match it.
            inner.epoch = epoch;
            inner.phase = SessionPhase::Closed;
            inner.room = None;
        }
        self.typing.lock().await.reset();
    }

    /// Sends a chat message on the live connection. Whitespace-only content
    /// is dropped without error. The pending typing stop is cancelled first
    /// so the server sees the message itself as the end of typing.
    pub async fn send_message(&self, content: &str) -> Result<(), SessionError> {
        if content.trim().is_empty() {
            return Ok(());
        }
        let inner = self.inner.lock().await;
        let Some(outbound) = inner.outbound.clone() else {
            return Err(SessionError::NotConnected);
        };
        self.typing.lock().await.cancel_pending_stop();
        drop(inner);
        outbound
            .send(ClientFrame::Message {
                content: content.to_string(),
            })
            .map_err(|_| SessionError::NotConnected)
    }

    /// Forwarded on every keystroke in the composer.
    pub async fn on_local_input_changed(&self, has_text: bool) {
        self.typing.lock().await.on_local_input_changed(has_text);
    }

    pub async fn current_view(&self) -> Vec<RoomMessage> {
        self.inner.lock().await.store.current_view().to_vec()
    }

    pub async fn current_typing_user(&self) -> Option<String> {
        self.typing
            .lock()
            .await
            .current_typing_user()
            .map(str::to_string)
    }

    pub async fn phase(&self) -> SessionPhase {
        self.inner.lock().await.phase
    }

    pub async fn history_status(&self) -> HistoryStatus {
        self.inner.lock().await.history_status
    }

    pub async fn active_room(&self) -> Option<RoomSummary> {
        self.inner.lock().await.room.clone()
    }

    async fn load_history(self: Arc<Self>, epoch: u64, room_id: RoomId, auth_token: String) {
        let result = self.fetch_history(&room_id, &auth_token).await;
        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            trace!(room_id = %room_id, epoch, "discarding history for superseded session");
            return;
        }
        let history = match result {
            Ok(rows) => {
                inner.history_status = HistoryStatus::Ready;
                // The endpoint returns newest first.
                rows.into_iter()
                    .rev()
                    .map(|row| RoomMessage::Chat(self.chat_from_history(row)))
                    .collect()
            }
            Err(source) => {
                let err = SessionError::HistoryFetch {
                    room_id: room_id.clone(),
                    source,
                };
                warn!("{err}, substituting empty history");
                inner.history_status = HistoryStatus::Failed;
                Vec::new()
            }
        };
        let count = history.len();
        inner.store.seed_history(history);
        // History failure never blocks the live path; the session still
        // goes live with an empty backlog.
        if inner.phase == SessionPhase::HistoryLoading {
            inner.phase = SessionPhase::Live;
        }
        let _ = self.events.send(SessionEvent::HistoryLoaded {
            room_id: room_id.clone(),
            count,
        });
        for message in std::mem::take(&mut inner.pending_live) {
            inner.store.append_live(message.clone());
            let _ = self.events.send(SessionEvent::MessageAppended(message));
        }
    }

    async fn fetch_history(
        &self,
        room_id: &RoomId,
        auth_token: &str,
    ) -> anyhow::Result<Vec<HistoryMessage>> {
        let url = format!("{}/rooms/{}/messages", self.server_url, room_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(auth_token)
            .send()
            .await
            .context("history request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(match response.json::<ApiError>().await {
                Ok(body) => anyhow!("history request rejected ({status}): {body}"),
                Err(_) => anyhow!("history request rejected ({status})"),
            });
        }
        let rows = response.json().await.context("malformed history payload")?;
        Ok(rows)
    }

    async fn connect_live(self: Arc<Self>, epoch: u64, room_id: RoomId, auth_token: String) {
        match self.transport.connect(&room_id, &auth_token).await {
            Ok(connection) => {
                let mut inner = self.inner.lock().await;
                if inner.epoch != epoch {
                    trace!(room_id = %room_id, epoch, "dropping socket for superseded session");
                    return;
                }
                info!(room_id = %room_id, "live connection established");
                inner.outbound = Some(connection.outbound.clone());
                let mut inbound = connection.inbound;
                let client = Arc::clone(&self);
                let reader_room = room_id.clone();
                inner.reader_task = Some(tokio::spawn(async move {
                    while let Some(event) = inbound.recv().await {
                        client
                            .handle_transport_event(epoch, &reader_room, event)
                            .await;
                    }
                }));
                // Bound under the inner lock so a fast room switch cannot
                // attach typing to a stale socket.
                self.typing.lock().await.bind(connection.outbound);
            }
            Err(source) => {
                if self.epochs.load(Ordering::SeqCst) != epoch {
                    return;
                }
                let err = SessionError::Transport {
                    room_id: room_id.clone(),
                    source,
                };
                warn!("{err}, session degraded");
                let _ = self.events.send(SessionEvent::TransportDown {
                    room_id,
                    reason: Some(err.to_string()),
                });
            }
        }
    }

    async fn handle_transport_event(
        self: &Arc<Self>,
        epoch: u64,
        room_id: &RoomId,
        event: TransportEvent,
    ) {
        match event {
            TransportEvent::Frame(frame) => self.dispatch_frame(epoch, room_id, frame).await,
            TransportEvent::Closed { reason } => {
                warn!(room_id = %room_id, ?reason, "live connection closed");
                let mut inner = self.inner.lock().await;
                if inner.epoch != epoch {
                    return;
                }
                inner.outbound = None;
                let _ = self.events.send(SessionEvent::TransportDown {
                    room_id: room_id.clone(),
                    reason,
                });
            }
        }
    }

    async fn dispatch_frame(self: &Arc<Self>, epoch: u64, room_id: &RoomId, frame: ServerFrame) {
        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            trace!(room_id = %room_id, epoch, "discarding frame from superseded session");
            return;
        }
        match frame {
            ServerFrame::Message {
                message_id,
                room_id: frame_room,
                sender_id: _,
                username,
                content,
                timestamp,
            } => {
                {
                    let mut typing = self.typing.lock().await;
                    if typing.on_chat_message_received() {
                        let _ = self.events.send(SessionEvent::TypingChanged(None));
                    }
                }
                let chat = ChatMessage {
                    id: message_id,
                    room_id: frame_room,
                    username,
                    content,
                    timestamp,
                };
                Self::append_or_buffer(&mut inner, &self.events, RoomMessage::Chat(chat.clone()));
                let room_name = inner
                    .room
                    .as_ref()
                    .map(|room| room.name.clone())
                    .unwrap_or_default();
                if let Some(intent) = self.notifier.on_chat_message(&chat, &room_name, room_id) {
                    let _ = self.events.send(SessionEvent::Notified(intent));
                }
            }
            ServerFrame::Typing { username, is_typing } => {
                let mut typing = self.typing.lock().await;
                if typing.on_remote_typing_event(&username, is_typing) {
                    let current = typing.current_typing_user().map(str::to_string);
                    let _ = self.events.send(SessionEvent::TypingChanged(current));
                }
            }
            ServerFrame::UserJoined { username } => {
                let system = Self::system_message(format!("{username} joined the channel 👋"));
                Self::append_or_buffer(&mut inner, &self.events, RoomMessage::System(system));
            }
            ServerFrame::UserLeft { username } => {
                let system = Self::system_message(format!("{username} left the channel"));
                Self::append_or_buffer(&mut inner, &self.events, RoomMessage::System(system));
            }
            ServerFrame::Unknown => {
                trace!(room_id = %room_id, "ignoring unrecognized frame");
            }
        }
    }

    fn append_or_buffer(
        inner: &mut SessionState,
        events: &broadcast::Sender<SessionEvent>,
        message: RoomMessage,
    ) {
        if inner.history_status == HistoryStatus::Loading {
            inner.pending_live.push(message);
        } else {
            inner.store.append_live(message.clone());
            let _ = events.send(SessionEvent::MessageAppended(message));
        }
    }

    fn system_message(content: String) -> SystemMessage {
        SystemMessage {
            id: MessageId::from(Uuid::new_v4().to_string().as_str()),
            content,
            timestamp: Utc::now(),
        }
    }

    fn chat_from_history(&self, row: HistoryMessage) -> ChatMessage {
        let username = row.username.unwrap_or_else(|| row.sender_id.0.clone());
        ChatMessage {
            id: row.id,
            room_id: row.room_id,
            username,
            content: row.content,
            timestamp: row.created_at,
        }
    }

    fn teardown_locked(inner: &mut SessionState) {
        if let Some(task) = inner.reader_task.take() {
            task.abort();
        }
        inner.outbound = None;
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
