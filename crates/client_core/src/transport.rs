use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shared::{
    domain::RoomId,
    protocol::{ClientFrame, ServerFrame},
};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

/// What the read half of a live connection can deliver.
#[derive(Debug)]
pub enum TransportEvent {
    Frame(ServerFrame),
    Closed { reason: Option<String> },
}

/// One live room connection. The outbound sender is the only way to write to
/// the wire; dropping it shuts the writer down.
pub struct RoomConnection {
    pub outbound: mpsc::UnboundedSender<ClientFrame>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
pub trait RoomTransport: Send + Sync {
    async fn connect(&self, room_id: &RoomId, auth_token: &str) -> Result<RoomConnection>;
}

/// Production transport: one websocket per active room at
/// `/ws/{room_id}?token={auth_token}`.
pub struct WebSocketTransport {
    server_url: String,
}

impl WebSocketTransport {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
        }
    }

    fn endpoint(&self, room_id: &RoomId, auth_token: &str) -> Result<Url> {
        let ws_base = if self.server_url.starts_with("https://") {
            self.server_url.replacen("https://", "wss://", 1)
        } else if self.server_url.starts_with("http://") {
            self.server_url.replacen("http://", "ws://", 1)
        } else {
            return Err(anyhow!("server_url must start with http:// or https://"));
        };
        let mut url = Url::parse(&format!("{ws_base}/ws/{room_id}"))?;
        url.query_pairs_mut().append_pair("token", auth_token);
        Ok(url)
    }
}

#[async_trait]
impl RoomTransport for WebSocketTransport {
    async fn connect(&self, room_id: &RoomId, auth_token: &str) -> Result<RoomConnection> {
        let url = self.endpoint(room_id, auth_token)?;
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("failed to connect websocket for room {room_id}"))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!("failed to encode outbound frame: {err}");
                        continue;
                    }
                };
                if let Err(err) = ws_writer.send(Message::text(text)).await {
                    warn!("websocket send failed: {err}");
                    break;
                }
            }
        });

        tokio::spawn(async move {
            while let Some(message) = ws_reader.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerFrame>(&text) {
                        Ok(frame) => {
                            if inbound_tx.send(TransportEvent::Frame(frame)).is_err() {
                                break;
                            }
                        }
                        Err(err) => debug!("dropping malformed frame: {err}"),
                    },
                    Ok(Message::Close(frame)) => {
                        let reason = frame.map(|close| close.reason.to_string());
                        let _ = inbound_tx.send(TransportEvent::Closed { reason });
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        let _ = inbound_tx.send(TransportEvent::Closed {
                            reason: Some(err.to_string()),
                        });
                        break;
                    }
                }
            }
        });

        Ok(RoomConnection { outbound, inbound })
    }
}
