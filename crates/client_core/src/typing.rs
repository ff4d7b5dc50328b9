use std::time::Duration;

use shared::protocol::ClientFrame;
use tokio::{sync::mpsc, task::JoinHandle, time};
use tracing::trace;

/// Idle period after the last keystroke before `typing:stop` goes out.
pub const TYPING_DEBOUNCE: Duration = Duration::from_millis(2000);

/// Debounces outbound typing signals and remembers at most one remote
/// "is typing" user for the current session.
pub struct TypingController {
    local_username: String,
    debounce: Duration,
    outbound: Option<mpsc::UnboundedSender<ClientFrame>>,
    stop_timer: Option<JoinHandle<()>>,
    remote_typing: Option<String>,
}

impl TypingController {
    pub fn new(local_username: impl Into<String>) -> Self {
        Self::with_debounce(local_username, TYPING_DEBOUNCE)
    }

    pub fn with_debounce(local_username: impl Into<String>, debounce: Duration) -> Self {
        Self {
            local_username: local_username.into(),
            debounce,
            outbound: None,
            stop_timer: None,
            remote_typing: None,
        }
    }

    /// Attaches the controller to a live connection's write half.
    pub fn bind(&mut self, outbound: mpsc::UnboundedSender<ClientFrame>) {
        self.outbound = Some(outbound);
    }

    /// Session teardown: drops the connection binding, cancels the pending
    /// stop signal and forgets any remote typing state. Idempotent.
    pub fn reset(&mut self) {
        self.cancel_pending_stop();
        self.outbound = None;
        self.remote_typing = None;
    }

    /// One local keystroke: emits `typing:start` and re-arms the single idle
    /// timer that emits `typing:stop` once the user goes quiet. Clearing the
    /// input emits the stop right away instead.
    pub fn on_local_input_changed(&mut self, has_text: bool) {
        let Some(outbound) = self.outbound.clone() else {
            return;
        };
        self.cancel_pending_stop();
        if !has_text {
            let _ = outbound.send(ClientFrame::Typing { is_typing: false });
            return;
        }
        let _ = outbound.send(ClientFrame::Typing { is_typing: true });
        let debounce = self.debounce;
        self.stop_timer = Some(tokio::spawn(async move {
            time::sleep(debounce).await;
            let _ = outbound.send(ClientFrame::Typing { is_typing: false });
        }));
    }

    /// Cancels the idle timer without emitting a stop signal. Called right
    /// before a message is sent so a stray stop cannot race the send, and on
    /// session close.
    pub fn cancel_pending_stop(&mut self) {
        if let Some(timer) = self.stop_timer.take() {
            timer.abort();
        }
    }

    /// Last-write-wins remote typing state. A stop clears it no matter which
    /// user it names; the local user's own echo is never stored. Returns
    /// whether the remembered value changed.
    pub fn on_remote_typing_event(&mut self, username: &str, is_typing: bool) -> bool {
        if is_typing && username == self.local_username {
            trace!(username, "ignoring self-originated typing frame");
            return false;
        }
        let next = is_typing.then(|| username.to_string());
        if next == self.remote_typing {
            return false;
        }
        self.remote_typing = next;
        true
    }

    /// Any chat message clears the remembered typing user. Returns whether
    /// there was one to clear.
    pub fn on_chat_message_received(&mut self) -> bool {
        self.remote_typing.take().is_some()
    }

    pub fn current_typing_user(&self) -> Option<&str> {
        self.remote_typing.as_deref()
    }
}

#[cfg(test)]
#[path = "tests/typing_tests.rs"]
mod tests;
