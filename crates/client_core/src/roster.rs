use std::{sync::Arc, time::Duration};

use anyhow::Result;
use shared::protocol::RosterEntry;
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
    time,
};
use tracing::debug;

/// Fixed poll cadence for the online-user roster.
pub const ROSTER_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Periodically refreshes the online-user roster. Independent of the active
/// room: it starts when the surrounding UI mounts and stops on teardown.
pub struct RosterPoller {
    http: reqwest::Client,
    server_url: String,
    auth_token: String,
    snapshot: Arc<RwLock<Vec<RosterEntry>>>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl RosterPoller {
    pub fn new(server_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            server_url: server_url.into(),
            auth_token: auth_token.into(),
            snapshot: Arc::new(RwLock::new(Vec::new())),
            poll_task: Mutex::new(None),
        }
    }

    /// Spawns the poll loop; the first poll fires immediately. Calling start
    /// again replaces the previous loop.
    pub async fn start(&self, interval: Duration) {
        let http = self.http.clone();
        let url = format!("{}/users/online", self.server_url);
        let auth_token = self.auth_token.clone();
        let snapshot = Arc::clone(&self.snapshot);
        let task = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            loop {
                ticker.tick().await;
                match fetch_roster(&http, &url, &auth_token).await {
                    Ok(entries) => *snapshot.write().await = entries,
                    // A failed poll keeps the previous snapshot; the next
                    // tick retries.
                    Err(err) => debug!("roster poll failed: {err:#}"),
                }
            }
        });
        if let Some(previous) = self.poll_task.lock().await.replace(task) {
            previous.abort();
        }
    }

    /// Idempotent disposer; safe to call multiple times.
    pub async fn stop(&self) {
        if let Some(task) = self.poll_task.lock().await.take() {
            task.abort();
        }
    }

    /// The roster as of the last successful poll, replaced wholesale.
    pub async fn snapshot(&self) -> Vec<RosterEntry> {
        self.snapshot.read().await.clone()
    }
}

async fn fetch_roster(
    http: &reqwest::Client,
    url: &str,
    auth_token: &str,
) -> Result<Vec<RosterEntry>> {
    let entries = http
        .get(url)
        .bearer_auth(auth_token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(entries)
}

#[cfg(test)]
#[path = "tests/roster_tests.rs"]
mod tests;
