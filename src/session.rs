//! Session record — one authenticated gateway client and its lifecycle state

use crate::config::with_timeout;
use crate::error::Result;
use crate::gateway::GatewayClient;
use crate::types::{now_millis, SessionInfo, SessionState};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

/// A gateway session
///
/// Exclusively owns its gateway client. Shared as `Arc<SessionRecord>`
/// between the registry, in-flight dispatches and the session monitor.
pub struct SessionRecord {
    identifier: String,
    client: Box<dyn GatewayClient>,
    status: Mutex<Status>,
    created_at: i64,
    shutdown: Notify,
}

struct Status {
    state: SessionState,
    last_error: Option<String>,
}

impl SessionRecord {
    /// Wrap a logged-in client; starts in `Authenticating`
    pub fn new(identifier: impl Into<String>, client: Box<dyn GatewayClient>) -> Self {
        Self {
            identifier: identifier.into(),
            client,
            status: Mutex::new(Status {
                state: SessionState::Authenticating,
                last_error: None,
            }),
            created_at: now_millis(),
            shutdown: Notify::new(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn client(&self) -> &dyn GatewayClient {
        self.client.as_ref()
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        self.status().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    pub fn last_error(&self) -> Option<String> {
        self.status().last_error.clone()
    }

    /// `Authenticating` → `Active`; returns false from any other state
    pub fn activate(&self) -> bool {
        let mut status = self.status();
        if status.state != SessionState::Authenticating {
            return false;
        }
        status.state = SessionState::Active;
        true
    }

    /// Move to `Terminated`, recording `error` if given
    ///
    /// Returns true only for the call that performed the transition; that
    /// caller is responsible for disconnecting the client and announcing the
    /// end. Later calls leave the record untouched.
    pub fn terminate(&self, error: Option<String>) -> bool {
        let mut status = self.status();
        if status.state == SessionState::Terminated {
            return false;
        }
        status.state = SessionState::Terminated;
        if error.is_some() {
            status.last_error = error;
        }
        true
    }

    /// Record an error without changing state
    pub fn record_error(&self, error: impl Into<String>) {
        self.status().last_error = Some(error.into());
    }

    /// Snapshot for listing
    pub fn info(&self) -> SessionInfo {
        let status = self.status();
        SessionInfo {
            identifier: self.identifier.clone(),
            state: status.state,
            channels: self
                .client
                .channels()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
            created_at: self.created_at,
            last_error: status.last_error.clone(),
        }
    }

    /// Ask the session monitor to exit
    pub(crate) fn stop_monitor(&self) {
        // notify_one stores a permit if the monitor is not waiting yet
        self.shutdown.notify_one();
    }

    pub(crate) async fn stopped(&self) {
        self.shutdown.notified().await
    }

    fn status(&self) -> std::sync::MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecord")
            .field("identifier", &self.identifier)
            .field("state", &self.state())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Disconnect a client, logging instead of failing
pub(crate) async fn release(client: &dyn GatewayClient, identifier: &str, limit: Option<Duration>) {
    if let Err(e) = disconnect(client, limit).await {
        tracing::warn!(
            session = %identifier,
            error = %e,
            "Failed to release gateway client"
        );
    }
}

pub(crate) async fn disconnect(client: &dyn GatewayClient, limit: Option<Duration>) -> Result<()> {
    with_timeout(limit, "disconnect", client.disconnect()).await
}
