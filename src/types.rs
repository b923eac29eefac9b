//! Core session types for the a3s-session system
//!
//! All serializable types use camelCase JSON for wire compatibility.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a gateway session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// Login initiated, waiting for the gateway to become ready
    Authenticating,
    /// Registered and able to dispatch messages
    Active,
    /// Ended or failed; never registered again
    Terminated,
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Gateway-assigned identifier (e.g. `name#1234`)
    pub identifier: String,

    /// Current lifecycle state
    pub state: SessionState,

    /// Channel names in gateway order
    pub channels: Vec<String>,

    /// Unix timestamp in milliseconds when login was initiated
    pub created_at: i64,

    /// Last asynchronous gateway error, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Outcome of a successful channel send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResult {
    /// Gateway-assigned message id
    pub message_id: String,

    /// Session that sent the message
    pub session_id: String,

    /// Channel the message was delivered to
    pub channel: String,

    /// Unix timestamp in milliseconds
    pub delivered_at: i64,
}

/// Notification broadcast to session observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum SessionEvent {
    /// Session became active and was added to the registry
    Registered { identifier: String },
    /// Session was torn down by a caller
    Ended { identifier: String },
    /// Gateway reported an error with no pending caller
    Failed { identifier: String, error: String },
}

impl SessionEvent {
    /// Identifier of the session this event concerns
    pub fn identifier(&self) -> &str {
        match self {
            Self::Registered { identifier }
            | Self::Ended { identifier }
            | Self::Failed { identifier, .. } => identifier,
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
