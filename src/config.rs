//! Session manager configuration

use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gateway's hard limit on a single text message, in UTF-16 code units
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 2000;

/// Configuration for the session manager
///
/// All timeouts are optional. Without one, a gateway call that never
/// settles keeps its caller waiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Messages this many UTF-16 code units long or more are rejected locally
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,

    /// Timeout for the login round trip (milliseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_timeout_ms: Option<u64>,

    /// Timeout for the ready notification after login (milliseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_timeout_ms: Option<u64>,

    /// Timeout for a single channel send (milliseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_timeout_ms: Option<u64>,

    /// Timeout for disconnect during teardown (milliseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disconnect_timeout_ms: Option<u64>,

    /// Buffer size of the session event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Evict a session from the registry when its gateway reports an error
    #[serde(default = "default_evict_on_error")]
    pub evict_on_error: bool,
}

fn default_max_message_len() -> usize {
    DEFAULT_MAX_MESSAGE_LEN
}

fn default_event_capacity() -> usize {
    64
}

fn default_evict_on_error() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            login_timeout_ms: None,
            ready_timeout_ms: None,
            send_timeout_ms: None,
            disconnect_timeout_ms: None,
            event_capacity: default_event_capacity(),
            evict_on_error: true,
        }
    }
}

impl SessionConfig {
    /// Reject values the manager cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.max_message_len == 0 {
            return Err(SessionError::Config(
                "maxMessageLen must be greater than zero".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(SessionError::Config(
                "eventCapacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn login_timeout(&self) -> Option<Duration> {
        self.login_timeout_ms.map(Duration::from_millis)
    }

    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_ms.map(Duration::from_millis)
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_ms.map(Duration::from_millis)
    }

    pub fn disconnect_timeout(&self) -> Option<Duration> {
        self.disconnect_timeout_ms.map(Duration::from_millis)
    }
}

/// Await `fut`, failing with `Timeout` if `limit` elapses first
pub(crate) async fn with_timeout<T>(
    limit: Option<Duration>,
    what: &str,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            SessionError::Timeout(format!("{} timed out after {}ms", what, limit.as_millis()))
        })?,
        None => fut.await,
    }
}
