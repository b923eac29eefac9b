//! Error types for a3s-session

use thiserror::Error;

/// Errors that can occur while managing gateway sessions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Login rejected by the gateway
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No active session matches the identifier
    #[error("Cannot find session matching identifier: {0}")]
    SessionNotFound(String),

    /// Session exists but has no channel with that name
    #[error("Cannot find a channel with name '{channel}' in session '{session}'")]
    ChannelNotFound {
        session: String,
        channel: String,
    },

    /// Outbound text is empty
    #[error("Message needs to have a value")]
    EmptyMessage,

    /// Outbound text exceeds the gateway's transport limit
    #[error("Message is {len} characters long, limit is below {max}")]
    MessageTooLarge {
        len: usize,
        max: usize,
    },

    /// Send accepted locally but rejected by the gateway
    #[error("Gateway rejected the message: {0}")]
    TransportRejected(String),

    /// Asynchronous gateway error with no pending caller
    #[error("Unhandled error from session '{session}': {reason}")]
    UnhandledSessionError {
        session: String,
        reason: String,
    },

    /// Another active session already holds this identifier
    #[error("Session already registered: {0}")]
    DuplicateSession(String),

    /// Gateway connection failure (disconnect, client creation)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            SessionError::SessionNotFound("bot#1".into()).to_string(),
            "Cannot find session matching identifier: bot#1"
        );
        assert_eq!(
            SessionError::ChannelNotFound {
                session: "bot#1".into(),
                channel: "random".into(),
            }
            .to_string(),
            "Cannot find a channel with name 'random' in session 'bot#1'"
        );
        assert_eq!(
            SessionError::MessageTooLarge { len: 2000, max: 2000 }.to_string(),
            "Message is 2000 characters long, limit is below 2000"
        );
    }
}
