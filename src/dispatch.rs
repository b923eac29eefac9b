//! Channel message dispatcher
//!
//! Resolves session and channel, validates the payload locally, then hands
//! it to the gateway. Gateway failures come back verbatim; nothing is retried.

use crate::config::{with_timeout, SessionConfig};
use crate::error::{Result, SessionError};
use crate::registry::SessionRegistry;
use crate::types::DeliveryResult;
use std::sync::Arc;

/// Routes outbound text to a channel of an active session
pub struct ChannelDispatcher {
    registry: Arc<SessionRegistry>,
    config: Arc<SessionConfig>,
}

impl ChannelDispatcher {
    pub fn new(registry: Arc<SessionRegistry>, config: Arc<SessionConfig>) -> Self {
        Self { registry, config }
    }

    /// Send `text` to `channel_name` within session `identifier`
    pub async fn send_message(
        &self,
        identifier: &str,
        channel_name: &str,
        text: &str,
    ) -> Result<DeliveryResult> {
        let record = self.registry.find(identifier).await?;
        if !record.is_active() {
            return Err(SessionError::SessionNotFound(identifier.to_string()));
        }

        let channel = record.client().channel(channel_name).ok_or_else(|| {
            SessionError::ChannelNotFound {
                session: identifier.to_string(),
                channel: channel_name.to_string(),
            }
        })?;

        let len = validate_text(text, self.config.max_message_len)?;

        tracing::debug!(
            session = %identifier,
            channel = %channel_name,
            len,
            "Dispatching message"
        );

        with_timeout(self.config.send_timeout(), "send", channel.send_text(text)).await
    }
}

/// Reject empty text and text of `max_len` UTF-16 code units or more
///
/// The gateway measures messages in UTF-16 code units, so a character
/// outside the Basic Multilingual Plane counts twice. Returns the measured
/// length.
pub fn validate_text(text: &str, max_len: usize) -> Result<usize> {
    if text.is_empty() {
        return Err(SessionError::EmptyMessage);
    }
    let len = text.encode_utf16().count();
    if len >= max_len {
        return Err(SessionError::MessageTooLarge { len, max: max_len });
    }
    Ok(len)
}
