//! Gateway client capability — the abstraction over messaging gateways
//!
//! A gateway (Discord, Slack, in-memory, etc.) implements these traits to
//! hand the session layer authenticated clients. The session layer never
//! touches connection setup, heartbeats or wire encoding.

use crate::error::Result;
use crate::types::DeliveryResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

pub mod memory;

/// Factory for fresh, unauthenticated gateway clients
pub trait GatewayConnector: Send + Sync {
    /// Create a new client; one per session
    fn create_client(&self) -> Result<Box<dyn GatewayClient>>;

    /// Gateway name (e.g., "discord", "memory")
    fn name(&self) -> &str;
}

/// One connection to the messaging gateway
///
/// Implementations must buffer events emitted after `subscribe` so that a
/// `Ready` fired during `login` is still delivered.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Subscribe to `Ready` and `Error` notifications
    fn subscribe(&self) -> Box<dyn GatewayEvents>;

    /// Authenticate with an opaque credential
    ///
    /// Resolves once the gateway accepted the credential; the returned
    /// identifier is assigned by the gateway.
    async fn login(&self, credential: &str) -> Result<LoginAck>;

    /// Addressable channels, in gateway order
    fn channels(&self) -> Vec<Arc<dyn GatewayChannel>>;

    /// Look up a channel by exact name
    ///
    /// Default implementation scans `channels()`.
    fn channel(&self, name: &str) -> Option<Arc<dyn GatewayChannel>> {
        self.channels().into_iter().find(|c| c.name() == name)
    }

    /// Close the connection and release its resources
    async fn disconnect(&self) -> Result<()>;
}

/// A destination that accepts text messages
#[async_trait]
pub trait GatewayChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Send a text message; gateway rejections surface as `TransportRejected`
    async fn send_text(&self, text: &str) -> Result<DeliveryResult>;
}

/// Async stream of gateway notifications
#[async_trait]
pub trait GatewayEvents: Send {
    /// Next notification, or `None` once the client is gone
    async fn next(&mut self) -> Option<GatewayEvent>;
}

/// Notification emitted by a gateway client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// Connection is authenticated and channels are available
    Ready,
    /// Gateway-level failure
    Error(String),
}

/// Successful login acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAck {
    /// Gateway-assigned identifier (e.g., the bot's user tag)
    pub identifier: String,
}

/// `GatewayEvents` backed by a tokio broadcast receiver
///
/// Lagged receivers skip the dropped notifications and keep reading.
pub struct BroadcastEvents {
    rx: broadcast::Receiver<GatewayEvent>,
}

impl BroadcastEvents {
    pub fn new(rx: broadcast::Receiver<GatewayEvent>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl GatewayEvents for BroadcastEvents {
    async fn next(&mut self) -> Option<GatewayEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Gateway event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_events_in_order() {
        let (tx, rx) = broadcast::channel(8);
        let mut events = BroadcastEvents::new(rx);

        tx.send(GatewayEvent::Ready).unwrap();
        tx.send(GatewayEvent::Error("boom".to_string())).unwrap();
        drop(tx);

        assert_eq!(events.next().await, Some(GatewayEvent::Ready));
        assert_eq!(events.next().await, Some(GatewayEvent::Error("boom".to_string())));
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn test_broadcast_events_skip_lagged() {
        let (tx, rx) = broadcast::channel(1);
        let mut events = BroadcastEvents::new(rx);

        tx.send(GatewayEvent::Ready).unwrap();
        tx.send(GatewayEvent::Error("latest".to_string())).unwrap();

        assert_eq!(
            events.next().await,
            Some(GatewayEvent::Error("latest".to_string()))
        );
    }
}
