//! Session teardown
//!
//! The registry entry is removed before the gateway is asked to disconnect,
//! so a failed disconnect never leaves an unreachable session registered.

use crate::config::SessionConfig;
use crate::error::Result;
use crate::registry::SessionRegistry;
use crate::session::disconnect;
use crate::types::SessionEvent;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Ends sessions and releases their gateway clients
pub struct SessionTeardown {
    registry: Arc<SessionRegistry>,
    notifier: broadcast::Sender<SessionEvent>,
    config: Arc<SessionConfig>,
}

impl SessionTeardown {
    pub fn new(
        registry: Arc<SessionRegistry>,
        notifier: broadcast::Sender<SessionEvent>,
        config: Arc<SessionConfig>,
    ) -> Self {
        Self {
            registry,
            notifier,
            config,
        }
    }

    /// End the session registered as `identifier`
    ///
    /// Fails with `SessionNotFound` if absent. A disconnect failure is
    /// returned, but the session is already gone from the registry.
    pub async fn end_session(&self, identifier: &str) -> Result<()> {
        let record = self.registry.remove(identifier).await?;
        if !record.terminate(None) {
            // A gateway error ended it first; the monitor announces and releases
            tracing::debug!(session = %identifier, "Session already terminated by gateway error");
            return Ok(());
        }
        record.stop_monitor();

        let _ = self.notifier.send(SessionEvent::Ended {
            identifier: identifier.to_string(),
        });

        match disconnect(record.client(), self.config.disconnect_timeout()).await {
            Ok(()) => {
                tracing::info!(session = %identifier, "Session ended");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    session = %identifier,
                    error = %e,
                    "Disconnect failed, session removed anyway"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::gateway::memory::{MemoryAccount, MemoryGateway};
    use crate::gateway::GatewayConnector;
    use crate::session::SessionRecord;
    use crate::types::SessionState;

    async fn setup(
        gateway: &MemoryGateway,
        credential: &str,
    ) -> (SessionTeardown, Arc<SessionRecord>, Arc<SessionRegistry>) {
        let registry = Arc::new(SessionRegistry::new());
        let client = gateway.create_client().unwrap();
        let ack = client.login(credential).await.unwrap();
        let record = Arc::new(SessionRecord::new(ack.identifier, client));
        record.activate();
        registry.insert(record.clone()).await.unwrap();

        let (notifier, _) = broadcast::channel(16);
        let teardown = SessionTeardown::new(
            registry.clone(),
            notifier,
            Arc::new(SessionConfig::default()),
        );
        (teardown, record, registry)
    }

    #[tokio::test]
    async fn test_end_session_disconnects() {
        let gateway = MemoryGateway::default();
        let (teardown, record, registry) = setup(&gateway, "tok1").await;

        teardown.end_session("user#tok1").await.unwrap();
        assert!(registry.is_empty().await);
        assert_eq!(record.state(), SessionState::Terminated);
        assert!(gateway.was_disconnected("user#tok1"));
    }

    #[tokio::test]
    async fn test_removed_even_when_disconnect_fails() {
        let gateway = MemoryGateway::default()
            .with_account("tok", MemoryAccount::new("bot#1").failing_disconnect());
        let (teardown, _, registry) = setup(&gateway, "tok").await;

        let err = teardown.end_session("bot#1").await.unwrap_err();
        assert!(matches!(err, SessionError::Connection(_)));
        assert!(!registry.contains("bot#1").await);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let gateway = MemoryGateway::default();
        let (teardown, _, registry) = setup(&gateway, "tok1").await;

        assert_eq!(
            teardown.end_session("user#nobody").await.unwrap_err(),
            SessionError::SessionNotFound("user#nobody".to_string())
        );
        assert_eq!(registry.len().await, 1);
    }
}
