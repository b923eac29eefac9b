//! Session lifecycle — drives a new gateway client through login
//!
//! `begin_session` resolves only after the session is `Active` and in the
//! registry, so a caller may dispatch as soon as it returns.

use crate::config::{with_timeout, SessionConfig};
use crate::error::{Result, SessionError};
use crate::gateway::{GatewayConnector, GatewayEvent, GatewayEvents};
use crate::monitor::{self, MonitorContext};
use crate::registry::SessionRegistry;
use crate::session::{release, SessionRecord};
use crate::types::SessionEvent;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Creates and authenticates sessions
pub struct SessionLifecycle {
    connector: Arc<dyn GatewayConnector>,
    registry: Arc<SessionRegistry>,
    notifier: broadcast::Sender<SessionEvent>,
    config: Arc<SessionConfig>,
}

impl SessionLifecycle {
    pub fn new(
        connector: Arc<dyn GatewayConnector>,
        registry: Arc<SessionRegistry>,
        notifier: broadcast::Sender<SessionEvent>,
        config: Arc<SessionConfig>,
    ) -> Self {
        Self {
            connector,
            registry,
            notifier,
            config,
        }
    }

    /// Log in with `credential` and register the resulting session
    ///
    /// Returns the gateway-assigned identifier. The credential is passed to
    /// the gateway unchecked. Login rejections are returned unchanged and
    /// leave the registry untouched.
    pub async fn begin_session(&self, credential: &str) -> Result<String> {
        let client = self.connector.create_client()?;
        // Subscribe before login so an early Ready is not lost
        let mut events = client.subscribe();

        let ack = match with_timeout(
            self.config.login_timeout(),
            "login",
            client.login(credential),
        )
        .await
        {
            Ok(ack) if ack.identifier.is_empty() => {
                release(client.as_ref(), "", self.config.disconnect_timeout()).await;
                return Err(SessionError::AuthenticationFailed(
                    "gateway assigned an empty identifier".to_string(),
                ));
            }
            Ok(ack) => ack,
            Err(e) => {
                tracing::warn!(gateway = %self.connector.name(), error = %e, "Gateway login failed");
                release(client.as_ref(), "", self.config.disconnect_timeout()).await;
                return Err(e);
            }
        };

        let identifier = ack.identifier;
        tracing::info!(session = %identifier, "Logged in");
        let record = Arc::new(SessionRecord::new(identifier.clone(), client));

        if let Err(e) = with_timeout(
            self.config.ready_timeout(),
            "ready",
            wait_ready(events.as_mut()),
        )
        .await
        {
            tracing::warn!(session = %identifier, error = %e, "Session never became ready");
            self.abandon(&record).await;
            return Err(e);
        }

        record.activate();
        if let Err(e) = self.registry.insert(record.clone()).await {
            tracing::warn!(session = %identifier, error = %e, "Refusing duplicate session");
            self.abandon(&record).await;
            return Err(e);
        }

        monitor::spawn(
            record.clone(),
            events,
            MonitorContext {
                registry: self.registry.clone(),
                notifier: self.notifier.clone(),
                evict_on_error: self.config.evict_on_error,
                disconnect_timeout: self.config.disconnect_timeout(),
            },
        );

        tracing::info!(
            session = %identifier,
            channels = record.client().channels().len(),
            "Client ready"
        );
        let _ = self.notifier.send(SessionEvent::Registered {
            identifier: identifier.clone(),
        });

        Ok(identifier)
    }

    async fn abandon(&self, record: &SessionRecord) {
        if record.terminate(None) {
            release(
                record.client(),
                record.identifier(),
                self.config.disconnect_timeout(),
            )
            .await;
        }
    }
}

/// Wait for `Ready`; an `Error` first means authentication did not settle
async fn wait_ready(events: &mut dyn GatewayEvents) -> Result<()> {
    match events.next().await {
        Some(GatewayEvent::Ready) => Ok(()),
        Some(GatewayEvent::Error(reason)) => Err(SessionError::AuthenticationFailed(reason)),
        None => Err(SessionError::AuthenticationFailed(
            "gateway closed before ready".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::{MemoryAccount, MemoryGateway};
    use crate::types::SessionState;

    fn build(
        gateway: &MemoryGateway,
        config: SessionConfig,
    ) -> (SessionLifecycle, Arc<SessionRegistry>) {
        let registry = Arc::new(SessionRegistry::new());
        let (notifier, _) = broadcast::channel(16);
        let lifecycle = SessionLifecycle::new(
            Arc::new(gateway.clone()),
            registry.clone(),
            notifier,
            Arc::new(config),
        );
        (lifecycle, registry)
    }

    #[tokio::test]
    async fn test_begin_registers_before_resolving() {
        let gateway = MemoryGateway::default();
        let (lifecycle, registry) = build(&gateway, SessionConfig::default());

        let id = lifecycle.begin_session("tok1").await.unwrap();
        assert_eq!(id, "user#tok1");

        let record = registry.find(&id).await.unwrap();
        assert_eq!(record.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_rejected_login_not_registered() {
        let gateway = MemoryGateway::default()
            .with_account("bad", MemoryAccount::new("bot#1").rejecting_login("ERROR!"));
        let (lifecycle, registry) = build(&gateway, SessionConfig::default());

        let err = lifecycle.begin_session("bad").await.unwrap_err();
        assert_eq!(err, SessionError::AuthenticationFailed("ERROR!".to_string()));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_ready_timeout_releases_client() {
        let gateway = MemoryGateway::default()
            .with_account("slow", MemoryAccount::new("bot#slow").without_ready());
        let config = SessionConfig {
            ready_timeout_ms: Some(30),
            ..Default::default()
        };
        let (lifecycle, registry) = build(&gateway, config);

        let err = lifecycle.begin_session("slow").await.unwrap_err();
        assert!(matches!(err, SessionError::Timeout(_)));
        assert!(registry.is_empty().await);
        assert!(gateway.was_disconnected("bot#slow"));
    }

    #[tokio::test]
    async fn test_login_timeout_releases_client() {
        let gateway = MemoryGateway::default()
            .with_account("slow", MemoryAccount::new("bot#slow").stalling_login());
        let config = SessionConfig {
            login_timeout_ms: Some(30),
            ..Default::default()
        };
        let (lifecycle, registry) = build(&gateway, config);

        let err = lifecycle.begin_session("slow").await.unwrap_err();
        assert_eq!(err, SessionError::Timeout("login timed out after 30ms".to_string()));
        assert!(registry.is_empty().await);
        assert_eq!(gateway.live_clients(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_identifier_rejected() {
        let gateway = MemoryGateway::default();
        let (lifecycle, registry) = build(&gateway, SessionConfig::default());

        let first = lifecycle.begin_session("tok1").await.unwrap();
        let err = lifecycle.begin_session("tok1").await.unwrap_err();
        assert_eq!(err, SessionError::DuplicateSession(first.clone()));

        assert_eq!(registry.len().await, 1);
        assert!(registry.find(&first).await.unwrap().is_active());
        assert!(gateway.is_connected(&first));
    }
}
