//! High-level session manager built on a pluggable gateway
//!
//! `SessionManager` wires lifecycle, dispatch and teardown around one
//! injected registry and exposes the session event stream.

use crate::config::SessionConfig;
use crate::dispatch::ChannelDispatcher;
use crate::error::{Result, SessionError};
use crate::gateway::GatewayConnector;
use crate::lifecycle::SessionLifecycle;
use crate::registry::SessionRegistry;
use crate::teardown::SessionTeardown;
use crate::types::{DeliveryResult, SessionEvent, SessionInfo};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

/// Multi-tenant gateway session manager
pub struct SessionManager {
    connector: Arc<dyn GatewayConnector>,
    registry: Arc<SessionRegistry>,
    lifecycle: SessionLifecycle,
    dispatcher: ChannelDispatcher,
    teardown: SessionTeardown,
    notifier: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    /// Create a manager with default configuration and a fresh registry
    pub fn new(connector: impl GatewayConnector + 'static) -> Self {
        Self::build(
            Arc::new(connector),
            Arc::new(SessionRegistry::new()),
            SessionConfig::default(),
        )
    }

    /// Create a manager with explicit configuration
    pub fn with_config(
        connector: impl GatewayConnector + 'static,
        config: SessionConfig,
    ) -> Result<Self> {
        Self::with_registry(Arc::new(connector), Arc::new(SessionRegistry::new()), config)
    }

    /// Create a manager around an existing registry
    pub fn with_registry(
        connector: Arc<dyn GatewayConnector>,
        registry: Arc<SessionRegistry>,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(connector, registry, config))
    }

    fn build(
        connector: Arc<dyn GatewayConnector>,
        registry: Arc<SessionRegistry>,
        config: SessionConfig,
    ) -> Self {
        let (notifier, _) = broadcast::channel(config.event_capacity);
        let config = Arc::new(config);

        Self {
            lifecycle: SessionLifecycle::new(
                connector.clone(),
                registry.clone(),
                notifier.clone(),
                config.clone(),
            ),
            dispatcher: ChannelDispatcher::new(registry.clone(), config.clone()),
            teardown: SessionTeardown::new(registry.clone(), notifier.clone(), config),
            connector,
            registry,
            notifier,
        }
    }

    /// Get the gateway name
    pub fn gateway_name(&self) -> &str {
        self.connector.name()
    }

    /// Log in and register a new session, returning its identifier
    pub async fn begin_session(&self, credential: &str) -> Result<String> {
        self.lifecycle.begin_session(credential).await
    }

    /// Send text to a named channel of a session
    pub async fn send_message(
        &self,
        identifier: &str,
        channel_name: &str,
        text: &str,
    ) -> Result<DeliveryResult> {
        self.dispatcher
            .send_message(identifier, channel_name, text)
            .await
    }

    /// End a session and release its gateway client
    pub async fn end_session(&self, identifier: &str) -> Result<()> {
        self.teardown.end_session(identifier).await
    }

    /// Subscribe to session notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.notifier.subscribe()
    }

    /// Session notifications as a stream; lagged notifications are dropped
    pub fn events(&self) -> impl Stream<Item = SessionEvent> {
        BroadcastStream::new(self.notifier.subscribe()).filter_map(|event| event.ok())
    }

    /// Snapshot of every registered session
    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        self.registry.snapshot().await
    }

    /// Snapshot of one session
    pub async fn session(&self, identifier: &str) -> Result<SessionInfo> {
        Ok(self.registry.find(identifier).await?.info())
    }

    /// Channel names of a session, in gateway order
    pub async fn channels(&self, identifier: &str) -> Result<Vec<String>> {
        let record = self.registry.find(identifier).await?;
        Ok(record
            .client()
            .channels()
            .iter()
            .map(|c| c.name().to_string())
            .collect())
    }

    /// Get a reference to the underlying registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// End every registered session concurrently
    ///
    /// Returns the number of sessions whose disconnect failed. All sessions
    /// are removed regardless.
    pub async fn shutdown(&self) -> usize {
        let identifiers = self.registry.identifiers().await;
        let results = join_all(identifiers.iter().map(|id| self.end_session(id))).await;

        let failed = results
            .iter()
            .filter(|r| !matches!(r, Ok(()) | Err(SessionError::SessionNotFound(_))))
            .count();

        tracing::info!(
            sessions = identifiers.len(),
            failed,
            "Session manager shut down"
        );
        failed
    }
}
