//! In-memory gateway for testing and single-process use
//!
//! Accounts are scripted per credential. Unknown credentials are accepted
//! by default and resolve to `<tagPrefix><credential>`. Deliveries are
//! recorded up to `maxDeliveries` so tests can inspect what was sent.
//! Clients are dropped from the gateway once disconnected.

use super::{
    BroadcastEvents, GatewayChannel, GatewayClient, GatewayConnector, GatewayEvent,
    GatewayEvents, LoginAck,
};
use crate::error::{Result, SessionError};
use crate::types::{now_millis, DeliveryResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Configuration for the in-memory gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryConfig {
    /// Accept any non-empty credential that has no scripted account
    #[serde(default = "default_accept_unknown")]
    pub accept_unknown: bool,

    /// Channels given to accounts created from unknown credentials
    #[serde(default = "default_channels")]
    pub default_channels: Vec<String>,

    /// Prefix of identifiers derived from unknown credentials
    #[serde(default = "default_tag_prefix")]
    pub tag_prefix: String,

    /// Recorded deliveries kept before the oldest are dropped (0 = unbounded)
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: usize,
}

fn default_accept_unknown() -> bool {
    true
}

fn default_channels() -> Vec<String> {
    vec!["general".to_string()]
}

fn default_tag_prefix() -> String {
    "user#".to_string()
}

fn default_max_deliveries() -> usize {
    10_000
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            accept_unknown: true,
            default_channels: default_channels(),
            tag_prefix: default_tag_prefix(),
            max_deliveries: default_max_deliveries(),
        }
    }
}

/// Scripted behaviour for one credential
#[derive(Debug, Clone)]
pub struct MemoryAccount {
    pub identifier: String,
    pub channels: Vec<String>,
    /// Login fails with this reason
    pub login_rejection: Option<String>,
    /// Every send fails with `TransportRejected`
    pub reject_sends: bool,
    /// Disconnect fails with `Connection`
    pub fail_disconnect: bool,
    /// Emit `Ready` after a successful login
    pub emit_ready: bool,
    /// Login never settles
    pub stall_login: bool,
    /// Sends never settle
    pub stall_sends: bool,
    /// Disconnect never settles
    pub stall_disconnect: bool,
}

impl MemoryAccount {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            channels: default_channels(),
            login_rejection: None,
            reject_sends: false,
            fail_disconnect: false,
            emit_ready: true,
            stall_login: false,
            stall_sends: false,
            stall_disconnect: false,
        }
    }

    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    pub fn rejecting_login(mut self, reason: impl Into<String>) -> Self {
        self.login_rejection = Some(reason.into());
        self
    }

    pub fn rejecting_sends(mut self) -> Self {
        self.reject_sends = true;
        self
    }

    pub fn failing_disconnect(mut self) -> Self {
        self.fail_disconnect = true;
        self
    }

    pub fn without_ready(mut self) -> Self {
        self.emit_ready = false;
        self
    }

    pub fn stalling_login(mut self) -> Self {
        self.stall_login = true;
        self
    }

    pub fn stalling_sends(mut self) -> Self {
        self.stall_sends = true;
        self
    }

    pub fn stalling_disconnect(mut self) -> Self {
        self.stall_disconnect = true;
        self
    }
}

/// A message recorded by the in-memory gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: String,
    pub session_id: String,
    pub channel: String,
    pub text: String,
}

/// In-memory gateway connector
///
/// Cloning shares state, so a test can keep one handle for scripting and
/// inspection while the session manager owns another.
#[derive(Clone, Default)]
pub struct MemoryGateway {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    config: MemoryConfig,
    accounts: RwLock<HashMap<String, MemoryAccount>>,
    /// Clients not yet disconnected
    clients: RwLock<Vec<Arc<ClientShared>>>,
    disconnected: RwLock<HashSet<String>>,
    deliveries: RwLock<Vec<SentMessage>>,
    clients_created: AtomicUsize,
    login_attempts: AtomicUsize,
}

impl MemoryGateway {
    /// Create a gateway with the given config
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                config,
                ..Default::default()
            }),
        }
    }

    /// Script the account a credential logs into
    pub fn with_account(self, credential: impl Into<String>, account: MemoryAccount) -> Self {
        self.add_account(credential, account);
        self
    }

    /// Script the account a credential logs into
    pub fn add_account(&self, credential: impl Into<String>, account: MemoryAccount) {
        write(&self.inner.accounts).insert(credential.into(), account);
    }

    /// Fire an `Error` event on every live client logged in as `identifier`
    ///
    /// Returns false when no such client exists.
    pub fn emit_error(&self, identifier: &str, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let clients = read(&self.inner.clients);
        let mut found = false;
        for client in clients.iter().filter(|c| c.is_live_as(identifier)) {
            let _ = client.events.send(GatewayEvent::Error(reason.clone()));
            found = true;
        }
        found
    }

    /// Messages delivered by the session with this identifier
    pub fn deliveries(&self, identifier: &str) -> Vec<SentMessage> {
        read(&self.inner.deliveries)
            .iter()
            .filter(|m| m.session_id == identifier)
            .cloned()
            .collect()
    }

    /// Number of clients created so far
    pub fn clients_created(&self) -> usize {
        self.inner.clients_created.load(Ordering::SeqCst)
    }

    /// Number of clients not yet disconnected
    pub fn live_clients(&self) -> usize {
        read(&self.inner.clients).len()
    }

    /// Number of login calls so far
    pub fn login_attempts(&self) -> usize {
        self.inner.login_attempts.load(Ordering::SeqCst)
    }

    /// True if some client logged in as `identifier` is still connected
    pub fn is_connected(&self, identifier: &str) -> bool {
        read(&self.inner.clients)
            .iter()
            .any(|c| c.is_live_as(identifier))
    }

    /// True if some client logged in as `identifier` had `disconnect` called
    pub fn was_disconnected(&self, identifier: &str) -> bool {
        read(&self.inner.disconnected).contains(identifier)
    }

    fn drop_client(&self, shared: &Arc<ClientShared>) {
        write(&self.inner.clients).retain(|c| !Arc::ptr_eq(c, shared));
    }

    fn record_delivery(&self, message: SentMessage) {
        let max = self.inner.config.max_deliveries;
        let mut deliveries = write(&self.inner.deliveries);
        deliveries.push(message);
        if max > 0 && deliveries.len() > max {
            let drain_count = deliveries.len() - max;
            deliveries.drain(..drain_count);
        }
    }

    fn resolve_account(&self, credential: &str) -> Result<MemoryAccount> {
        if let Some(account) = read(&self.inner.accounts).get(credential) {
            return Ok(account.clone());
        }
        let config = &self.inner.config;
        if config.accept_unknown && !credential.is_empty() {
            return Ok(MemoryAccount::new(format!("{}{}", config.tag_prefix, credential))
                .with_channels(config.default_channels.clone()));
        }
        Err(SessionError::AuthenticationFailed(
            "An invalid token was provided".to_string(),
        ))
    }
}

impl GatewayConnector for MemoryGateway {
    fn create_client(&self) -> Result<Box<dyn GatewayClient>> {
        let (events, _) = broadcast::channel(16);
        let shared = Arc::new(ClientShared {
            events,
            identifier: RwLock::new(None),
            account: RwLock::new(None),
            disconnected: AtomicBool::new(false),
        });
        write(&self.inner.clients).push(shared.clone());
        self.inner.clients_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryClient {
            gateway: self.clone(),
            shared,
        }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct ClientShared {
    events: broadcast::Sender<GatewayEvent>,
    identifier: RwLock<Option<String>>,
    account: RwLock<Option<MemoryAccount>>,
    disconnected: AtomicBool,
}

impl ClientShared {
    fn is_live_as(&self, identifier: &str) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
            && read(&self.identifier).as_deref() == Some(identifier)
    }
}

struct MemoryClient {
    gateway: MemoryGateway,
    shared: Arc<ClientShared>,
}

#[async_trait]
impl GatewayClient for MemoryClient {
    fn subscribe(&self) -> Box<dyn GatewayEvents> {
        Box::new(BroadcastEvents::new(self.shared.events.subscribe()))
    }

    async fn login(&self, credential: &str) -> Result<LoginAck> {
        self.gateway.inner.login_attempts.fetch_add(1, Ordering::SeqCst);

        let account = match self.gateway.resolve_account(credential) {
            Ok(account) => account,
            Err(e) => {
                self.gateway.drop_client(&self.shared);
                return Err(e);
            }
        };
        if account.stall_login {
            std::future::pending::<()>().await;
        }
        if let Some(reason) = &account.login_rejection {
            self.gateway.drop_client(&self.shared);
            return Err(SessionError::AuthenticationFailed(reason.clone()));
        }

        let identifier = account.identifier.clone();
        let emit_ready = account.emit_ready;
        *write(&self.shared.identifier) = Some(identifier.clone());
        *write(&self.shared.account) = Some(account);

        if emit_ready {
            let _ = self.shared.events.send(GatewayEvent::Ready);
        }

        Ok(LoginAck { identifier })
    }

    fn channels(&self) -> Vec<Arc<dyn GatewayChannel>> {
        let account = read(&self.shared.account);
        let Some(account) = account.as_ref() else {
            return Vec::new();
        };
        account
            .channels
            .iter()
            .map(|name| {
                Arc::new(MemoryChannel {
                    name: name.clone(),
                    session_id: account.identifier.clone(),
                    reject_sends: account.reject_sends,
                    stall_sends: account.stall_sends,
                    gateway: self.gateway.clone(),
                    shared: self.shared.clone(),
                }) as Arc<dyn GatewayChannel>
            })
            .collect()
    }

    async fn disconnect(&self) -> Result<()> {
        let (stall, fail) = read(&self.shared.account)
            .as_ref()
            .map(|a| (a.stall_disconnect, a.fail_disconnect))
            .unwrap_or((false, false));
        if stall {
            std::future::pending::<()>().await;
        }

        self.shared.disconnected.store(true, Ordering::SeqCst);
        self.gateway.drop_client(&self.shared);
        let identifier = read(&self.shared.identifier).clone();
        if let Some(identifier) = identifier {
            write(&self.gateway.inner.disconnected).insert(identifier);
        }
        if fail {
            return Err(SessionError::Connection(
                "WebSocket was closed before the connection was established".to_string(),
            ));
        }
        Ok(())
    }
}

struct MemoryChannel {
    name: String,
    session_id: String,
    reject_sends: bool,
    stall_sends: bool,
    gateway: MemoryGateway,
    shared: Arc<ClientShared>,
}

#[async_trait]
impl GatewayChannel for MemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_text(&self, text: &str) -> Result<DeliveryResult> {
        if self.stall_sends {
            std::future::pending::<()>().await;
        }
        if self.shared.disconnected.load(Ordering::SeqCst) {
            return Err(SessionError::TransportRejected(
                "Client is disconnected".to_string(),
            ));
        }
        if self.reject_sends {
            return Err(SessionError::TransportRejected(
                "Missing Permissions".to_string(),
            ));
        }

        let message_id = uuid::Uuid::new_v4().to_string();
        self.gateway.record_delivery(SentMessage {
            message_id: message_id.clone(),
            session_id: self.session_id.clone(),
            channel: self.name.clone(),
            text: text.to_string(),
        });

        Ok(DeliveryResult {
            message_id,
            session_id: self.session_id.clone(),
            channel: self.name.clone(),
            delivered_at: now_millis(),
        })
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
