//! Session registry — identifier → active session
//!
//! Constructed explicitly and shared via `Arc`; independent registries can
//! coexist in one process. The lock guards map operations only and is never
//! held across a gateway call.

use crate::error::{Result, SessionError};
use crate::session::SessionRecord;
use crate::types::SessionInfo;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory lookup table of active sessions
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionRecord>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under its identifier
    ///
    /// Fails with `DuplicateSession` if the identifier is already taken;
    /// the existing entry is left untouched.
    pub async fn insert(&self, record: Arc<SessionRecord>) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(record.identifier()) {
            return Err(SessionError::DuplicateSession(
                record.identifier().to_string(),
            ));
        }
        sessions.insert(record.identifier().to_string(), record);
        Ok(())
    }

    /// Exact, case-sensitive lookup
    pub async fn find(&self, identifier: &str) -> Result<Arc<SessionRecord>> {
        self.sessions
            .read()
            .await
            .get(identifier)
            .cloned()
            .ok_or_else(|| SessionError::SessionNotFound(identifier.to_string()))
    }

    /// Remove and return the entry for `identifier`
    pub async fn remove(&self, identifier: &str) -> Result<Arc<SessionRecord>> {
        self.sessions
            .write()
            .await
            .remove(identifier)
            .ok_or_else(|| SessionError::SessionNotFound(identifier.to_string()))
    }

    /// Remove `record` only if it is still the registered entry
    ///
    /// Returns false when the identifier is absent or now maps to a
    /// different session.
    pub async fn remove_if_same(&self, record: &Arc<SessionRecord>) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(record.identifier()) {
            Some(current) if Arc::ptr_eq(current, record) => {
                sessions.remove(record.identifier());
                true
            }
            _ => false,
        }
    }

    pub async fn contains(&self, identifier: &str) -> bool {
        self.sessions.read().await.contains_key(identifier)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Registered identifiers, sorted
    pub async fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of every registered session, sorted by identifier
    pub async fn snapshot(&self) -> Vec<SessionInfo> {
        let records: Vec<Arc<SessionRecord>> =
            self.sessions.read().await.values().cloned().collect();
        let mut infos: Vec<SessionInfo> = records.iter().map(|r| r.info()).collect();
        infos.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::MemoryGateway;
    use crate::gateway::GatewayConnector;

    async fn active(gateway: &MemoryGateway, credential: &str) -> Arc<SessionRecord> {
        let client = gateway.create_client().unwrap();
        let ack = client.login(credential).await.unwrap();
        let record = SessionRecord::new(ack.identifier, client);
        record.activate();
        Arc::new(record)
    }

    #[tokio::test]
    async fn test_insert_find_remove() {
        let gateway = MemoryGateway::default();
        let registry = SessionRegistry::new();
        let record = active(&gateway, "tok1").await;

        registry.insert(record.clone()).await.unwrap();
        assert_eq!(registry.len().await, 1);
        assert!(registry.contains("user#tok1").await);

        let found = registry.find("user#tok1").await.unwrap();
        assert!(Arc::ptr_eq(&found, &record));

        registry.remove("user#tok1").await.unwrap();
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_find_is_exact_match() {
        let gateway = MemoryGateway::default();
        let registry = SessionRegistry::new();
        registry.insert(active(&gateway, "tok1").await).await.unwrap();

        assert_eq!(
            registry.find("USER#tok1").await.unwrap_err(),
            SessionError::SessionNotFound("USER#tok1".to_string())
        );
        assert!(registry.find("user#tok").await.is_err());
    }

    #[tokio::test]
    async fn test_remove_missing_fails() {
        let registry = SessionRegistry::new();
        assert!(matches!(
            registry.remove("ghost").await,
            Err(SessionError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_rejected_keeps_original() {
        let gateway = MemoryGateway::default();
        let registry = SessionRegistry::new();
        let first = active(&gateway, "tok1").await;
        let second = active(&gateway, "tok1").await;

        registry.insert(first.clone()).await.unwrap();
        assert_eq!(
            registry.insert(second).await.unwrap_err(),
            SessionError::DuplicateSession("user#tok1".to_string())
        );

        let found = registry.find("user#tok1").await.unwrap();
        assert!(Arc::ptr_eq(&found, &first));
    }

    #[tokio::test]
    async fn test_remove_if_same_ignores_replacement() {
        let gateway = MemoryGateway::default();
        let registry = SessionRegistry::new();
        let old = active(&gateway, "tok1").await;
        let new = active(&gateway, "tok1").await;

        registry.insert(old.clone()).await.unwrap();
        registry.remove("user#tok1").await.unwrap();
        registry.insert(new.clone()).await.unwrap();

        assert!(!registry.remove_if_same(&old).await);
        assert!(registry.contains("user#tok1").await);
        assert!(registry.remove_if_same(&new).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_snapshot_sorted() {
        let gateway = MemoryGateway::default();
        let registry = SessionRegistry::new();
        registry.insert(active(&gateway, "b").await).await.unwrap();
        registry.insert(active(&gateway, "a").await).await.unwrap();

        let ids: Vec<String> = registry
            .snapshot()
            .await
            .into_iter()
            .map(|i| i.identifier)
            .collect();
        assert_eq!(ids, vec!["user#a", "user#b"]);
        assert_eq!(registry.identifiers().await, ids);
    }
}
