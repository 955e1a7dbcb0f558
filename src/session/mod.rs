//! Session persistence layer
//!
//! Durable mapping from session identifier to session record. The
//! compare-and-swap contract is the sole mutation path; nothing in this
//! crate writes a session any other way, which serializes updates per
//! session without any cross-session locking.

use crate::error::OrchestrationError;
use crate::models::SessionRecord;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

mod postgres;
pub use postgres::PgSessionStore;

#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session. `SessionNotFound` if the id was never created.
    async fn get(&self, session_id: &str) -> Result<SessionRecord>;

    /// Create a fresh record at version 0. `SessionAlreadyExists` on reuse.
    async fn create(&self, session_id: &str) -> Result<SessionRecord>;

    /// Commit `updated` if the stored version still equals
    /// `expected_version`. Returns the committed record (version bumped by
    /// exactly one) or `VersionConflict`.
    async fn compare_and_swap(
        &self,
        session_id: &str,
        expected_version: u64,
        updated: SessionRecord,
    ) -> Result<SessionRecord>;
}

/// In-memory store for development and tests.
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<SessionRecord> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| OrchestrationError::SessionNotFound(session_id.to_string()))
    }

    async fn create(&self, session_id: &str) -> Result<SessionRecord> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(session_id) {
            return Err(OrchestrationError::SessionAlreadyExists(
                session_id.to_string(),
            ));
        }
        let record = SessionRecord::new(session_id.to_string());
        sessions.insert(session_id.to_string(), record.clone());
        Ok(record)
    }

    async fn compare_and_swap(
        &self,
        session_id: &str,
        expected_version: u64,
        mut updated: SessionRecord,
    ) -> Result<SessionRecord> {
        let mut sessions = self.sessions.write().await;

        let current = sessions
            .get(session_id)
            .ok_or_else(|| OrchestrationError::SessionNotFound(session_id.to_string()))?;

        if current.version != expected_version {
            return Err(OrchestrationError::VersionConflict {
                session_id: session_id.to_string(),
                expected: expected_version,
                actual: current.version,
            });
        }

        updated.version = expected_version + 1;
        updated.updated_at = chrono::Utc::now();
        sessions.insert(session_id.to_string(), updated.clone());
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Stage;

    #[tokio::test]
    async fn test_create_then_get() {
        let store = InMemorySessionStore::new();
        let created = store.create("s1").await.unwrap();
        assert_eq!(created.version, 0);
        assert_eq!(created.stage, Stage::Greeting);

        let loaded = store.get("s1").await.unwrap();
        assert_eq!(loaded, created);
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let store = InMemorySessionStore::new();
        store.create("s1").await.unwrap();

        match store.create("s1").await {
            Err(OrchestrationError::SessionAlreadyExists(id)) => assert_eq!(id, "s1"),
            other => panic!("expected AlreadyExists, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_missing_session() {
        let store = InMemorySessionStore::new();
        assert!(matches!(
            store.get("nope").await,
            Err(OrchestrationError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cas_bumps_version_by_one() {
        let store = InMemorySessionStore::new();
        let mut record = store.create("s1").await.unwrap();

        record.stage = Stage::Sales;
        let committed = store.compare_and_swap("s1", 0, record).await.unwrap();
        assert_eq!(committed.version, 1);

        let mut next = committed.clone();
        next.stage = Stage::Verification;
        let committed = store.compare_and_swap("s1", 1, next).await.unwrap();
        assert_eq!(committed.version, 2);
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let store = InMemorySessionStore::new();
        let record = store.create("s1").await.unwrap();

        // First writer wins
        store
            .compare_and_swap("s1", 0, record.clone())
            .await
            .unwrap();

        // Second writer with the same expected version loses
        match store.compare_and_swap("s1", 0, record).await {
            Err(OrchestrationError::VersionConflict {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 0);
                assert_eq!(actual, 1);
            }
            other => panic!("expected VersionConflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrent_commits_never_both_succeed() {
        let store = Arc::new(InMemorySessionStore::new());
        let record = store.create("s1").await.unwrap();

        let a = {
            let store = store.clone();
            let record = record.clone();
            tokio::spawn(async move { store.compare_and_swap("s1", 0, record).await })
        };
        let b = {
            let store = store.clone();
            let record = record.clone();
            tokio::spawn(async move { store.compare_and_swap("s1", 0, record).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
    }
}
