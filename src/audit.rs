//! Decision audit trail
//!
//! Every terminal decision is recorded with the facts that produced it and
//! an integrity hash of the session record at commit time. Because the
//! decision engine is pure, replaying a record's facts through it must
//! reproduce the stored outcome.

use crate::models::{Decision, Facts, SessionRecord};
use crate::Result;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DecisionRecord {
    pub audit_id: Uuid,
    pub session_id: String,
    pub facts: Facts,
    pub decision: Decision,
    pub record_hash: String,
}

/// Audit trail storage
pub struct DecisionAuditLog {
    records: Arc<RwLock<HashMap<Uuid, DecisionRecord>>>,
}

impl DecisionAuditLog {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record the decision committed for a session. Returns the audit id.
    pub async fn record(&self, record: &SessionRecord, decision: &Decision) -> Result<Uuid> {
        let entry = DecisionRecord {
            audit_id: Uuid::new_v4(),
            session_id: record.session_id.clone(),
            facts: record.facts.clone(),
            decision: decision.clone(),
            record_hash: compute_record_hash(record),
        };

        let audit_id = entry.audit_id;
        let mut records = self.records.write().await;
        records.insert(audit_id, entry);
        Ok(audit_id)
    }

    pub async fn get(&self, audit_id: Uuid) -> Result<Option<DecisionRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&audit_id).cloned())
    }

    /// All decisions recorded for a session, oldest first.
    pub async fn list_for_session(&self, session_id: &str) -> Result<Vec<DecisionRecord>> {
        let records = self.records.read().await;

        let mut items: Vec<_> = records
            .values()
            .filter(|record| record.session_id == session_id)
            .cloned()
            .collect();
        items.sort_by_key(|record| record.decision.decided_at);
        Ok(items)
    }

    /// Re-hash the live session record against the stored hash.
    pub async fn verify_integrity(&self, audit_id: Uuid, record: &SessionRecord) -> Result<bool> {
        let records = self.records.read().await;

        if let Some(entry) = records.get(&audit_id) {
            Ok(entry.record_hash == compute_record_hash(record))
        } else {
            Ok(false)
        }
    }
}

impl Default for DecisionAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute SHA256 hash of a session record for integrity verification.
/// Streams serialized JSON directly into the hasher.
pub fn compute_record_hash(record: &SessionRecord) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), record).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DecisionOutcome, DecisionReason};
    use chrono::Utc;

    fn decided_record() -> (SessionRecord, Decision) {
        let mut record = SessionRecord::new("s1".to_string());
        record.facts.credit_score = Some(780);
        record.facts.requested_amount = Some(200_000.0);

        let decision = Decision {
            outcome: DecisionOutcome::Approved,
            reason: DecisionReason::WithinPreApprovedLimit,
            decided_at: Utc::now(),
        };
        (record, decision)
    }

    #[tokio::test]
    async fn test_record_and_replay() {
        let log = DecisionAuditLog::new();
        let (record, decision) = decided_record();

        let audit_id = log.record(&record, &decision).await.unwrap();
        let stored = log.get(audit_id).await.unwrap().unwrap();

        assert_eq!(stored.session_id, "s1");
        assert_eq!(stored.decision.outcome, DecisionOutcome::Approved);

        let listed = log.list_for_session("s1").await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_integrity_detects_tampering() {
        let log = DecisionAuditLog::new();
        let (record, decision) = decided_record();

        let audit_id = log.record(&record, &decision).await.unwrap();
        assert!(log.verify_integrity(audit_id, &record).await.unwrap());

        let mut tampered = record.clone();
        tampered.facts.requested_amount = Some(900_000.0);
        assert!(!log.verify_integrity(audit_id, &tampered).await.unwrap());
    }

    #[test]
    fn test_hash_is_stable() {
        let (record, _) = decided_record();
        assert_eq!(compute_record_hash(&record), compute_record_hash(&record));
    }
}
