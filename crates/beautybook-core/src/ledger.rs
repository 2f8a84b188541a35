use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Discriminates the three append-only streams that share this hash-chain
/// primitive: point-balance changes, audit events, and security events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryKind {
    PointTransaction,
    Audit,
    Security,
}

/// Hash-chained, append-only entry. Every entry commits to its own payload
/// and to the previous entry's hash, so any tampering with historical rows
/// is detectable by recomputing the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub entry_id: String,
    pub index: u64,
    pub subject_id: String,
    pub kind: LogEntryKind,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}

/// Append-only log with hash-chain proofs.
///
/// No in-place mutation API is exposed. Every state change is an additional
/// record; reversals are themselves new entries (`reverseByPayment`,
/// `expire`), never updates to existing rows.
#[derive(Debug, Default, Clone)]
pub struct AppendOnlyLog {
    entries: Vec<LogEntry>,
}

impl AppendOnlyLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Rebuild from persisted rows and verify hash-chain integrity.
    pub fn from_entries(entries: Vec<LogEntry>) -> Result<Self, CoreError> {
        let log = Self { entries };
        for (expected_index, entry) in log.entries.iter().enumerate() {
            if entry.index != expected_index as u64 {
                return Err(CoreError::Internal(format!(
                    "ledger index gap detected at position {expected_index} (found {})",
                    entry.index
                )));
            }
        }
        if !log.verify_chain() {
            return Err(CoreError::Internal(
                "persisted ledger hash-chain verification failed".to_string(),
            ));
        }
        Ok(log)
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn entries_for_subject(&self, subject_id: &str) -> impl Iterator<Item = &LogEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.subject_id == subject_id)
    }

    pub fn append<T: Serialize>(
        &mut self,
        subject_id: &str,
        kind: LogEntryKind,
        payload: &T,
    ) -> Result<LogEntry, CoreError> {
        let payload = serde_json::to_value(payload)?;
        let entry = self.build_entry(subject_id, kind, payload);
        self.commit_entry(entry.clone())?;
        Ok(entry)
    }

    fn build_entry(&self, subject_id: &str, kind: LogEntryKind, payload: Value) -> LogEntry {
        let index = self.entries.len() as u64;
        let timestamp = Utc::now();
        let previous_hash = self.entries.last().map(|e| e.entry_hash.clone());
        let entry_hash = compute_entry_hash(
            index,
            subject_id,
            &kind,
            timestamp,
            &payload,
            previous_hash.as_deref(),
        );
        LogEntry {
            entry_id: Uuid::new_v4().to_string(),
            index,
            subject_id: subject_id.to_string(),
            kind,
            timestamp,
            payload,
            previous_hash,
            entry_hash,
        }
    }

    pub fn commit_entry(&mut self, entry: LogEntry) -> Result<(), CoreError> {
        let expected_index = self.entries.len() as u64;
        if entry.index != expected_index {
            return Err(CoreError::Internal(format!(
                "commit index mismatch: expected {expected_index}, got {}",
                entry.index
            )));
        }
        let expected_previous = self.entries.last().map(|e| e.entry_hash.clone());
        if entry.previous_hash != expected_previous {
            return Err(CoreError::Internal(
                "commit previous-hash mismatch".to_string(),
            ));
        }
        let expected_hash = compute_entry_hash(
            entry.index,
            &entry.subject_id,
            &entry.kind,
            entry.timestamp,
            &entry.payload,
            entry.previous_hash.as_deref(),
        );
        if entry.entry_hash != expected_hash {
            return Err(CoreError::Internal(
                "commit hash mismatch for ledger entry".to_string(),
            ));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn verify_chain(&self) -> bool {
        let mut previous_hash: Option<String> = None;
        for entry in &self.entries {
            let expected_hash = compute_entry_hash(
                entry.index,
                &entry.subject_id,
                &entry.kind,
                entry.timestamp,
                &entry.payload,
                previous_hash.as_deref(),
            );
            if entry.entry_hash != expected_hash || entry.previous_hash != previous_hash {
                return false;
            }
            previous_hash = Some(entry.entry_hash.clone());
        }
        true
    }
}

fn compute_entry_hash(
    index: u64,
    subject_id: &str,
    kind: &LogEntryKind,
    timestamp: DateTime<Utc>,
    payload: &Value,
    previous_hash: Option<&str>,
) -> String {
    let material = serde_json::json!({
        "index": index,
        "subject_id": subject_id,
        "kind": kind,
        "timestamp": timestamp,
        "payload": payload,
        "previous_hash": previous_hash,
    });
    let bytes = serde_json::to_vec(&material).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PointTransaction, PointTransactionType};

    fn sample_entry(user: &str, amount: i64) -> PointTransaction {
        PointTransaction {
            id: Uuid::new_v4().to_string(),
            user_id: user.to_string(),
            amount,
            tx_type: PointTransactionType::EarnedPurchase,
            payment_id: None,
            referrer_user_id: None,
            created_at: Utc::now(),
            expires_at: None,
            source_tx_id: None,
        }
    }

    #[test]
    fn verifies_hash_chain() {
        let mut log = AppendOnlyLog::new();
        log.append("user-1", LogEntryKind::PointTransaction, &sample_entry("user-1", 1000))
            .unwrap();
        log.append("user-1", LogEntryKind::PointTransaction, &sample_entry("user-1", -200))
            .unwrap();
        assert!(log.verify_chain());
    }

    #[test]
    fn detects_tampered_entries() {
        let mut log = AppendOnlyLog::new();
        log.append("user-1", LogEntryKind::PointTransaction, &sample_entry("user-1", 1000))
            .unwrap();

        let mut tampered = log.clone();
        tampered.entries[0].payload = serde_json::json!({"tampered": true});
        assert!(!tampered.verify_chain());
    }

    #[test]
    fn from_entries_rejects_broken_chain() {
        let mut log = AppendOnlyLog::new();
        log.append("user-1", LogEntryKind::PointTransaction, &sample_entry("user-1", 1000))
            .unwrap();
        let mut entries = log.entries().to_vec();
        entries[0].entry_hash = "deadbeef".to_string();
        assert!(AppendOnlyLog::from_entries(entries).is_err());
    }
}
