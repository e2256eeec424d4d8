//! Spendgate Audit - immutable transaction log
//!
//! Every reservation terminal transition produces exactly one
//! [`TransactionRecord`]. The log is append-only and hash-chained so the
//! trail is verifiable after the fact: each chained record carries the hash
//! of its predecessor.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use spendgate_types::{
    AgentId, Amount, Fault, Outcome, RecordId, ReservationId, Result, TransactionRecord,
};

/// A transaction record with its chain linkage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainedRecord {
    pub record: TransactionRecord,
    /// Hash of the previous chained record ("genesis" for the first)
    pub previous_hash: String,
    /// Hash over this record and its predecessor's hash
    pub hash: String,
}

impl ChainedRecord {
    /// Compute the hash for this record
    pub fn compute_hash(&self) -> String {
        let content = format!(
            "{}:{}:{}:{}:{:?}:{}",
            self.previous_hash,
            self.record.id,
            self.record.reservation_id,
            self.record.reserved_amount.0,
            self.record.outcome,
            self.record.recorded_at.timestamp_millis(),
        );
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Verify the stored hash
    pub fn verify(&self) -> bool {
        self.hash == self.compute_hash()
    }
}

/// The transaction log seam
#[async_trait]
pub trait TransactionLog: Send + Sync {
    /// Append a record
    ///
    /// Exactly one record is allowed per reservation terminal transition;
    /// a second append for the same reservation (refunds excepted, which
    /// reference the original record) is `Fault::DuplicateRecord`.
    async fn append(&self, record: TransactionRecord) -> Result<ChainedRecord>;

    /// Fetch a record by ID
    async fn get(&self, id: &RecordId) -> Result<TransactionRecord>;

    /// The record terminalizing a reservation, if one exists
    async fn for_reservation(&self, id: &ReservationId) -> Result<Option<TransactionRecord>>;

    /// All records for an agent, oldest first
    async fn for_agent(&self, id: &AgentId) -> Result<Vec<TransactionRecord>>;

    /// The newest records, newest first
    async fn recent(&self, limit: usize) -> Result<Vec<TransactionRecord>>;

    /// Sum of all refunds already issued against an original record
    async fn refunded_total(&self, original: &RecordId) -> Result<Amount>;

    /// Walk the chain and verify every link
    async fn verify_chain(&self) -> Result<bool>;
}

/// In-memory [`TransactionLog`]
#[derive(Clone, Default)]
pub struct MemoryTransactionLog {
    inner: Arc<RwLock<LogInner>>,
}

#[derive(Default)]
struct LogInner {
    records: Vec<ChainedRecord>,
    by_reservation: HashMap<ReservationId, usize>,
}

impl MemoryTransactionLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionLog for MemoryTransactionLog {
    async fn append(&self, record: TransactionRecord) -> Result<ChainedRecord> {
        let mut inner = self.inner.write().await;

        let is_refund = matches!(record.outcome, Outcome::Refunded { .. });
        if !is_refund && inner.by_reservation.contains_key(&record.reservation_id) {
            return Err(Fault::DuplicateRecord {
                reservation_id: record.reservation_id.to_string(),
            }
            .into());
        }

        let previous_hash = inner
            .records
            .last()
            .map(|r| r.hash.clone())
            .unwrap_or_else(|| "genesis".to_string());

        let mut chained = ChainedRecord {
            record,
            previous_hash,
            hash: String::new(),
        };
        chained.hash = chained.compute_hash();

        let index = inner.records.len();
        if !is_refund {
            inner
                .by_reservation
                .insert(chained.record.reservation_id, index);
        }
        inner.records.push(chained.clone());
        Ok(chained)
    }

    async fn get(&self, id: &RecordId) -> Result<TransactionRecord> {
        let inner = self.inner.read().await;
        inner
            .records
            .iter()
            .find(|r| &r.record.id == id)
            .map(|r| r.record.clone())
            .ok_or_else(|| {
                Fault::RecordNotFound {
                    record_id: id.to_string(),
                }
                .into()
            })
    }

    async fn for_reservation(&self, id: &ReservationId) -> Result<Option<TransactionRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_reservation
            .get(id)
            .and_then(|&i| inner.records.get(i))
            .map(|r| r.record.clone()))
    }

    async fn for_agent(&self, id: &AgentId) -> Result<Vec<TransactionRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .filter(|r| &r.record.agent_id == id)
            .map(|r| r.record.clone())
            .collect())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<TransactionRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .rev()
            .take(limit)
            .map(|r| r.record.clone())
            .collect())
    }

    async fn refunded_total(&self, original: &RecordId) -> Result<Amount> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .filter_map(|r| match &r.record.outcome {
                Outcome::Refunded { original: o, amount } if o == original => Some(*amount),
                _ => None,
            })
            .sum())
    }

    async fn verify_chain(&self) -> Result<bool> {
        let inner = self.inner.read().await;
        let mut previous = "genesis".to_string();
        for record in &inner.records {
            if record.previous_hash != previous || !record.verify() {
                return Ok(false);
            }
            previous = record.hash.clone();
        }
        Ok(true)
    }
}
