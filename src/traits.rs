//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::reconciliation::validator::MatchAssessment;
use crate::types::*;

/// Guard checked by the store before a write is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// The document must not exist yet
    MustNotExist,
    /// The stored document must still be at this version
    Version(u64),
}

/// A single document write inside a [`WriteBatch`]
#[derive(Debug, Clone)]
pub enum Write {
    PutEntry {
        entry: LedgerEntry,
        precondition: Precondition,
    },
    DeleteEntry {
        id: String,
        precondition: Precondition,
    },
    PutBankRecord {
        record: BankRecord,
        precondition: Precondition,
    },
    PutSettlement {
        settlement: Settlement,
        precondition: Precondition,
    },
}

/// A set of writes applied all-or-nothing.
///
/// Update helpers take the document's `version` as the precondition, so a
/// batch built from a fresh read fails with [`ReconError::Conflict`] if any
/// of those documents changed in between.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_entry(&mut self, entry: LedgerEntry) -> &mut Self {
        self.writes.push(Write::PutEntry {
            entry,
            precondition: Precondition::MustNotExist,
        });
        self
    }

    pub fn update_entry(&mut self, entry: LedgerEntry) -> &mut Self {
        let precondition = Precondition::Version(entry.version);
        self.writes.push(Write::PutEntry {
            entry,
            precondition,
        });
        self
    }

    pub fn delete_entry(&mut self, entry: &LedgerEntry) -> &mut Self {
        self.writes.push(Write::DeleteEntry {
            id: entry.id.clone(),
            precondition: Precondition::Version(entry.version),
        });
        self
    }

    pub fn create_bank_record(&mut self, record: BankRecord) -> &mut Self {
        self.writes.push(Write::PutBankRecord {
            record,
            precondition: Precondition::MustNotExist,
        });
        self
    }

    pub fn update_bank_record(&mut self, record: BankRecord) -> &mut Self {
        let precondition = Precondition::Version(record.version);
        self.writes.push(Write::PutBankRecord {
            record,
            precondition,
        });
        self
    }

    pub fn create_settlement(&mut self, settlement: Settlement) -> &mut Self {
        self.writes.push(Write::PutSettlement {
            settlement,
            precondition: Precondition::MustNotExist,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}

/// Document collections kept by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Entries,
    BankRecords,
    Settlements,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChange {
    pub collection: Collection,
    pub id: String,
    pub kind: ChangeKind,
}

/// Everything one committed batch changed, published as a single event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub changes: Vec<DocumentChange>,
    pub committed_at: NaiveDateTime,
}

/// Reconciliation-state filter for entry queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconciliationFilter {
    #[default]
    Any,
    Reconciled,
    /// Unreconciled and waiting in `pending_reconciliation`
    Outstanding,
}

/// Query over ledger entries
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub reconciliation: ReconciliationFilter,
    pub kind: Option<EntryKind>,
    pub status: Option<EntryStatus>,
    pub location: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl EntryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn outstanding() -> Self {
        Self {
            reconciliation: ReconciliationFilter::Outstanding,
            ..Self::default()
        }
    }

    pub fn reconciled() -> Self {
        Self {
            reconciliation: ReconciliationFilter::Reconciled,
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_status(mut self, status: EntryStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn at_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn between(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        let reconciliation_ok = match self.reconciliation {
            ReconciliationFilter::Any => true,
            ReconciliationFilter::Reconciled => entry.reconciled,
            ReconciliationFilter::Outstanding => entry.needs_reconciliation(),
        };

        reconciliation_ok
            && self.kind.is_none_or(|k| entry.kind() == k)
            && self.status.is_none_or(|s| entry.status == s)
            && self
                .location
                .as_ref()
                .is_none_or(|l| &entry.location == l)
            && within(entry.date.date(), self.start_date, self.end_date)
    }
}

/// Query over bank records
#[derive(Debug, Clone, Default)]
pub struct BankRecordFilter {
    pub matched: Option<bool>,
    /// `Some(true)` only settlement deposits, `Some(false)` excludes them
    pub settlement_deposits: Option<bool>,
    pub source: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl BankRecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Unmatched lines in the general matching pool
    pub fn unmatched() -> Self {
        Self {
            matched: Some(false),
            settlement_deposits: Some(false),
            ..Self::default()
        }
    }

    /// Unmatched aggregated processor payouts
    pub fn unmatched_settlements() -> Self {
        Self {
            matched: Some(false),
            settlement_deposits: Some(true),
            ..Self::default()
        }
    }

    pub fn from_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn between(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    pub fn matches(&self, record: &BankRecord) -> bool {
        self.matched.is_none_or(|m| record.is_matched() == m)
            && self
                .settlement_deposits
                .is_none_or(|s| record.is_settlement_deposit() == s)
            && self.source.as_ref().is_none_or(|s| &record.source == s)
            && within(record.date, self.start_date, self.end_date)
    }
}

pub(crate) fn within(date: NaiveDate, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    start.is_none_or(|s| date >= s) && end.is_none_or(|e| date <= e)
}

/// Storage abstraction for the reconciliation engine
///
/// Any document store with a transactional batch primitive can back the
/// engine. Writes go exclusively through [`ReconStore::commit`]; every
/// committed batch is announced on the change feed.
#[async_trait]
pub trait ReconStore: Send + Sync {
    /// Get a ledger entry by ID
    async fn get_entry(&self, entry_id: &str) -> ReconResult<Option<LedgerEntry>>;

    /// List ledger entries ordered by (date, id)
    async fn list_entries(&self, filter: &EntryFilter) -> ReconResult<Vec<LedgerEntry>>;

    /// Get a bank record by ID
    async fn get_bank_record(&self, record_id: &str) -> ReconResult<Option<BankRecord>>;

    /// List bank records ordered by (date, id)
    async fn list_bank_records(&self, filter: &BankRecordFilter) -> ReconResult<Vec<BankRecord>>;

    /// Get a settlement by ID
    async fn get_settlement(&self, settlement_id: &str) -> ReconResult<Option<Settlement>>;

    /// List settlements whose settlement date falls within the range
    async fn list_settlements(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> ReconResult<Vec<Settlement>>;

    /// Apply a batch atomically. Any failed precondition or invariant rejects
    /// the whole batch and nothing is written.
    async fn commit(&self, batch: WriteBatch) -> ReconResult<ChangeSet>;

    /// Subscribe to committed change sets
    fn subscribe(&self) -> broadcast::Receiver<ChangeSet>;
}

/// Trait for implementing match validation rules
pub trait MatchValidator: Send + Sync {
    /// Validate a selection destined for one commit. Entries and records are
    /// fresh reads from the store.
    fn validate_match(
        &self,
        entries: &[LedgerEntry],
        bank_records: &[BankRecord],
        confirmed: bool,
    ) -> ReconResult<MatchAssessment>;
}
