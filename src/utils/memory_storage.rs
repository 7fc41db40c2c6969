//! In-memory storage implementation for testing

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

use crate::traits::*;
use crate::types::*;

const CHANGE_FEED_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct Documents {
    entries: HashMap<String, LedgerEntry>,
    bank_records: HashMap<String, BankRecord>,
    settlements: HashMap<String, Settlement>,
}

/// In-memory storage implementation for testing and development
///
/// All collections sit behind one lock, so readers see either none or all of
/// a committed batch.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    documents: Arc<RwLock<Documents>>,
    changes: broadcast::Sender<ChangeSet>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            documents: Arc::new(RwLock::new(Documents::default())),
            changes,
        }
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> ReconResult<()> {
        let mut docs = self.documents.write().map_err(poisoned)?;
        docs.entries.clear();
        docs.bank_records.clear();
        docs.settlements.clear();
        Ok(())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> ReconError {
    ReconError::Storage("memory store lock poisoned".to_string())
}

fn check_precondition(
    collection: &str,
    id: &str,
    current: Option<u64>,
    precondition: Precondition,
) -> ReconResult<()> {
    match (precondition, current) {
        (Precondition::MustNotExist, None) => Ok(()),
        (Precondition::MustNotExist, Some(_)) => Err(ReconError::Conflict(format!(
            "{} '{}' already exists",
            collection, id
        ))),
        (Precondition::Version(expected), Some(actual)) if expected == actual => Ok(()),
        (Precondition::Version(expected), Some(actual)) => Err(ReconError::Conflict(format!(
            "{} '{}' was modified concurrently (expected version {}, found {})",
            collection, id, expected, actual
        ))),
        (Precondition::Version(_), None) => Err(ReconError::Conflict(format!(
            "{} '{}' no longer exists",
            collection, id
        ))),
    }
}

fn check_entry_update(current: &LedgerEntry, next: &LedgerEntry) -> ReconResult<()> {
    if current.reconciled && !next.reconciled {
        return Err(ReconError::Validation(format!(
            "Entry '{}' is reconciled and cannot be un-reconciled",
            current.id
        )));
    }

    if current.matched_bank_record_id.is_some()
        && current.matched_bank_record_id != next.matched_bank_record_id
    {
        return Err(ReconError::Validation(format!(
            "Entry '{}' is already linked to a bank record",
            current.id
        )));
    }

    if current.kind() != next.kind() {
        return Err(ReconError::Validation(format!(
            "Entry '{}' cannot change kind",
            current.id
        )));
    }

    if current.status != next.status {
        let reachable = [StatusEvent::Disbursed, StatusEvent::Reconciled]
            .into_iter()
            .any(|event| matches!(current.status.apply(event), Ok(status) if status == next.status));
        if !reachable {
            return Err(ReconError::Validation(format!(
                "Entry '{}' cannot move from {:?} to {:?}",
                current.id, current.status, next.status
            )));
        }
    }

    // Completion through the bank and the link land in the same write
    let completing = current.status == EntryStatus::PendingReconciliation
        && next.status == EntryStatus::Completed;
    let linking = !current.reconciled && next.reconciled;
    if completing != linking || (linking && next.matched_bank_record_id.is_none()) {
        return Err(ReconError::Validation(format!(
            "Entry '{}' must be completed and linked to a bank record together",
            current.id
        )));
    }

    if current.status != EntryStatus::PendingApproval
        && (current.amount != next.amount || current.category != next.category)
    {
        return Err(ReconError::Validation(format!(
            "Entry '{}' amount and category are fixed once it leaves approval",
            current.id
        )));
    }

    Ok(())
}

fn check_bank_record(current: Option<&BankRecord>, next: &BankRecord) -> ReconResult<()> {
    if next.matched_transaction_id.as_ref() != next.matched_entry_ids.first() {
        return Err(ReconError::Validation(format!(
            "Bank record '{}' must link its first matched entry",
            next.id
        )));
    }

    let Some(current) = current else {
        return Ok(());
    };

    if !current.same_statement_line(next) {
        return Err(ReconError::Validation(format!(
            "Bank record '{}' imported fields are immutable",
            current.id
        )));
    }

    if current.is_matched() && !next.matched_entry_ids.starts_with(&current.matched_entry_ids) {
        return Err(ReconError::Validation(format!(
            "Bank record '{}' match is permanent",
            current.id
        )));
    }

    Ok(())
}

fn next_version(current: Option<u64>) -> (u64, ChangeKind) {
    match current {
        Some(version) => (version + 1, ChangeKind::Updated),
        None => (1, ChangeKind::Created),
    }
}

#[async_trait]
impl ReconStore for MemoryStorage {
    async fn get_entry(&self, entry_id: &str) -> ReconResult<Option<LedgerEntry>> {
        let docs = self.documents.read().map_err(poisoned)?;
        Ok(docs.entries.get(entry_id).cloned())
    }

    async fn list_entries(&self, filter: &EntryFilter) -> ReconResult<Vec<LedgerEntry>> {
        let docs = self.documents.read().map_err(poisoned)?;
        let mut filtered: Vec<LedgerEntry> = docs
            .entries
            .values()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        filtered.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(filtered)
    }

    async fn get_bank_record(&self, record_id: &str) -> ReconResult<Option<BankRecord>> {
        let docs = self.documents.read().map_err(poisoned)?;
        Ok(docs.bank_records.get(record_id).cloned())
    }

    async fn list_bank_records(&self, filter: &BankRecordFilter) -> ReconResult<Vec<BankRecord>> {
        let docs = self.documents.read().map_err(poisoned)?;
        let mut filtered: Vec<BankRecord> = docs
            .bank_records
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        filtered.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(filtered)
    }

    async fn get_settlement(&self, settlement_id: &str) -> ReconResult<Option<Settlement>> {
        let docs = self.documents.read().map_err(poisoned)?;
        Ok(docs.settlements.get(settlement_id).cloned())
    }

    async fn list_settlements(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> ReconResult<Vec<Settlement>> {
        let docs = self.documents.read().map_err(poisoned)?;
        let mut filtered: Vec<Settlement> = docs
            .settlements
            .values()
            .filter(|s| within(s.settled_at.date(), start_date, end_date))
            .cloned()
            .collect();
        filtered.sort_by(|a, b| {
            a.settled_at
                .cmp(&b.settled_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(filtered)
    }

    async fn commit(&self, batch: WriteBatch) -> ReconResult<ChangeSet> {
        let committed_at = chrono::Utc::now().naive_utc();
        let mut docs = self.documents.write().map_err(poisoned)?;

        // Verify everything before touching anything
        let mut seen = HashSet::new();
        for write in batch.writes() {
            let (collection, id) = match write {
                Write::PutEntry { entry, .. } => (Collection::Entries, entry.id.as_str()),
                Write::DeleteEntry { id, .. } => (Collection::Entries, id.as_str()),
                Write::PutBankRecord { record, .. } => {
                    (Collection::BankRecords, record.id.as_str())
                }
                Write::PutSettlement { settlement, .. } => {
                    (Collection::Settlements, settlement.id.as_str())
                }
            };
            if !seen.insert((collection, id)) {
                return Err(ReconError::Validation(format!(
                    "Document '{}' appears more than once in a batch",
                    id
                )));
            }

            match write {
                Write::PutEntry {
                    entry,
                    precondition,
                } => {
                    let current = docs.entries.get(&entry.id);
                    check_precondition("Entry", &entry.id, current.map(|e| e.version), *precondition)?;
                    entry.validate()?;
                    if let Some(current) = current {
                        check_entry_update(current, entry)?;
                    }
                }
                Write::DeleteEntry { id, precondition } => {
                    let current = docs.entries.get(id);
                    check_precondition("Entry", id, current.map(|e| e.version), *precondition)?;
                    if let Some(current) = current {
                        if current.status != EntryStatus::PendingApproval {
                            return Err(ReconError::Validation(format!(
                                "Entry '{}' is {:?} and can no longer be deleted",
                                id, current.status
                            )));
                        }
                    }
                }
                Write::PutBankRecord {
                    record,
                    precondition,
                } => {
                    let current = docs.bank_records.get(&record.id);
                    check_precondition(
                        "Bank record",
                        &record.id,
                        current.map(|r| r.version),
                        *precondition,
                    )?;
                    check_bank_record(current, record)?;
                }
                Write::PutSettlement {
                    settlement,
                    precondition,
                } => {
                    let current = docs.settlements.get(&settlement.id);
                    check_precondition(
                        "Settlement",
                        &settlement.id,
                        current.map(|s| s.version),
                        *precondition,
                    )?;
                }
            }
        }

        let mut changes = Vec::with_capacity(batch.len());
        for write in batch.into_writes() {
            match write {
                Write::PutEntry { mut entry, .. } => {
                    let (version, kind) = next_version(docs.entries.get(&entry.id).map(|e| e.version));
                    entry.version = version;
                    changes.push(DocumentChange {
                        collection: Collection::Entries,
                        id: entry.id.clone(),
                        kind,
                    });
                    docs.entries.insert(entry.id.clone(), entry);
                }
                Write::DeleteEntry { id, .. } => {
                    docs.entries.remove(&id);
                    changes.push(DocumentChange {
                        collection: Collection::Entries,
                        id,
                        kind: ChangeKind::Deleted,
                    });
                }
                Write::PutBankRecord { mut record, .. } => {
                    let (version, kind) =
                        next_version(docs.bank_records.get(&record.id).map(|r| r.version));
                    record.version = version;
                    changes.push(DocumentChange {
                        collection: Collection::BankRecords,
                        id: record.id.clone(),
                        kind,
                    });
                    docs.bank_records.insert(record.id.clone(), record);
                }
                Write::PutSettlement { mut settlement, .. } => {
                    let (version, kind) =
                        next_version(docs.settlements.get(&settlement.id).map(|s| s.version));
                    settlement.version = version;
                    changes.push(DocumentChange {
                        collection: Collection::Settlements,
                        id: settlement.id.clone(),
                        kind,
                    });
                    docs.settlements.insert(settlement.id.clone(), settlement);
                }
            }
        }
        drop(docs);

        let change_set = ChangeSet {
            changes,
            committed_at,
        };
        // No subscribers is not an error
        let _ = self.changes.send(change_set.clone());
        Ok(change_set)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeSet> {
        self.changes.subscribe()
    }
}
