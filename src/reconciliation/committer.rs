//! Atomic application of matches to the entry and bank-record collections

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::slice;
use tracing::{debug, info, warn};

use crate::category::Category;
use crate::config::EngineConfig;
use crate::ledger::entry::patterns;
use crate::reconciliation::candidates::find_bank_candidate;
use crate::reconciliation::validator::{DefaultMatchValidator, MatchWarning};
use crate::traits::*;
use crate::types::*;

/// Result of a dry-run validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchProposal {
    pub entry_ids: Vec<String>,
    pub bank_record_id: String,
    pub warnings: Vec<MatchWarning>,
    /// Committing will need `confirmed = true`
    pub requires_confirmation: bool,
}

/// A committed match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReceipt {
    pub bank_record_id: String,
    pub entry_ids: Vec<String>,
    pub warnings: Vec<MatchWarning>,
    pub committed_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoMatch {
    pub entry_id: String,
    pub bank_record_id: String,
}

/// What an automatic pass did
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AutoReconcileReport {
    pub matched: Vec<AutoMatch>,
    /// Entries with no candidate in the pool
    pub without_candidate: usize,
    /// Candidates the validator refused
    pub rejected: usize,
    /// Pairs lost to a concurrent writer
    pub conflicts: usize,
}

/// Mark `entries` reconciled against `record` and link them in commit order.
///
/// The bank record keeps the first entry as `matched_transaction_id` and the
/// full list in `matched_entry_ids`; every entry points back at the record.
pub(crate) fn link_entries(
    entries: &[LedgerEntry],
    record: &BankRecord,
) -> ReconResult<(Vec<LedgerEntry>, BankRecord)> {
    let now = chrono::Utc::now().naive_utc();
    let mut linked = Vec::with_capacity(entries.len());
    for entry in entries {
        let mut entry = entry.clone();
        entry.status = entry.status.apply(StatusEvent::Reconciled)?;
        entry.reconciled = true;
        entry.matched_bank_record_id = Some(record.id.clone());
        entry.updated_at = now;
        linked.push(entry);
    }

    let mut record = record.clone();
    record
        .matched_entry_ids
        .extend(linked.iter().map(|e| e.id.clone()));
    record.matched_transaction_id = record.matched_entry_ids.first().cloned();

    Ok((linked, record))
}

/// Applies matches as single atomic batches
pub struct ReconciliationCommitter<S: ReconStore> {
    storage: S,
    validator: Box<dyn MatchValidator>,
    config: EngineConfig,
}

impl<S: ReconStore> ReconciliationCommitter<S> {
    /// Create a new committer
    pub fn new(storage: S, config: EngineConfig) -> Self {
        Self {
            storage,
            validator: Box::new(DefaultMatchValidator),
            config,
        }
    }

    /// Create a new committer with a custom validator
    pub fn with_validator(
        storage: S,
        config: EngineConfig,
        validator: Box<dyn MatchValidator>,
    ) -> Self {
        Self {
            storage,
            validator,
            config,
        }
    }

    pub(crate) async fn load_entries(&self, entry_ids: &[String]) -> ReconResult<Vec<LedgerEntry>> {
        let mut entries = Vec::with_capacity(entry_ids.len());
        for id in entry_ids {
            let entry = self
                .storage
                .get_entry(id)
                .await?
                .ok_or_else(|| ReconError::NotFound(format!("Ledger entry '{}'", id)))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    pub(crate) async fn load_bank_record(&self, record_id: &str) -> ReconResult<BankRecord> {
        self.storage
            .get_bank_record(record_id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("Bank record '{}'", record_id)))
    }

    /// Validate a selection without writing anything
    pub async fn propose_match(
        &self,
        entry_ids: &[String],
        bank_record_id: &str,
    ) -> ReconResult<MatchProposal> {
        let entries = self.load_entries(entry_ids).await?;
        let record = self.load_bank_record(bank_record_id).await?;
        let assessment =
            self.validator
                .validate_match(&entries, slice::from_ref(&record), true)?;

        Ok(MatchProposal {
            entry_ids: entry_ids.to_vec(),
            bank_record_id: bank_record_id.to_string(),
            warnings: assessment.warnings,
            requires_confirmation: assessment.fan_in,
        })
    }

    /// Reconcile `entry_ids` against one bank record.
    ///
    /// Current state is re-read from the store; the batch carries the
    /// versions that were read, so a concurrent commit on any of the same
    /// documents makes this one fail with [`ReconError::Conflict`].
    pub async fn commit_match(
        &self,
        entry_ids: &[String],
        bank_record_id: &str,
        confirmed: bool,
    ) -> ReconResult<MatchReceipt> {
        let entries = self.load_entries(entry_ids).await?;
        let record = self.load_bank_record(bank_record_id).await?;
        let assessment =
            self.validator
                .validate_match(&entries, slice::from_ref(&record), confirmed)?;

        for warning in &assessment.warnings {
            warn!(bank_record_id, %warning, "Committing match with warning");
        }

        let (linked, record) = link_entries(&entries, &record)?;
        let mut batch = WriteBatch::new();
        for entry in linked {
            batch.update_entry(entry);
        }
        batch.update_bank_record(record);

        let change_set = self.storage.commit(batch).await?;
        info!(
            bank_record_id,
            entries = entry_ids.len(),
            "Committed reconciliation match"
        );

        Ok(MatchReceipt {
            bank_record_id: bank_record_id.to_string(),
            entry_ids: entry_ids.to_vec(),
            warnings: assessment.warnings,
            committed_at: change_set.committed_at,
        })
    }

    /// Create a completed, reconciled income entry for an unmatched deposit
    /// and link it in the same batch.
    pub async fn quick_create_from_deposit(
        &self,
        bank_record_id: &str,
        confirmed: bool,
    ) -> ReconResult<LedgerEntry> {
        let record = self.load_bank_record(bank_record_id).await?;
        if record.is_matched() {
            return Err(ReconError::NotFound(format!(
                "Bank record '{}' is already matched",
                bank_record_id
            )));
        }
        if !record.is_deposit() {
            return Err(ReconError::Validation(format!(
                "Bank record '{}' is not a deposit",
                bank_record_id
            )));
        }
        if record.is_settlement_deposit() {
            return Err(ReconError::Validation(format!(
                "Bank record '{}' is a settlement deposit; reconcile it as a settlement",
                bank_record_id
            )));
        }

        let category = match record.suggested_category {
            Category::Income(_) => record.suggested_category,
            Category::Unconfirmed if !confirmed => {
                return Err(ReconError::ConfirmationRequired(
                    ConfirmationReason::UnconfirmedCategory {
                        bank_record_id: bank_record_id.to_string(),
                    },
                ))
            }
            Category::Unconfirmed => Category::Unconfirmed,
            Category::Expense(_) | Category::SettlementDeposit => {
                Category::Income(self.config.default_income_category)
            }
        };

        let entry = patterns::from_bank_deposit(
            &record,
            category,
            &self.config.default_location,
            &self.config.quick_create_author,
        )?;

        let mut record = record;
        record.matched_entry_ids.push(entry.id.clone());
        record.matched_transaction_id = record.matched_entry_ids.first().cloned();

        let mut batch = WriteBatch::new();
        batch.create_entry(entry.clone());
        batch.update_bank_record(record);
        self.storage.commit(batch).await?;

        info!(
            bank_record_id,
            entry_id = %entry.id,
            category = %entry.category,
            "Quick-created income from bank deposit"
        );

        self.storage
            .get_entry(&entry.id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("Ledger entry '{}'", entry.id)))
    }

    /// Pair outstanding entries with unmatched bank lines without operator
    /// input. Each pair is its own batch; entries without a usable candidate
    /// are skipped, not reported as errors.
    pub async fn run_auto_reconcile(&self) -> ReconResult<AutoReconcileReport> {
        let entries = self.storage.list_entries(&EntryFilter::outstanding()).await?;
        let mut pool = self
            .storage
            .list_bank_records(&BankRecordFilter::unmatched())
            .await?;
        let mut report = AutoReconcileReport::default();

        for entry in &entries {
            let Some(candidate) =
                find_bank_candidate(entry, &pool, &self.config.amount_tolerance).cloned()
            else {
                report.without_candidate += 1;
                continue;
            };

            if let Err(e) = self.validator.validate_match(
                slice::from_ref(entry),
                slice::from_ref(&candidate),
                false,
            ) {
                debug!(entry_id = %entry.id, bank_record_id = %candidate.id, error = %e, "Auto-match candidate rejected");
                report.rejected += 1;
                continue;
            }

            let (linked, record) = link_entries(slice::from_ref(entry), &candidate)?;
            let mut batch = WriteBatch::new();
            for linked_entry in linked {
                batch.update_entry(linked_entry);
            }
            batch.update_bank_record(record);

            match self.storage.commit(batch).await {
                Ok(_) => {
                    report.matched.push(AutoMatch {
                        entry_id: entry.id.clone(),
                        bank_record_id: candidate.id.clone(),
                    });
                }
                Err(e @ ReconError::Conflict(_)) => {
                    warn!(entry_id = %entry.id, bank_record_id = %candidate.id, error = %e, "Auto-match lost to a concurrent commit");
                    report.conflicts += 1;
                }
                Err(e) => return Err(e),
            }
            pool.retain(|r| r.id != candidate.id);
        }

        info!(
            matched = report.matched.len(),
            without_candidate = report.without_candidate,
            rejected = report.rejected,
            conflicts = report.conflicts,
            "Auto-reconcile pass finished"
        );
        Ok(report)
    }
}
