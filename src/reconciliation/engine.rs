//! Operator-facing facade over one reconciliation store

use chrono::NaiveDate;
use tokio::sync::broadcast;
use tracing::debug;

use crate::category::Category;
use crate::config::EngineConfig;
use crate::ledger::{DisbursementManager, DisbursementOutcome, EntryManager};
use crate::reconciliation::candidates::{find_bank_candidate, find_entry_candidate};
use crate::reconciliation::categorizer::categorize;
use crate::reconciliation::committer::{
    AutoReconcileReport, MatchProposal, MatchReceipt, ReconciliationCommitter,
};
use crate::reconciliation::ingest::{BankIngestor, BankLine};
use crate::reconciliation::settlement::{SettlementAggregator, SettlementPreview};
use crate::reporting::ReportReader;
use crate::traits::*;
use crate::types::*;

/// Reconciliation engine that orchestrates every operator action.
///
/// Holds no selection state between calls: each operation names the entries
/// and bank records it acts on, and re-reads them from the store.
pub struct ReconciliationEngine<S: ReconStore> {
    storage: S,
    config: EngineConfig,
    committer: ReconciliationCommitter<S>,
    settlements: SettlementAggregator<S>,
    disbursements: DisbursementManager<S>,
    entries: EntryManager<S>,
    ingestor: BankIngestor<S>,
    reports: ReportReader<S>,
}

impl<S: ReconStore + Clone> ReconciliationEngine<S> {
    /// Create a new engine with the given storage backend
    pub fn new(storage: S, config: EngineConfig) -> Self {
        let committer = ReconciliationCommitter::new(storage.clone(), config.clone());
        Self::assemble(storage, config, committer)
    }

    /// Create a new engine with a custom match validator
    pub fn with_validator(
        storage: S,
        config: EngineConfig,
        validator: Box<dyn MatchValidator>,
    ) -> Self {
        let committer =
            ReconciliationCommitter::with_validator(storage.clone(), config.clone(), validator);
        Self::assemble(storage, config, committer)
    }

    fn assemble(storage: S, config: EngineConfig, committer: ReconciliationCommitter<S>) -> Self {
        Self {
            committer,
            settlements: SettlementAggregator::new(storage.clone()),
            disbursements: DisbursementManager::new(storage.clone()),
            entries: EntryManager::new(storage.clone()),
            ingestor: BankIngestor::new(storage.clone()),
            reports: ReportReader::new(storage.clone()),
            storage,
            config,
        }
    }
}

impl<S: ReconStore> ReconciliationEngine<S> {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read-only queries for reporting collaborators
    pub fn reports(&self) -> &ReportReader<S> {
        &self.reports
    }

    /// Subscribe to committed change sets
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeSet> {
        self.storage.subscribe()
    }

    // Ingestion
    /// Suggested category for a free-text bank description
    pub fn categorize(&self, description: &str) -> Category {
        categorize(description)
    }

    /// Import parsed statement lines as unmatched bank records
    pub async fn ingest_bank_lines(&self, lines: Vec<BankLine>) -> ReconResult<Vec<BankRecord>> {
        self.ingestor.ingest(lines).await
    }

    /// Replace the suggested category on an unmatched bank record
    pub async fn override_suggested_category(
        &self,
        bank_record_id: &str,
        category: Category,
    ) -> ReconResult<BankRecord> {
        self.ingestor
            .override_suggested_category(bank_record_id, category)
            .await
    }

    // Entry intake
    /// Record point-of-sale income lines
    pub async fn record_income(&self, entries: Vec<LedgerEntry>) -> ReconResult<Vec<LedgerEntry>> {
        self.entries.record_income(entries).await
    }

    /// Submit an expense request for approval
    pub async fn submit_expense(&self, entry: LedgerEntry) -> ReconResult<LedgerEntry> {
        self.entries.submit_expense(entry).await
    }

    /// Get a ledger entry by ID
    pub async fn get_entry(&self, entry_id: &str) -> ReconResult<Option<LedgerEntry>> {
        self.storage.get_entry(entry_id).await
    }

    /// Get a bank record by ID
    pub async fn get_bank_record(&self, bank_record_id: &str) -> ReconResult<Option<BankRecord>> {
        self.storage.get_bank_record(bank_record_id).await
    }

    /// Delete an expense request that has not been paid out
    pub async fn delete_entry(&self, entry_id: &str) -> ReconResult<()> {
        self.entries.delete_entry(entry_id).await
    }

    // Suggestions
    /// First unmatched bank line within tolerance of the entry
    pub async fn suggest_for_entry(&self, entry_id: &str) -> ReconResult<Option<BankRecord>> {
        let entry = self.entries.get_entry_required(entry_id).await?;
        if !entry.needs_reconciliation() {
            return Ok(None);
        }
        let pool = self
            .storage
            .list_bank_records(&BankRecordFilter::unmatched())
            .await?;
        let candidate = find_bank_candidate(&entry, &pool, &self.config.amount_tolerance).cloned();
        debug!(entry_id, found = candidate.is_some(), "Bank candidate lookup");
        Ok(candidate)
    }

    /// First outstanding entry with exactly the bank line's magnitude
    pub async fn suggest_for_bank_record(
        &self,
        bank_record_id: &str,
    ) -> ReconResult<Option<LedgerEntry>> {
        let record = self.committer.load_bank_record(bank_record_id).await?;
        if record.is_matched() || record.is_settlement_deposit() {
            return Ok(None);
        }
        let pool = self
            .storage
            .list_entries(&EntryFilter::outstanding())
            .await?;
        let candidate = find_entry_candidate(&record, &pool).cloned();
        debug!(bank_record_id, found = candidate.is_some(), "Entry candidate lookup");
        Ok(candidate)
    }

    // Matching
    /// Dry-run validation of a selection
    pub async fn propose_match(
        &self,
        entry_ids: &[String],
        bank_record_id: &str,
    ) -> ReconResult<MatchProposal> {
        self.committer.propose_match(entry_ids, bank_record_id).await
    }

    /// Reconcile entries against one bank record
    pub async fn commit_match(
        &self,
        entry_ids: &[String],
        bank_record_id: &str,
        confirmed: bool,
    ) -> ReconResult<MatchReceipt> {
        self.committer
            .commit_match(entry_ids, bank_record_id, confirmed)
            .await
    }

    /// Synthesize and link an income entry for an unmatched deposit
    pub async fn quick_create_from_deposit(
        &self,
        bank_record_id: &str,
        confirmed: bool,
    ) -> ReconResult<LedgerEntry> {
        self.committer
            .quick_create_from_deposit(bank_record_id, confirmed)
            .await
    }

    /// Best-effort automatic pass over all outstanding entries
    pub async fn run_auto_reconcile(&self) -> ReconResult<AutoReconcileReport> {
        self.committer.run_auto_reconcile().await
    }

    // Disbursement
    /// Pay out approved expense requests
    pub async fn batch_disburse(
        &self,
        entry_ids: &[String],
        last5: Option<&str>,
    ) -> ReconResult<DisbursementOutcome> {
        self.disbursements.batch_disburse(entry_ids, last5).await
    }

    // Settlements
    /// Derived fee for a prospective settlement
    pub async fn preview_settlement(
        &self,
        entry_ids: &[String],
        bank_record_id: &str,
    ) -> ReconResult<SettlementPreview> {
        self.settlements.preview(entry_ids, bank_record_id).await
    }

    /// Reconcile Line Pay sales against their aggregated deposit
    pub async fn reconcile_settlement(
        &self,
        entry_ids: &[String],
        bank_record_id: &str,
        confirmed: bool,
    ) -> ReconResult<Settlement> {
        self.settlements
            .reconcile_settlement(entry_ids, bank_record_id, confirmed)
            .await
    }

    pub async fn list_settlements(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> ReconResult<Vec<Settlement>> {
        self.storage.list_settlements(start_date, end_date).await
    }
}
