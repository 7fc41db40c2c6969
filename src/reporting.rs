//! Read-only views over reconciliation state

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::category::{Category, CostClass, ExpenseCategory};
use crate::traits::*;
use crate::types::*;

/// A reconciled entry with the bank line it was matched to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub entry: LedgerEntry,
    /// `None` when the linked record is no longer in the store
    pub bank_record: Option<BankRecord>,
}

/// One derived processor fee, reported under the processing-fee expense
/// category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeLineItem {
    pub settlement_id: String,
    pub bank_record_id: String,
    pub source: String,
    pub settled_at: NaiveDateTime,
    pub gross_total: BigDecimal,
    pub deposit_amount: BigDecimal,
    pub fee: BigDecimal,
    pub anomaly: bool,
    /// Always the payment-processing-fee expense category
    pub category: Category,
}

impl From<&Settlement> for FeeLineItem {
    fn from(settlement: &Settlement) -> Self {
        Self {
            settlement_id: settlement.id.clone(),
            bank_record_id: settlement.bank_record_id.clone(),
            source: settlement.source.clone(),
            settled_at: settlement.settled_at,
            gross_total: settlement.gross_total.clone(),
            deposit_amount: settlement.deposit_amount.clone(),
            fee: settlement.fee.clone(),
            anomaly: settlement.anomaly,
            category: Category::Expense(ExpenseCategory::PaymentProcessingFee),
        }
    }
}

/// Count and total of a group of amounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    pub count: usize,
    pub total: BigDecimal,
}

impl Default for Tally {
    fn default() -> Self {
        Self {
            count: 0,
            total: BigDecimal::from(0),
        }
    }
}

impl Tally {
    fn add(&mut self, amount: &BigDecimal) {
        self.count += 1;
        self.total += amount;
    }
}

/// Period overview of what is reconciled and what still needs attention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub income: Tally,
    pub reconciled_income: Tally,
    pub outstanding_income: Tally,
    pub pending_approval: Tally,
    pub outstanding_expenses: Tally,
    pub reconciled_expenses: Tally,
    pub unmatched_deposits: Tally,
    pub unmatched_withdrawals: Tally,
    pub unmatched_settlement_deposits: Tally,
    /// Fees from settlements not flagged as anomalies
    pub processing_fees: BigDecimal,
    pub anomalous_settlements: usize,
    /// Paid-out expenses (pending reconciliation or completed) by cost class
    pub expenses_by_cost_class: HashMap<CostClass, BigDecimal>,
    /// Entries still carrying the unconfirmed category
    pub unconfirmed_entries: usize,
}

/// Query helper over a reconciliation store
pub struct ReportReader<S: ReconStore> {
    storage: S,
}

impl<S: ReconStore> ReportReader<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Entries still waiting for a bank line
    pub async fn outstanding_entries(&self, filter: &EntryFilter) -> ReconResult<Vec<LedgerEntry>> {
        let filter = EntryFilter {
            reconciliation: ReconciliationFilter::Outstanding,
            ..filter.clone()
        };
        self.storage.list_entries(&filter).await
    }

    /// Unmatched bank records, settlement deposits excluded
    pub async fn unmatched_bank_records(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> ReconResult<Vec<BankRecord>> {
        self.storage
            .list_bank_records(&BankRecordFilter::unmatched().between(start_date, end_date))
            .await
    }

    /// Settlement deposits awaiting their point-of-sale entries
    pub async fn unmatched_settlement_deposits(&self) -> ReconResult<Vec<BankRecord>> {
        self.storage
            .list_bank_records(&BankRecordFilter::unmatched_settlements())
            .await
    }

    /// Reconciled entries paired with their bank lines
    pub async fn matched_history(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> ReconResult<Vec<MatchedPair>> {
        let entries = self
            .storage
            .list_entries(&EntryFilter::reconciled().between(start_date, end_date))
            .await?;

        let mut records: HashMap<String, Option<BankRecord>> = HashMap::new();
        let mut history = Vec::with_capacity(entries.len());
        for entry in entries {
            let bank_record = match &entry.matched_bank_record_id {
                Some(id) => {
                    if !records.contains_key(id) {
                        let record = self.storage.get_bank_record(id).await?;
                        records.insert(id.clone(), record);
                    }
                    records.get(id).cloned().flatten()
                }
                None => None,
            };
            history.push(MatchedPair { entry, bank_record });
        }
        Ok(history)
    }

    /// Processor fees derived from settlements in the range
    pub async fn processing_fees(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> ReconResult<Vec<FeeLineItem>> {
        let settlements = self.storage.list_settlements(start_date, end_date).await?;
        Ok(settlements.iter().map(FeeLineItem::from).collect())
    }

    pub async fn reconciliation_summary(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> ReconResult<ReconciliationSummary> {
        let entries = self
            .storage
            .list_entries(&EntryFilter::all().between(start_date, end_date))
            .await?;
        let records = self
            .storage
            .list_bank_records(&BankRecordFilter::all().between(start_date, end_date))
            .await?;
        let settlements = self.storage.list_settlements(start_date, end_date).await?;

        let mut summary = ReconciliationSummary {
            start_date,
            end_date,
            income: Tally::default(),
            reconciled_income: Tally::default(),
            outstanding_income: Tally::default(),
            pending_approval: Tally::default(),
            outstanding_expenses: Tally::default(),
            reconciled_expenses: Tally::default(),
            unmatched_deposits: Tally::default(),
            unmatched_withdrawals: Tally::default(),
            unmatched_settlement_deposits: Tally::default(),
            processing_fees: BigDecimal::from(0),
            anomalous_settlements: 0,
            expenses_by_cost_class: HashMap::new(),
            unconfirmed_entries: 0,
        };

        for entry in &entries {
            if entry.category.is_unconfirmed() {
                summary.unconfirmed_entries += 1;
            }
            match entry.kind() {
                EntryKind::Income => {
                    summary.income.add(&entry.amount);
                    if entry.reconciled {
                        summary.reconciled_income.add(&entry.amount);
                    } else if entry.needs_reconciliation() {
                        summary.outstanding_income.add(&entry.amount);
                    }
                }
                EntryKind::Expense => {
                    if entry.status == EntryStatus::PendingApproval {
                        summary.pending_approval.add(&entry.amount);
                        continue;
                    }
                    if entry.reconciled {
                        summary.reconciled_expenses.add(&entry.amount);
                    } else {
                        summary.outstanding_expenses.add(&entry.amount);
                    }
                    if let Category::Expense(category) = entry.category {
                        *summary
                            .expenses_by_cost_class
                            .entry(category.cost_class())
                            .or_insert_with(|| BigDecimal::from(0)) += &entry.amount;
                    }
                }
            }
        }

        for record in records.iter().filter(|r| !r.is_matched()) {
            if record.is_settlement_deposit() {
                summary.unmatched_settlement_deposits.add(&record.amount);
            } else if record.is_deposit() {
                summary.unmatched_deposits.add(&record.amount);
            } else {
                summary.unmatched_withdrawals.add(&record.amount);
            }
        }

        for settlement in &settlements {
            if settlement.anomaly {
                summary.anomalous_settlements += 1;
            } else {
                summary.processing_fees += &settlement.fee;
            }
        }

        Ok(summary)
    }
}
