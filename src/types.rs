//! Core types and data structures for the reconciliation engine

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::category::Category;

/// Direction of an internal ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Income,
    Expense,
}

/// How an income entry was collected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeMethod {
    Cash,
    Transfer,
    /// Mobile wallet; paid out to the bank in aggregated settlements
    LinePay,
}

/// How an expense is paid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
    Cash,
    Transfer,
}

/// Lifecycle status of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Expense request awaiting payout
    PendingApproval,
    /// Money has moved (or is expected to); waiting for the bank line
    PendingReconciliation,
    /// Terminal
    Completed,
}

/// Events that drive [`EntryStatus`] forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// Batch payout of an approved expense
    Disbursed,
    /// Linked to a bank record by the committer
    Reconciled,
}

impl EntryStatus {
    /// Apply a lifecycle event. The only legal moves are
    /// `pending_approval -> pending_reconciliation -> completed`.
    pub fn apply(self, event: StatusEvent) -> ReconResult<EntryStatus> {
        match (self, event) {
            (EntryStatus::PendingApproval, StatusEvent::Disbursed) => {
                Ok(EntryStatus::PendingReconciliation)
            }
            (EntryStatus::PendingReconciliation, StatusEvent::Reconciled) => {
                Ok(EntryStatus::Completed)
            }
            (from, event) => Err(ReconError::Validation(format!(
                "Illegal status transition: {:?} cannot accept {:?}",
                from, event
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryStatus::Completed)
    }
}

/// Kind-specific fields of a ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryDetail {
    Income {
        method: IncomeMethod,
        /// Processor fee, only set on the lead entry of a settlement
        fee: Option<BigDecimal>,
        /// Settlement this entry was reconciled through, if any
        settlement_id: Option<String>,
    },
    Expense {
        payout_method: PayoutMethod,
        disbursement_date: Option<NaiveDateTime>,
        /// Last five digits of the account the payout left from
        outgoing_account_last5: Option<String>,
    },
}

impl EntryDetail {
    pub fn kind(&self) -> EntryKind {
        match self {
            EntryDetail::Income { .. } => EntryKind::Income,
            EntryDetail::Expense { .. } => EntryKind::Expense,
        }
    }
}

/// An internally recorded income or expense
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique identifier, immutable
    pub id: String,
    /// When the sale happened or the expense was requested
    pub date: NaiveDateTime,
    /// Non-negative magnitude; direction comes from the kind
    pub amount: BigDecimal,
    pub category: Category,
    pub detail: EntryDetail,
    pub status: EntryStatus,
    /// True iff linked to a bank record
    pub reconciled: bool,
    /// Bank record this entry was reconciled against
    pub matched_bank_record_id: Option<String>,
    /// Store location identifier
    pub location: String,
    pub description: Option<String>,
    /// Customer for income, beneficiary for expenses
    pub counterparty: Option<String>,
    pub created_by: Option<String>,
    /// Optimistic-concurrency version, maintained by the store
    #[serde(default)]
    pub version: u64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl LedgerEntry {
    pub fn kind(&self) -> EntryKind {
        self.detail.kind()
    }

    /// Amount as it should appear on a bank statement
    pub fn signed_amount(&self) -> BigDecimal {
        match self.kind() {
            EntryKind::Income => self.amount.clone(),
            EntryKind::Expense => -self.amount.clone(),
        }
    }

    pub fn income_method(&self) -> Option<IncomeMethod> {
        match &self.detail {
            EntryDetail::Income { method, .. } => Some(*method),
            EntryDetail::Expense { .. } => None,
        }
    }

    pub fn payout_method(&self) -> Option<PayoutMethod> {
        match &self.detail {
            EntryDetail::Expense { payout_method, .. } => Some(*payout_method),
            EntryDetail::Income { .. } => None,
        }
    }

    pub fn fee(&self) -> Option<&BigDecimal> {
        match &self.detail {
            EntryDetail::Income { fee, .. } => fee.as_ref(),
            EntryDetail::Expense { .. } => None,
        }
    }

    pub fn outgoing_account_last5(&self) -> Option<&str> {
        match &self.detail {
            EntryDetail::Expense {
                outgoing_account_last5,
                ..
            } => outgoing_account_last5.as_deref(),
            EntryDetail::Income { .. } => None,
        }
    }

    pub fn disbursement_date(&self) -> Option<NaiveDateTime> {
        match &self.detail {
            EntryDetail::Expense {
                disbursement_date, ..
            } => *disbursement_date,
            EntryDetail::Income { .. } => None,
        }
    }

    /// Waiting for a bank counterpart
    pub fn needs_reconciliation(&self) -> bool {
        !self.reconciled && self.status == EntryStatus::PendingReconciliation
    }

    /// Check record-level invariants
    pub fn validate(&self) -> ReconResult<()> {
        if self.id.trim().is_empty() {
            return Err(ReconError::Validation(
                "Ledger entry ID cannot be empty".to_string(),
            ));
        }

        if self.amount < BigDecimal::from(0) {
            return Err(ReconError::Validation(format!(
                "Entry '{}' amount must be a non-negative magnitude",
                self.id
            )));
        }

        if !self.category.fits(self.kind()) {
            return Err(ReconError::Validation(format!(
                "Category '{}' is not valid for a {:?} entry",
                self.category,
                self.kind()
            )));
        }

        if self.reconciled && self.status != EntryStatus::Completed {
            return Err(ReconError::Validation(format!(
                "Reconciled entry '{}' must be completed",
                self.id
            )));
        }

        if self.reconciled != self.matched_bank_record_id.is_some() {
            return Err(ReconError::Validation(format!(
                "Entry '{}' must be reconciled exactly when it is linked to a bank record",
                self.id
            )));
        }

        match &self.detail {
            EntryDetail::Income { fee, .. } => {
                if let Some(fee) = fee {
                    if *fee < BigDecimal::from(0) {
                        return Err(ReconError::Validation(format!(
                            "Entry '{}' fee cannot be negative",
                            self.id
                        )));
                    }
                }
            }
            EntryDetail::Expense {
                payout_method,
                outgoing_account_last5,
                ..
            } => {
                if outgoing_account_last5.is_some() && *payout_method != PayoutMethod::Transfer {
                    return Err(ReconError::Validation(format!(
                        "Cash expense '{}' cannot carry an outgoing account",
                        self.id
                    )));
                }
            }
        }

        Ok(())
    }
}

/// One imported bank statement line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankRecord {
    pub id: String,
    pub date: NaiveDate,
    /// Signed: positive is a deposit, negative a withdrawal
    pub amount: BigDecimal,
    pub description: String,
    /// Originating bank account identifier
    pub source: String,
    pub suggested_category: Category,
    /// First linked entry; set once, never cleared
    pub matched_transaction_id: Option<String>,
    /// Every entry linked to this record, in commit order
    #[serde(default)]
    pub matched_entry_ids: Vec<String>,
    pub imported_at: NaiveDateTime,
    #[serde(default)]
    pub version: u64,
}

impl BankRecord {
    pub fn is_deposit(&self) -> bool {
        self.amount > BigDecimal::from(0)
    }

    pub fn is_withdrawal(&self) -> bool {
        self.amount < BigDecimal::from(0)
    }

    pub fn is_matched(&self) -> bool {
        self.matched_transaction_id.is_some()
    }

    pub fn is_settlement_deposit(&self) -> bool {
        self.suggested_category == Category::SettlementDeposit
    }

    /// Fields fixed at import time
    pub fn same_statement_line(&self, other: &BankRecord) -> bool {
        self.date == other.date
            && self.amount == other.amount
            && self.description == other.description
            && self.source == other.source
    }
}

/// A reconciled processor settlement and its derived fee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: String,
    pub bank_record_id: String,
    pub entry_ids: Vec<String>,
    /// Sum of the point-of-sale amounts
    pub gross_total: BigDecimal,
    /// What actually arrived at the bank
    pub deposit_amount: BigDecimal,
    /// `gross_total - deposit_amount`
    pub fee: BigDecimal,
    /// Deposit exceeded the gross total; accepted only with confirmation
    pub anomaly: bool,
    pub source: String,
    pub settled_at: NaiveDateTime,
    #[serde(default)]
    pub version: u64,
}

/// Why an operation needs explicit operator acknowledgment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfirmationReason {
    /// Several entries against one bank record
    FanIn {
        bank_record_id: String,
        entry_count: usize,
    },
    /// Quick-create from a deposit whose category was never confirmed
    UnconfirmedCategory { bank_record_id: String },
    /// Bank deposit larger than the gross point-of-sale total
    NegativeSettlementFee {
        bank_record_id: String,
        fee: BigDecimal,
    },
}

impl fmt::Display for ConfirmationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfirmationReason::FanIn {
                bank_record_id,
                entry_count,
            } => write!(
                f,
                "linking {} entries to bank record '{}'",
                entry_count, bank_record_id
            ),
            ConfirmationReason::UnconfirmedCategory { bank_record_id } => write!(
                f,
                "bank record '{}' has an unconfirmed category",
                bank_record_id
            ),
            ConfirmationReason::NegativeSettlementFee {
                bank_record_id,
                fee,
            } => write!(
                f,
                "settlement deposit '{}' exceeds the sales total (fee {})",
                bank_record_id, fee
            ),
        }
    }
}

/// Errors that can occur in the reconciliation engine
#[derive(Debug, thiserror::Error)]
pub enum ReconError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Confirmation required: {0}")]
    ConfirmationRequired(ConfirmationReason),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ReconError {
    /// Safe to re-issue after re-reading current state
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReconError::Conflict(_))
    }
}

/// Result type for reconciliation operations
pub type ReconResult<T> = Result<T, ReconError>;
