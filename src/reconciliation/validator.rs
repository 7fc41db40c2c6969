//! Pre-commit checks for a selected match

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::traits::MatchValidator;
use crate::types::*;

/// Suspicious but permitted aspects of a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchWarning {
    /// Income and expense entries selected together; direction is unchecked
    MixedEntryKinds,
    /// Entries do not add up to the bank amount
    AmountMismatch {
        entries_total: BigDecimal,
        bank_amount: BigDecimal,
    },
}

impl fmt::Display for MatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchWarning::MixedEntryKinds => {
                write!(f, "selection mixes income and expense entries")
            }
            MatchWarning::AmountMismatch {
                entries_total,
                bank_amount,
            } => write!(
                f,
                "entries total {} but the bank line is {}",
                entries_total, bank_amount
            ),
        }
    }
}

/// Outcome of a successful validation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchAssessment {
    pub warnings: Vec<MatchWarning>,
    /// More than one entry against the bank record
    pub fan_in: bool,
}

/// Default validator
///
/// Hard failures come first (missing selections, already matched records,
/// direction mismatch, many bank records); the fan-in confirmation request is
/// only raised once everything else holds.
pub struct DefaultMatchValidator;

impl MatchValidator for DefaultMatchValidator {
    fn validate_match(
        &self,
        entries: &[LedgerEntry],
        bank_records: &[BankRecord],
        confirmed: bool,
    ) -> ReconResult<MatchAssessment> {
        if entries.is_empty() {
            return Err(ReconError::Validation(
                "Select at least one ledger entry".to_string(),
            ));
        }

        let record = match bank_records {
            [] => {
                return Err(ReconError::Validation(
                    "Select a bank record".to_string(),
                ))
            }
            [record] => record,
            _ => {
                return Err(ReconError::Validation(format!(
                    "{} bank records selected; match them one at a time",
                    bank_records.len()
                )))
            }
        };

        let mut ids = HashSet::new();
        for entry in entries {
            if !ids.insert(entry.id.as_str()) {
                return Err(ReconError::Validation(format!(
                    "Entry '{}' selected more than once",
                    entry.id
                )));
            }
            if entry.reconciled {
                return Err(ReconError::NotFound(format!(
                    "Entry '{}' is already reconciled",
                    entry.id
                )));
            }
            if entry.status != EntryStatus::PendingReconciliation {
                return Err(ReconError::Validation(format!(
                    "Entry '{}' is {:?}, not pending reconciliation",
                    entry.id, entry.status
                )));
            }
        }

        if record.is_matched() {
            return Err(ReconError::NotFound(format!(
                "Bank record '{}' is already matched",
                record.id
            )));
        }
        if record.is_settlement_deposit() {
            return Err(ReconError::Validation(format!(
                "Bank record '{}' is a settlement deposit; reconcile it as a settlement",
                record.id
            )));
        }

        let all_income = entries.iter().all(|e| e.kind() == EntryKind::Income);
        let all_expense = entries.iter().all(|e| e.kind() == EntryKind::Expense);
        if all_income && !record.is_deposit() {
            return Err(ReconError::Validation(format!(
                "Income entries cannot match withdrawal '{}'",
                record.id
            )));
        }
        if all_expense && !record.is_withdrawal() {
            return Err(ReconError::Validation(format!(
                "Expense entries cannot match deposit '{}'",
                record.id
            )));
        }

        let mut warnings = Vec::new();
        if !all_income && !all_expense {
            warnings.push(MatchWarning::MixedEntryKinds);
        }
        let entries_total: BigDecimal = entries.iter().map(|e| e.signed_amount()).sum();
        if entries_total != record.amount {
            warnings.push(MatchWarning::AmountMismatch {
                entries_total,
                bank_amount: record.amount.clone(),
            });
        }

        let fan_in = entries.len() > 1;
        if fan_in && !confirmed {
            return Err(ReconError::ConfirmationRequired(ConfirmationReason::FanIn {
                bank_record_id: record.id.clone(),
                entry_count: entries.len(),
            }));
        }

        Ok(MatchAssessment { warnings, fan_in })
    }
}
