//! Batch payout of approved expense requests

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

use crate::traits::*;
use crate::types::*;
use crate::utils::validation::validate_account_last5;

/// Non-blocking observations about a payout batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisbursementWarning {
    /// Cash and transfer payouts in one batch; only the transfers carry the
    /// outgoing account
    MixedPayoutMethods { cash: usize, transfer: usize },
    /// Transfer payouts recorded without the outgoing account
    MissingAccountDigits { transfer: usize },
}

/// Result of a batch disbursement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisbursementOutcome {
    pub entries: Vec<LedgerEntry>,
    /// Shared by every entry in the batch
    pub disbursement_date: NaiveDateTime,
    pub warnings: Vec<DisbursementWarning>,
}

/// Drives expense requests from `pending_approval` to
/// `pending_reconciliation`
pub struct DisbursementManager<S: ReconStore> {
    storage: S,
}

impl<S: ReconStore> DisbursementManager<S> {
    /// Create a new disbursement manager
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Pay out a batch of approved expenses in one atomic write.
    ///
    /// Every entry gets the same disbursement timestamp. Transfer payouts
    /// are stamped with `last5` when given; cash payouts never are.
    pub async fn batch_disburse(
        &self,
        entry_ids: &[String],
        last5: Option<&str>,
    ) -> ReconResult<DisbursementOutcome> {
        if entry_ids.is_empty() {
            return Err(ReconError::Validation(
                "Select at least one expense to disburse".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(entry_ids.len());
        for id in entry_ids {
            if !seen.insert(id.as_str()) {
                return Err(ReconError::Validation(format!(
                    "Entry '{}' selected more than once",
                    id
                )));
            }
            let entry = self
                .storage
                .get_entry(id)
                .await?
                .ok_or_else(|| ReconError::NotFound(format!("Ledger entry '{}'", id)))?;
            if entry.kind() != EntryKind::Expense {
                return Err(ReconError::Validation(format!(
                    "Entry '{}' is not an expense",
                    id
                )));
            }
            entries.push(entry);
        }

        let transfer = entries
            .iter()
            .filter(|e| e.payout_method() == Some(PayoutMethod::Transfer))
            .count();
        let cash = entries.len() - transfer;

        let mut warnings = Vec::new();
        let last5 = match (transfer, last5) {
            (0, _) => None,
            (_, Some(digits)) => {
                validate_account_last5(digits)?;
                Some(digits.to_string())
            }
            (_, None) => {
                warn!(transfer, "Transfer payouts disbursed without account digits");
                warnings.push(DisbursementWarning::MissingAccountDigits { transfer });
                None
            }
        };

        if cash > 0 && transfer > 0 {
            warn!(cash, transfer, "Disbursement batch mixes cash and transfer payouts");
            warnings.push(DisbursementWarning::MixedPayoutMethods { cash, transfer });
        }

        let now = chrono::Utc::now().naive_utc();
        let mut batch = WriteBatch::new();
        for entry in &mut entries {
            entry.status = entry.status.apply(StatusEvent::Disbursed)?;
            if let EntryDetail::Expense {
                payout_method,
                disbursement_date,
                outgoing_account_last5,
            } = &mut entry.detail
            {
                *disbursement_date = Some(now);
                *outgoing_account_last5 = match payout_method {
                    PayoutMethod::Transfer => last5.clone(),
                    PayoutMethod::Cash => None,
                };
            }
            entry.updated_at = now;
            batch.update_entry(entry.clone());
        }

        self.storage.commit(batch).await?;
        info!(
            count = entries.len(),
            cash,
            transfer,
            "Disbursed expense batch"
        );

        let mut stored = Vec::with_capacity(entries.len());
        for entry in &entries {
            stored.push(
                self.storage
                    .get_entry(&entry.id)
                    .await?
                    .ok_or_else(|| ReconError::NotFound(format!("Ledger entry '{}'", entry.id)))?,
            );
        }

        Ok(DisbursementOutcome {
            entries: stored,
            disbursement_date: now,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::{Category, ExpenseCategory};
    use crate::ledger::entry::{EntryBuilder, EntryManager};
    use crate::utils::memory_storage::MemoryStorage;
    use bigdecimal::BigDecimal;

    async fn submit(storage: &MemoryStorage, id: &str, amount: i64, method: PayoutMethod) {
        let entry = EntryBuilder::expense(
            id,
            BigDecimal::from(amount),
            Category::Expense(ExpenseCategory::DomesticTour),
            method,
        )
        .build()
        .unwrap();
        EntryManager::new(storage.clone())
            .submit_expense(entry)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_malformed_last5_rejected() {
        let storage = MemoryStorage::new();
        submit(&storage, "x1", 100, PayoutMethod::Transfer).await;
        let manager = DisbursementManager::new(storage.clone());

        assert!(matches!(
            manager.batch_disburse(&["x1".to_string()], Some("12")).await,
            Err(ReconError::Validation(_))
        ));
        let entry = storage.get_entry("x1").await.unwrap().unwrap();
        assert_eq!(entry.status, EntryStatus::PendingApproval);
    }

    #[tokio::test]
    async fn test_transfer_without_last5_warns() {
        let storage = MemoryStorage::new();
        submit(&storage, "x1", 100, PayoutMethod::Transfer).await;
        let manager = DisbursementManager::new(storage);

        let outcome = manager
            .batch_disburse(&["x1".to_string()], None)
            .await
            .unwrap();
        assert_eq!(
            outcome.warnings,
            vec![DisbursementWarning::MissingAccountDigits { transfer: 1 }]
        );
        assert_eq!(outcome.entries[0].status, EntryStatus::PendingReconciliation);
        assert_eq!(outcome.entries[0].outgoing_account_last5(), None);
    }

    #[tokio::test]
    async fn test_cash_only_batch_needs_no_account() {
        let storage = MemoryStorage::new();
        submit(&storage, "c1", 80, PayoutMethod::Cash).await;
        let manager = DisbursementManager::new(storage);

        let outcome = manager
            .batch_disburse(&["c1".to_string()], Some("99999"))
            .await
            .unwrap();
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.entries[0].outgoing_account_last5(), None);
        assert_eq!(
            outcome.entries[0].disbursement_date(),
            Some(outcome.disbursement_date)
        );
    }

    #[tokio::test]
    async fn test_cannot_disburse_twice() {
        let storage = MemoryStorage::new();
        submit(&storage, "c1", 80, PayoutMethod::Cash).await;
        let manager = DisbursementManager::new(storage);

        manager
            .batch_disburse(&["c1".to_string()], None)
            .await
            .unwrap();
        assert!(matches!(
            manager.batch_disburse(&["c1".to_string()], None).await,
            Err(ReconError::Validation(_))
        ));
    }
}
