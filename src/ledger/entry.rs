//! Ledger entry construction and intake

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use tracing::info;

use crate::category::Category;
use crate::config::DEFAULT_LOCATION;
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::{validate_entry_id, validate_location, validate_positive_amount};

/// Generate a fresh document ID
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Builder for ledger entries in their initial workflow state
#[derive(Debug)]
pub struct EntryBuilder {
    entry: LedgerEntry,
}

impl EntryBuilder {
    fn new(
        id: String,
        amount: BigDecimal,
        category: Category,
        detail: EntryDetail,
        status: EntryStatus,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            entry: LedgerEntry {
                id,
                date: now,
                amount,
                category,
                detail,
                status,
                reconciled: false,
                matched_bank_record_id: None,
                location: DEFAULT_LOCATION.to_string(),
                description: None,
                counterparty: None,
                created_by: None,
                version: 0,
                created_at: now,
                updated_at: now,
            },
        }
    }

    /// Point-of-sale income. Cash is settled on the spot and starts out
    /// `completed`; everything else waits for the bank.
    pub fn income(
        id: impl Into<String>,
        amount: BigDecimal,
        category: Category,
        method: IncomeMethod,
    ) -> Self {
        let status = match method {
            IncomeMethod::Cash => EntryStatus::Completed,
            IncomeMethod::Transfer | IncomeMethod::LinePay => EntryStatus::PendingReconciliation,
        };
        Self::new(
            id.into(),
            amount,
            category,
            EntryDetail::Income {
                method,
                fee: None,
                settlement_id: None,
            },
            status,
        )
    }

    /// Expense request awaiting approval and payout
    pub fn expense(
        id: impl Into<String>,
        amount: BigDecimal,
        category: Category,
        payout_method: PayoutMethod,
    ) -> Self {
        Self::new(
            id.into(),
            amount,
            category,
            EntryDetail::Expense {
                payout_method,
                disbursement_date: None,
                outgoing_account_last5: None,
            },
            EntryStatus::PendingApproval,
        )
    }

    pub fn date(mut self, date: NaiveDateTime) -> Self {
        self.entry.date = date;
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.entry.location = location.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.entry.description = Some(description.into());
        self
    }

    pub fn counterparty(mut self, counterparty: impl Into<String>) -> Self {
        self.entry.counterparty = Some(counterparty.into());
        self
    }

    pub fn created_by(mut self, created_by: impl Into<String>) -> Self {
        self.entry.created_by = Some(created_by.into());
        self
    }

    /// Build the entry
    pub fn build(self) -> ReconResult<LedgerEntry> {
        validate_entry_id(&self.entry.id)?;
        validate_positive_amount(&self.entry.amount)?;
        validate_location(&self.entry.location)?;
        self.entry.validate()?;
        Ok(self.entry)
    }
}

/// Common entry patterns
pub mod patterns {
    use super::*;

    /// One POS checkout line, grouped per category
    pub fn pos_sale(
        amount: BigDecimal,
        category: Category,
        method: IncomeMethod,
        location: &str,
        customer: Option<&str>,
    ) -> ReconResult<LedgerEntry> {
        let mut builder = EntryBuilder::income(new_id(), amount, category, method)
            .location(location)
            .created_by("pos");
        if let Some(customer) = customer {
            builder = builder.counterparty(customer);
        }
        builder.build()
    }

    /// Reimbursement or invoice payment request
    pub fn expense_request(
        amount: BigDecimal,
        category: Category,
        payout_method: PayoutMethod,
        location: &str,
        beneficiary: &str,
        description: &str,
    ) -> ReconResult<LedgerEntry> {
        EntryBuilder::expense(new_id(), amount, category, payout_method)
            .location(location)
            .counterparty(beneficiary)
            .description(description)
            .build()
    }

    /// Completed, already-reconciled income synthesized from a deposit line
    pub fn from_bank_deposit(
        record: &BankRecord,
        category: Category,
        location: &str,
        author: &str,
    ) -> ReconResult<LedgerEntry> {
        let date = record.date.and_time(chrono::NaiveTime::MIN);
        let mut entry = EntryBuilder::income(
            new_id(),
            record.amount.clone(),
            category,
            IncomeMethod::Transfer,
        )
        .date(date)
        .location(location)
        .description(format!("[bank] {}", record.description))
        .created_by(author)
        .build()?;

        entry.status = entry.status.apply(StatusEvent::Reconciled)?;
        entry.reconciled = true;
        entry.matched_bank_record_id = Some(record.id.clone());
        entry.validate()?;
        Ok(entry)
    }
}

/// Entry manager for intake and removal of ledger entries
pub struct EntryManager<S: ReconStore> {
    storage: S,
}

impl<S: ReconStore> EntryManager<S> {
    /// Create a new entry manager
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Record point-of-sale income lines as one batch
    pub async fn record_income(&self, entries: Vec<LedgerEntry>) -> ReconResult<Vec<LedgerEntry>> {
        if entries.is_empty() {
            return Err(ReconError::Validation(
                "At least one income entry is required".to_string(),
            ));
        }

        let mut batch = WriteBatch::new();
        for entry in &entries {
            if entry.kind() != EntryKind::Income {
                return Err(ReconError::Validation(format!(
                    "Entry '{}' is not income",
                    entry.id
                )));
            }
            let expected = match entry.income_method() {
                Some(IncomeMethod::Cash) => EntryStatus::Completed,
                _ => EntryStatus::PendingReconciliation,
            };
            if entry.status != expected || entry.reconciled {
                return Err(ReconError::Validation(format!(
                    "New income entry '{}' must start as {:?} and unreconciled",
                    entry.id, expected
                )));
            }
            batch.create_entry(entry.clone());
        }

        self.storage.commit(batch).await?;
        info!(count = entries.len(), "Recorded income entries");
        self.reload(&entries).await
    }

    /// Submit an expense request in `pending_approval`
    pub async fn submit_expense(&self, entry: LedgerEntry) -> ReconResult<LedgerEntry> {
        if entry.kind() != EntryKind::Expense {
            return Err(ReconError::Validation(format!(
                "Entry '{}' is not an expense",
                entry.id
            )));
        }
        if entry.status != EntryStatus::PendingApproval || entry.reconciled {
            return Err(ReconError::Validation(format!(
                "New expense '{}' must start pending approval",
                entry.id
            )));
        }

        let mut batch = WriteBatch::new();
        batch.create_entry(entry.clone());
        self.storage.commit(batch).await?;
        info!(entry_id = %entry.id, amount = %entry.amount, "Submitted expense request");
        self.get_entry_required(&entry.id).await
    }

    /// Get an entry by ID, returning an error if not found
    pub async fn get_entry_required(&self, entry_id: &str) -> ReconResult<LedgerEntry> {
        self.storage
            .get_entry(entry_id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("Ledger entry '{}'", entry_id)))
    }

    /// Delete an entry. Only allowed while it is still pending approval.
    pub async fn delete_entry(&self, entry_id: &str) -> ReconResult<()> {
        let entry = self.get_entry_required(entry_id).await?;
        if entry.status != EntryStatus::PendingApproval {
            return Err(ReconError::Validation(format!(
                "Entry '{}' is {:?}; only entries pending approval can be deleted",
                entry_id, entry.status
            )));
        }

        let mut batch = WriteBatch::new();
        batch.delete_entry(&entry);
        self.storage.commit(batch).await?;
        info!(entry_id, "Deleted expense request");
        Ok(())
    }

    async fn reload(&self, entries: &[LedgerEntry]) -> ReconResult<Vec<LedgerEntry>> {
        let mut stored = Vec::with_capacity(entries.len());
        for entry in entries {
            stored.push(self.get_entry_required(&entry.id).await?);
        }
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::{ExpenseCategory, IncomeCategory};
    use crate::utils::memory_storage::MemoryStorage;

    #[test]
    fn test_initial_states() {
        let cash = EntryBuilder::income(
            "c1",
            BigDecimal::from(60),
            Category::Income(IncomeCategory::Longdong),
            IncomeMethod::Cash,
        )
        .build()
        .unwrap();
        assert_eq!(cash.status, EntryStatus::Completed);
        assert!(!cash.reconciled);

        let line_pay = EntryBuilder::income(
            "l1",
            BigDecimal::from(2000),
            Category::Income(IncomeCategory::NortheastCoastEvents),
            IncomeMethod::LinePay,
        )
        .build()
        .unwrap();
        assert_eq!(line_pay.status, EntryStatus::PendingReconciliation);

        let expense = EntryBuilder::expense(
            "x1",
            BigDecimal::from(800),
            Category::Expense(ExpenseCategory::Utilities),
            PayoutMethod::Cash,
        )
        .build()
        .unwrap();
        assert_eq!(expense.status, EntryStatus::PendingApproval);
    }

    #[test]
    fn test_builder_rejects_bad_input() {
        assert!(EntryBuilder::income(
            "i1",
            BigDecimal::from(0),
            Category::Income(IncomeCategory::Sales),
            IncomeMethod::Transfer,
        )
        .build()
        .is_err());

        assert!(EntryBuilder::income(
            "i1",
            BigDecimal::from(10),
            Category::Expense(ExpenseCategory::Tax),
            IncomeMethod::Transfer,
        )
        .build()
        .is_err());

        assert!(EntryBuilder::expense(
            "",
            BigDecimal::from(10),
            Category::Expense(ExpenseCategory::Tax),
            PayoutMethod::Cash,
        )
        .build()
        .is_err());
    }

    #[tokio::test]
    async fn test_delete_only_pending_approval() {
        let storage = MemoryStorage::new();
        let manager = EntryManager::new(storage.clone());

        let expense = patterns::expense_request(
            BigDecimal::from(450),
            Category::Expense(ExpenseCategory::Maintenance),
            PayoutMethod::Cash,
            "longdong",
            "阿甘",
            "regulator service",
        )
        .unwrap();
        let expense = manager.submit_expense(expense).await.unwrap();
        manager.delete_entry(&expense.id).await.unwrap();
        assert!(storage.get_entry(&expense.id).await.unwrap().is_none());

        let sale = patterns::pos_sale(
            BigDecimal::from(3000),
            Category::Income(IncomeCategory::Teaching),
            IncomeMethod::Transfer,
            "qiangang",
            Some("walk-in"),
        )
        .unwrap();
        let sale = manager.record_income(vec![sale]).await.unwrap().remove(0);
        let result = manager.delete_entry(&sale.id).await;
        assert!(matches!(result, Err(ReconError::Validation(_))));

        assert!(matches!(
            manager.delete_entry("missing").await,
            Err(ReconError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_record_income_rejects_expenses() {
        let manager = EntryManager::new(MemoryStorage::new());
        let expense = EntryBuilder::expense(
            "x1",
            BigDecimal::from(10),
            Category::Expense(ExpenseCategory::Tax),
            PayoutMethod::Cash,
        )
        .build()
        .unwrap();
        assert!(matches!(
            manager.record_income(vec![expense]).await,
            Err(ReconError::Validation(_))
        ));
    }
}
