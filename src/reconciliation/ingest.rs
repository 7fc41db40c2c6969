//! Intake of parsed bank statement lines

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::category::Category;
use crate::ledger::entry::new_id;
use crate::reconciliation::categorizer::categorize;
use crate::traits::*;
use crate::types::*;

/// A statement line as delivered by the parsing collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankLine {
    pub date: NaiveDate,
    pub amount: BigDecimal,
    pub description: String,
    pub source: String,
    /// The parser recognized an aggregated processor payout
    #[serde(default)]
    pub settlement_deposit: bool,
}

impl BankLine {
    fn into_record(self, imported_at: chrono::NaiveDateTime) -> ReconResult<BankRecord> {
        if self.amount == BigDecimal::from(0) {
            return Err(ReconError::Validation(format!(
                "Bank line on {} has a zero amount",
                self.date
            )));
        }
        if self.source.trim().is_empty() {
            return Err(ReconError::Validation(
                "Bank line source account cannot be empty".to_string(),
            ));
        }

        let suggested_category = if self.settlement_deposit {
            Category::SettlementDeposit
        } else {
            categorize(&self.description)
        };

        Ok(BankRecord {
            id: new_id(),
            date: self.date,
            amount: self.amount,
            description: self.description,
            source: self.source,
            suggested_category,
            matched_transaction_id: None,
            matched_entry_ids: Vec::new(),
            imported_at,
            version: 0,
        })
    }
}

/// Writes imported lines and manages their category suggestions
pub struct BankIngestor<S: ReconStore> {
    storage: S,
}

impl<S: ReconStore> BankIngestor<S> {
    /// Create a new ingestor
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Import lines as one batch, tagging each with a suggested category
    pub async fn ingest(&self, lines: Vec<BankLine>) -> ReconResult<Vec<BankRecord>> {
        let imported_at = chrono::Utc::now().naive_utc();
        let records = lines
            .into_iter()
            .map(|line| line.into_record(imported_at))
            .collect::<ReconResult<Vec<_>>>()?;

        if records.is_empty() {
            return Ok(records);
        }

        let mut batch = WriteBatch::new();
        for record in &records {
            batch.create_bank_record(record.clone());
        }
        self.storage.commit(batch).await?;

        let unconfirmed = records
            .iter()
            .filter(|r| r.suggested_category.is_unconfirmed())
            .count();
        info!(count = records.len(), unconfirmed, "Imported bank records");

        let mut stored = Vec::with_capacity(records.len());
        for record in &records {
            stored.push(self.get_required(&record.id).await?);
        }
        Ok(stored)
    }

    /// Replace the suggestion on an unmatched record
    pub async fn override_suggested_category(
        &self,
        record_id: &str,
        category: Category,
    ) -> ReconResult<BankRecord> {
        let mut record = self.get_required(record_id).await?;
        if record.is_matched() {
            return Err(ReconError::Validation(format!(
                "Bank record '{}' is matched; its category is final",
                record_id
            )));
        }

        record.suggested_category = category;
        let mut batch = WriteBatch::new();
        batch.update_bank_record(record);
        self.storage.commit(batch).await?;
        info!(record_id, category = %category, "Overrode suggested category");

        self.get_required(record_id).await
    }

    async fn get_required(&self, record_id: &str) -> ReconResult<BankRecord> {
        self.storage
            .get_bank_record(record_id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("Bank record '{}'", record_id)))
    }
}
