//! Aggregated processor settlements
//!
//! A mobile-wallet processor pays many point-of-sale charges out as one bank
//! deposit, net of its fee. The fee is never reported separately, so it is
//! derived here as `gross_total - deposit_amount` and stored with the
//! settlement.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

use crate::ledger::entry::new_id;
use crate::reconciliation::committer::link_entries;
use crate::traits::*;
use crate::types::*;

/// Figures for a prospective settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementPreview {
    pub gross_total: BigDecimal,
    pub deposit_amount: BigDecimal,
    pub fee: BigDecimal,
    /// Deposit exceeds the gross total
    pub anomaly: bool,
}

impl SettlementPreview {
    pub fn compute(entries: &[LedgerEntry], record: &BankRecord) -> Self {
        let gross_total: BigDecimal = entries.iter().map(|e| &e.amount).sum();
        let fee = &gross_total - &record.amount;
        let anomaly = fee < BigDecimal::from(0);
        Self {
            gross_total,
            deposit_amount: record.amount.clone(),
            fee,
            anomaly,
        }
    }
}

fn check_selection(entries: &[LedgerEntry], record: &BankRecord) -> ReconResult<()> {
    if entries.is_empty() {
        return Err(ReconError::Validation(
            "Select at least one point-of-sale entry".to_string(),
        ));
    }

    let mut ids = HashSet::new();
    for entry in entries {
        if !ids.insert(entry.id.as_str()) {
            return Err(ReconError::Validation(format!(
                "Entry '{}' selected more than once",
                entry.id
            )));
        }
        if entry.income_method() != Some(IncomeMethod::LinePay) {
            return Err(ReconError::Validation(format!(
                "Entry '{}' is not a Line Pay sale",
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
    if !record.is_deposit() || !record.is_settlement_deposit() {
        return Err(ReconError::Validation(format!(
            "Bank record '{}' is not a settlement deposit",
            record.id
        )));
    }

    Ok(())
}

/// Reconciles sets of Line Pay sales against settlement deposits
pub struct SettlementAggregator<S: ReconStore> {
    storage: S,
}

impl<S: ReconStore> SettlementAggregator<S> {
    /// Create a new settlement aggregator
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    async fn load(
        &self,
        entry_ids: &[String],
        bank_record_id: &str,
    ) -> ReconResult<(Vec<LedgerEntry>, BankRecord)> {
        let mut entries = Vec::with_capacity(entry_ids.len());
        for id in entry_ids {
            entries.push(
                self.storage
                    .get_entry(id)
                    .await?
                    .ok_or_else(|| ReconError::NotFound(format!("Ledger entry '{}'", id)))?,
            );
        }
        let record = self
            .storage
            .get_bank_record(bank_record_id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("Bank record '{}'", bank_record_id)))?;
        Ok((entries, record))
    }

    /// Validate the selection and show the derived fee
    pub async fn preview(
        &self,
        entry_ids: &[String],
        bank_record_id: &str,
    ) -> ReconResult<SettlementPreview> {
        let (entries, record) = self.load(entry_ids, bank_record_id).await?;
        check_selection(&entries, &record)?;
        Ok(SettlementPreview::compute(&entries, &record))
    }

    /// Reconcile the entries against the deposit and persist the settlement.
    ///
    /// More than one entry, or a negative fee, needs `confirmed = true`. A
    /// negative fee is stored flagged as an anomaly. The lead (first) entry carries a non-negative fee; every
    /// entry carries the settlement ID.
    pub async fn reconcile_settlement(
        &self,
        entry_ids: &[String],
        bank_record_id: &str,
        confirmed: bool,
    ) -> ReconResult<Settlement> {
        let (entries, record) = self.load(entry_ids, bank_record_id).await?;
        check_selection(&entries, &record)?;

        if entries.len() > 1 && !confirmed {
            return Err(ReconError::ConfirmationRequired(ConfirmationReason::FanIn {
                bank_record_id: record.id.clone(),
                entry_count: entries.len(),
            }));
        }

        let preview = SettlementPreview::compute(&entries, &record);
        if preview.anomaly {
            if !confirmed {
                return Err(ReconError::ConfirmationRequired(
                    ConfirmationReason::NegativeSettlementFee {
                        bank_record_id: bank_record_id.to_string(),
                        fee: preview.fee,
                    },
                ));
            }
            warn!(
                bank_record_id,
                fee = %preview.fee,
                "Settlement deposit exceeds sales total; recording anomaly"
            );
        }

        let settlement = Settlement {
            id: new_id(),
            bank_record_id: record.id.clone(),
            entry_ids: entry_ids.to_vec(),
            gross_total: preview.gross_total,
            deposit_amount: preview.deposit_amount,
            fee: preview.fee.clone(),
            anomaly: preview.anomaly,
            source: record.source.clone(),
            settled_at: chrono::Utc::now().naive_utc(),
            version: 0,
        };

        let (mut linked, record) = link_entries(&entries, &record)?;
        for (index, entry) in linked.iter_mut().enumerate() {
            if let EntryDetail::Income {
                fee, settlement_id, ..
            } = &mut entry.detail
            {
                *settlement_id = Some(settlement.id.clone());
                if index == 0 && !preview.anomaly {
                    *fee = Some(preview.fee.clone());
                }
            }
        }

        let mut batch = WriteBatch::new();
        for entry in linked {
            batch.update_entry(entry);
        }
        batch.update_bank_record(record);
        batch.create_settlement(settlement.clone());
        self.storage.commit(batch).await?;

        info!(
            settlement_id = %settlement.id,
            bank_record_id,
            entries = entry_ids.len(),
            gross = %settlement.gross_total,
            fee = %settlement.fee,
            "Reconciled processor settlement"
        );

        self.storage
            .get_settlement(&settlement.id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("Settlement '{}'", settlement.id)))
    }
}
