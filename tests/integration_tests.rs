//! Integration tests for reconciliation-core

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use reconciliation_core::{
    categorize, patterns, utils::StrictMatchValidator, BankLine, BankRecord, BankRecordFilter,
    Category, ChangeKind, ChangeSet, Collection, ConfirmationReason, EngineConfig, EntryBuilder,
    EntryFilter, EntryStatus, ExpenseCategory, IncomeCategory, IncomeMethod, LedgerEntry,
    MemoryStorage, PayoutMethod, ReconError, ReconResult, ReconStore, ReconciliationEngine,
    Settlement, WriteBatch,
};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{broadcast, Barrier};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 12, d).unwrap()
}

fn bank_line(date: NaiveDate, amount: i64, description: &str, source: &str) -> BankLine {
    BankLine {
        date,
        amount: BigDecimal::from(amount),
        description: description.to_string(),
        source: source.to_string(),
        settlement_deposit: false,
    }
}

fn engine(storage: MemoryStorage) -> ReconciliationEngine<MemoryStorage> {
    ReconciliationEngine::new(storage, EngineConfig::default())
}

#[tokio::test]
async fn test_batch_disbursement_stamps_only_transfers() {
    let engine = engine(MemoryStorage::new());

    let transfer = patterns::expense_request(
        BigDecimal::from(1500),
        Category::Expense(ExpenseCategory::DomesticTour),
        PayoutMethod::Transfer,
        "qiangang",
        "民宿",
        "trip lodging deposit",
    )
    .unwrap();
    let cash = patterns::expense_request(
        BigDecimal::from(800),
        Category::Expense(ExpenseCategory::Maintenance),
        PayoutMethod::Cash,
        "longdong",
        "阿明",
        "tank valve repair",
    )
    .unwrap();
    let transfer = engine.submit_expense(transfer).await.unwrap();
    let cash = engine.submit_expense(cash).await.unwrap();

    let outcome = engine
        .batch_disburse(&[transfer.id.clone(), cash.id.clone()], Some("54321"))
        .await
        .unwrap();
    assert_eq!(outcome.warnings.len(), 1);

    let transfer = engine.get_entry(&transfer.id).await.unwrap().unwrap();
    let cash = engine.get_entry(&cash.id).await.unwrap().unwrap();
    assert_eq!(transfer.outgoing_account_last5(), Some("54321"));
    assert_eq!(cash.outgoing_account_last5(), None);
    assert_eq!(transfer.status, EntryStatus::PendingReconciliation);
    assert_eq!(cash.status, EntryStatus::PendingReconciliation);
    assert_eq!(transfer.disbursement_date(), Some(outcome.disbursement_date));
    assert_eq!(cash.disbursement_date(), Some(outcome.disbursement_date));

    // Disbursed entries are no longer deletable
    assert!(matches!(
        engine.delete_entry(&cash.id).await,
        Err(ReconError::Validation(_))
    ));
}

#[tokio::test]
async fn test_single_entry_settlement_fee() {
    let engine = engine(MemoryStorage::new());

    let sale = patterns::pos_sale(
        BigDecimal::from(10000),
        Category::Income(IncomeCategory::OverseasTour),
        IncomeMethod::LinePay,
        "qiangang",
        Some("王小姐"),
    )
    .unwrap();
    let sale = engine.record_income(vec![sale]).await.unwrap().remove(0);

    let mut deposit = bank_line(day(6), 9900, "國泰世華商業銀", "bankA");
    deposit.settlement_deposit = true;
    let deposit = engine
        .ingest_bank_lines(vec![deposit])
        .await
        .unwrap()
        .remove(0);
    assert_eq!(deposit.suggested_category, Category::SettlementDeposit);

    let settlement = engine
        .reconcile_settlement(&[sale.id.clone()], &deposit.id, false)
        .await
        .unwrap();
    assert_eq!(settlement.fee, BigDecimal::from(100));
    assert_eq!(
        settlement.fee,
        &settlement.gross_total - &settlement.deposit_amount
    );

    let sale = engine.get_entry(&sale.id).await.unwrap().unwrap();
    assert!(sale.reconciled);
    assert_eq!(sale.status, EntryStatus::Completed);
    assert_eq!(sale.fee(), Some(&BigDecimal::from(100)));

    let deposit = engine.get_bank_record(&deposit.id).await.unwrap().unwrap();
    assert_eq!(deposit.matched_transaction_id, Some(sale.id.clone()));

    let fees = engine.reports().processing_fees(None, None).await.unwrap();
    assert_eq!(fees.len(), 1);
    assert_eq!(fees[0].fee, BigDecimal::from(100));
    assert_eq!(
        fees[0].category,
        Category::Expense(ExpenseCategory::PaymentProcessingFee)
    );

    let summary = engine
        .reports()
        .reconciliation_summary(None, None)
        .await
        .unwrap();
    assert_eq!(summary.processing_fees, BigDecimal::from(100));
}

#[test]
fn test_categorize_club_marker_wins() {
    let expected = Category::Income(IncomeCategory::NortheastCoastEvents);
    assert_eq!(categorize("今日龍洞俱樂部活動收入"), expected);
    assert_eq!(categorize("俱樂部 教學 銷售"), expected);

    let input = "東北角收入 12月";
    assert_eq!(categorize(input), categorize(input));
}

#[tokio::test]
async fn test_committed_match_invariants() {
    let storage = MemoryStorage::new();
    let engine = engine(storage.clone());

    let a = patterns::pos_sale(
        BigDecimal::from(1200),
        Category::Income(IncomeCategory::Teaching),
        IncomeMethod::Transfer,
        "qiangang",
        None,
    )
    .unwrap();
    let b = patterns::pos_sale(
        BigDecimal::from(800),
        Category::Income(IncomeCategory::Teaching),
        IncomeMethod::Transfer,
        "qiangang",
        None,
    )
    .unwrap();
    let entries = engine.record_income(vec![a, b]).await.unwrap();
    let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
    let record = engine
        .ingest_bank_lines(vec![bank_line(day(9), 2000, "教學 AOW", "esun")])
        .await
        .unwrap()
        .remove(0);

    assert!(matches!(
        engine.commit_match(&ids, &record.id, false).await,
        Err(ReconError::ConfirmationRequired(ConfirmationReason::FanIn {
            entry_count: 2,
            ..
        }))
    ));
    engine.commit_match(&ids, &record.id, true).await.unwrap();

    let record = engine.get_bank_record(&record.id).await.unwrap().unwrap();
    assert_eq!(record.matched_transaction_id.as_ref(), Some(&ids[0]));
    assert_eq!(record.matched_entry_ids, ids);
    for id in &ids {
        let entry = engine.get_entry(id).await.unwrap().unwrap();
        assert!(entry.reconciled);
        assert_eq!(entry.status, EntryStatus::Completed);
        assert_eq!(entry.matched_bank_record_id.as_ref(), Some(&record.id));
    }

    // The match is permanent, even when written straight to the store
    let mut unmatched = record.clone();
    unmatched.matched_transaction_id = None;
    unmatched.matched_entry_ids.clear();
    let mut batch = WriteBatch::new();
    batch.update_bank_record(unmatched);
    assert!(storage.commit(batch).await.is_err());

    // An entry cannot be linked a second time
    let other = engine
        .ingest_bank_lines(vec![bank_line(day(9), 1200, "", "esun")])
        .await
        .unwrap()
        .remove(0);
    assert!(matches!(
        engine.commit_match(&ids[..1], &other.id, false).await,
        Err(ReconError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_requires_pending_approval() {
    let engine = engine(MemoryStorage::new());
    let sale = EntryBuilder::income(
        "pos-cash-1",
        BigDecimal::from(350),
        Category::Income(IncomeCategory::Sales),
        IncomeMethod::Cash,
    )
    .build()
    .unwrap();
    engine.record_income(vec![sale]).await.unwrap();

    assert!(matches!(
        engine.delete_entry("pos-cash-1").await,
        Err(ReconError::Validation(_))
    ));
    assert!(engine.get_entry("pos-cash-1").await.unwrap().is_some());
}

/// Holds both callers between their reads and their commits
#[derive(Clone)]
struct GatedStore {
    inner: MemoryStorage,
    gate: Arc<Barrier>,
}

#[async_trait]
impl ReconStore for GatedStore {
    async fn get_entry(&self, entry_id: &str) -> ReconResult<Option<LedgerEntry>> {
        self.inner.get_entry(entry_id).await
    }

    async fn list_entries(&self, filter: &EntryFilter) -> ReconResult<Vec<LedgerEntry>> {
        self.inner.list_entries(filter).await
    }

    async fn get_bank_record(&self, record_id: &str) -> ReconResult<Option<BankRecord>> {
        self.inner.get_bank_record(record_id).await
    }

    async fn list_bank_records(&self, filter: &BankRecordFilter) -> ReconResult<Vec<BankRecord>> {
        self.inner.list_bank_records(filter).await
    }

    async fn get_settlement(&self, settlement_id: &str) -> ReconResult<Option<Settlement>> {
        self.inner.get_settlement(settlement_id).await
    }

    async fn list_settlements(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> ReconResult<Vec<Settlement>> {
        self.inner.list_settlements(start_date, end_date).await
    }

    async fn commit(&self, batch: WriteBatch) -> ReconResult<ChangeSet> {
        self.gate.wait().await;
        self.inner.commit(batch).await
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeSet> {
        self.inner.subscribe()
    }
}

#[tokio::test]
async fn test_concurrent_commits_on_same_bank_record() {
    let storage = MemoryStorage::new();
    let setup = engine(storage.clone());

    let mut ids = Vec::new();
    for _ in 0..2 {
        let sale = patterns::pos_sale(
            BigDecimal::from(2500),
            Category::Income(IncomeCategory::DomesticTour),
            IncomeMethod::Transfer,
            "qiangang",
            None,
        )
        .unwrap();
        ids.push(setup.record_income(vec![sale]).await.unwrap().remove(0).id);
    }
    let record = setup
        .ingest_bank_lines(vec![bank_line(day(12), 2500, "國內團 綠島", "ctbc")])
        .await
        .unwrap()
        .remove(0);

    let gated = GatedStore {
        inner: storage.clone(),
        gate: Arc::new(Barrier::new(2)),
    };
    let first = ReconciliationEngine::new(gated.clone(), EngineConfig::default());
    let second = ReconciliationEngine::new(gated, EngineConfig::default());

    let first_ids = vec![ids[0].clone()];
    let second_ids = vec![ids[1].clone()];
    let (a, b) = tokio::join!(
        first.commit_match(&first_ids, &record.id, false),
        second.commit_match(&second_ids, &record.id, false),
    );

    let (loser_ids, error) = match (a, b) {
        (Ok(_), Err(e)) => (second_ids, e),
        (Err(e), Ok(_)) => (first_ids, e),
        other => panic!("expected exactly one winner, got {:?}", other),
    };
    assert!(matches!(error, ReconError::Conflict(_)));
    assert!(error.is_retryable());

    // Nothing of the losing batch is visible
    let loser = setup.get_entry(&loser_ids[0]).await.unwrap().unwrap();
    assert!(!loser.reconciled);

    // The retry re-reads and sees the record already matched
    assert!(matches!(
        setup.commit_match(&loser_ids, &record.id, false).await,
        Err(ReconError::NotFound(_))
    ));
    let record = setup.get_bank_record(&record.id).await.unwrap().unwrap();
    assert_eq!(record.matched_entry_ids.len(), 1);
}

#[tokio::test]
async fn test_change_feed_reports_each_commit_once() {
    let engine = engine(MemoryStorage::new());
    let mut feed = engine.subscribe();

    let sale = patterns::pos_sale(
        BigDecimal::from(640),
        Category::Income(IncomeCategory::Longdong),
        IncomeMethod::Transfer,
        "longdong",
        None,
    )
    .unwrap();
    let sale = engine.record_income(vec![sale]).await.unwrap().remove(0);
    let record = engine
        .ingest_bank_lines(vec![bank_line(day(14), 640, "東北角收入", "esun")])
        .await
        .unwrap()
        .remove(0);
    engine
        .commit_match(&[sale.id.clone()], &record.id, false)
        .await
        .unwrap();

    let _intake = feed.recv().await.unwrap();
    let _import = feed.recv().await.unwrap();
    let matched = feed.recv().await.unwrap();
    assert_eq!(matched.changes.len(), 2);
    assert!(matched
        .changes
        .iter()
        .all(|c| c.kind == ChangeKind::Updated));
    assert!(matched
        .changes
        .iter()
        .any(|c| c.collection == Collection::BankRecords && c.id == record.id));
    assert!(feed.try_recv().is_err());
}

#[tokio::test]
async fn test_auto_reconcile_then_quick_create_leftovers() {
    let storage = MemoryStorage::new();
    let engine = engine(storage.clone());

    let sale = patterns::pos_sale(
        BigDecimal::from(4200),
        Category::Income(IncomeCategory::Teaching),
        IncomeMethod::Transfer,
        "qiangang",
        None,
    )
    .unwrap();
    let sale = engine.record_income(vec![sale]).await.unwrap().remove(0);

    let expense = patterns::expense_request(
        BigDecimal::from(1800),
        Category::Expense(ExpenseCategory::Advertising),
        PayoutMethod::Transfer,
        "qiangang",
        "print shop",
        "flyers",
    )
    .unwrap();
    let expense = engine.submit_expense(expense).await.unwrap();
    engine
        .batch_disburse(&[expense.id.clone()], Some("00123"))
        .await
        .unwrap();

    let mut near = bank_line(day(20), 0, "ATM 轉入", "esun");
    near.amount = BigDecimal::from_str("4199.5").unwrap();
    let records = engine
        .ingest_bank_lines(vec![
            near,
            bank_line(day(20), -1800, "跨行轉出", "esun"),
            bank_line(day(21), 950, "銷售 防寒衣", "esun"),
        ])
        .await
        .unwrap();

    let report = engine.run_auto_reconcile().await.unwrap();
    assert_eq!(report.matched.len(), 2);
    assert_eq!(report.without_candidate, 0);

    let sale = engine.get_entry(&sale.id).await.unwrap().unwrap();
    assert_eq!(sale.matched_bank_record_id.as_ref(), Some(&records[0].id));
    let expense = engine.get_entry(&expense.id).await.unwrap().unwrap();
    assert_eq!(expense.status, EntryStatus::Completed);

    let leftovers = engine.reports().unmatched_bank_records(None, None).await.unwrap();
    assert_eq!(leftovers.len(), 1);
    let created = engine
        .quick_create_from_deposit(&leftovers[0].id, false)
        .await
        .unwrap();
    assert_eq!(created.category, Category::Income(IncomeCategory::Sales));
    assert_eq!(created.description.as_deref(), Some("[bank] 銷售 防寒衣"));

    let history = engine.reports().matched_history(None, None).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|pair| pair.bank_record.is_some()));
    assert!(engine
        .reports()
        .outstanding_entries(&EntryFilter::all())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_strict_validator_refuses_amount_mismatch() {
    let engine = ReconciliationEngine::with_validator(
        MemoryStorage::new(),
        EngineConfig::default(),
        Box::new(StrictMatchValidator),
    );
    let sale = patterns::pos_sale(
        BigDecimal::from(1000),
        Category::Income(IncomeCategory::Sales),
        IncomeMethod::Transfer,
        "qiangang",
        None,
    )
    .unwrap();
    let sale = engine.record_income(vec![sale]).await.unwrap().remove(0);
    let record = engine
        .ingest_bank_lines(vec![bank_line(day(2), 990, "", "esun")])
        .await
        .unwrap()
        .remove(0);

    assert!(matches!(
        engine
            .commit_match(&[sale.id.clone()], &record.id, false)
            .await,
        Err(ReconError::Validation(_))
    ));
}
