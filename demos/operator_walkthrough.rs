//! One bookkeeping day: intake, payout, import, matching and settlement

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use reconciliation_core::telemetry::init_tracing;
use reconciliation_core::{
    patterns, BankLine, Category, EngineConfig, ExpenseCategory, IncomeCategory, IncomeMethod,
    MemoryStorage, PayoutMethod, ReconError, ReconciliationEngine,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::from_env()?;
    init_tracing(&config.telemetry)?;

    println!("Reconciliation Core - operator walkthrough\n");
    let engine = ReconciliationEngine::new(MemoryStorage::new(), config);
    let date = NaiveDate::from_ymd_opt(2024, 8, 3).ok_or("invalid date")?;

    // 1. Point-of-sale checkout
    println!("Recording sales...");
    let sales = engine
        .record_income(vec![
            patterns::pos_sale(
                BigDecimal::from(3000),
                Category::Income(IncomeCategory::Teaching),
                IncomeMethod::Transfer,
                "qiangang",
                Some("陳先生"),
            )?,
            patterns::pos_sale(
                BigDecimal::from(2000),
                Category::Income(IncomeCategory::NortheastCoastEvents),
                IncomeMethod::LinePay,
                "longdong",
                None,
            )?,
            patterns::pos_sale(
                BigDecimal::from(2300),
                Category::Income(IncomeCategory::NortheastCoastEvents),
                IncomeMethod::LinePay,
                "longdong",
                None,
            )?,
        ])
        .await?;
    for sale in &sales {
        println!("  {} {} {:?}", sale.category, sale.amount, sale.status);
    }

    // 2. Expense requests and payout
    println!("\nDisbursing expenses...");
    let boat = engine
        .submit_expense(patterns::expense_request(
            BigDecimal::from(1500),
            Category::Expense(ExpenseCategory::NortheastCoast),
            PayoutMethod::Transfer,
            "longdong",
            "船家",
            "boat charter",
        )?)
        .await?;
    let snacks = engine
        .submit_expense(patterns::expense_request(
            BigDecimal::from(800),
            Category::Expense(ExpenseCategory::Employee),
            PayoutMethod::Cash,
            "longdong",
            "staff",
            "lunch boxes",
        )?)
        .await?;
    let outcome = engine
        .batch_disburse(&[boat.id.clone(), snacks.id.clone()], Some("54321"))
        .await?;
    for warning in &outcome.warnings {
        println!("  warning: {:?}", warning);
    }

    // 3. Bank statement import
    println!("\nImporting bank lines...");
    let payout = BankLine {
        date,
        amount: BigDecimal::from(4205),
        description: "國泰世華商業銀".to_string(),
        source: "ctbc".to_string(),
        settlement_deposit: true,
    };
    let records = engine
        .ingest_bank_lines(vec![
            BankLine {
                date,
                amount: BigDecimal::from(3000),
                description: "教學 OW 陳先生".to_string(),
                source: "esun".to_string(),
                settlement_deposit: false,
            },
            BankLine {
                date,
                amount: BigDecimal::from(-1500),
                description: "跨行轉出".to_string(),
                source: "esun".to_string(),
                settlement_deposit: false,
            },
            BankLine {
                date,
                amount: BigDecimal::from(600),
                description: "現金存入".to_string(),
                source: "esun".to_string(),
                settlement_deposit: false,
            },
            payout,
        ])
        .await?;
    for record in &records {
        println!(
            "  {} {} -> {}",
            record.amount, record.description, record.suggested_category
        );
    }

    // 4. Automatic pass
    let report = engine.run_auto_reconcile().await?;
    println!(
        "\nAuto-reconcile: {} matched, {} without candidate",
        report.matched.len(),
        report.without_candidate
    );

    // 5. Unidentified deposit needs the operator's go-ahead
    let unknown = &records[2];
    match engine.quick_create_from_deposit(&unknown.id, false).await {
        Err(ReconError::ConfirmationRequired(reason)) => {
            println!("Confirmation needed: {}", reason);
            let entry = engine.quick_create_from_deposit(&unknown.id, true).await?;
            println!("  created {} ({})", entry.id, entry.category);
        }
        other => {
            other?;
        }
    }

    // 6. Line Pay settlement
    let line_pay: Vec<String> = sales[1..].iter().map(|s| s.id.clone()).collect();
    let preview = engine.preview_settlement(&line_pay, &records[3].id).await?;
    println!(
        "\nSettlement preview: gross {} deposit {} fee {}",
        preview.gross_total, preview.deposit_amount, preview.fee
    );
    match engine
        .reconcile_settlement(&line_pay, &records[3].id, false)
        .await
    {
        Err(ReconError::ConfirmationRequired(reason)) => {
            println!("Confirmation needed: {}", reason);
            let settlement = engine
                .reconcile_settlement(&line_pay, &records[3].id, true)
                .await?;
            println!("  settled {} (fee {})", settlement.id, settlement.fee);
        }
        other => {
            other?;
        }
    }

    // 7. Where things stand
    let summary = engine.reports().reconciliation_summary(None, None).await?;
    println!("\nSummary");
    println!(
        "  income {} ({} reconciled)",
        summary.income.total, summary.reconciled_income.total
    );
    println!("  outstanding expenses {}", summary.outstanding_expenses.total);
    println!("  processing fees {}", summary.processing_fees);
    println!(
        "  unmatched bank lines {}",
        summary.unmatched_deposits.count + summary.unmatched_withdrawals.count
    );

    Ok(())
}
