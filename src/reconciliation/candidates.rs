//! Advisory counterpart suggestions
//!
//! The two directions deliberately differ: an entry looks for a bank line
//! within a tolerance, while a bank line looks for an entry with exactly its
//! magnitude. Neither ranks; the first hit in the given order is returned.

use bigdecimal::BigDecimal;

use crate::types::{BankRecord, EntryKind, LedgerEntry};

/// First unmatched bank record whose amount is strictly within `tolerance`
/// of the entry's signed amount.
pub fn find_bank_candidate<'a>(
    entry: &LedgerEntry,
    unmatched_bank_records: &'a [BankRecord],
    tolerance: &BigDecimal,
) -> Option<&'a BankRecord> {
    let target = entry.signed_amount();
    unmatched_bank_records
        .iter()
        .filter(|record| !record.is_matched())
        .find(|record| (&record.amount - &target).abs() < *tolerance)
}

/// First unmatched entry with exactly the bank record's magnitude and a
/// compatible kind.
///
/// Deposits only pair with income. Withdrawals pair with expenses, and for
/// compatibility with historical data also with income.
pub fn find_entry_candidate<'a>(
    bank_record: &BankRecord,
    unmatched_entries: &'a [LedgerEntry],
) -> Option<&'a LedgerEntry> {
    let magnitude = bank_record.amount.abs();
    let deposit = bank_record.is_deposit();
    unmatched_entries
        .iter()
        .filter(|entry| !entry.reconciled)
        .find(|entry| {
            let kind_ok = match entry.kind() {
                EntryKind::Income => true,
                EntryKind::Expense => !deposit,
            };
            kind_ok && entry.amount == magnitude
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::entry::EntryBuilder;
    use crate::category::{Category, ExpenseCategory, IncomeCategory};
    use crate::types::{IncomeMethod, PayoutMethod};
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn record(id: &str, amount: &str) -> BankRecord {
        BankRecord {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            amount: BigDecimal::from_str(amount).unwrap(),
            description: String::new(),
            source: "esun".to_string(),
            suggested_category: Category::Unconfirmed,
            matched_transaction_id: None,
            matched_entry_ids: Vec::new(),
            imported_at: chrono::Utc::now().naive_utc(),
            version: 1,
        }
    }

    fn income(id: &str, amount: i64) -> LedgerEntry {
        EntryBuilder::income(
            id,
            BigDecimal::from(amount),
            Category::Income(IncomeCategory::Sales),
            IncomeMethod::Transfer,
        )
        .build()
        .unwrap()
    }

    fn expense(id: &str, amount: i64) -> LedgerEntry {
        EntryBuilder::expense(
            id,
            BigDecimal::from(amount),
            Category::Expense(ExpenseCategory::Vehicle),
            PayoutMethod::Transfer,
        )
        .build()
        .unwrap()
    }

    #[test]
    fn test_bank_candidate_uses_signed_amount_and_tolerance() {
        let tolerance = BigDecimal::from(1);
        let records = vec![
            record("deposit", "1500"),
            record("near", "-1500.4"),
            record("exact", "-1500"),
        ];

        let found = find_bank_candidate(&expense("e1", 1500), &records, &tolerance).unwrap();
        assert_eq!(found.id, "near");

        let found = find_bank_candidate(&income("i1", 1500), &records, &tolerance).unwrap();
        assert_eq!(found.id, "deposit");
    }

    #[test]
    fn test_bank_candidate_tolerance_is_exclusive() {
        let tolerance = BigDecimal::from(1);
        let records = vec![record("off-by-one", "1001")];
        assert!(find_bank_candidate(&income("i1", 1000), &records, &tolerance).is_none());
    }

    #[test]
    fn test_bank_candidate_skips_matched() {
        let tolerance = BigDecimal::from(1);
        let mut matched = record("taken", "200");
        matched.matched_transaction_id = Some("x".to_string());
        matched.matched_entry_ids = vec!["x".to_string()];
        let records = vec![matched, record("free", "200")];
        let found = find_bank_candidate(&income("i1", 200), &records, &tolerance).unwrap();
        assert_eq!(found.id, "free");
    }

    #[test]
    fn test_entry_candidate_is_exact() {
        let entries = vec![income("i1", 999), income("i2", 1000)];
        let found = find_entry_candidate(&record("b", "1000"), &entries).unwrap();
        assert_eq!(found.id, "i2");
        assert!(find_entry_candidate(&record("b", "1000.5"), &entries).is_none());
    }

    #[test]
    fn test_entry_candidate_direction() {
        let entries = vec![expense("e1", 300), income("i1", 300)];

        // Deposit never pairs with an expense
        let found = find_entry_candidate(&record("dep", "300"), &entries).unwrap();
        assert_eq!(found.id, "i1");

        // Withdrawal takes the first of either kind
        let found = find_entry_candidate(&record("wd", "-300"), &entries).unwrap();
        assert_eq!(found.id, "e1");
        let income_only = vec![income("i1", 300)];
        let found = find_entry_candidate(&record("wd", "-300"), &income_only).unwrap();
        assert_eq!(found.id, "i1");
    }
}
