//! Closed income and expense category sets
//!
//! Labels are the operator-facing names as they appear on statements and
//! reports. They are also the serialized form, so a category round-trips
//! through the store as its label.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{EntryKind, ReconError};

/// Label of the "not yet confirmed" sentinel
pub const UNCONFIRMED_LABEL: &str = "待確認";

/// Label the ingestion collaborator uses for aggregated processor payouts
pub const SETTLEMENT_DEPOSIT_LABEL: &str = "Line Pay 撥款";

/// Income categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncomeCategory {
    /// Diving lessons and certification courses
    Teaching,
    /// Retail sales
    Sales,
    /// Club / recreational events on the northeast coast
    NortheastCoastEvents,
    /// Longdong regional site income
    Longdong,
    /// Domestic group trips
    DomesticTour,
    /// Overseas group trips
    OverseasTour,
    /// Anything else (rent received and similar)
    Special,
}

impl IncomeCategory {
    pub const ALL: [IncomeCategory; 7] = [
        IncomeCategory::Teaching,
        IncomeCategory::Sales,
        IncomeCategory::NortheastCoastEvents,
        IncomeCategory::Longdong,
        IncomeCategory::DomesticTour,
        IncomeCategory::OverseasTour,
        IncomeCategory::Special,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            IncomeCategory::Teaching => "教學",
            IncomeCategory::Sales => "銷售",
            IncomeCategory::NortheastCoastEvents => "東北角活動",
            IncomeCategory::Longdong => "龍洞",
            IncomeCategory::DomesticTour => "國內團",
            IncomeCategory::OverseasTour => "國外團",
            IncomeCategory::Special => "特殊",
        }
    }
}

/// How an expense category rolls up in the profit report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CostClass {
    /// Cost of goods sold: directly attributable to a revenue line
    CostOfGoods,
    /// Operating expense
    Operating,
}

/// Expense categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpenseCategory {
    Longdong,
    Teaching,
    FdStaff,
    Staff,
    Sales,
    NortheastCoast,
    DomesticTour,
    OverseasTour,
    Vehicle,
    Maintenance,
    Utilities,
    Advertising,
    Employee,
    PassThrough,
    Tax,
    Insurance,
    StudentRefund,
    PaymentProcessingFee,
}

impl ExpenseCategory {
    pub const ALL: [ExpenseCategory; 18] = [
        ExpenseCategory::Longdong,
        ExpenseCategory::Teaching,
        ExpenseCategory::FdStaff,
        ExpenseCategory::Staff,
        ExpenseCategory::Sales,
        ExpenseCategory::NortheastCoast,
        ExpenseCategory::DomesticTour,
        ExpenseCategory::OverseasTour,
        ExpenseCategory::Vehicle,
        ExpenseCategory::Maintenance,
        ExpenseCategory::Utilities,
        ExpenseCategory::Advertising,
        ExpenseCategory::Employee,
        ExpenseCategory::PassThrough,
        ExpenseCategory::Tax,
        ExpenseCategory::Insurance,
        ExpenseCategory::StudentRefund,
        ExpenseCategory::PaymentProcessingFee,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ExpenseCategory::Longdong => "龍洞支出",
            ExpenseCategory::Teaching => "教學支出",
            ExpenseCategory::FdStaff => "FD幹部支出",
            ExpenseCategory::Staff => "幹部支出",
            ExpenseCategory::Sales => "銷售支出",
            ExpenseCategory::NortheastCoast => "東北角支出",
            ExpenseCategory::DomesticTour => "國內團支出",
            ExpenseCategory::OverseasTour => "國外團支出",
            ExpenseCategory::Vehicle => "車輛支出",
            ExpenseCategory::Maintenance => "維修保養支出",
            ExpenseCategory::Utilities => "水電瓦斯支出",
            ExpenseCategory::Advertising => "廣告支出",
            ExpenseCategory::Employee => "員工支出",
            ExpenseCategory::PassThrough => "代收代付",
            ExpenseCategory::Tax => "稅金",
            ExpenseCategory::Insurance => "保險支出",
            ExpenseCategory::StudentRefund => "學員退款",
            ExpenseCategory::PaymentProcessingFee => "金流手續費",
        }
    }

    pub fn cost_class(&self) -> CostClass {
        match self {
            ExpenseCategory::Longdong
            | ExpenseCategory::Teaching
            | ExpenseCategory::NortheastCoast
            | ExpenseCategory::DomesticTour
            | ExpenseCategory::OverseasTour
            | ExpenseCategory::PassThrough
            | ExpenseCategory::Insurance
            | ExpenseCategory::StudentRefund => CostClass::CostOfGoods,
            ExpenseCategory::FdStaff
            | ExpenseCategory::Staff
            | ExpenseCategory::Sales
            | ExpenseCategory::Vehicle
            | ExpenseCategory::Maintenance
            | ExpenseCategory::Utilities
            | ExpenseCategory::Advertising
            | ExpenseCategory::Employee
            | ExpenseCategory::Tax
            | ExpenseCategory::PaymentProcessingFee => CostClass::Operating,
        }
    }
}

/// A category as carried by ledger entries and bank-record suggestions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Category {
    Income(IncomeCategory),
    Expense(ExpenseCategory),
    /// Aggregated processor payout awaiting settlement reconciliation
    SettlementDeposit,
    /// Nothing matched; needs an operator decision
    Unconfirmed,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Category::Income(c) => c.label(),
            Category::Expense(c) => c.label(),
            Category::SettlementDeposit => SETTLEMENT_DEPOSIT_LABEL,
            Category::Unconfirmed => UNCONFIRMED_LABEL,
        }
    }

    /// Parse an operator-facing label
    pub fn from_label(label: &str) -> Option<Category> {
        let label = label.trim();
        if label == UNCONFIRMED_LABEL {
            return Some(Category::Unconfirmed);
        }
        if label == SETTLEMENT_DEPOSIT_LABEL {
            return Some(Category::SettlementDeposit);
        }
        IncomeCategory::ALL
            .iter()
            .find(|c| c.label() == label)
            .map(|c| Category::Income(*c))
            .or_else(|| {
                ExpenseCategory::ALL
                    .iter()
                    .find(|c| c.label() == label)
                    .map(|c| Category::Expense(*c))
            })
    }

    pub fn is_unconfirmed(&self) -> bool {
        matches!(self, Category::Unconfirmed)
    }

    /// Whether a ledger entry of `kind` may carry this category.
    /// The unconfirmed sentinel is accepted for either kind.
    pub fn fits(&self, kind: EntryKind) -> bool {
        match (self, kind) {
            (Category::Income(_), EntryKind::Income) => true,
            (Category::Expense(_), EntryKind::Expense) => true,
            (Category::Unconfirmed, _) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.label().to_string()
    }
}

impl TryFrom<String> for Category {
    type Error = ReconError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Category::from_label(&value)
            .ok_or_else(|| ReconError::Validation(format!("Unknown category '{}'", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_income_and_expense_labels_are_disjoint() {
        for income in IncomeCategory::ALL {
            for expense in ExpenseCategory::ALL {
                assert_ne!(income.label(), expense.label());
            }
        }
    }

    #[test]
    fn test_label_parsing() {
        assert_eq!(
            Category::from_label("東北角活動"),
            Some(Category::Income(IncomeCategory::NortheastCoastEvents))
        );
        assert_eq!(
            Category::from_label(" 金流手續費 "),
            Some(Category::Expense(ExpenseCategory::PaymentProcessingFee))
        );
        assert_eq!(Category::from_label("待確認"), Some(Category::Unconfirmed));
        assert_eq!(
            Category::from_label("Line Pay 撥款"),
            Some(Category::SettlementDeposit)
        );
        assert_eq!(Category::from_label("unknown"), None);
    }

    #[test]
    fn test_serializes_as_label() {
        let json = serde_json::to_string(&Category::Income(IncomeCategory::Sales)).unwrap();
        assert_eq!(json, "\"銷售\"");

        let parsed: Category = serde_json::from_str("\"稅金\"").unwrap();
        assert_eq!(parsed, Category::Expense(ExpenseCategory::Tax));

        assert!(serde_json::from_str::<Category>("\"nope\"").is_err());
    }

    #[test]
    fn test_cost_classes() {
        assert_eq!(
            ExpenseCategory::StudentRefund.cost_class(),
            CostClass::CostOfGoods
        );
        assert_eq!(
            ExpenseCategory::PaymentProcessingFee.cost_class(),
            CostClass::Operating
        );
    }

    #[test]
    fn test_category_fits_kind() {
        assert!(Category::Income(IncomeCategory::Teaching).fits(EntryKind::Income));
        assert!(!Category::Income(IncomeCategory::Teaching).fits(EntryKind::Expense));
        assert!(Category::Unconfirmed.fits(EntryKind::Expense));
        assert!(!Category::SettlementDeposit.fits(EntryKind::Income));
    }
}
