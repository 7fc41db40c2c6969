//! Description-based category suggestions for imported bank lines

use crate::category::{Category, IncomeCategory};

/// Ordered substring rules; the first marker found wins, so the order is
/// part of the behavior.
const RULES: &[(&str, IncomeCategory)] = &[
    ("俱樂部", IncomeCategory::NortheastCoastEvents),
    ("教學", IncomeCategory::Teaching),
    ("東北角收入", IncomeCategory::Longdong),
    ("銷售", IncomeCategory::Sales),
];

/// Suggest a category for a bank line description.
///
/// Total and pure: anything without a known marker (including blank input)
/// is [`Category::Unconfirmed`]. Matching is case-sensitive containment on
/// the trimmed text.
pub fn categorize(description: &str) -> Category {
    let text = description.trim();
    if text.is_empty() {
        return Category::Unconfirmed;
    }

    RULES
        .iter()
        .find(|(marker, _)| text.contains(marker))
        .map(|(_, category)| Category::Income(*category))
        .unwrap_or(Category::Unconfirmed)
}
