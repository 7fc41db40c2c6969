//! Validation utilities

use crate::reconciliation::validator::{DefaultMatchValidator, MatchAssessment};
use crate::traits::*;
use crate::types::*;
use bigdecimal::BigDecimal;

/// Validate that an amount is positive
pub fn validate_positive_amount(amount: &BigDecimal) -> ReconResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(ReconError::Validation(
            "Amount must be positive".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Validate that an entry ID is valid
pub fn validate_entry_id(entry_id: &str) -> ReconResult<()> {
    if entry_id.trim().is_empty() {
        return Err(ReconError::Validation(
            "Entry ID cannot be empty".to_string(),
        ));
    }

    if entry_id.len() > 64 {
        return Err(ReconError::Validation(
            "Entry ID cannot exceed 64 characters".to_string(),
        ));
    }

    if !entry_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ReconError::Validation(
            "Entry ID can only contain alphanumeric characters, dashes, and underscores"
                .to_string(),
        ));
    }

    Ok(())
}

/// Validate a store location identifier
pub fn validate_location(location: &str) -> ReconResult<()> {
    if location.trim().is_empty() {
        return Err(ReconError::Validation(
            "Location cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validate the last five digits of an outgoing bank account
pub fn validate_account_last5(last5: &str) -> ReconResult<()> {
    if last5.len() != 5 || !last5.chars().all(|c| c.is_ascii_digit()) {
        return Err(ReconError::Validation(format!(
            "Outgoing account must be exactly 5 digits, got '{}'",
            last5
        )));
    }

    Ok(())
}

/// Match validator that also rejects anything the default one only warns about
pub struct StrictMatchValidator;

impl MatchValidator for StrictMatchValidator {
    fn validate_match(
        &self,
        entries: &[LedgerEntry],
        bank_records: &[BankRecord],
        confirmed: bool,
    ) -> ReconResult<MatchAssessment> {
        let assessment = DefaultMatchValidator.validate_match(entries, bank_records, confirmed)?;

        if let Some(warning) = assessment.warnings.first() {
            return Err(ReconError::Validation(format!(
                "Match rejected: {}",
                warning
            )));
        }

        Ok(assessment)
    }
}
