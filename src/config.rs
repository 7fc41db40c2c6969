//! Engine configuration

use bigdecimal::BigDecimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;
use std::str::FromStr;

use crate::category::{Category, IncomeCategory};
use crate::types::{ReconError, ReconResult};

/// Location assigned to entries that do not name one
pub const DEFAULT_LOCATION: &str = "qiangang";

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive, e.g. `info` or `reconciliation_core=debug`
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Automatic matching accepts a bank line whose signed amount differs
    /// from the entry's by strictly less than this
    #[serde(default = "default_amount_tolerance")]
    pub amount_tolerance: BigDecimal,
    /// Used when quick-creating from a deposit whose suggestion is not an
    /// income category
    #[serde(
        default = "default_income_category",
        serialize_with = "serialize_income_category",
        deserialize_with = "deserialize_income_category"
    )]
    pub default_income_category: IncomeCategory,
    #[serde(default = "default_location")]
    pub default_location: String,
    /// `created_by` on entries synthesized from bank lines
    #[serde(default = "default_quick_create_author")]
    pub quick_create_author: String,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            amount_tolerance: default_amount_tolerance(),
            default_income_category: default_income_category(),
            default_location: default_location(),
            quick_create_author: default_quick_create_author(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `RECON_*` environment variables.
    ///
    /// Unset variables keep their default; set but malformed ones are an
    /// error rather than silently ignored.
    pub fn from_env() -> ReconResult<Self> {
        let mut config = Self::default();

        if let Ok(raw) = env::var("RECON_AMOUNT_TOLERANCE") {
            config.amount_tolerance = BigDecimal::from_str(raw.trim()).map_err(|_| {
                ReconError::Validation(format!("RECON_AMOUNT_TOLERANCE '{}' is not a number", raw))
            })?;
        }
        if let Ok(raw) = env::var("RECON_DEFAULT_LOCATION") {
            config.default_location = raw;
        }
        if let Ok(raw) = env::var("RECON_DEFAULT_INCOME_CATEGORY") {
            config.default_income_category = parse_income_category(&raw)?;
        }
        if let Ok(raw) = env::var("RECON_QUICK_CREATE_AUTHOR") {
            config.quick_create_author = raw;
        }
        if let Ok(raw) = env::var("RECON_LOG_LEVEL") {
            config.telemetry.log_level = raw;
        }
        if let Ok(raw) = env::var("RECON_LOG_JSON") {
            config.telemetry.json = parse_flag("RECON_LOG_JSON", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ReconResult<()> {
        if self.amount_tolerance < BigDecimal::from(0) {
            return Err(ReconError::Validation(
                "Amount tolerance cannot be negative".to_string(),
            ));
        }
        if self.default_location.trim().is_empty() {
            return Err(ReconError::Validation(
                "Default location cannot be empty".to_string(),
            ));
        }
        if self.quick_create_author.trim().is_empty() {
            return Err(ReconError::Validation(
                "Quick-create author cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_amount_tolerance() -> BigDecimal {
    BigDecimal::from(1)
}

fn default_income_category() -> IncomeCategory {
    IncomeCategory::Sales
}

fn default_location() -> String {
    DEFAULT_LOCATION.to_string()
}

fn default_quick_create_author() -> String {
    "system".to_string()
}

fn parse_income_category(label: &str) -> ReconResult<IncomeCategory> {
    match Category::from_label(label) {
        Some(Category::Income(category)) => Ok(category),
        _ => Err(ReconError::Validation(format!(
            "'{}' is not an income category",
            label
        ))),
    }
}

fn parse_flag(name: &str, raw: &str) -> ReconResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ReconError::Validation(format!(
            "{} '{}' is not a boolean",
            name, raw
        ))),
    }
}

fn serialize_income_category<S: Serializer>(
    category: &IncomeCategory,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(category.label())
}

fn deserialize_income_category<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<IncomeCategory, D::Error> {
    let label = String::deserialize(deserializer)?;
    parse_income_category(&label).map_err(serde::de::Error::custom)
}
