//! # Reconciliation Core
//!
//! A reconciliation engine for a small multi-location retail business:
//! point-of-sale income, expense disbursements and imported bank statement
//! lines, and the links between them.
//!
//! ## Features
//!
//! - **Categorization**: first-match-wins suggestion of a category for each imported bank line
//! - **Candidate finding**: advisory counterpart suggestions in both directions
//! - **Match validation**: direction checks, fan-in confirmation, typed errors
//! - **Atomic commits**: every match is one all-or-nothing write batch with optimistic versioning
//! - **Disbursement workflow**: `pending_approval → pending_reconciliation → completed`
//! - **Processor settlements**: many Line Pay sales against one deposit with a derived, stored fee
//! - **Storage abstraction**: database-agnostic design with a subscribable change feed
//!
//! ## Quick Start
//!
//! ```rust
//! use reconciliation_core::{EngineConfig, MemoryStorage, ReconciliationEngine};
//!
//! let engine = ReconciliationEngine::new(MemoryStorage::new(), EngineConfig::default());
//! let category = engine.categorize("今日龍洞俱樂部活動收入");
//! assert_eq!(category.label(), "東北角活動");
//! ```

pub mod category;
pub mod config;
pub mod ledger;
pub mod reconciliation;
pub mod reporting;
pub mod telemetry;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use category::*;
pub use config::*;
pub use ledger::*;
pub use reconciliation::*;
pub use reporting::*;
pub use traits::*;
pub use types::*;
pub use utils::*;

// Re-export entry patterns for convenience
pub use ledger::entry::patterns;
