//! Reconciliation of ledger entries against imported bank records
//!
//! The pieces compose bottom-up: the categorizer and candidate finder are pure
//! functions, the validator checks a selection, the committer and settlement
//! aggregator apply matches as atomic batches, and [`ReconciliationEngine`]
//! ties them to one store.

pub mod candidates;
pub mod categorizer;
pub mod committer;
pub mod engine;
pub mod ingest;
pub mod settlement;
pub mod validator;

pub use candidates::*;
pub use categorizer::*;
pub use committer::*;
pub use engine::*;
pub use ingest::*;
pub use settlement::*;
pub use validator::*;
