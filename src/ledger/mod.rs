//! Ledger module containing entry intake and the disbursement workflow

pub mod disbursement;
pub mod entry;

pub use disbursement::*;
pub use entry::*;
