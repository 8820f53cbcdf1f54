mod error;
mod repository;
mod unit_of_work;

pub use error::*;
pub use repository::*;
pub use unit_of_work::*;

/// SQL migration for accounts and sequences
pub const MIGRATION_001_ACCOUNTS: &str = include_str!("migrations/001_accounts.sql");

/// SQL migration for the transaction ledger
pub const MIGRATION_002_LEDGER: &str = include_str!("migrations/002_ledger.sql");
