use thiserror::Error;

use crate::domain::AccountId;

/// Failures surfaced by the account store and the ledger.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Account not found: {0}")]
    NotFound(String),

    /// The row changed between read and conditional write, or the database was
    /// busy. Callers retry.
    #[error("Concurrent modification detected")]
    Conflict,

    #[error("Account already terminated: {0}")]
    AlreadyTerminated(AccountId),

    #[error("Email already registered: {0}")]
    EmailTaken(String),

    #[error("Storage fault: {0:#}")]
    Fault(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict)
    }
}

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Classify a driver error. Lock contention becomes `Conflict`, everything
/// else is an unrecoverable fault carrying `operation` as context.
pub(crate) fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    if is_contention(&err) {
        tracing::debug!(operation, error = %err, "store contention");
        return StoreError::Conflict;
    }
    StoreError::Fault(anyhow::Error::new(err).context(format!("Failed to {}", operation)))
}

fn is_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            // Extended result codes keep the primary code in the low byte
            .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
            .unwrap_or(false),
        _ => false,
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
