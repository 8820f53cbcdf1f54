use thiserror::Error;

use crate::domain::{AccountId, Amount};
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient funds in account {account_id}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Amount,
        requested: Amount,
    },

    #[error("Account is terminated: {0}")]
    TerminatedAccount(AccountId),

    #[error("Account already terminated: {0}")]
    AlreadyTerminated(AccountId),

    #[error("Cannot transfer from account {0} to itself")]
    SameAccount(AccountId),

    #[error("Email already registered: {0}")]
    EmailAlreadyRegistered(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{operation} gave up after {attempts} conflicting attempts")]
    Busy {
        operation: &'static str,
        attempts: u32,
    },

    #[error("Storage fault: {0:#}")]
    StorageFault(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => AppError::AccountNotFound(id),
            StoreError::AlreadyTerminated(id) => AppError::AlreadyTerminated(id),
            StoreError::EmailTaken(email) => AppError::EmailAlreadyRegistered(email),
            // Conflicts are normally absorbed by the retry loop
            StoreError::Conflict => AppError::Busy {
                operation: "store",
                attempts: 1,
            },
            StoreError::Fault(e) => AppError::StorageFault(e),
        }
    }
}

impl AppError {
    /// True when retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Busy { .. })
    }
}
