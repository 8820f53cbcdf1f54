//! Overdraft notification port

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::{AccountId, Amount};

/// What the account holder is told when a transfer overdraws their account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverdraftNotice {
    pub account_id: AccountId,
    pub email: String,
    pub first_name: String,
    pub balance: Amount,
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Overdraft notice for account {account_id} not delivered: {reason}")]
    DeliveryFailed { account_id: AccountId, reason: String },
}

/// Delivers overdraft notices. Called after the overdrawing transfer has
/// committed; a delivery failure never affects the transfer.
#[async_trait]
pub trait OverdraftNotifier: Send + Sync {
    async fn notify_overdraft(&self, notice: &OverdraftNotice) -> Result<(), DeliveryError>;
}
