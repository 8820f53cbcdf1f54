// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use argentum::application::{LedgerService, RetryPolicy};
use argentum::config::{HashingConfig, LedgerConfig};
use argentum::domain::{Account, AccountId, Amount};
use argentum::ports::{DeliveryError, OverdraftNotice, OverdraftNotifier};
use async_trait::async_trait;
use tempfile::TempDir;

pub const PASSWORD: &str = "correct horse battery staple";

/// Cheap hashing so tests don't spend their time in Argon2
pub fn test_config(temp_dir: &TempDir) -> LedgerConfig {
    LedgerConfig::new(temp_dir.path().join("test.db"))
        .with_hashing(HashingConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .with_retry(
            RetryPolicy::new(500).with_delays(Duration::from_micros(200), Duration::from_millis(5)),
        )
}

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let service = LedgerService::init(&test_config(&temp_dir)).await?;
    Ok((service, temp_dir))
}

/// Test service whose overdraft notices are captured
pub async fn recording_service() -> Result<(LedgerService, Arc<RecordingNotifier>, TempDir)> {
    let (service, temp_dir) = test_service().await?;
    let notifier = Arc::new(RecordingNotifier::default());
    let service = service.with_notifier(notifier.clone());
    Ok((service, notifier, temp_dir))
}

/// Open an account for `name` (email `<name>@example.com`)
pub async fn open(service: &LedgerService, name: &str) -> Result<Account> {
    let email = format!("{}@example.com", name.to_lowercase());
    Ok(service.open_account(name, "Tester", &email, PASSWORD).await?)
}

/// Open an account and deposit `balance` into it
pub async fn open_funded(service: &LedgerService, name: &str, balance: Amount) -> Result<AccountId> {
    let account = open(service, name).await?;
    if balance > 0 {
        service.deposit(account.id, balance).await?;
    }
    Ok(account.id)
}

/// Captures every notice it is asked to deliver
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<OverdraftNotice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<OverdraftNotice> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl OverdraftNotifier for RecordingNotifier {
    async fn notify_overdraft(&self, notice: &OverdraftNotice) -> Result<(), DeliveryError> {
        self.notices.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

/// Always fails to deliver
pub struct FailingNotifier;

#[async_trait]
impl OverdraftNotifier for FailingNotifier {
    async fn notify_overdraft(&self, notice: &OverdraftNotice) -> Result<(), DeliveryError> {
        Err(DeliveryError::DeliveryFailed {
            account_id: notice.account_id,
            reason: "mail relay unreachable".to_string(),
        })
    }
}
