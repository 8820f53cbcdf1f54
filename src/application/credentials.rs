use std::sync::Arc;

use anyhow::Context;

use crate::domain::Account;
use crate::ports::CredentialHasher;
use crate::storage::Repository;

use super::AppError;

/// Login checks, kept apart from balance logic.
///
/// The gate owns the credential column of the account record: it produces the
/// stored form and is the only component that compares against it.
#[derive(Clone)]
pub struct CredentialGate {
    repo: Repository,
    hasher: Arc<dyn CredentialHasher>,
}

impl CredentialGate {
    pub fn new(repo: Repository, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self { repo, hasher }
    }

    /// Produce the stored credential for a raw password.
    pub async fn hash(&self, raw_password: &str) -> Result<String, AppError> {
        let hasher = Arc::clone(&self.hasher);
        let raw = raw_password.to_owned();
        let credential = tokio::task::spawn_blocking(move || hasher.hash(&raw))
            .await
            .context("Credential hashing task failed")??;
        Ok(credential)
    }

    /// Look up the account for `email` and check `raw_password` against it.
    /// Returns the account together with the verdict.
    pub async fn verify(&self, email: &str, raw_password: &str) -> Result<(Account, bool), AppError> {
        let account = self
            .repo
            .get_account_by_email(email)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(email.to_string()))?;

        let hasher = Arc::clone(&self.hasher);
        let raw = raw_password.to_owned();
        let credential = account.credential.clone();
        let valid = tokio::task::spawn_blocking(move || hasher.verify(&raw, &credential))
            .await
            .context("Credential verification task failed")??;

        Ok((account, valid))
    }
}
