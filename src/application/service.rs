use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::instrument;

use crate::adapters::{Argon2Hasher, LogNotifier};
use crate::config::LedgerConfig;
use crate::domain::{
    Account, AccountId, Amount, LedgerEntry, NewAccount, ReconciliationReport, TransferId,
    checked_apply, reconcile,
};
use crate::ports::{CredentialHasher, OverdraftNotice, OverdraftNotifier};
use crate::storage::{Repository, StoreError};

use super::retry::Attempt;
use super::{AppError, CredentialGate, RetryPolicy};

/// Unwrap a store result inside an attempt. A conflict rolls the unit back
/// and ends the attempt so the retry loop can start over from a fresh read.
macro_rules! or_retry {
    ($uow:ident, $op:expr) => {{
        let outcome = $op;
        match outcome {
            Ok(value) => value,
            Err(StoreError::Conflict) => {
                $uow.rollback().await?;
                return Ok(Attempt::Conflict);
            }
            Err(e) => return Err(e.into()),
        }
    }};
}

/// Split a store conflict out of the error path.
fn settle<T>(result: Result<T, StoreError>) -> Result<Attempt<T>, AppError> {
    match result {
        Ok(value) => Ok(Attempt::Committed(value)),
        Err(StoreError::Conflict) => Ok(Attempt::Conflict),
        Err(e) => Err(e.into()),
    }
}

fn validate_amount(amount: Amount) -> Result<(), AppError> {
    if amount <= 0 {
        return Err(AppError::InvalidAmount(format!(
            "Amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

fn overflow(account_id: AccountId) -> AppError {
    AppError::InvalidAmount(format!(
        "Amount would overflow the balance of account {}",
        account_id
    ))
}

/// Ledger operations engine. The primary interface for any front end
/// (CLI, RPC, HTTP).
///
/// Holds no mutable state of its own: every operation coordinates through the
/// store's compare-and-set primitive, so one instance can be shared freely
/// between tasks.
pub struct LedgerService {
    repo: Repository,
    credentials: CredentialGate,
    notifier: Arc<dyn OverdraftNotifier>,
    retry: RetryPolicy,
}

/// Result of a deposit or withdrawal
#[derive(Debug, Clone)]
pub struct BalanceChange {
    pub account_id: AccountId,
    pub balance: Amount,
    pub entry: LedgerEntry,
}

/// Result of a committed transfer
#[derive(Debug)]
pub struct TransferResult {
    pub transfer_id: TransferId,
    /// Source account as of the commit
    pub source: Account,
    /// Destination account as of the commit
    pub destination: Account,
    pub debit: LedgerEntry,
    pub credit: LedgerEntry,
    /// Background overdraft notice, present when the source went negative.
    /// Awaiting it is optional; the transfer is already committed.
    pub notice: Option<JoinHandle<()>>,
}

impl TransferResult {
    pub fn overdrawn(&self) -> bool {
        self.source.is_overdrawn()
    }
}

impl LedgerService {
    /// Create a new ledger service from explicitly constructed collaborators.
    pub fn new(
        repo: Repository,
        hasher: Arc<dyn CredentialHasher>,
        notifier: Arc<dyn OverdraftNotifier>,
    ) -> Self {
        Self {
            credentials: CredentialGate::new(repo.clone(), hasher),
            repo,
            notifier,
            retry: RetryPolicy::default(),
        }
    }

    /// Initialize the database described by `config` and build a service
    /// with the Argon2 hasher and the logging notifier.
    pub async fn init(config: &LedgerConfig) -> Result<Self, AppError> {
        let repo = Repository::init(&config.store).await?;
        Self::assemble(repo, config)
    }

    /// Connect to an existing database.
    pub async fn connect(config: &LedgerConfig) -> Result<Self, AppError> {
        let repo = Repository::connect(&config.store).await?;
        Self::assemble(repo, config)
    }

    fn assemble(repo: Repository, config: &LedgerConfig) -> Result<Self, AppError> {
        let hasher = Argon2Hasher::new(config.hashing)
            .map_err(|e| AppError::InvalidInput(format!("{:#}", e)))?;
        Ok(Self::new(repo, Arc::new(hasher), Arc::new(LogNotifier)).with_retry_policy(config.retry))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn OverdraftNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    // ========================
    // Account operations
    // ========================

    /// Open a new account with balance 0.
    #[instrument(skip(self, password))]
    pub async fn open_account(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        password: &str,
    ) -> Result<Account, AppError> {
        if first_name.trim().is_empty() || last_name.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "First and last name are required".to_string(),
            ));
        }
        if !email.contains('@') {
            return Err(AppError::InvalidInput(format!(
                "Not an email address: {}",
                email
            )));
        }
        if password.is_empty() {
            return Err(AppError::InvalidInput("Password is required".to_string()));
        }

        let credential = self.credentials.hash(password).await?;
        let new_account = NewAccount::new(first_name.trim(), last_name.trim(), email, credential);

        let repo = &self.repo;
        let new_account = &new_account;
        let account = self
            .retry
            .run("open_account", move || async move {
                settle(repo.create_account(new_account).await)
            })
            .await?;

        tracing::info!(account_id = %account.id, "account opened");
        Ok(account)
    }

    /// Get an account by ID.
    pub async fn get_account(&self, account_id: AccountId) -> Result<Account, AppError> {
        self.repo
            .get_account(account_id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(account_id.to_string()))
    }

    /// List all accounts.
    pub async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        Ok(self.repo.list_accounts().await?)
    }

    /// Get an account that may still be operated on.
    async fn get_open_account(&self, account_id: AccountId) -> Result<Account, AppError> {
        let account = self.get_account(account_id).await?;
        if account.terminated {
            return Err(AppError::TerminatedAccount(account_id));
        }
        Ok(account)
    }

    /// Current balance. Read-only; terminated accounts can still be queried.
    pub async fn check_balance(&self, account_id: AccountId) -> Result<Amount, AppError> {
        Ok(self.get_account(account_id).await?.balance)
    }

    /// Close an account for good. The balance is left as it is.
    #[instrument(skip(self))]
    pub async fn terminate_account(&self, account_id: AccountId) -> Result<Account, AppError> {
        let repo = &self.repo;
        self.retry
            .run("terminate_account", move || async move {
                settle(repo.terminate_account(account_id).await)
            })
            .await?;

        tracing::info!(%account_id, "account terminated");
        self.get_account(account_id).await
    }

    // ========================
    // Balance operations
    // ========================

    /// Add `amount` to an account. The account is checked before the amount.
    #[instrument(skip(self))]
    pub async fn deposit(
        &self,
        account_id: AccountId,
        amount: Amount,
    ) -> Result<BalanceChange, AppError> {
        let change = self
            .retry
            .run("deposit", move || self.try_deposit(account_id, amount))
            .await?;

        tracing::info!(%account_id, amount, balance = change.balance, "deposit committed");
        Ok(change)
    }

    async fn try_deposit(
        &self,
        account_id: AccountId,
        amount: Amount,
    ) -> Result<Attempt<BalanceChange>, AppError> {
        let account = self.get_open_account(account_id).await?;
        validate_amount(amount)?;
        let balance = checked_apply(account.balance, amount).ok_or_else(|| overflow(account_id))?;

        let Attempt::Committed(mut uow) = settle(self.repo.begin().await)? else {
            return Ok(Attempt::Conflict);
        };
        or_retry!(
            uow,
            uow.compare_and_set_balance(account_id, account.balance, balance)
                .await
        );
        let mut entry = LedgerEntry::deposit(account_id, amount);
        or_retry!(uow, uow.append_entry(&mut entry).await);
        if let Attempt::Conflict = settle(uow.commit().await)? {
            return Ok(Attempt::Conflict);
        }

        Ok(Attempt::Committed(BalanceChange {
            account_id,
            balance,
            entry,
        }))
    }

    /// Take `amount` out of an account. Withdrawals never overdraw.
    #[instrument(skip(self))]
    pub async fn withdraw(
        &self,
        account_id: AccountId,
        amount: Amount,
    ) -> Result<BalanceChange, AppError> {
        let change = self
            .retry
            .run("withdraw", move || self.try_withdraw(account_id, amount))
            .await?;

        tracing::info!(%account_id, amount, balance = change.balance, "withdrawal committed");
        Ok(change)
    }

    async fn try_withdraw(
        &self,
        account_id: AccountId,
        amount: Amount,
    ) -> Result<Attempt<BalanceChange>, AppError> {
        // Re-read on every attempt: the funds check must see the balance the
        // compare-and-set will be conditioned on
        let account = self.get_open_account(account_id).await?;
        validate_amount(amount)?;
        if amount > account.balance {
            return Err(AppError::InsufficientFunds {
                account_id,
                balance: account.balance,
                requested: amount,
            });
        }
        let balance = account.balance - amount;

        let Attempt::Committed(mut uow) = settle(self.repo.begin().await)? else {
            return Ok(Attempt::Conflict);
        };
        or_retry!(
            uow,
            uow.compare_and_set_balance(account_id, account.balance, balance)
                .await
        );
        let mut entry = LedgerEntry::withdrawal(account_id, amount);
        or_retry!(uow, uow.append_entry(&mut entry).await);
        if let Attempt::Conflict = settle(uow.commit().await)? {
            return Ok(Attempt::Conflict);
        }

        Ok(Attempt::Committed(BalanceChange {
            account_id,
            balance,
            entry,
        }))
    }

    /// Move `amount` from `source` to `destination`.
    ///
    /// Both balance updates and both ledger legs commit as one unit. The
    /// source may end up negative; when it does, the overdraft notifier is
    /// started in the background once the transfer has committed.
    #[instrument(skip(self))]
    pub async fn transfer(
        &self,
        source: AccountId,
        destination: AccountId,
        amount: Amount,
    ) -> Result<TransferResult, AppError> {
        let mut result = self
            .retry
            .run("transfer", move || {
                self.try_transfer(source, destination, amount)
            })
            .await?;

        tracing::info!(
            %source,
            %destination,
            amount,
            transfer_id = %result.transfer_id,
            source_balance = result.source.balance,
            "transfer committed"
        );

        if result.overdrawn() {
            result.notice = Some(self.spawn_overdraft_notice(&result.source));
        }
        Ok(result)
    }

    async fn try_transfer(
        &self,
        source: AccountId,
        destination: AccountId,
        amount: Amount,
    ) -> Result<Attempt<TransferResult>, AppError> {
        let mut from = self.get_open_account(source).await?;
        let mut to = self.get_open_account(destination).await?;
        if source == destination {
            return Err(AppError::SameAccount(source));
        }
        validate_amount(amount)?;

        let from_balance = checked_apply(from.balance, -amount).ok_or_else(|| overflow(source))?;
        let to_balance = checked_apply(to.balance, amount).ok_or_else(|| overflow(destination))?;

        let Attempt::Committed(mut uow) = settle(self.repo.begin().await)? else {
            return Ok(Attempt::Conflict);
        };
        or_retry!(
            uow,
            uow.compare_and_set_balance(source, from.balance, from_balance)
                .await
        );
        or_retry!(
            uow,
            uow.compare_and_set_balance(destination, to.balance, to_balance)
                .await
        );

        let (mut debit, mut credit) = LedgerEntry::transfer_pair(source, destination, amount);
        or_retry!(uow, uow.append_entry(&mut debit).await);
        or_retry!(uow, uow.append_entry(&mut credit).await);
        if let Attempt::Conflict = settle(uow.commit().await)? {
            return Ok(Attempt::Conflict);
        }

        from.balance = from_balance;
        to.balance = to_balance;
        Ok(Attempt::Committed(TransferResult {
            transfer_id: debit.transfer_id.unwrap_or(debit.id),
            source: from,
            destination: to,
            debit,
            credit,
            notice: None,
        }))
    }

    /// Deliver an overdraft notice without holding up the caller.
    fn spawn_overdraft_notice(&self, account: &Account) -> JoinHandle<()> {
        let notifier = Arc::clone(&self.notifier);
        let notice = OverdraftNotice {
            account_id: account.id,
            email: account.email.clone(),
            first_name: account.first_name.clone(),
            balance: account.balance,
        };

        tokio::spawn(async move {
            match notifier.notify_overdraft(&notice).await {
                Ok(()) => tracing::debug!(account_id = %notice.account_id, "overdraft notice sent"),
                Err(e) => tracing::warn!(
                    account_id = %notice.account_id,
                    error = %e,
                    "overdraft notice failed"
                ),
            }
        })
    }

    // ========================
    // Authentication
    // ========================

    /// Check a login. Terminated accounts cannot authenticate.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Account, AppError> {
        let (account, valid) = self.credentials.verify(email, password).await?;

        if account.terminated {
            tracing::info!(account_id = %account.id, "login refused: account terminated");
            return Err(AppError::TerminatedAccount(account.id));
        }
        if !valid {
            tracing::info!(account_id = %account.id, "login refused: bad credentials");
            return Err(AppError::InvalidCredentials);
        }

        tracing::debug!(account_id = %account.id, "login accepted");
        Ok(account)
    }

    // ========================
    // Audit
    // ========================

    /// Ledger entries for one account, in commit order.
    pub async fn history(&self, account_id: AccountId) -> Result<Vec<LedgerEntry>, AppError> {
        self.get_account(account_id).await?;
        Ok(self.repo.list_entries_for_account(account_id).await?)
    }

    /// Replay the ledger and compare it with the stored balances.
    pub async fn reconcile(&self) -> Result<ReconciliationReport, AppError> {
        let (accounts, entries) = self.repo.ledger_snapshot().await?;
        let report = reconcile(&accounts, &entries);

        if report.is_consistent() {
            tracing::debug!(
                accounts = report.accounts_checked,
                entries = report.entries_checked,
                "ledger reconciled"
            );
        } else {
            for issue in report.issues() {
                tracing::error!(%issue, "ledger inconsistency");
            }
        }
        Ok(report)
    }
}
