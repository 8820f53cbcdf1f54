use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::domain::{Account, AccountId, EntryKind, LedgerEntry, NewAccount, normalize_email};

use super::{
    MIGRATION_001_ACCOUNTS, MIGRATION_002_LEDGER, StoreError, UnitOfWork, is_unique_violation,
    map_sqlx_error,
};

const ACCOUNT_COLUMNS: &str =
    "id, first_name, last_name, email, credential, balance, terminated, created_at";
const ENTRY_COLUMNS: &str =
    "id, sequence, kind, account_id, counterparty_id, amount, transfer_id, recorded_at";

/// Account store and transaction ledger over a single SQLite database.
///
/// Reads go straight to the pool. Every write that touches a balance goes
/// through a [`UnitOfWork`], so the balance change and its ledger entries
/// commit together.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to an existing database.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        Self::open(config, false).await
    }

    /// Create the database if needed and bring the schema up to date.
    pub async fn init(config: &StoreConfig) -> Result<Self> {
        let repo = Self::open(config, true).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    async fn open(config: &StoreConfig, create_if_missing: bool) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(config.busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to database {}",
                    config.database_path.display()
                )
            })?;

        tracing::debug!(
            path = %config.database_path.display(),
            max_connections = config.max_connections,
            "connected to account store"
        );
        Ok(Self::new(pool))
    }

    /// Run database migrations. Safe to run repeatedly.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(MIGRATION_001_ACCOUNTS)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        sqlx::raw_sql(MIGRATION_002_LEDGER)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 002")?;

        Ok(())
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Start a write transaction for one ledger operation.
    pub async fn begin(&self) -> Result<UnitOfWork, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin transaction", e))?;
        Ok(UnitOfWork::new(tx))
    }

    // ========================
    // Account operations
    // ========================

    /// Insert a new account with balance 0, allocating its id from the
    /// store sequence inside the same transaction.
    pub async fn create_account(&self, account: &NewAccount) -> Result<Account, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin transaction", e))?;

        let id = next_sequence(&mut tx, "account_id").await?;
        let created_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO accounts (id, first_name, last_name, email, credential, balance, terminated, created_at)
            VALUES (?, ?, ?, ?, ?, 0, 0, ?)
            "#,
        )
        .bind(id)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.email)
        .bind(&account.credential)
        .bind(created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::EmailTaken(account.email.clone())
            } else {
                map_sqlx_error("insert account", e)
            }
        })?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit account", e))?;

        Ok(Account {
            id: AccountId(id),
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            email: account.email.clone(),
            credential: account.credential.clone(),
            balance: 0,
            terminated: false,
            created_at,
        })
    }

    /// Get an account by ID.
    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE id = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch account", e))?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// Get an account by e-mail. Used by the credential gate only.
    pub async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE email = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch account by email", e))?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// List all accounts ordered by id.
    pub async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM accounts ORDER BY id",
            ACCOUNT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list accounts", e))?;

        rows.iter().map(row_to_account).collect()
    }

    /// Flip the terminated flag. One-way.
    pub async fn terminate_account(&self, id: AccountId) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE accounts SET terminated = 1 WHERE id = ? AND terminated = 0")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("terminate account", e))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        match self.get_account(id).await? {
            Some(account) if account.terminated => Err(StoreError::AlreadyTerminated(id)),
            Some(_) => Err(StoreError::Conflict),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    // ========================
    // Ledger queries
    // ========================

    /// List all ledger entries in commit order.
    pub async fn list_entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM ledger_entries ORDER BY sequence",
            ENTRY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list ledger entries", e))?;

        rows.iter().map(row_to_entry).collect()
    }

    /// List ledger entries affecting one account, in commit order.
    pub async fn list_entries_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM ledger_entries WHERE account_id = ? ORDER BY sequence",
            ENTRY_COLUMNS
        ))
        .bind(account_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list ledger entries for account", e))?;

        rows.iter().map(row_to_entry).collect()
    }

    /// Accounts and ledger read inside one read transaction, so both halves
    /// reflect the same set of committed operations.
    pub async fn ledger_snapshot(&self) -> Result<(Vec<Account>, Vec<LedgerEntry>), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin snapshot", e))?;

        let account_rows = sqlx::query(&format!(
            "SELECT {} FROM accounts ORDER BY id",
            ACCOUNT_COLUMNS
        ))
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("snapshot accounts", e))?;

        let entry_rows = sqlx::query(&format!(
            "SELECT {} FROM ledger_entries ORDER BY sequence",
            ENTRY_COLUMNS
        ))
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("snapshot ledger entries", e))?;

        tx.rollback()
            .await
            .map_err(|e| map_sqlx_error("end snapshot", e))?;

        let accounts = account_rows
            .iter()
            .map(row_to_account)
            .collect::<Result<Vec<_>, _>>()?;
        let entries = entry_rows
            .iter()
            .map(row_to_entry)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((accounts, entries))
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Increment a named counter and return its new value.
/// Runs inside the caller's transaction, so values follow commit order.
pub(crate) async fn next_sequence(
    tx: &mut Transaction<'static, Sqlite>,
    name: &str,
) -> Result<i64, StoreError> {
    let row = sqlx::query(
        r#"
        UPDATE sequence_counter
        SET value = value + 1
        WHERE name = ?
        RETURNING value
        "#,
    )
    .bind(name)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("advance sequence", e))?;

    Ok(row.get("value"))
}

fn parse_timestamp(value: &str, what: &'static str) -> Result<DateTime<Utc>, StoreError> {
    let parsed = DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid {} timestamp", what))?;
    Ok(parsed.with_timezone(&Utc))
}

fn row_to_account(row: &SqliteRow) -> Result<Account, StoreError> {
    let created_at_str: String = row.get("created_at");

    Ok(Account {
        id: AccountId(row.get("id")),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        credential: row.get("credential"),
        balance: row.get("balance"),
        terminated: row.get::<i64, _>("terminated") != 0,
        created_at: parse_timestamp(&created_at_str, "created_at")?,
    })
}

fn row_to_entry(row: &SqliteRow) -> Result<LedgerEntry, StoreError> {
    let id_str: String = row.get("id");
    let kind_str: String = row.get("kind");
    let transfer_str: Option<String> = row.get("transfer_id");
    let recorded_at_str: String = row.get("recorded_at");

    Ok(LedgerEntry {
        id: Uuid::parse_str(&id_str).context("Invalid ledger entry ID")?,
        sequence: row.get("sequence"),
        kind: EntryKind::from_str(&kind_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid entry kind: {}", kind_str))?,
        account_id: AccountId(row.get("account_id")),
        counterparty: row.get::<Option<i64>, _>("counterparty_id").map(AccountId),
        amount: row.get("amount"),
        transfer_id: transfer_str
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .context("Invalid transfer ID")?,
        recorded_at: parse_timestamp(&recorded_at_str, "recorded_at")?,
    })
}
