use sqlx::{Sqlite, Transaction};

use crate::domain::{AccountId, Amount, LedgerEntry};

use super::{StoreError, map_sqlx_error, next_sequence};

/// One storage transaction covering a ledger operation: conditional balance
/// updates plus the ledger entries that describe them.
///
/// Nothing is visible to other readers until [`UnitOfWork::commit`]. Dropping
/// the unit without committing (including when the owning future is
/// cancelled) rolls everything back.
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
    entries: usize,
}

impl UnitOfWork {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx, entries: 0 }
    }

    /// Set `account_id`'s balance to `new_balance` only if it still equals
    /// `expected` and the account is open. Any other state is a `Conflict`:
    /// the caller re-reads and decides again.
    pub async fn compare_and_set_balance(
        &mut self,
        account_id: AccountId,
        expected: Amount,
        new_balance: Amount,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = ?
            WHERE id = ? AND balance = ? AND terminated = 0
            "#,
        )
        .bind(new_balance)
        .bind(account_id.get())
        .bind(expected)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update balance", e))?;

        if result.rows_affected() != 1 {
            tracing::debug!(%account_id, expected, "balance compare-and-set lost");
            return Err(StoreError::Conflict);
        }
        Ok(())
    }

    /// Append an entry to the ledger, assigning its sequence number.
    pub async fn append_entry(&mut self, entry: &mut LedgerEntry) -> Result<(), StoreError> {
        entry.sequence = next_sequence(&mut self.tx, "ledger_sequence").await?;

        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, sequence, kind, account_id, counterparty_id, amount, transfer_id, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.sequence)
        .bind(entry.kind.as_str())
        .bind(entry.account_id.get())
        .bind(entry.counterparty.map(AccountId::get))
        .bind(entry.amount)
        .bind(entry.transfer_id.map(|id| id.to_string()))
        .bind(entry.recorded_at.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append ledger entry", e))?;

        self.entries += 1;
        Ok(())
    }

    /// Make every change in this unit durable and visible at once.
    pub async fn commit(self) -> Result<(), StoreError> {
        let entries = self.entries;
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit transaction", e))?;
        tracing::trace!(entries, "unit of work committed");
        Ok(())
    }

    /// Discard every change in this unit.
    pub async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback transaction", e))
    }
}
