use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Amount};

pub type EntryId = Uuid;
pub type TransferId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Deposit,
    Withdrawal,
    TransferOut,
    TransferIn,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Deposit => "deposit",
            EntryKind::Withdrawal => "withdrawal",
            EntryKind::TransferOut => "transfer_out",
            EntryKind::TransferIn => "transfer_in",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(EntryKind::Deposit),
            "withdrawal" => Some(EntryKind::Withdrawal),
            "transfer_out" => Some(EntryKind::TransferOut),
            "transfer_in" => Some(EntryKind::TransferIn),
            _ => None,
        }
    }

    /// Signed effect of an entry of this kind on the affected account's balance.
    pub fn signed(&self, amount: Amount) -> Amount {
        match self {
            EntryKind::Deposit | EntryKind::TransferIn => amount,
            EntryKind::Withdrawal | EntryKind::TransferOut => -amount,
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One committed balance-affecting event.
/// Entries are immutable - the ledger is append-only and corrections are new entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    /// Position in commit order, assigned by the store on append
    pub sequence: i64,
    pub kind: EntryKind,
    /// Account whose balance this entry changed
    pub account_id: AccountId,
    /// The other side of a transfer
    pub counterparty: Option<AccountId>,
    /// Always positive; the direction comes from `kind`
    pub amount: Amount,
    /// Shared by the two legs of one transfer
    pub transfer_id: Option<TransferId>,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    fn new(kind: EntryKind, account_id: AccountId, amount: Amount) -> Self {
        assert!(amount > 0, "Ledger entry amount must be positive");
        Self {
            id: Uuid::new_v4(),
            sequence: 0, // Will be set by the store
            kind,
            account_id,
            counterparty: None,
            amount,
            transfer_id: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn deposit(account_id: AccountId, amount: Amount) -> Self {
        Self::new(EntryKind::Deposit, account_id, amount)
    }

    pub fn withdrawal(account_id: AccountId, amount: Amount) -> Self {
        Self::new(EntryKind::Withdrawal, account_id, amount)
    }

    /// Both legs of a transfer, sharing one transfer id: (out, in).
    pub fn transfer_pair(source: AccountId, dest: AccountId, amount: Amount) -> (Self, Self) {
        let transfer_id = Uuid::new_v4();

        let mut out = Self::new(EntryKind::TransferOut, source, amount);
        out.counterparty = Some(dest);
        out.transfer_id = Some(transfer_id);

        let mut incoming = Self::new(EntryKind::TransferIn, dest, amount);
        incoming.counterparty = Some(source);
        incoming.transfer_id = Some(transfer_id);

        (out, incoming)
    }

    /// Signed effect of this entry on `account_id`'s balance.
    pub fn delta(&self) -> Amount {
        self.kind.signed(self.amount)
    }

    pub fn is_transfer(&self) -> bool {
        self.transfer_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_kind_roundtrip() {
        for kind in [
            EntryKind::Deposit,
            EntryKind::Withdrawal,
            EntryKind::TransferOut,
            EntryKind::TransferIn,
        ] {
            assert_eq!(EntryKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(EntryKind::from_str("withdrawl"), None);
    }

    #[test]
    fn test_deposit_and_withdrawal_deltas() {
        let account = AccountId(1);
        assert_eq!(LedgerEntry::deposit(account, 50).delta(), 50);
        assert_eq!(LedgerEntry::withdrawal(account, 20).delta(), -20);
        assert!(!LedgerEntry::deposit(account, 50).is_transfer());
    }

    #[test]
    fn test_transfer_pair_is_linked() {
        let (out, incoming) = LedgerEntry::transfer_pair(AccountId(1), AccountId(2), 70);

        assert_eq!(out.kind, EntryKind::TransferOut);
        assert_eq!(out.account_id, AccountId(1));
        assert_eq!(out.counterparty, Some(AccountId(2)));
        assert_eq!(out.delta(), -70);

        assert_eq!(incoming.kind, EntryKind::TransferIn);
        assert_eq!(incoming.account_id, AccountId(2));
        assert_eq!(incoming.counterparty, Some(AccountId(1)));
        assert_eq!(incoming.delta(), 70);

        assert!(out.transfer_id.is_some());
        assert_eq!(out.transfer_id, incoming.transfer_id);
        assert_ne!(out.id, incoming.id);
    }

    #[test]
    #[should_panic(expected = "Ledger entry amount must be positive")]
    fn test_entry_requires_positive_amount() {
        LedgerEntry::deposit(AccountId(1), 0);
    }
}
