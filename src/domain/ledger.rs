use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::{Account, AccountId, Amount, LedgerEntry, TransferId};

/// Recompute one account's balance from the ledger alone.
/// Every account starts at 0, so the balance is the sum of its entry deltas.
pub fn replay_balance(account_id: AccountId, entries: &[LedgerEntry]) -> Amount {
    entries
        .iter()
        .filter(|entry| entry.account_id == account_id)
        .map(LedgerEntry::delta)
        .sum()
}

/// Recompute balances for every account that appears in the ledger.
pub fn replay_all_balances(entries: &[LedgerEntry]) -> HashMap<AccountId, Amount> {
    let mut balances: HashMap<AccountId, Amount> = HashMap::new();

    for entry in entries {
        *balances.entry(entry.account_id).or_insert(0) += entry.delta();
    }

    balances
}

/// Stored balance that disagrees with the ledger replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceMismatch {
    pub account_id: AccountId,
    pub stored: Amount,
    pub replayed: Amount,
}

/// Outcome of checking the account store against the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub accounts_checked: usize,
    pub entries_checked: usize,
    pub mismatches: Vec<BalanceMismatch>,
    /// Entries referencing an account that does not exist
    pub orphan_entries: usize,
    /// Transfers whose out/in legs are missing or disagree
    pub unmatched_transfers: Vec<TransferId>,
    pub has_sequence_gaps: bool,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
            && self.orphan_entries == 0
            && self.unmatched_transfers.is_empty()
            && !self.has_sequence_gaps
    }

    /// Human-readable list of problems, empty when consistent.
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for m in &self.mismatches {
            issues.push(format!(
                "account {}: stored balance {} but ledger replays to {}",
                m.account_id, m.stored, m.replayed
            ));
        }
        if self.orphan_entries > 0 {
            issues.push(format!(
                "{} ledger entries reference unknown accounts",
                self.orphan_entries
            ));
        }
        for id in &self.unmatched_transfers {
            issues.push(format!("transfer {} does not have two matching legs", id));
        }
        if self.has_sequence_gaps {
            issues.push("ledger sequence has gaps".to_string());
        }
        issues
    }
}

/// Compare stored balances with a replay of the ledger.
/// `accounts` and `entries` must come from the same consistent snapshot.
pub fn reconcile(accounts: &[Account], entries: &[LedgerEntry]) -> ReconciliationReport {
    let replayed = replay_all_balances(entries);
    let known: HashSet<AccountId> = accounts.iter().map(|a| a.id).collect();

    let mut mismatches: Vec<BalanceMismatch> = accounts
        .iter()
        .filter_map(|account| {
            let replayed = replayed.get(&account.id).copied().unwrap_or(0);
            (replayed != account.balance).then_some(BalanceMismatch {
                account_id: account.id,
                stored: account.balance,
                replayed,
            })
        })
        .collect();
    mismatches.sort_by_key(|m| m.account_id);

    let orphan_entries = entries
        .iter()
        .filter(|entry| !known.contains(&entry.account_id))
        .count();

    ReconciliationReport {
        accounts_checked: accounts.len(),
        entries_checked: entries.len(),
        mismatches,
        orphan_entries,
        unmatched_transfers: unmatched_transfers(entries),
        has_sequence_gaps: has_sequence_gaps(entries),
    }
}

fn unmatched_transfers(entries: &[LedgerEntry]) -> Vec<TransferId> {
    let mut legs: HashMap<TransferId, Vec<&LedgerEntry>> = HashMap::new();
    for entry in entries {
        if let Some(transfer_id) = entry.transfer_id {
            legs.entry(transfer_id).or_default().push(entry);
        }
    }

    let mut unmatched: Vec<TransferId> = legs
        .into_iter()
        .filter(|(_, legs)| match legs.as_slice() {
            [a, b] => {
                a.amount != b.amount
                    || a.delta() + b.delta() != 0
                    || a.counterparty != Some(b.account_id)
                    || b.counterparty != Some(a.account_id)
            }
            _ => true,
        })
        .map(|(id, _)| id)
        .collect();
    unmatched.sort();
    unmatched
}

fn has_sequence_gaps(entries: &[LedgerEntry]) -> bool {
    let mut sequences: Vec<i64> = entries.iter().map(|e| e.sequence).collect();
    sequences.sort_unstable();
    sequences.windows(2).any(|w| w[1] != w[0] + 1)
}
