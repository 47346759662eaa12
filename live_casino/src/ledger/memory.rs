//! In-memory ledger for tests and database-less deployments.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{
    errors::{LedgerError, LedgerResult},
    models::HistoryRecord,
    Ledger,
};
use crate::{Chips, UserId};

#[derive(Debug, Default)]
struct Account {
    balance: Chips,
    history: Vec<HistoryRecord>,
}

/// Process-local ledger. A single mutex over the account map gives the same
/// atomicity the database backend gets from row-level updates.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    accounts: Mutex<HashMap<UserId, Account>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an account with a starting balance, replacing any existing one.
    /// Test convenience.
    pub fn with_account(self, user: UserId, balance: Chips) -> Self {
        {
            let mut accounts = self.accounts.lock().expect("ledger mutex poisoned");
            accounts.insert(
                user,
                Account {
                    balance,
                    history: Vec::new(),
                },
            );
        }
        self
    }

    /// Snapshot of a user's history, newest last.
    pub fn history(&self, user: UserId) -> Vec<HistoryRecord> {
        let accounts = self.accounts.lock().expect("ledger mutex poisoned");
        accounts
            .get(&user)
            .map(|account| account.history.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn balance(&self, user: UserId) -> LedgerResult<Chips> {
        let accounts = self.accounts.lock().expect("ledger mutex poisoned");
        accounts
            .get(&user)
            .map(|account| account.balance)
            .ok_or(LedgerError::AccountNotFound(user))
    }

    async fn atomic_adjust(&self, user: UserId, delta: Chips) -> LedgerResult<Chips> {
        let mut accounts = self.accounts.lock().expect("ledger mutex poisoned");
        let account = accounts
            .get_mut(&user)
            .ok_or(LedgerError::AccountNotFound(user))?;
        let next = account
            .balance
            .checked_add(delta)
            .ok_or(LedgerError::BalanceOverflow)?;
        if next < 0 {
            return Err(LedgerError::InsufficientBalance {
                available: account.balance,
                required: -delta,
            });
        }
        account.balance = next;
        Ok(next)
    }

    async fn ensure_account(&self, user: UserId, starting: Chips) -> LedgerResult<Chips> {
        let mut accounts = self.accounts.lock().expect("ledger mutex poisoned");
        let account = accounts.entry(user).or_insert_with(|| Account {
            balance: starting,
            history: Vec::new(),
        });
        Ok(account.balance)
    }

    async fn append_history(&self, user: UserId, record: HistoryRecord) -> LedgerResult<()> {
        let mut accounts = self.accounts.lock().expect("ledger mutex poisoned");
        let account = accounts
            .get_mut(&user)
            .ok_or(LedgerError::AccountNotFound(user))?;
        account.history.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn adjust_floors_at_zero() {
        let ledger = InMemoryLedger::new().with_account(1, 100);
        assert_eq!(ledger.atomic_adjust(1, -60).await.unwrap(), 40);
        let err = ledger.atomic_adjust(1, -50).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance {
                available: 40,
                required: 50
            }
        ));
        // failed debit mutated nothing
        assert_eq!(ledger.balance(1).await.unwrap(), 40);
    }

    #[tokio::test]
    async fn ensure_account_is_idempotent() {
        let ledger = InMemoryLedger::new();
        assert_eq!(ledger.ensure_account(7, 500).await.unwrap(), 500);
        ledger.atomic_adjust(7, -100).await.unwrap();
        // second ensure does not reset the balance
        assert_eq!(ledger.ensure_account(7, 500).await.unwrap(), 400);
    }

    #[tokio::test]
    async fn unknown_account_is_reported() {
        let ledger = InMemoryLedger::new();
        assert!(matches!(
            ledger.balance(9).await.unwrap_err(),
            LedgerError::AccountNotFound(9)
        ));
    }
}
