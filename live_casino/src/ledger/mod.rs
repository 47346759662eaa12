//! Shared balance ledger.
//!
//! The ledger is the one resource shared across sessions and table
//! settlement. All balance mutations go through [`Ledger::atomic_adjust`],
//! an atomic increment/decrement with a floor at zero — never a
//! read-modify-write across two logically concurrent settlements.

use async_trait::async_trait;

use crate::{Chips, UserId};

pub mod errors;
pub mod memory;
pub mod models;
pub mod pg;

pub use errors::{LedgerError, LedgerResult};
pub use memory::InMemoryLedger;
pub use models::{GameKind, HistoryRecord};
pub use pg::PgLedger;

/// Balance and history operations consumed by the game engine.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Current balance for a user.
    async fn balance(&self, user: UserId) -> LedgerResult<Chips>;

    /// Atomically apply `delta` to the user's balance and return the new
    /// balance. A debit that would take the balance below zero fails with
    /// [`LedgerError::InsufficientBalance`] and mutates nothing.
    async fn atomic_adjust(&self, user: UserId, delta: Chips) -> LedgerResult<Chips>;

    /// Create the account with `starting` balance if it does not exist yet,
    /// returning the current balance either way.
    async fn ensure_account(&self, user: UserId, starting: Chips) -> LedgerResult<Chips>;

    /// Append one immutable history record for the user.
    async fn append_history(&self, user: UserId, record: HistoryRecord) -> LedgerResult<()>;
}
