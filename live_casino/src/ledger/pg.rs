//! Postgres-backed ledger.
//!
//! Debits are expressed as a single conditional `UPDATE` so the balance
//! check and the mutation are one atomic operation; there is no window for
//! two concurrent settlements to double-spend the same account.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE accounts (
//!     user_id     BIGINT PRIMARY KEY,
//!     balance     BIGINT NOT NULL,
//!     updated_at  TIMESTAMP NOT NULL DEFAULT NOW()
//! );
//!
//! CREATE TABLE game_history (
//!     id          UUID PRIMARY KEY,
//!     user_id     BIGINT NOT NULL REFERENCES accounts(user_id),
//!     game        TEXT NOT NULL,
//!     action      TEXT NOT NULL,
//!     amount      BIGINT NOT NULL,
//!     result      TEXT NOT NULL,
//!     outcome     TEXT NOT NULL,
//!     payout      BIGINT NOT NULL,
//!     recorded_at TIMESTAMP NOT NULL
//! );
//! ```

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::sync::Arc;

use super::{
    errors::{LedgerError, LedgerResult},
    models::HistoryRecord,
    Ledger,
};
use crate::{Chips, UserId};

/// Ledger backed by a Postgres connection pool.
#[derive(Clone)]
pub struct PgLedger {
    pool: Arc<PgPool>,
}

impl PgLedger {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn balance(&self, user: UserId) -> LedgerResult<Chips> {
        let row = sqlx::query("SELECT balance FROM accounts WHERE user_id = $1")
            .bind(user)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or(LedgerError::AccountNotFound(user))?;
        Ok(row.get("balance"))
    }

    async fn atomic_adjust(&self, user: UserId, delta: Chips) -> LedgerResult<Chips> {
        let updated = sqlx::query(
            "UPDATE accounts
             SET balance = balance + $1, updated_at = NOW()
             WHERE user_id = $2 AND balance + $1 >= 0
             RETURNING balance",
        )
        .bind(delta)
        .bind(user)
        .fetch_optional(self.pool.as_ref())
        .await?;

        match updated {
            Some(row) => Ok(row.get("balance")),
            None => {
                // Either the account doesn't exist or the debit would cross
                // the floor. Check which.
                let check = sqlx::query("SELECT balance FROM accounts WHERE user_id = $1")
                    .bind(user)
                    .fetch_optional(self.pool.as_ref())
                    .await?;
                match check {
                    Some(row) => Err(LedgerError::InsufficientBalance {
                        available: row.get("balance"),
                        required: -delta,
                    }),
                    None => Err(LedgerError::AccountNotFound(user)),
                }
            }
        }
    }

    async fn ensure_account(&self, user: UserId, starting: Chips) -> LedgerResult<Chips> {
        let row = sqlx::query(
            "INSERT INTO accounts (user_id, balance, updated_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
             RETURNING balance",
        )
        .bind(user)
        .bind(starting)
        .fetch_one(self.pool.as_ref())
        .await?;
        Ok(row.get("balance"))
    }

    async fn append_history(&self, user: UserId, record: HistoryRecord) -> LedgerResult<()> {
        sqlx::query(
            "INSERT INTO game_history
                 (id, user_id, game, action, amount, result, outcome, payout, recorded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(record.id)
        .bind(user)
        .bind(record.game.to_string())
        .bind(&record.action)
        .bind(record.amount)
        .bind(&record.result)
        .bind(&record.outcome)
        .bind(record.payout)
        .bind(record.recorded_at.naive_utc())
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }
}
