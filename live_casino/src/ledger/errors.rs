//! Ledger error types.

use thiserror::Error;

use crate::{Chips, UserId};

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Debit would take the balance below zero
    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: Chips, required: Chips },

    /// Account not found
    #[error("account not found for user {0}")]
    AccountNotFound(UserId),

    /// Balance overflow
    #[error("balance overflow")]
    BalanceOverflow,
}

impl LedgerError {
    /// Client-safe message that doesn't leak internal detail.
    pub fn client_message(&self) -> String {
        match self {
            LedgerError::Database(_) => "internal server error".to_string(),
            LedgerError::AccountNotFound(_) => "account not found".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
