//! Game error taxonomy.
//!
//! Every rejected action carries a machine-checkable kind plus a
//! human-readable reason; the presentation layer never receives a bare
//! failure. Game-logic errors are recovered at the component boundary and
//! returned as structured results, never propagated as faults that could
//! take down other sessions or the shared table.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Chips, UserId};

/// Errors that can occur during game operations.
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum GameError {
    #[error("{action} is not allowed while {phase}")]
    InvalidStateTransition { phase: String, action: String },
    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds { required: Chips, available: Chips },
    #[error("invalid amount: {0}")]
    InvalidAmount(Chips),
    #[error("the shoe ran out of cards")]
    ResourceExhausted,
    #[error("no session for user {0}")]
    NotFound(UserId),
    #[error("authentication failed")]
    Unauthenticated,
    #[error("not ready: {0}")]
    NotReady(String),
}

impl GameError {
    /// Stable machine-checkable kind for the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidStateTransition { .. } => "invalid_state_transition",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::ResourceExhausted => "resource_exhausted",
            Self::NotFound(_) => "not_found",
            Self::Unauthenticated => "unauthenticated",
            Self::NotReady(_) => "not_ready",
        }
    }

    pub(crate) fn invalid_transition(phase: &str, action: &str) -> Self {
        Self::InvalidStateTransition {
            phase: phase.to_string(),
            action: action.to_string(),
        }
    }
}

/// Result type for game operations.
pub type GameResult<T> = Result<T, GameError>;
