//! Ledger data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::Chips;

/// Which game produced a history record.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    Baccarat,
    Blackjack,
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Baccarat => "baccarat",
            Self::Blackjack => "blackjack",
        };
        write!(f, "{repr}")
    }
}

/// One immutable ledger history record: what was wagered, how it resolved,
/// and what came back.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub game: GameKind,
    /// Bet choice or session action, e.g. `banker` or `double`.
    pub action: String,
    pub amount: Chips,
    /// How this wager resolved, e.g. `win`, `lose`, `push`.
    pub result: String,
    /// Overall round or hand outcome, e.g. `player` or `blackjack`.
    pub outcome: String,
    pub payout: Chips,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(
        game: GameKind,
        action: impl Into<String>,
        amount: Chips,
        result: impl Into<String>,
        outcome: impl Into<String>,
        payout: Chips,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            game,
            action: action.into(),
            amount,
            result: result.into(),
            outcome: outcome.into(),
            payout,
            recorded_at: Utc::now(),
        }
    }
}
