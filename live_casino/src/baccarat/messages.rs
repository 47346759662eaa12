//! Table actor message types.

use tokio::sync::{mpsc, oneshot};

use super::bets::{BetChoice, ChoiceStats};
use super::table::{FixedOutcome, RoundOutcome};
use crate::auth::Role;
use crate::cards::ShoeStatus;
use crate::errors::GameError;
use crate::events::TableEvent;
use crate::{Chips, UserId};
use std::collections::HashMap;

/// Messages that can be sent to the table actor.
#[derive(Debug)]
pub enum TableCommand {
    /// A user's connection arrived at the table. A first non-privileged
    /// user brings the table live.
    Connect { user: UserId, role: Role },

    /// A user's connection went away. Never stops a run by itself.
    Disconnect { user: UserId },

    /// Place a bet into the open window. The stake is debited atomically
    /// on acceptance.
    PlaceBet {
        user: UserId,
        choice: BetChoice,
        amount: Chips,
        response: oneshot::Sender<TableReply>,
    },

    /// Cancel and refund every bet the user placed in the open window.
    CancelBets {
        user: UserId,
        response: oneshot::Sender<TableReply>,
    },

    /// Aggregated per-choice stats of the open window.
    WindowStats {
        response: oneshot::Sender<HashMap<BetChoice, ChoiceStats>>,
    },

    /// Remaining shoe cards and deck equivalents.
    DeckStatus {
        response: oneshot::Sender<ShoeStatus>,
    },

    /// Admin: force the table live until explicitly stopped.
    StartForced {
        response: oneshot::Sender<TableReply>,
    },

    /// Run a fixed number of background rounds, then stop automatically.
    StartBounded {
        rounds: u32,
        response: oneshot::Sender<TableReply>,
    },

    /// Stop the active driver. The in-flight cycle still settles.
    Stop {
        response: oneshot::Sender<TableReply>,
    },

    /// Admin: rig the next round to a fixed outcome.
    ArmFixedOutcome {
        fixed: FixedOutcome,
        response: oneshot::Sender<TableReply>,
    },

    /// Scheduler status snapshot.
    Status {
        response: oneshot::Sender<SchedulerStatus>,
    },

    /// Subscribe to table events.
    Subscribe {
        user: UserId,
        sender: mpsc::Sender<TableEvent>,
    },

    /// Unsubscribe from table events.
    Unsubscribe { user: UserId },
}

/// Response from table operations.
#[derive(Debug, Clone, PartialEq)]
pub enum TableReply {
    /// Operation accepted; bets carry the bettor's new balance.
    Accepted { new_balance: Option<Chips> },

    /// Operation rejected with a structured reason.
    Rejected { error: GameError },
}

impl TableReply {
    pub fn accepted() -> Self {
        Self::Accepted { new_balance: None }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn error(&self) -> Option<&GameError> {
        match self {
            Self::Rejected { error } => Some(error),
            Self::Accepted { .. } => None,
        }
    }
}

/// Scheduler status snapshot.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SchedulerStatus {
    pub live: bool,
    pub driver: Option<String>,
    pub rounds_completed: u64,
    pub rounds_remaining: Option<u32>,
    pub window_open: bool,
    pub connected_users: usize,
    pub forced_outcome: Option<RoundOutcome>,
}
