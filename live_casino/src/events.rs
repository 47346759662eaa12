//! Outbound events consumed by the presentation layer.
//!
//! Payload shape is the contract; transport framing is someone else's
//! problem. Blackjack snapshots mask the dealer's hole card until the
//! reveal step and show everything once the hand is finished.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::baccarat::bets::BetChoice;
use crate::baccarat::table::RoundOutcome;
use crate::cards::Card;
use crate::{Chips, UserId};

/// Aggregated win notice for one (bettor, choice).
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct WinNotice {
    pub bettor: UserId,
    pub choice: BetChoice,
    pub wagered: Chips,
    pub payout: Chips,
}

/// Events broadcast from the shared baccarat table.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TableEvent {
    WindowOpened {
        closes_at: DateTime<Utc>,
    },
    WindowClosed,
    RoundResolved {
        outcome: RoundOutcome,
        player_score: u8,
        banker_score: u8,
        player_pair: bool,
        banker_pair: bool,
        player_hand: Vec<Card>,
        banker_hand: Vec<Card>,
    },
    RoundSettled {
        notices: Vec<WinNotice>,
    },
    ForcedOutcomeArmed {
        outcome: RoundOutcome,
        pattern: usize,
    },
    SchedulerStatus {
        live: bool,
        driver: Option<String>,
        rounds_completed: u64,
        rounds_remaining: Option<u32>,
    },
}

/// A card as a viewer is allowed to see it. The real value of a hidden
/// card stays server-side.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "visibility", rename_all = "snake_case")]
pub enum CardView {
    Hidden,
    Shown { card: Card },
}

/// Per-phase capability flags shown to the player.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Capabilities {
    pub can_double: bool,
    pub can_split: bool,
    pub can_insurance: bool,
}

/// Snapshot of a blackjack session as sent to its owner.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SessionView {
    pub phase: String,
    pub player_hands: Vec<Vec<Card>>,
    pub active_hand: usize,
    pub dealer_hand: Vec<CardView>,
    pub bet: Chips,
    pub insurance: Chips,
    pub capabilities: Capabilities,
    pub results: Vec<String>,
    pub total_payout: Chips,
    pub balance: Chips,
}

/// Events delivered to a single blackjack session's owner.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionCreated {
        snapshot: SessionView,
    },
    ActionResult {
        action: String,
        ok: bool,
        kind: Option<String>,
        reason: Option<String>,
        snapshot: SessionView,
    },
    BalanceChanged {
        balance: Chips,
        reason: String,
    },
    DealerReveal {
        card: Card,
    },
    DealerDraw {
        card: Card,
        total: u8,
    },
}
