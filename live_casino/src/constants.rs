//! Game-wide tuning constants.

use crate::Chips;

/// Number of 52-card decks in the baccarat shoe.
pub const BACCARAT_DECK_COUNT: usize = 8;

/// The baccarat shoe regenerates before the next draw once fewer cards than
/// this remain. Mid-shoe, never mid-hand.
pub const BACCARAT_RESHUFFLE_THRESHOLD: usize = 52;

/// Number of 52-card decks in a blackjack session's shoe.
pub const BLACKJACK_DECK_COUNT: usize = 1;

/// A blackjack shoe is replenished between hands once fewer cards than this
/// remain. Running out mid-hand is a fault of the current hand only.
pub const BLACKJACK_REFILL_THRESHOLD: usize = 20;

/// The dealer stands on any total of 17 or more.
pub const DEALER_STAND_TOTAL: u8 = 17;

/// How long a baccarat betting window stays open.
pub const BETTING_WINDOW_SECS: u64 = 16;

/// Wall-clock budget for a blackjack dealer turn before it is
/// force-finalized through the normal result logic.
pub const DEALER_TURN_BUDGET_SECS: u64 = 30;

/// Blackjack sessions are evicted after this many minutes of inactivity.
pub const SESSION_IDLE_TIMEOUT_MINS: i64 = 30;

/// Starting balance for freshly opened in-memory ledger accounts.
pub const DEFAULT_STARTING_BALANCE: Chips = 10_000;
