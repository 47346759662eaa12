//! Shared baccarat table: betting window, round play, settlement, and the
//! scheduler actor that drives repeating rounds.

pub mod bets;
pub mod messages;
pub mod scheduler;
pub mod settlement;
pub mod table;

pub use bets::{Bet, BetChoice, BettingWindow, ChoiceStats};
pub use messages::{SchedulerStatus, TableCommand, TableReply};
pub use scheduler::{spawn_table, TableHandle, TableTiming};
pub use settlement::{Settlement, SettlementEngine};
pub use table::{BaccaratTable, FixedOutcome, RoundOutcome, RoundRecord};
