//! # Live Casino
//!
//! A real-money baccarat and blackjack engine built for persistent real-time
//! connections.
//!
//! The library is split between a shared baccarat table driven by a round
//! scheduler and per-player blackjack sessions owned by a registry:
//!
//! - **Baccarat**: many connected users bet into a shared betting window,
//!   one table actor runs rounds start-to-finish and settles every bet
//!   against the ledger through a fixed odds table.
//! - **Blackjack**: each authenticated player gets an isolated session with
//!   its own shoe and a phase state machine (bet, deal, hit, stand, double,
//!   split, insurance, surrender).
//!
//! Money only moves through the [`ledger::Ledger`] interface: stakes are
//! debited atomically when a bet is placed and payouts are credited exactly
//! once at resolution.
//!
//! ## Core Modules
//!
//! - [`cards`]: card model, multi-deck shoe, and per-game hand scoring
//! - [`baccarat`]: shared table, betting window, settlement, round scheduler
//! - [`blackjack`]: session state machine, ledger-mediating driver, registry
//! - [`ledger`]: balance/history interface with in-memory and Postgres backends
//! - [`auth`]: identity verification consumed as a capability

pub mod auth;
pub mod baccarat;
pub mod blackjack;
pub mod cards;
pub mod constants;
pub mod errors;
pub mod events;
pub mod ledger;

pub use cards::{Card, Shoe, Suit};
pub use errors::{GameError, GameResult};

/// Type alias for whole currency units. All bets and balances are whole
/// units; fractional odds round down at payout time.
pub type Chips = i64;

/// Type alias for user identities handed out by the auth layer.
pub type UserId = i64;
