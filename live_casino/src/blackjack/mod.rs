//! Per-player blackjack: the session state machine, the registry that owns
//! live sessions, and the driver that mirrors session money movement onto
//! the ledger and paces the dealer's turn.

pub mod driver;
pub mod registry;
pub mod session;

pub use driver::{DealerTiming, SessionDriver};
pub use registry::SessionRegistry;
pub use session::{
    BlackjackSession, DealerStep, HandOutcome, HandResult, Outcome, Phase,
};
