//! Bets and the shared betting window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::errors::{GameError, GameResult};
use crate::{Chips, UserId};

/// What a baccarat bet backs.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BetChoice {
    Player,
    Banker,
    Tie,
    PlayerPair,
    BankerPair,
}

impl BetChoice {
    pub const ALL: [BetChoice; 5] = [
        BetChoice::Player,
        BetChoice::Banker,
        BetChoice::Tie,
        BetChoice::PlayerPair,
        BetChoice::BankerPair,
    ];
}

impl fmt::Display for BetChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Player => "player",
            Self::Banker => "banker",
            Self::Tie => "tie",
            Self::PlayerPair => "player_pair",
            Self::BankerPair => "banker_pair",
        };
        write!(f, "{repr}")
    }
}

/// One placed bet. Lives for exactly one betting window.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Bet {
    pub bettor: UserId,
    pub choice: BetChoice,
    pub amount: Chips,
}

/// Per-choice aggregates, always derivable by replaying the bet list.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ChoiceStats {
    pub count: usize,
    pub total: Chips,
    pub distinct_bettors: usize,
}

/// The shared betting window. Exactly one exists per table; bets are
/// accepted only while it is open.
#[derive(Clone, Debug, Default)]
pub struct BettingWindow {
    open: bool,
    closes_at: Option<DateTime<Utc>>,
    bets: Vec<Bet>,
}

impl BettingWindow {
    /// A closed, empty window.
    pub fn closed() -> Self {
        Self::default()
    }

    /// Open the window until the deadline. Any leftover bets from a prior
    /// window have already been drained by [`BettingWindow::close`].
    pub fn open_until(&mut self, closes_at: DateTime<Utc>) {
        self.open = true;
        self.closes_at = Some(closes_at);
        self.bets.clear();
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn closes_at(&self) -> Option<DateTime<Utc>> {
        self.closes_at
    }

    /// Accept a bet while open. Multiple bets from one user on one choice
    /// accumulate into the same round.
    pub fn place(&mut self, bet: Bet) -> GameResult<()> {
        if !self.open {
            return Err(GameError::NotReady("betting window is closed".to_string()));
        }
        if bet.amount <= 0 {
            return Err(GameError::InvalidAmount(bet.amount));
        }
        self.bets.push(bet);
        Ok(())
    }

    /// Remove every bet a user placed in the open window, returning the
    /// total stake to refund.
    pub fn cancel(&mut self, bettor: UserId) -> GameResult<Chips> {
        if !self.open {
            return Err(GameError::NotReady("betting window is closed".to_string()));
        }
        let refund = self
            .bets
            .iter()
            .filter(|bet| bet.bettor == bettor)
            .map(|bet| bet.amount)
            .sum();
        self.bets.retain(|bet| bet.bettor != bettor);
        Ok(refund)
    }

    /// Close the window and drain the bets for resolution.
    pub fn close(&mut self) -> Vec<Bet> {
        self.open = false;
        self.closes_at = None;
        std::mem::take(&mut self.bets)
    }

    pub fn bets(&self) -> &[Bet] {
        &self.bets
    }

    /// Aggregate stats per choice by replaying the bet list.
    pub fn stats(&self) -> HashMap<BetChoice, ChoiceStats> {
        let mut stats: HashMap<BetChoice, ChoiceStats> = HashMap::new();
        let mut bettors: HashMap<BetChoice, HashSet<UserId>> = HashMap::new();
        for bet in &self.bets {
            let entry = stats.entry(bet.choice).or_default();
            entry.count += 1;
            entry.total += bet.amount;
            bettors.entry(bet.choice).or_default().insert(bet.bettor);
        }
        for (choice, entry) in &mut stats {
            entry.distinct_bettors = bettors[choice].len();
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_window() -> BettingWindow {
        let mut window = BettingWindow::closed();
        window.open_until(Utc::now() + chrono::Duration::seconds(16));
        window
    }

    #[test]
    fn closed_window_rejects_bets() {
        let mut window = BettingWindow::closed();
        let err = window
            .place(Bet {
                bettor: 1,
                choice: BetChoice::Player,
                amount: 100,
            })
            .unwrap_err();
        assert_eq!(err.kind(), "not_ready");
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let mut window = open_window();
        for amount in [0, -50] {
            let err = window
                .place(Bet {
                    bettor: 1,
                    choice: BetChoice::Tie,
                    amount,
                })
                .unwrap_err();
            assert_eq!(err, GameError::InvalidAmount(amount));
        }
        assert!(window.bets().is_empty());
    }

    #[test]
    fn stats_replay_the_bet_list() {
        let mut window = open_window();
        for (bettor, choice, amount) in [
            (1, BetChoice::Player, 100),
            (1, BetChoice::Player, 150),
            (2, BetChoice::Player, 50),
            (2, BetChoice::Tie, 25),
        ] {
            window
                .place(Bet {
                    bettor,
                    choice,
                    amount,
                })
                .unwrap();
        }
        let stats = window.stats();
        let player = stats[&BetChoice::Player];
        assert_eq!(player.count, 3);
        assert_eq!(player.total, 300);
        assert_eq!(player.distinct_bettors, 2);
        let tie = stats[&BetChoice::Tie];
        assert_eq!(tie.count, 1);
        assert_eq!(tie.total, 25);
        assert_eq!(tie.distinct_bettors, 1);
        assert!(!stats.contains_key(&BetChoice::BankerPair));
    }

    #[test]
    fn cancel_refunds_only_that_bettor() {
        let mut window = open_window();
        for (bettor, amount) in [(1, 100), (2, 200), (1, 50)] {
            window
                .place(Bet {
                    bettor,
                    choice: BetChoice::Banker,
                    amount,
                })
                .unwrap();
        }
        assert_eq!(window.cancel(1).unwrap(), 150);
        assert_eq!(window.bets().len(), 1);
        assert_eq!(window.bets()[0].bettor, 2);
        // cancelling again refunds nothing
        assert_eq!(window.cancel(1).unwrap(), 0);
    }

    #[test]
    fn close_drains_and_shuts() {
        let mut window = open_window();
        window
            .place(Bet {
                bettor: 3,
                choice: BetChoice::PlayerPair,
                amount: 10,
            })
            .unwrap();
        let drained = window.close();
        assert_eq!(drained.len(), 1);
        assert!(!window.is_open());
        assert!(window.bets().is_empty());
        assert!(window.cancel(3).is_err());
    }
}
