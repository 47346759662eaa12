//! The shared baccarat table.
//!
//! One active hand at a time; a round runs start-to-finish synchronously
//! once started. Pacing between rounds belongs to the scheduler, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cards::score::{baccarat_total, baccarat_value, is_natural, is_pair};
use crate::cards::{Card, Shoe, ShoeStatus, Suit};
use crate::constants::{BACCARAT_DECK_COUNT, BACCARAT_RESHUFFLE_THRESHOLD};

/// How a round resolved.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundOutcome {
    Player,
    Banker,
    Tie,
}

impl fmt::Display for RoundOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Player => "player",
            Self::Banker => "banker",
            Self::Tie => "tie",
        };
        write!(f, "{repr}")
    }
}

/// Immutable record of one finished round.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RoundRecord {
    pub player_hand: Vec<Card>,
    pub banker_hand: Vec<Card>,
    pub outcome: RoundOutcome,
    pub player_pair: bool,
    pub banker_pair: bool,
    pub player_score: u8,
    pub banker_score: u8,
    pub resolved_at: DateTime<Utc>,
}

impl RoundRecord {
    /// Score two final hands through the normal evaluator. Fixed-outcome
    /// patterns go through this exact path, so a forced round is always
    /// consistent with how the same cards would naturally resolve.
    pub fn evaluate(player_hand: Vec<Card>, banker_hand: Vec<Card>) -> Self {
        let player_score = baccarat_total(&player_hand);
        let banker_score = baccarat_total(&banker_hand);
        let outcome = match player_score.cmp(&banker_score) {
            std::cmp::Ordering::Greater => RoundOutcome::Player,
            std::cmp::Ordering::Less => RoundOutcome::Banker,
            std::cmp::Ordering::Equal => RoundOutcome::Tie,
        };
        Self {
            player_pair: is_pair(&player_hand),
            banker_pair: is_pair(&banker_hand),
            player_score,
            banker_score,
            player_hand,
            banker_hand,
            outcome,
            resolved_at: Utc::now(),
        }
    }
}

/// Operator-forced outcome for a single round.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct FixedOutcome {
    pub outcome: RoundOutcome,
    pub pattern: usize,
}

/// True when the player's side draws a third card: total five or less, and
/// only when neither side holds a natural.
pub fn player_draws(player_total: u8) -> bool {
    player_total <= 5
}

/// The banker third-card table. `player_third` is the baccarat value of the
/// player's third card, or `None` when the player stood.
pub fn banker_draws(banker_total: u8, player_third: Option<u8>) -> bool {
    match banker_total {
        0..=2 => true,
        7.. => false,
        total => match player_third {
            None => total <= 5,
            Some(third) => match total {
                3 => third != 8,
                4 => (2..=7).contains(&third),
                5 => (4..=7).contains(&third),
                6 => third == 6 || third == 7,
                _ => unreachable!("totals 0-2 and 7-9 handled above"),
            },
        },
    }
}

/// One shared table wrapping the shoe.
pub struct BaccaratTable {
    shoe: Shoe,
}

impl Default for BaccaratTable {
    fn default() -> Self {
        Self::new(Shoe::shuffled(
            BACCARAT_DECK_COUNT,
            BACCARAT_RESHUFFLE_THRESHOLD,
        ))
    }
}

impl BaccaratTable {
    pub fn new(shoe: Shoe) -> Self {
        Self { shoe }
    }

    /// Run one complete round: deal two cards each, stop on a natural,
    /// otherwise apply the third-card rules, then score.
    pub fn play_round(&mut self) -> RoundRecord {
        let mut player = vec![self.shoe.draw()];
        let mut banker = vec![self.shoe.draw()];
        player.push(self.shoe.draw());
        banker.push(self.shoe.draw());

        if !is_natural(&player) && !is_natural(&banker) {
            let player_third = if player_draws(baccarat_total(&player)) {
                let card = self.shoe.draw();
                player.push(card);
                Some(baccarat_value(card))
            } else {
                None
            };
            if banker_draws(baccarat_total(&banker), player_third) {
                banker.push(self.shoe.draw());
            }
        }

        let record = RoundRecord::evaluate(player, banker);
        log::debug!(
            "round resolved: {} ({} vs {})",
            record.outcome,
            record.player_score,
            record.banker_score
        );
        record
    }

    /// Deterministic path for operator-forced outcomes. The pattern library
    /// holds literal card sets that the normal evaluator independently
    /// scores to the requested outcome; an unrecognized pattern index falls
    /// back to the first combination for that outcome. The shoe is not
    /// consumed.
    pub fn play_fixed_round(&mut self, fixed: FixedOutcome) -> RoundRecord {
        let (player, banker) = fixed_pattern(fixed.outcome, fixed.pattern);
        let record = RoundRecord::evaluate(player, banker);
        debug_assert_eq!(record.outcome, fixed.outcome);
        record
    }

    /// Remaining card count and deck equivalents.
    pub fn deck_status(&self) -> ShoeStatus {
        self.shoe.status()
    }
}

/// Pre-built card combinations per (outcome, pattern index).
fn fixed_pattern(outcome: RoundOutcome, pattern: usize) -> (Vec<Card>, Vec<Card>) {
    use Suit::{Club, Diamond, Heart, Spade};
    let card = Card::new;
    match (outcome, pattern) {
        // Natural nine over natural eight.
        (RoundOutcome::Player, 1) => (
            vec![card(2, Club), card(3, Diamond), card(4, Heart)],
            vec![card(6, Spade), card(11, Diamond)],
        ),
        (RoundOutcome::Player, _) => (
            vec![card(9, Heart), card(10, Diamond)],
            vec![card(8, Club), card(10, Spade)],
        ),
        // Natural nine for the banker.
        (RoundOutcome::Banker, 1) => (
            vec![card(13, Spade), card(6, Heart)],
            vec![card(7, Diamond), card(12, Club)],
        ),
        (RoundOutcome::Banker, _) => (
            vec![card(10, Diamond), card(3, Spade)],
            vec![card(9, Heart), card(12, Diamond)],
        ),
        // Both sides stand on seven.
        (RoundOutcome::Tie, 1) => (
            vec![card(3, Heart), card(4, Diamond)],
            vec![card(2, Spade), card(5, Club)],
        ),
        (RoundOutcome::Tie, _) => (
            vec![card(8, Spade), card(12, Heart)],
            vec![card(8, Diamond), card(11, Club)],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_fixed_pattern_evaluates_to_its_outcome() {
        for outcome in [RoundOutcome::Player, RoundOutcome::Banker, RoundOutcome::Tie] {
            // index 99 exercises the fallback
            for pattern in [0, 1, 99] {
                let (player, banker) = fixed_pattern(outcome, pattern);
                let record = RoundRecord::evaluate(player, banker);
                assert_eq!(record.outcome, outcome, "pattern {pattern}");
            }
        }
    }

    #[test]
    fn banker_row_three_draws_except_on_eight() {
        for third in 0..=9 {
            assert_eq!(banker_draws(3, Some(third)), third != 8);
        }
    }

    #[test]
    fn banker_stands_on_seven_and_up() {
        for total in 7..=9 {
            assert!(!banker_draws(total, None));
            assert!(!banker_draws(total, Some(5)));
        }
    }
}
