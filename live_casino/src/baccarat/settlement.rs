//! Settlement of finished rounds against the ledger.
//!
//! Settlement is a pure computation over the bet list plus an async applier
//! that performs the ledger mutations. Multiple same-choice bets from one
//! bettor collapse into a single payout computation and a single outward
//! win notice, never one per bet row.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::bets::{Bet, BetChoice};
use super::table::{RoundOutcome, RoundRecord};
use crate::events::WinNotice;
use crate::ledger::{GameKind, HistoryRecord, Ledger};
use crate::{Chips, UserId};

/// One aggregated (bettor, choice) settlement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Settlement {
    pub bettor: UserId,
    pub choice: BetChoice,
    pub wagered: Chips,
    pub payout: Chips,
}

/// The fixed odds table. Stakes were collected at bet time, so a payout of
/// zero means the stake is simply gone; a push returns exactly the stake.
pub fn payout_for(choice: BetChoice, amount: Chips, record: &RoundRecord) -> Chips {
    match choice {
        BetChoice::Player => match record.outcome {
            RoundOutcome::Player => amount * 2,
            RoundOutcome::Tie => amount,
            RoundOutcome::Banker => 0,
        },
        BetChoice::Banker => match record.outcome {
            // 1.95x, floored
            RoundOutcome::Banker => amount * 195 / 100,
            RoundOutcome::Tie => amount,
            RoundOutcome::Player => 0,
        },
        BetChoice::Tie => match record.outcome {
            RoundOutcome::Tie => amount * 9,
            _ => 0,
        },
        BetChoice::PlayerPair => {
            if record.player_pair {
                amount * 12
            } else {
                0
            }
        }
        BetChoice::BankerPair => {
            if record.banker_pair {
                amount * 12
            } else {
                0
            }
        }
    }
}

/// Aggregate bets per (bettor, choice) and evaluate the odds table once per
/// group. Output order is deterministic: by bettor, then choice.
pub fn settle(record: &RoundRecord, bets: &[Bet]) -> Vec<Settlement> {
    let mut grouped: BTreeMap<(UserId, BetChoice), Chips> = BTreeMap::new();
    for bet in bets {
        *grouped.entry((bet.bettor, bet.choice)).or_default() += bet.amount;
    }
    grouped
        .into_iter()
        .map(|((bettor, choice), wagered)| Settlement {
            bettor,
            choice,
            wagered,
            payout: payout_for(choice, wagered, record),
        })
        .collect()
}

/// Applies settlements to the ledger.
pub struct SettlementEngine {
    ledger: Arc<dyn Ledger>,
}

impl SettlementEngine {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Credit payouts and append history for every settlement, returning
    /// one win notice per (bettor, choice). Ledger write failures are
    /// logged and retried; they never block delivering the round result.
    pub async fn apply(&self, record: &RoundRecord, settlements: &[Settlement]) -> Vec<WinNotice> {
        let mut notices = Vec::with_capacity(settlements.len());
        for settlement in settlements {
            if settlement.payout > 0 {
                self.credit_with_retry(settlement.bettor, settlement.payout)
                    .await;
            }
            let result = if settlement.payout > settlement.wagered {
                "win"
            } else if settlement.payout == settlement.wagered {
                "push"
            } else {
                "lose"
            };
            let history = HistoryRecord::new(
                GameKind::Baccarat,
                settlement.choice.to_string(),
                settlement.wagered,
                result,
                record.outcome.to_string(),
                settlement.payout,
            );
            if let Err(e) = self.ledger.append_history(settlement.bettor, history).await {
                log::error!(
                    "failed to append history for user {}: {}",
                    settlement.bettor,
                    e
                );
            }
            notices.push(WinNotice {
                bettor: settlement.bettor,
                choice: settlement.choice,
                wagered: settlement.wagered,
                payout: settlement.payout,
            });
        }
        notices
    }

    /// The payout already happened logically; the ledger must eventually
    /// agree. Retry a few times and escalate to an error log for
    /// reconciliation.
    async fn credit_with_retry(&self, bettor: UserId, payout: Chips) {
        for attempt in 1..=3 {
            match self.ledger.atomic_adjust(bettor, payout).await {
                Ok(_) => return,
                Err(e) => log::warn!(
                    "payout credit attempt {attempt} for user {bettor} failed: {e}"
                ),
            }
        }
        log::error!("could not credit {payout} to user {bettor}; needs reconciliation");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{Card, Suit};

    fn record(outcome_cards: (Vec<Card>, Vec<Card>)) -> RoundRecord {
        RoundRecord::evaluate(outcome_cards.0, outcome_cards.1)
    }

    fn player_win() -> RoundRecord {
        record((
            vec![Card::new(9, Suit::Heart), Card::new(10, Suit::Diamond)],
            vec![Card::new(8, Suit::Club), Card::new(10, Suit::Spade)],
        ))
    }

    #[test]
    fn banker_odds_floor() {
        let rec = record((
            vec![Card::new(10, Suit::Diamond), Card::new(3, Suit::Spade)],
            vec![Card::new(9, Suit::Heart), Card::new(12, Suit::Diamond)],
        ));
        assert_eq!(rec.outcome, RoundOutcome::Banker);
        // 101 * 1.95 = 196.95 -> 196
        assert_eq!(payout_for(BetChoice::Banker, 101, &rec), 196);
        assert_eq!(payout_for(BetChoice::Banker, 100, &rec), 195);
    }

    #[test]
    fn side_bets_ignore_the_main_outcome() {
        let rec = record((
            vec![Card::new(4, Suit::Heart), Card::new(4, Suit::Diamond)],
            vec![Card::new(6, Suit::Club), Card::new(13, Suit::Spade)],
        ));
        assert_eq!(rec.outcome, RoundOutcome::Player);
        assert!(rec.player_pair);
        assert_eq!(payout_for(BetChoice::PlayerPair, 10, &rec), 120);
        assert_eq!(payout_for(BetChoice::BankerPair, 10, &rec), 0);
    }

    #[test]
    fn push_returns_stake_on_tie() {
        let rec = record((
            vec![Card::new(8, Suit::Spade), Card::new(12, Suit::Heart)],
            vec![Card::new(8, Suit::Diamond), Card::new(11, Suit::Club)],
        ));
        assert_eq!(rec.outcome, RoundOutcome::Tie);
        assert_eq!(payout_for(BetChoice::Player, 70, &rec), 70);
        assert_eq!(payout_for(BetChoice::Banker, 70, &rec), 70);
        assert_eq!(payout_for(BetChoice::Tie, 70, &rec), 630);
    }

    #[test]
    fn same_choice_bets_settle_once() {
        let rec = player_win();
        let bets = vec![
            Bet {
                bettor: 1,
                choice: BetChoice::Player,
                amount: 100,
            },
            Bet {
                bettor: 1,
                choice: BetChoice::Player,
                amount: 250,
            },
            Bet {
                bettor: 2,
                choice: BetChoice::Banker,
                amount: 40,
            },
        ];
        let settlements = settle(&rec, &bets);
        assert_eq!(settlements.len(), 2);
        assert_eq!(
            settlements[0],
            Settlement {
                bettor: 1,
                choice: BetChoice::Player,
                wagered: 350,
                payout: 700,
            }
        );
        assert_eq!(settlements[1].payout, 0);
    }
}
