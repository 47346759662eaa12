//! The blackjack session state machine.
//!
//! A session belongs to exactly one player and moves through
//! waiting -> betting -> playing -> dealer turn -> finished. Every
//! operation validates the current phase and either mutates in place or
//! returns a structured error; an invalid action never changes state.
//!
//! Money here is a mirror of the player's ledger balance. Operations that
//! move chips return the signed delta they applied to the mirror so the
//! caller can apply the identical delta to the ledger, compensating the
//! mirror if the ledger write fails.

use chrono::{DateTime, Utc};

use crate::cards::score::{blackjack_total, blackjack_value, is_blackjack};
use crate::cards::{Card, Shoe};
use crate::constants::{BLACKJACK_DECK_COUNT, BLACKJACK_REFILL_THRESHOLD, DEALER_STAND_TOTAL};
use crate::errors::{GameError, GameResult};
use crate::events::{Capabilities, CardView, SessionView};
use crate::{Chips, UserId};

/// Hand play state while the player still acts.
#[derive(Clone, Debug)]
pub struct PlayState {
    pub hands: Vec<Vec<Card>>,
    pub active: usize,
    /// Stake per hand. Doubling doubles it; a split duplicates it.
    pub bet: Chips,
    pub insurance: Chips,
    pub split: bool,
    pub caps: Capabilities,
    /// Set by a double down: the next card ends the player's turn.
    pub must_stand: bool,
    pub busted: Vec<bool>,
    /// Everything committed this hand, for a forced refund.
    pub staked: Chips,
}

/// Carried state while the dealer resolves.
#[derive(Clone, Debug)]
pub struct DealerState {
    pub hands: Vec<Vec<Card>>,
    pub busted: Vec<bool>,
    pub bet: Chips,
    pub insurance: Chips,
    pub staked: Chips,
    pub player_blackjack: bool,
    pub hole_revealed: bool,
    pub draw_done: bool,
}

/// Result of one player hand.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HandOutcome {
    Win,
    Blackjack,
    Lose,
    Push,
    Bust,
    Surrender,
}

impl HandOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Blackjack => "blackjack",
            Self::Lose => "lose",
            Self::Push => "push",
            Self::Bust => "bust",
            Self::Surrender => "surrender",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HandResult {
    pub outcome: HandOutcome,
    pub wagered: Chips,
    pub payout: Chips,
}

/// Final accounting for a finished hand.
#[derive(Clone, Debug, PartialEq)]
pub struct Outcome {
    pub results: Vec<HandResult>,
    pub hands: Vec<Vec<Card>>,
    pub insurance_payout: Chips,
    pub total_payout: Chips,
}

/// One step of the dealer's paced draw loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DealerStep {
    Draw { card: Card, total: u8 },
    Done,
}

#[derive(Clone, Debug)]
pub enum Phase {
    Waiting,
    Betting { bet: Chips },
    Playing(PlayState),
    DealerTurn(DealerState),
    Finished(Outcome),
}

/// A single player's blackjack session.
#[derive(Debug)]
pub struct BlackjackSession {
    user: UserId,
    display_name: String,
    shoe: Shoe,
    /// Dealer cards; index 0 is the hole card.
    dealer: Vec<Card>,
    phase: Phase,
    balance: Chips,
    created_at: DateTime<Utc>,
    last_action: DateTime<Utc>,
}

impl BlackjackSession {
    pub fn new(user: UserId, display_name: String, balance: Chips) -> Self {
        Self::with_shoe(
            user,
            display_name,
            balance,
            Shoe::shuffled(BLACKJACK_DECK_COUNT, BLACKJACK_REFILL_THRESHOLD),
        )
    }

    /// A session over an explicit shoe. Tests stack the deck with this.
    pub fn with_shoe(user: UserId, display_name: String, balance: Chips, shoe: Shoe) -> Self {
        let now = Utc::now();
        Self {
            user,
            display_name,
            shoe,
            dealer: Vec::new(),
            phase: Phase::Waiting,
            balance,
            created_at: now,
            last_action: now,
        }
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn balance(&self) -> Chips {
        self.balance
    }

    /// Overwrite the mirror with the ledger's authoritative balance.
    pub fn sync_balance(&mut self, balance: Chips) {
        self.balance = balance;
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_action(&self) -> DateTime<Utc> {
        self.last_action
    }

    pub fn touch(&mut self) {
        self.last_action = Utc::now();
    }

    pub fn phase_name(&self) -> &'static str {
        match self.phase {
            Phase::Waiting => "waiting",
            Phase::Betting { .. } => "betting",
            Phase::Playing(_) => "playing",
            Phase::DealerTurn(_) => "dealer_turn",
            Phase::Finished(_) => "finished",
        }
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        match &self.phase {
            Phase::Finished(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn dealer_cards(&self) -> &[Card] {
        &self.dealer
    }

    /// The stake waiting in the betting phase, if any.
    pub fn staged_bet(&self) -> Chips {
        match self.phase {
            Phase::Betting { bet } => bet,
            _ => 0,
        }
    }

    /// The per-hand stake while the player acts.
    pub fn play_bet(&self) -> Option<Chips> {
        match &self.phase {
            Phase::Playing(play) => Some(play.bet),
            _ => None,
        }
    }

    fn draw(&mut self) -> GameResult<Card> {
        self.shoe.try_draw().ok_or(GameError::ResourceExhausted)
    }

    fn reject(&self, action: &str) -> GameError {
        GameError::invalid_transition(self.phase_name(), action)
    }

    /// Stake a bet. Allowed while waiting, after a finished hand (which is
    /// cleared first), or while betting (the previous stake is refunded and
    /// replaced). Returns the net delta applied to the mirror.
    pub fn place_bet(&mut self, amount: Chips) -> GameResult<Chips> {
        if amount <= 0 {
            return Err(GameError::InvalidAmount(amount));
        }
        let refund = match &self.phase {
            Phase::Waiting => 0,
            Phase::Betting { bet } => *bet,
            Phase::Finished(_) => {
                self.clear_round();
                0
            }
            _ => return Err(self.reject("bet")),
        };
        let available = self.balance + refund;
        if amount > available {
            return Err(GameError::InsufficientFunds {
                required: amount,
                available,
            });
        }
        let delta = refund - amount;
        self.balance += delta;
        self.phase = Phase::Betting { bet: amount };
        self.touch();
        Ok(delta)
    }

    /// Deal the opening hands: player, dealer hole, player, dealer upcard.
    pub fn start_game(&mut self) -> GameResult<()> {
        let bet = match &self.phase {
            Phase::Betting { bet } => *bet,
            _ => return Err(self.reject("deal")),
        };
        let first = self.draw()?;
        let hole = self.draw()?;
        let second = self.draw()?;
        let upcard = self.draw()?;
        self.dealer = vec![hole, upcard];
        let hand = vec![first, second];
        let caps = Capabilities {
            can_double: self.balance >= bet,
            can_split: blackjack_value(first) == blackjack_value(second) && self.balance >= bet,
            can_insurance: upcard.rank == 1 && self.balance >= bet / 2 && bet >= 2,
        };
        self.phase = Phase::Playing(PlayState {
            hands: vec![hand],
            active: 0,
            bet,
            insurance: 0,
            split: false,
            caps,
            must_stand: false,
            busted: vec![false],
            staked: bet,
        });
        self.touch();
        Ok(())
    }

    /// A dealt two-card 21 skips straight to the dealer's turn.
    pub fn check_blackjack(&mut self) -> GameResult<bool> {
        let play = match std::mem::replace(&mut self.phase, Phase::Waiting) {
            Phase::Playing(play) => play,
            other => {
                self.phase = other;
                return Err(self.reject("check blackjack"));
            }
        };
        if !play.split && is_blackjack(&play.hands[0]) {
            self.phase = Phase::DealerTurn(DealerState {
                hands: play.hands,
                busted: play.busted,
                bet: play.bet,
                insurance: play.insurance,
                staked: play.staked,
                player_blackjack: true,
                hole_revealed: false,
                draw_done: false,
            });
            Ok(true)
        } else {
            self.phase = Phase::Playing(play);
            Ok(false)
        }
    }

    /// Draw one card to the active hand. A 21 stands automatically, a bust
    /// forfeits the hand, and a doubled hand stands after its single card.
    pub fn hit(&mut self) -> GameResult<Card> {
        let mut play = match std::mem::replace(&mut self.phase, Phase::Waiting) {
            Phase::Playing(play) => play,
            other => {
                self.phase = other;
                return Err(self.reject("hit"));
            }
        };
        let card = match self.shoe.try_draw() {
            Some(card) => card,
            None => {
                self.phase = Phase::Playing(play);
                return Err(GameError::ResourceExhausted);
            }
        };
        let active = play.active;
        play.hands[active].push(card);
        play.caps.can_double = false;
        play.caps.can_split = false;
        play.caps.can_insurance = false;
        let total = blackjack_total(&play.hands[active]).total;
        if total > 21 {
            play.busted[active] = true;
            if play.split {
                self.advance_or_dealer(play);
            } else {
                // single busted hand: the stake is gone and the dealer
                // never reveals, so any insurance is forfeited too
                let bet = play.bet;
                let hands = play.hands;
                self.phase = Phase::Finished(Outcome {
                    results: vec![HandResult {
                        outcome: HandOutcome::Bust,
                        wagered: bet,
                        payout: 0,
                    }],
                    hands,
                    insurance_payout: 0,
                    total_payout: 0,
                });
                log::debug!("user {} busted a {bet} chip hand", self.user);
            }
        } else if total == 21 || play.must_stand {
            self.advance_or_dealer(play);
        } else {
            self.phase = Phase::Playing(play);
        }
        self.touch();
        Ok(card)
    }

    /// Finish the active hand; the last hand hands over to the dealer.
    pub fn stand(&mut self) -> GameResult<()> {
        let play = match std::mem::replace(&mut self.phase, Phase::Waiting) {
            Phase::Playing(play) => play,
            other => {
                self.phase = other;
                return Err(self.reject("stand"));
            }
        };
        self.advance_or_dealer(play);
        self.touch();
        Ok(())
    }

    /// Double the stake on a fresh two-card hand. Exactly one more card may
    /// be drawn, after which the hand stands. Returns the mirror delta.
    pub fn double_down(&mut self) -> GameResult<Chips> {
        let play = match &mut self.phase {
            Phase::Playing(play) => play,
            _ => return Err(self.reject("double down")),
        };
        if !play.caps.can_double {
            return Err(GameError::NotReady(
                "doubling down is not available".to_string(),
            ));
        }
        let bet = play.bet;
        if self.balance < bet {
            return Err(GameError::InsufficientFunds {
                required: bet,
                available: self.balance,
            });
        }
        play.bet = bet * 2;
        play.staked += bet;
        play.must_stand = true;
        play.caps.can_double = false;
        play.caps.can_split = false;
        play.caps.can_insurance = false;
        self.balance -= bet;
        self.touch();
        Ok(-bet)
    }

    /// Buy insurance against a dealer ace, at most half the bet. Returns
    /// the mirror delta.
    pub fn insurance(&mut self, amount: Chips) -> GameResult<Chips> {
        let play = match &mut self.phase {
            Phase::Playing(play) => play,
            _ => return Err(self.reject("insurance")),
        };
        if !play.caps.can_insurance {
            return Err(GameError::NotReady(
                "insurance is not available".to_string(),
            ));
        }
        if amount <= 0 {
            return Err(GameError::InvalidAmount(amount));
        }
        let premium = amount.min(play.bet / 2);
        if self.balance < premium {
            return Err(GameError::InsufficientFunds {
                required: premium,
                available: self.balance,
            });
        }
        play.insurance = premium;
        play.staked += premium;
        play.caps.can_insurance = false;
        self.balance -= premium;
        self.touch();
        Ok(-premium)
    }

    /// Give up a fresh two-card hand for half the stake back. Returns the
    /// mirror delta (the refunded half).
    pub fn surrender(&mut self) -> GameResult<Chips> {
        let play = match std::mem::replace(&mut self.phase, Phase::Waiting) {
            Phase::Playing(play) => play,
            other => {
                self.phase = other;
                return Err(self.reject("surrender"));
            }
        };
        if play.split || play.hands[0].len() != 2 || is_blackjack(&self.dealer) {
            let err = GameError::NotReady("surrender is not available".to_string());
            self.phase = Phase::Playing(play);
            return Err(err);
        }
        let refund = play.bet / 2;
        self.balance += refund;
        self.phase = Phase::Finished(Outcome {
            results: vec![HandResult {
                outcome: HandOutcome::Surrender,
                wagered: play.bet,
                payout: refund,
            }],
            hands: play.hands,
            insurance_payout: 0,
            total_payout: refund,
        });
        self.touch();
        Ok(refund)
    }

    /// Split a matching-value pair into two hands, staking a second bet.
    /// Returns the mirror delta.
    pub fn split(&mut self) -> GameResult<Chips> {
        let mut play = match std::mem::replace(&mut self.phase, Phase::Waiting) {
            Phase::Playing(play) => play,
            other => {
                self.phase = other;
                return Err(self.reject("split"));
            }
        };
        if !play.caps.can_split {
            let err = GameError::NotReady("splitting is not available".to_string());
            self.phase = Phase::Playing(play);
            return Err(err);
        }
        let bet = play.bet;
        if self.balance < bet {
            let err = GameError::InsufficientFunds {
                required: bet,
                available: self.balance,
            };
            self.phase = Phase::Playing(play);
            return Err(err);
        }
        let first_extra = match self.shoe.try_draw() {
            Some(card) => card,
            None => {
                self.phase = Phase::Playing(play);
                return Err(GameError::ResourceExhausted);
            }
        };
        let second_extra = match self.shoe.try_draw() {
            Some(card) => card,
            None => {
                // put nothing back; a one-card shoe this late means the
                // hand is unrecoverable anyway
                self.phase = Phase::Playing(play);
                return Err(GameError::ResourceExhausted);
            }
        };
        let second = play.hands[0].pop().ok_or(GameError::ResourceExhausted)?;
        let first = play.hands[0].pop().ok_or(GameError::ResourceExhausted)?;
        play.hands = vec![vec![first, first_extra], vec![second, second_extra]];
        play.busted = vec![false, false];
        play.active = 0;
        play.split = true;
        play.staked += bet;
        play.caps.can_split = false;
        play.caps.can_double = false;
        self.balance -= bet;
        self.phase = Phase::Playing(play);
        self.touch();
        Ok(-bet)
    }

    /// Turn over the dealer's hole card.
    pub fn reveal_hole(&mut self) -> GameResult<Card> {
        let dealer = match &mut self.phase {
            Phase::DealerTurn(dealer) => dealer,
            _ => return Err(self.reject("reveal")),
        };
        dealer.hole_revealed = true;
        self.dealer
            .first()
            .copied()
            .ok_or(GameError::ResourceExhausted)
    }

    /// Settle immediately if the dealer was dealt a natural: a player
    /// blackjack pushes, everything else loses, insurance pays double.
    pub fn check_dealer_blackjack(&mut self) -> GameResult<Option<Outcome>> {
        let dealer = match std::mem::replace(&mut self.phase, Phase::Waiting) {
            Phase::DealerTurn(dealer) => dealer,
            other => {
                self.phase = other;
                return Err(self.reject("check dealer blackjack"));
            }
        };
        if !is_blackjack(&self.dealer) {
            self.phase = Phase::DealerTurn(dealer);
            return Ok(None);
        }
        let results: Vec<HandResult> = dealer
            .hands
            .iter()
            .map(|_| {
                if dealer.player_blackjack {
                    HandResult {
                        outcome: HandOutcome::Push,
                        wagered: dealer.bet,
                        payout: dealer.bet,
                    }
                } else {
                    HandResult {
                        outcome: HandOutcome::Lose,
                        wagered: dealer.bet,
                        payout: 0,
                    }
                }
            })
            .collect();
        let insurance_payout = dealer.insurance * 2;
        let total_payout: Chips =
            results.iter().map(|r| r.payout).sum::<Chips>() + insurance_payout;
        let outcome = Outcome {
            results,
            hands: dealer.hands,
            insurance_payout,
            total_payout,
        };
        self.balance += total_payout;
        self.phase = Phase::Finished(outcome.clone());
        self.touch();
        Ok(Some(outcome))
    }

    /// One step of the dealer draw loop: draws while under the stand total,
    /// then reports done. Skips drawing entirely when the player already
    /// has blackjack or every hand busted.
    pub fn dealer_play_step(&mut self) -> GameResult<DealerStep> {
        let dealer = match &mut self.phase {
            Phase::DealerTurn(dealer) => dealer,
            _ => return Err(self.reject("dealer draw")),
        };
        if dealer.draw_done
            || dealer.player_blackjack
            || dealer.busted.iter().all(|busted| *busted)
        {
            dealer.draw_done = true;
            return Ok(DealerStep::Done);
        }
        if blackjack_total(&self.dealer).total >= DEALER_STAND_TOTAL {
            dealer.draw_done = true;
            return Ok(DealerStep::Done);
        }
        let card = self.shoe.try_draw().ok_or(GameError::ResourceExhausted)?;
        self.dealer.push(card);
        Ok(DealerStep::Draw {
            card,
            total: blackjack_total(&self.dealer).total,
        })
    }

    /// Compare every player hand against the dealer and credit payouts.
    /// Only callable once: the transition to finished makes a repeat call a
    /// phase error, so a hand can never pay twice.
    pub fn determine_result(&mut self) -> GameResult<Outcome> {
        let mut dealer = match std::mem::replace(&mut self.phase, Phase::Waiting) {
            Phase::DealerTurn(dealer) => dealer,
            other => {
                self.phase = other;
                return Err(self.reject("settle"));
            }
        };
        dealer.hole_revealed = true;
        let dealer_total = blackjack_total(&self.dealer).total;
        let dealer_bust = dealer_total > 21;
        let bet = dealer.bet;
        let results: Vec<HandResult> = dealer
            .hands
            .iter()
            .enumerate()
            .map(|(i, hand)| {
                if dealer.busted[i] {
                    return HandResult {
                        outcome: HandOutcome::Bust,
                        wagered: bet,
                        payout: 0,
                    };
                }
                if dealer.player_blackjack {
                    // 2.5x total return, floored
                    return HandResult {
                        outcome: HandOutcome::Blackjack,
                        wagered: bet,
                        payout: bet * 5 / 2,
                    };
                }
                let total = blackjack_total(hand).total;
                if dealer_bust || total > dealer_total {
                    HandResult {
                        outcome: HandOutcome::Win,
                        wagered: bet,
                        payout: bet * 2,
                    }
                } else if total == dealer_total {
                    HandResult {
                        outcome: HandOutcome::Push,
                        wagered: bet,
                        payout: bet,
                    }
                } else {
                    HandResult {
                        outcome: HandOutcome::Lose,
                        wagered: bet,
                        payout: 0,
                    }
                }
            })
            .collect();
        // reaching here means the dealer had no natural, so insurance lost
        let total_payout: Chips = results.iter().map(|r| r.payout).sum();
        let outcome = Outcome {
            results,
            hands: dealer.hands,
            insurance_payout: 0,
            total_payout,
        };
        self.balance += total_payout;
        self.phase = Phase::Finished(outcome.clone());
        self.touch();
        Ok(outcome)
    }

    /// Reset a finished hand for the next one, refilling the shoe if it ran
    /// low.
    pub fn prepare_for_next_game(&mut self) -> GameResult<()> {
        match self.phase {
            Phase::Waiting | Phase::Finished(_) => {}
            _ => return Err(self.reject("reset")),
        }
        self.clear_round();
        self.phase = Phase::Waiting;
        self.touch();
        Ok(())
    }

    /// Void a stuck hand, returning every staked chip as a push. A last
    /// resort for hands that cannot settle normally; money-safe but never
    /// a payout.
    pub fn abort_hand(&mut self) -> Chips {
        let (refund, results, hands) = match std::mem::replace(&mut self.phase, Phase::Waiting) {
            Phase::Betting { bet } => (bet, Vec::new(), Vec::new()),
            Phase::Playing(play) => {
                let results = play
                    .hands
                    .iter()
                    .map(|_| HandResult {
                        outcome: HandOutcome::Push,
                        wagered: play.bet,
                        payout: play.bet,
                    })
                    .collect();
                (play.staked, results, play.hands)
            }
            Phase::DealerTurn(dealer) => {
                let results = dealer
                    .hands
                    .iter()
                    .map(|_| HandResult {
                        outcome: HandOutcome::Push,
                        wagered: dealer.bet,
                        payout: dealer.bet,
                    })
                    .collect();
                (dealer.staked, results, dealer.hands)
            }
            other => {
                self.phase = other;
                return 0;
            }
        };
        log::warn!(
            "force-finalizing hand for user {}, refunding {refund}",
            self.user
        );
        self.balance += refund;
        self.phase = Phase::Finished(Outcome {
            results,
            hands,
            insurance_payout: 0,
            total_payout: refund,
        });
        refund
    }

    fn clear_round(&mut self) {
        self.dealer.clear();
        if self.shoe.needs_refill() {
            self.shoe.refill();
        }
    }

    /// Advance past the active hand; moving past the last hand starts the
    /// dealer's turn.
    fn advance_or_dealer(&mut self, mut play: PlayState) {
        if play.active + 1 < play.hands.len() {
            play.active += 1;
            play.must_stand = false;
            self.phase = Phase::Playing(play);
        } else {
            self.phase = Phase::DealerTurn(DealerState {
                hands: play.hands,
                busted: play.busted,
                bet: play.bet,
                insurance: play.insurance,
                staked: play.staked,
                player_blackjack: false,
                hole_revealed: false,
                draw_done: false,
            });
        }
    }

    /// Owner-facing snapshot. The hole card stays hidden until the reveal
    /// step or the end of the hand.
    pub fn view(&self) -> SessionView {
        let mut view = SessionView {
            phase: self.phase_name().to_string(),
            player_hands: Vec::new(),
            active_hand: 0,
            dealer_hand: Vec::new(),
            bet: 0,
            insurance: 0,
            capabilities: Capabilities::default(),
            results: Vec::new(),
            total_payout: 0,
            balance: self.balance,
        };
        let hole_visible = match &self.phase {
            Phase::DealerTurn(dealer) => dealer.hole_revealed,
            Phase::Finished(_) => true,
            _ => false,
        };
        view.dealer_hand = self
            .dealer
            .iter()
            .enumerate()
            .map(|(i, card)| {
                if i == 0 && !hole_visible {
                    CardView::Hidden
                } else {
                    CardView::Shown { card: *card }
                }
            })
            .collect();
        match &self.phase {
            Phase::Waiting => {}
            Phase::Betting { bet } => view.bet = *bet,
            Phase::Playing(play) => {
                view.player_hands = play.hands.clone();
                view.active_hand = play.active;
                view.bet = play.bet;
                view.insurance = play.insurance;
                view.capabilities = play.caps;
            }
            Phase::DealerTurn(dealer) => {
                view.player_hands = dealer.hands.clone();
                view.bet = dealer.bet;
                view.insurance = dealer.insurance;
            }
            Phase::Finished(outcome) => {
                view.player_hands = outcome.hands.clone();
                view.results = outcome
                    .results
                    .iter()
                    .map(|r| r.outcome.as_str().to_string())
                    .collect();
                view.total_payout = outcome.total_payout;
            }
        }
        view
    }
}
