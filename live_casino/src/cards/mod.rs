//! Card model and the multi-deck shoe.

use rand::{seq::SliceRandom, thread_rng};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod score;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Suit {
    Club,
    Spade,
    Diamond,
    Heart,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Club, Suit::Spade, Suit::Diamond, Suit::Heart];
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Club => "♣",
            Self::Spade => "♠",
            Self::Diamond => "♦",
            Self::Heart => "♥",
        };
        write!(f, "{repr}")
    }
}

/// A playing card. Rank runs 1 (ace) through 13 (king). Immutable once
/// drawn.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Card {
    pub rank: u8,
    pub suit: Suit,
}

impl Card {
    pub const fn new(rank: u8, suit: Suit) -> Self {
        Self { rank, suit }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let rank = match self.rank {
            1 => "A".to_string(),
            11 => "J".to_string(),
            12 => "Q".to_string(),
            13 => "K".to_string(),
            r => r.to_string(),
        };
        write!(f, "{rank}{}", self.suit)
    }
}

/// Remaining-card summary for a shoe.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct ShoeStatus {
    pub remaining: usize,
    /// Remaining deck equivalents (`remaining / 52`), one decimal place.
    pub decks: f64,
}

/// A multi-deck shoe consumed from one end.
///
/// Draws pop from the back of the card vector, so length strictly decreases
/// on every draw. Regeneration policy is the caller's: [`Shoe::draw`]
/// regenerates proactively near the threshold (baccarat), while
/// [`Shoe::try_draw`] never regenerates and only [`Shoe::refill`] between
/// hands brings cards back (blackjack).
#[derive(Clone, Debug)]
pub struct Shoe {
    cards: Vec<Card>,
    deck_count: usize,
    reshuffle_threshold: usize,
}

impl Shoe {
    /// Build `deck_count` full 52-card sets. Order is not meaningful until
    /// [`Shoe::shuffle`] is called.
    pub fn new(deck_count: usize, reshuffle_threshold: usize) -> Self {
        Self {
            cards: Self::fresh_cards(deck_count),
            deck_count,
            reshuffle_threshold,
        }
    }

    /// A freshly built and shuffled shoe.
    pub fn shuffled(deck_count: usize, reshuffle_threshold: usize) -> Self {
        let mut shoe = Self::new(deck_count, reshuffle_threshold);
        shoe.shuffle();
        shoe
    }

    /// A shoe with an explicit card order. Cards are drawn from the back of
    /// the slice, so the last card is the first one dealt.
    pub fn from_cards(cards: Vec<Card>) -> Self {
        Self {
            cards,
            deck_count: 1,
            reshuffle_threshold: 0,
        }
    }

    fn fresh_cards(deck_count: usize) -> Vec<Card> {
        let mut cards = Vec::with_capacity(52 * deck_count);
        for _ in 0..deck_count {
            for suit in Suit::ALL {
                for rank in 1..=13 {
                    cards.push(Card::new(rank, suit));
                }
            }
        }
        cards
    }

    /// In-place uniform random permutation.
    pub fn shuffle(&mut self) {
        self.cards.shuffle(&mut thread_rng());
    }

    /// Regenerate the full shoe and shuffle. Only call between hands.
    pub fn refill(&mut self) {
        self.cards = Self::fresh_cards(self.deck_count);
        self.shuffle();
    }

    /// Draw one card, regenerating the shoe first when it has fallen below
    /// the reshuffle threshold.
    pub fn draw(&mut self) -> Card {
        if self.cards.len() < self.reshuffle_threshold || self.cards.is_empty() {
            self.refill();
        }
        // refill always leaves at least one full deck
        self.cards.pop().expect("shoe is non-empty after refill")
    }

    /// Draw one card without any regeneration. `None` means the shoe is
    /// exhausted and the current hand is lost to `ResourceExhausted`.
    pub fn try_draw(&mut self) -> Option<Card> {
        self.cards.pop()
    }

    pub fn remaining(&self) -> usize {
        self.cards.len()
    }

    pub fn needs_refill(&self) -> bool {
        self.cards.len() < self.reshuffle_threshold
    }

    pub fn status(&self) -> ShoeStatus {
        let remaining = self.cards.len();
        ShoeStatus {
            remaining,
            decks: (remaining as f64 / 52.0 * 10.0).round() / 10.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn fresh_shoe_has_full_composition() {
        let shoe = Shoe::new(8, 52);
        assert_eq!(shoe.remaining(), 8 * 52);
    }

    #[test]
    fn shuffle_preserves_multiset() {
        let mut shoe = Shoe::new(2, 0);
        let count = |cards: &[Card]| {
            let mut counts: HashMap<Card, usize> = HashMap::new();
            for card in cards {
                *counts.entry(*card).or_default() += 1;
            }
            counts
        };
        let before = count(&shoe.cards);
        shoe.shuffle();
        let after = count(&shoe.cards);
        assert_eq!(before, after);
        assert_eq!(shoe.remaining(), 104);
    }

    #[test]
    fn draw_regenerates_below_threshold() {
        let mut shoe = Shoe::shuffled(1, 10);
        for _ in 0..43 {
            shoe.draw();
        }
        assert_eq!(shoe.remaining(), 9);
        // next draw crosses the threshold and refills first
        shoe.draw();
        assert_eq!(shoe.remaining(), 51);
    }

    #[test]
    fn try_draw_never_regenerates() {
        let mut shoe = Shoe::from_cards(vec![Card::new(5, Suit::Heart)]);
        assert_eq!(shoe.try_draw(), Some(Card::new(5, Suit::Heart)));
        assert_eq!(shoe.try_draw(), None);
    }

    #[test]
    fn status_reports_deck_equivalents() {
        let mut shoe = Shoe::shuffled(8, 52);
        for _ in 0..26 {
            shoe.draw();
        }
        let status = shoe.status();
        assert_eq!(status.remaining, 390);
        assert_eq!(status.decks, 7.5);
    }
}
