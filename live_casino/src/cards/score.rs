//! Per-game hand scoring.
//!
//! Baccarat accumulates modulo ten after every card; blackjack counts aces
//! as eleven and demotes them one at a time while the hand is bust.

use super::Card;

/// Baccarat value of a single card: ace is 1, tens and faces are 0.
pub fn baccarat_value(card: Card) -> u8 {
    match card.rank {
        1..=9 => card.rank,
        _ => 0,
    }
}

/// Baccarat hand total, accumulated mod 10 card by card.
pub fn baccarat_total(cards: &[Card]) -> u8 {
    cards
        .iter()
        .fold(0, |total, card| (total + baccarat_value(*card)) % 10)
}

/// A natural is an initial two-card hand totaling 8 or 9.
pub fn is_natural(cards: &[Card]) -> bool {
    cards.len() == 2 && baccarat_total(cards) >= 8
}

/// Pair check on the first two cards of a hand: equal rank ignoring suit.
/// Later draws never create a pair.
pub fn is_pair(cards: &[Card]) -> bool {
    cards.len() >= 2 && cards[0].rank == cards[1].rank
}

/// Blackjack value of a single card before ace adjustment: faces are 10,
/// the ace contributes through [`blackjack_total`].
pub fn blackjack_value(card: Card) -> u8 {
    card.rank.min(10)
}

/// A blackjack hand total after ace demotion.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlackjackTotal {
    pub total: u8,
    /// True while at least one ace still counts as eleven.
    pub soft: bool,
}

/// Score a blackjack hand. Every ace starts at eleven and is demoted to one
/// (subtracting ten) while the total exceeds 21 and an undemoted ace
/// remains.
pub fn blackjack_total(cards: &[Card]) -> BlackjackTotal {
    let mut total: u16 = 0;
    let mut elevens = 0u8;
    for card in cards {
        if card.rank == 1 {
            total += 11;
            elevens += 1;
        } else {
            total += u16::from(blackjack_value(*card));
        }
    }
    while total > 21 && elevens > 0 {
        total -= 10;
        elevens -= 1;
    }
    BlackjackTotal {
        total: total.min(u16::from(u8::MAX)) as u8,
        soft: elevens > 0,
    }
}

/// A blackjack is 21 with exactly two cards.
pub fn is_blackjack(cards: &[Card]) -> bool {
    cards.len() == 2 && blackjack_total(cards).total == 21
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::Suit;

    fn card(rank: u8) -> Card {
        Card::new(rank, Suit::Spade)
    }

    #[test]
    fn baccarat_faces_score_zero() {
        assert_eq!(baccarat_value(card(10)), 0);
        assert_eq!(baccarat_value(card(13)), 0);
        assert_eq!(baccarat_value(card(1)), 1);
        assert_eq!(baccarat_value(card(9)), 9);
    }

    #[test]
    fn baccarat_total_wraps_mod_ten() {
        assert_eq!(baccarat_total(&[card(9), card(7)]), 6);
        assert_eq!(baccarat_total(&[card(9), card(10)]), 9);
        assert_eq!(baccarat_total(&[card(2), card(3), card(4)]), 9);
    }

    #[test]
    fn naturals_require_two_cards() {
        assert!(is_natural(&[card(9), card(12)]));
        assert!(is_natural(&[card(4), card(4)]));
        assert!(!is_natural(&[card(3), card(3)]));
        assert!(!is_natural(&[card(2), card(3), card(4)]));
    }

    #[test]
    fn pair_only_checks_first_two() {
        assert!(is_pair(&[card(8), Card::new(8, Suit::Heart)]));
        assert!(!is_pair(&[card(8), card(9), Card::new(9, Suit::Heart)]));
        assert!(!is_pair(&[card(8)]));
    }

    #[test]
    fn blackjack_aces_demote() {
        // A + A + 9: 11 + 11 + 9 = 31 -> 21 after one demotion
        let total = blackjack_total(&[card(1), Card::new(1, Suit::Heart), card(9)]);
        assert_eq!(total.total, 21);
        assert!(total.soft);

        // A + 9 + 5: soft 20 busts, demotes to hard 15
        let total = blackjack_total(&[card(1), card(9), card(5)]);
        assert_eq!(total.total, 15);
        assert!(!total.soft);
    }

    #[test]
    fn blackjack_is_two_card_21_only() {
        assert!(is_blackjack(&[card(1), card(13)]));
        assert!(!is_blackjack(&[card(7), card(7), card(7)]));
        assert!(!is_blackjack(&[card(10), card(10)]));
    }
}
