//! Integration tests for the blackjack driver: ledger mirroring, dealer
//! pacing, event delivery, and session reuse across reconnects.

use std::sync::Arc;
use std::time::Duration;

use live_casino::blackjack::{DealerTiming, SessionDriver, SessionRegistry};
use live_casino::cards::{Card, Shoe, Suit};
use live_casino::events::SessionEvent;
use live_casino::ledger::{GameKind, InMemoryLedger, Ledger};
use tokio::sync::mpsc;
use tokio::time::timeout;

const ALICE: i64 = 1;

/// Deal order is player, hole, player, upcard, then dealer draws. The shoe
/// pops from the back, so the order is reversed going in.
fn rigged_shoe(deal_order: &[u8]) -> Shoe {
    Shoe::from_cards(
        deal_order
            .iter()
            .rev()
            .map(|rank| Card::new(*rank, Suit::Spade))
            .collect(),
    )
}

fn setup_with_timing(
    deal_order: &'static [u8],
    timing: DealerTiming,
) -> (SessionDriver, Arc<InMemoryLedger>) {
    let ledger = Arc::new(InMemoryLedger::new().with_account(ALICE, 10_000));
    let registry = Arc::new(SessionRegistry::new(
        chrono::Duration::minutes(30),
        Box::new(move || rigged_shoe(deal_order)),
    ));
    let driver = SessionDriver::new(registry, ledger.clone(), timing);
    (driver, ledger)
}

fn setup(deal_order: &'static [u8]) -> (SessionDriver, Arc<InMemoryLedger>) {
    setup_with_timing(deal_order, DealerTiming::instant())
}

async fn drain(rx: &mut mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = timeout(Duration::from_millis(100), rx.recv()).await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn a_standing_loss_flows_through_the_ledger() {
    // player 10+9=19, dealer 5+6 draws a 10 for 21
    let (driver, ledger) = setup(&[10, 5, 9, 6, 10]);
    driver.attach(ALICE, "alice").await.unwrap();

    driver.place_bet(ALICE, 1_000).await.unwrap();
    assert_eq!(ledger.balance(ALICE).await.unwrap(), 9_000);

    driver.deal(ALICE).await.unwrap();
    let view = driver.stand(ALICE).await.unwrap();
    assert_eq!(view.phase, "finished");
    assert_eq!(view.results, vec!["lose".to_string()]);
    assert_eq!(ledger.balance(ALICE).await.unwrap(), 9_000);

    let history = ledger.history(ALICE);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].game, GameKind::Blackjack);
    assert_eq!(history[0].result, "lose");
    assert_eq!(history[0].amount, 1_000);
}

#[tokio::test]
async fn a_dealt_blackjack_pays_out_immediately() {
    // player A+K, dealer 5+6
    let (driver, ledger) = setup(&[1, 5, 13, 6]);
    driver.attach(ALICE, "alice").await.unwrap();
    driver.place_bet(ALICE, 1_000).await.unwrap();

    let view = driver.deal(ALICE).await.unwrap();
    assert_eq!(view.phase, "finished");
    assert_eq!(view.results, vec!["blackjack".to_string()]);
    assert_eq!(view.total_payout, 2_500);
    assert_eq!(ledger.balance(ALICE).await.unwrap(), 11_500);
}

#[tokio::test]
async fn rejected_bets_leave_the_ledger_alone() {
    let (driver, ledger) = setup(&[10, 5, 9, 6]);
    driver.attach(ALICE, "alice").await.unwrap();

    let err = driver.place_bet(ALICE, 15_000).await.unwrap_err();
    assert_eq!(err.kind(), "insufficient_funds");
    assert_eq!(ledger.balance(ALICE).await.unwrap(), 10_000);

    let view = driver.view(ALICE).await.unwrap();
    assert_eq!(view.phase, "waiting");
}

#[tokio::test]
async fn doubling_debits_a_second_stake() {
    // player 6+5=11, dealer 10+9 stands; double draws a 10 for 21
    let (driver, ledger) = setup(&[6, 10, 5, 9, 10]);
    driver.attach(ALICE, "alice").await.unwrap();
    driver.place_bet(ALICE, 1_000).await.unwrap();
    driver.deal(ALICE).await.unwrap();

    driver.double_down(ALICE).await.unwrap();
    assert_eq!(ledger.balance(ALICE).await.unwrap(), 8_000);

    let view = driver.hit(ALICE).await.unwrap();
    assert_eq!(view.phase, "finished");
    // doubled 2000 stake wins 4000
    assert_eq!(ledger.balance(ALICE).await.unwrap(), 12_000);
}

#[tokio::test]
async fn the_owner_sees_the_dealer_turn_unfold() {
    // player 10+10, dealer 2+4 draws 5 and K
    let (driver, ledger) = setup(&[10, 2, 10, 4, 5, 13]);
    driver.attach(ALICE, "alice").await.unwrap();
    let (tx, mut rx) = mpsc::channel(64);
    driver.subscribe(ALICE, tx).await;

    driver.place_bet(ALICE, 1_000).await.unwrap();
    driver.deal(ALICE).await.unwrap();
    driver.stand(ALICE).await.unwrap();

    let events = drain(&mut rx).await;
    let reveal = events
        .iter()
        .find_map(|e| match e {
            SessionEvent::DealerReveal { card } => Some(*card),
            _ => None,
        })
        .expect("hole card was never revealed");
    assert_eq!(reveal.rank, 2);
    let draws: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::DealerDraw { card, .. } => Some(card.rank),
            _ => None,
        })
        .collect();
    assert_eq!(draws, vec![5, 13]);
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::BalanceChanged { reason, .. } if reason == "settlement"
    )));
    // dealer 21 beats the player's 20
    assert_eq!(ledger.balance(ALICE).await.unwrap(), 9_000);
}

#[tokio::test]
async fn reconnecting_resumes_the_same_hand() {
    let (driver, _ledger) = setup(&[10, 5, 9, 6, 10]);
    driver.attach(ALICE, "alice").await.unwrap();
    driver.place_bet(ALICE, 1_000).await.unwrap();
    driver.deal(ALICE).await.unwrap();

    // a fresh attach lands back in the same hand mid-play
    let view = driver.attach(ALICE, "alice").await.unwrap();
    assert_eq!(view.phase, "playing");
    assert_eq!(view.bet, 1_000);
    assert_eq!(driver.registry().len().await, 1);
}

#[tokio::test]
async fn surrender_refunds_half_through_the_ledger() {
    let (driver, ledger) = setup(&[10, 9, 6, 10]);
    driver.attach(ALICE, "alice").await.unwrap();
    driver.place_bet(ALICE, 1_000).await.unwrap();
    driver.deal(ALICE).await.unwrap();

    let view = driver.surrender(ALICE).await.unwrap();
    assert_eq!(view.phase, "finished");
    assert_eq!(ledger.balance(ALICE).await.unwrap(), 9_500);
    let history = ledger.history(ALICE);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].result, "surrender");
}

#[tokio::test]
async fn splitting_settles_each_hand_separately() {
    // player 8+8, dealer 10+7; splits draw 3 and 2
    let (driver, ledger) = setup(&[8, 10, 8, 7, 3, 2]);
    driver.attach(ALICE, "alice").await.unwrap();
    driver.place_bet(ALICE, 1_000).await.unwrap();
    driver.deal(ALICE).await.unwrap();

    driver.split(ALICE).await.unwrap();
    assert_eq!(ledger.balance(ALICE).await.unwrap(), 8_000);

    driver.stand(ALICE).await.unwrap();
    let view = driver.stand(ALICE).await.unwrap();
    assert_eq!(view.phase, "finished");
    assert_eq!(view.results.len(), 2);
    assert_eq!(ledger.history(ALICE).len(), 2);
}

#[tokio::test]
async fn an_expired_dealer_turn_settles_on_the_cards() {
    // player 10+10=20, dealer 10+7 stands on 17; a spent budget must not
    // turn the win into a voided push
    let timing = DealerTiming {
        budget: Duration::ZERO,
        ..DealerTiming::instant()
    };
    let (driver, ledger) = setup_with_timing(&[10, 10, 10, 7], timing);
    driver.attach(ALICE, "alice").await.unwrap();
    driver.place_bet(ALICE, 1_000).await.unwrap();
    driver.deal(ALICE).await.unwrap();

    let view = driver.stand(ALICE).await.unwrap();
    assert_eq!(view.phase, "finished");
    assert_eq!(view.results, vec!["win".to_string()]);
    assert_eq!(ledger.balance(ALICE).await.unwrap(), 11_000);

    let history = ledger.history(ALICE);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].result, "win");
}

#[tokio::test]
async fn unknown_users_are_reported_not_created() {
    let (driver, _ledger) = setup(&[]);
    let err = driver.place_bet(99, 100).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}
