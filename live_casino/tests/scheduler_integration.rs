//! Integration tests for the baccarat table actor: window lifecycle,
//! bet debits and refunds, bounded runs, and rigged outcomes.

use std::sync::Arc;
use std::time::Duration;

use live_casino::auth::Role;
use live_casino::baccarat::table::{FixedOutcome, RoundOutcome};
use live_casino::baccarat::{spawn_table, BaccaratTable, BetChoice, TableHandle, TableTiming};
use live_casino::events::TableEvent;
use live_casino::ledger::{InMemoryLedger, Ledger};
use tokio::sync::mpsc;
use tokio::time::timeout;

const ALICE: i64 = 1;
const BOB: i64 = 2;

fn test_timing() -> TableTiming {
    TableTiming {
        betting: Duration::from_millis(200),
        ..TableTiming::instant()
    }
}

async fn setup(timing: TableTiming) -> (TableHandle, Arc<InMemoryLedger>, mpsc::Receiver<TableEvent>) {
    let ledger = Arc::new(
        InMemoryLedger::new()
            .with_account(ALICE, 10_000)
            .with_account(BOB, 10_000),
    );
    let handle = spawn_table(BaccaratTable::default(), ledger.clone(), timing);
    let (tx, rx) = mpsc::channel(64);
    handle.subscribe(ALICE, tx).await.unwrap();
    (handle, ledger, rx)
}

async fn next_event(rx: &mut mpsc::Receiver<TableEvent>) -> TableEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a table event")
        .expect("event channel closed")
}

/// Wait for the next event of one shape, skipping the rest.
async fn wait_for<F, T>(rx: &mut mpsc::Receiver<TableEvent>, mut pick: F) -> T
where
    F: FnMut(TableEvent) -> Option<T>,
{
    loop {
        if let Some(found) = pick(next_event(rx).await) {
            return found;
        }
    }
}

#[tokio::test]
async fn first_player_brings_the_table_live() {
    let (handle, _ledger, mut rx) = setup(test_timing()).await;
    handle.connect(ALICE, Role::Player).await.unwrap();
    let closes_at = wait_for(&mut rx, |event| match event {
        TableEvent::WindowOpened { closes_at } => Some(closes_at),
        _ => None,
    })
    .await;
    assert!(closes_at > chrono::Utc::now() - chrono::Duration::seconds(1));

    let status = handle.status().await.unwrap();
    assert!(status.live);
    assert_eq!(status.driver.as_deref(), Some("presence"));
    assert!(status.window_open);
    handle.stop().await.unwrap();
}

#[tokio::test]
async fn bets_debit_up_front_and_settle_through_the_ledger() {
    let (handle, ledger, mut rx) = setup(test_timing()).await;
    handle.connect(ALICE, Role::Player).await.unwrap();

    let reply = handle.place_bet(ALICE, BetChoice::Player, 500).await.unwrap();
    assert!(reply.is_accepted());
    assert_eq!(ledger.balance(ALICE).await.unwrap(), 9_500);

    let notices = wait_for(&mut rx, |event| match event {
        TableEvent::RoundSettled { notices } => Some(notices),
        _ => None,
    })
    .await;
    let payout: i64 = notices
        .iter()
        .filter(|n| n.bettor == ALICE)
        .map(|n| n.payout)
        .sum();
    assert_eq!(ledger.balance(ALICE).await.unwrap(), 9_500 + payout);
    // the stake itself went into the round, win or lose
    assert_eq!(ledger.history(ALICE).len(), 1);
    handle.stop().await.unwrap();
}

#[tokio::test]
async fn oversized_bets_are_rejected_whole() {
    let (handle, ledger, _rx) = setup(test_timing()).await;
    handle.connect(ALICE, Role::Player).await.unwrap();

    let reply = handle
        .place_bet(ALICE, BetChoice::Banker, 50_000)
        .await
        .unwrap();
    assert!(!reply.is_accepted());
    assert_eq!(reply.error().unwrap().kind(), "insufficient_funds");
    assert_eq!(ledger.balance(ALICE).await.unwrap(), 10_000);
    handle.stop().await.unwrap();
}

#[tokio::test]
async fn cancel_refunds_every_bet_from_that_user() {
    let (handle, ledger, _rx) = setup(TableTiming {
        betting: Duration::from_millis(500),
        ..TableTiming::instant()
    })
    .await;
    handle.connect(ALICE, Role::Player).await.unwrap();
    handle.connect(BOB, Role::Player).await.unwrap();

    handle.place_bet(ALICE, BetChoice::Player, 300).await.unwrap();
    handle.place_bet(ALICE, BetChoice::Tie, 200).await.unwrap();
    handle.place_bet(BOB, BetChoice::Banker, 400).await.unwrap();
    assert_eq!(ledger.balance(ALICE).await.unwrap(), 9_500);

    let stats = handle.window_stats().await.unwrap();
    assert_eq!(stats[&BetChoice::Player].total, 300);
    assert_eq!(stats[&BetChoice::Player].distinct_bettors, 1);

    let reply = handle.cancel_bets(ALICE).await.unwrap();
    assert!(reply.is_accepted());
    assert_eq!(ledger.balance(ALICE).await.unwrap(), 10_000);
    // the other bettor is untouched
    assert_eq!(ledger.balance(BOB).await.unwrap(), 9_600);
    handle.stop().await.unwrap();
}

#[tokio::test]
async fn bounded_runs_stop_themselves() {
    let (handle, _ledger, mut rx) = setup(TableTiming::instant()).await;
    handle.start_bounded(2).await.unwrap();

    let mut settled = 0;
    while settled < 2 {
        if let TableEvent::RoundSettled { .. } = next_event(&mut rx).await {
            settled += 1;
        }
    }
    let live = wait_for(&mut rx, |event| match event {
        TableEvent::SchedulerStatus { live, .. } => Some(live),
        _ => None,
    })
    .await;
    assert!(!live);

    let status = handle.status().await.unwrap();
    assert!(!status.live);
    assert_eq!(status.rounds_completed, 2);
}

#[tokio::test]
async fn zero_round_runs_are_rejected() {
    let (handle, _ledger, _rx) = setup(TableTiming::instant()).await;
    let reply = handle.start_bounded(0).await.unwrap();
    assert!(!reply.is_accepted());
}

#[tokio::test]
async fn armed_outcomes_land_exactly_once() {
    let (handle, _ledger, mut rx) = setup(TableTiming::instant()).await;
    handle
        .arm_fixed_outcome(FixedOutcome {
            outcome: RoundOutcome::Tie,
            pattern: 0,
        })
        .await
        .unwrap();
    handle.start_bounded(2).await.unwrap();

    let mut outcomes = Vec::new();
    while outcomes.len() < 2 {
        if let TableEvent::RoundResolved { outcome, .. } = next_event(&mut rx).await {
            outcomes.push(outcome);
        }
    }
    // the first round is rigged, the second is dealt from the shoe
    assert_eq!(outcomes[0], RoundOutcome::Tie);
    let status = handle.status().await.unwrap();
    assert!(status.forced_outcome.is_none());
}

#[tokio::test]
async fn stopping_mid_round_still_settles() {
    let (handle, ledger, mut rx) = setup(test_timing()).await;
    handle.connect(ALICE, Role::Player).await.unwrap();
    handle.place_bet(ALICE, BetChoice::Player, 100).await.unwrap();
    handle.stop().await.unwrap();

    // the in-flight cycle resolves the already-staked bet
    wait_for(&mut rx, |event| match event {
        TableEvent::RoundSettled { .. } => Some(()),
        _ => None,
    })
    .await;
    let status = handle.status().await.unwrap();
    assert!(!status.live);
    assert!(!status.window_open);
    let balance = ledger.balance(ALICE).await.unwrap();
    // lost the stake or got a payout, never left in limbo
    assert!(balance == 9_900 || balance >= 10_000);
}

#[tokio::test]
async fn bets_outside_the_window_are_rejected() {
    let (handle, ledger, _rx) = setup(TableTiming::instant()).await;
    // nobody connected, no driver, window never opened
    let reply = handle.place_bet(ALICE, BetChoice::Player, 100).await.unwrap();
    assert_eq!(reply.error().unwrap().kind(), "not_ready");
    assert_eq!(ledger.balance(ALICE).await.unwrap(), 10_000);
}
