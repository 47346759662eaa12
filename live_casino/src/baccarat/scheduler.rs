//! Table actor: the betting window timer and the repeating round cycle.
//!
//! One actor owns the shared table, the single betting window, and the
//! subscriber list. All timer work is expressed as a pending step with a
//! deadline so the actor keeps serving messages while a delay is pending;
//! no game-state mutation ever suspends mid-way.

use enum_dispatch::enum_dispatch;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant};

use super::bets::{Bet, BetChoice, BettingWindow, ChoiceStats};
use super::messages::{SchedulerStatus, TableCommand, TableReply};
use super::settlement::{settle, SettlementEngine};
use super::table::{BaccaratTable, FixedOutcome, RoundRecord};
use crate::auth::Role;
use crate::cards::ShoeStatus;
use crate::constants::BETTING_WINDOW_SECS;
use crate::errors::{GameError, GameResult};
use crate::events::TableEvent;
use crate::ledger::{Ledger, LedgerError};
use crate::{Chips, UserId};

/// Pacing for the round cycle. Cosmetic: correctness never depends on any
/// of these being non-zero.
#[derive(Clone, Copy, Debug)]
pub struct TableTiming {
    /// How long the betting window stays open.
    pub betting: Duration,
    /// Pause between window close and the deal.
    pub pre_deal: Duration,
    /// Pause after the deal for reveal/animation pacing.
    pub reveal: Duration,
    /// Pause after settlement before the next window opens.
    pub post_settle: Duration,
}

impl Default for TableTiming {
    fn default() -> Self {
        Self {
            betting: Duration::from_secs(BETTING_WINDOW_SECS),
            pre_deal: Duration::from_secs(1),
            reveal: Duration::from_secs(3),
            post_settle: Duration::from_secs(2),
        }
    }
}

impl TableTiming {
    /// Zero pacing everywhere. Tests run whole cycles instantly.
    pub fn instant() -> Self {
        Self {
            betting: Duration::ZERO,
            pre_deal: Duration::ZERO,
            reveal: Duration::ZERO,
            post_settle: Duration::ZERO,
        }
    }
}

/// Behavior shared by all scheduler run modes.
#[enum_dispatch]
pub trait RoundDriver {
    fn label(&self) -> &'static str;
    fn rounds_remaining(&self) -> Option<u32>;
    fn note_round_complete(&mut self);
    /// True once the driver has run its course and should stop itself.
    fn exhausted(&self) -> bool;
}

/// Started by the first non-privileged user; runs until explicitly stopped.
#[derive(Debug)]
pub struct PresenceDriver;

impl RoundDriver for PresenceDriver {
    fn label(&self) -> &'static str {
        "presence"
    }
    fn rounds_remaining(&self) -> Option<u32> {
        None
    }
    fn note_round_complete(&mut self) {}
    fn exhausted(&self) -> bool {
        false
    }
}

/// Admin-forced; runs until explicitly stopped.
#[derive(Debug)]
pub struct ForcedDriver;

impl RoundDriver for ForcedDriver {
    fn label(&self) -> &'static str {
        "forced"
    }
    fn rounds_remaining(&self) -> Option<u32> {
        None
    }
    fn note_round_complete(&mut self) {}
    fn exhausted(&self) -> bool {
        false
    }
}

/// Background run that terminates itself after a fixed round count.
#[derive(Debug)]
pub struct BoundedRun {
    remaining: u32,
}

impl BoundedRun {
    pub fn new(rounds: u32) -> Self {
        Self { remaining: rounds }
    }
}

impl RoundDriver for BoundedRun {
    fn label(&self) -> &'static str {
        "bounded"
    }
    fn rounds_remaining(&self) -> Option<u32> {
        Some(self.remaining)
    }
    fn note_round_complete(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }
    fn exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// The active run mode. Only one may drive the table at a time; starting
/// one implicitly replaces any other.
#[enum_dispatch(RoundDriver)]
#[derive(Debug)]
pub enum Driver {
    Presence(PresenceDriver),
    Forced(ForcedDriver),
    Bounded(BoundedRun),
}

#[derive(Clone, Copy, Debug)]
enum CycleStep {
    CloseWindow,
    Deal,
    Settle,
    Reopen,
}

struct PendingStep {
    at: Instant,
    step: CycleStep,
}

/// Handle for sending commands to a running table actor.
#[derive(Clone)]
pub struct TableHandle {
    sender: mpsc::Sender<TableCommand>,
}

impl TableHandle {
    async fn send(&self, command: TableCommand) -> GameResult<()> {
        self.sender
            .send(command)
            .await
            .map_err(|_| GameError::NotReady("table is closed".to_string()))
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> TableCommand,
    ) -> GameResult<T> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await
            .map_err(|_| GameError::NotReady("table is closed".to_string()))
    }

    pub async fn connect(&self, user: UserId, role: Role) -> GameResult<()> {
        self.send(TableCommand::Connect { user, role }).await
    }

    pub async fn disconnect(&self, user: UserId) -> GameResult<()> {
        self.send(TableCommand::Disconnect { user }).await
    }

    pub async fn place_bet(
        &self,
        user: UserId,
        choice: BetChoice,
        amount: Chips,
    ) -> GameResult<TableReply> {
        self.request(|response| TableCommand::PlaceBet {
            user,
            choice,
            amount,
            response,
        })
        .await
    }

    pub async fn cancel_bets(&self, user: UserId) -> GameResult<TableReply> {
        self.request(|response| TableCommand::CancelBets { user, response })
            .await
    }

    pub async fn window_stats(&self) -> GameResult<HashMap<BetChoice, ChoiceStats>> {
        self.request(|response| TableCommand::WindowStats { response })
            .await
    }

    pub async fn deck_status(&self) -> GameResult<ShoeStatus> {
        self.request(|response| TableCommand::DeckStatus { response })
            .await
    }

    pub async fn start_forced(&self) -> GameResult<TableReply> {
        self.request(|response| TableCommand::StartForced { response })
            .await
    }

    pub async fn start_bounded(&self, rounds: u32) -> GameResult<TableReply> {
        self.request(|response| TableCommand::StartBounded { rounds, response })
            .await
    }

    pub async fn stop(&self) -> GameResult<TableReply> {
        self.request(|response| TableCommand::Stop { response }).await
    }

    pub async fn arm_fixed_outcome(&self, fixed: FixedOutcome) -> GameResult<TableReply> {
        self.request(|response| TableCommand::ArmFixedOutcome { fixed, response })
            .await
    }

    pub async fn status(&self) -> GameResult<SchedulerStatus> {
        self.request(|response| TableCommand::Status { response })
            .await
    }

    pub async fn subscribe(&self, user: UserId, sender: mpsc::Sender<TableEvent>) -> GameResult<()> {
        self.send(TableCommand::Subscribe { user, sender }).await
    }

    pub async fn unsubscribe(&self, user: UserId) -> GameResult<()> {
        self.send(TableCommand::Unsubscribe { user }).await
    }
}

/// Spawn a table actor and return its handle.
pub fn spawn_table(
    table: BaccaratTable,
    ledger: Arc<dyn Ledger>,
    timing: TableTiming,
) -> TableHandle {
    let (sender, inbox) = mpsc::channel(100);
    let actor = TableActor {
        table,
        window: BettingWindow::closed(),
        engine: SettlementEngine::new(ledger.clone()),
        ledger,
        timing,
        inbox,
        subscribers: HashMap::new(),
        connected: HashMap::new(),
        driver: None,
        forced: None,
        pending: None,
        staged_bets: Vec::new(),
        staged_record: None,
        rounds_completed: 0,
    };
    tokio::spawn(actor.run());
    TableHandle { sender }
}

struct TableActor {
    table: BaccaratTable,
    window: BettingWindow,
    engine: SettlementEngine,
    ledger: Arc<dyn Ledger>,
    timing: TableTiming,
    inbox: mpsc::Receiver<TableCommand>,
    subscribers: HashMap<UserId, mpsc::Sender<TableEvent>>,
    connected: HashMap<UserId, Role>,
    driver: Option<Driver>,
    /// One-shot rigged outcome consumed by the next deal.
    forced: Option<FixedOutcome>,
    pending: Option<PendingStep>,
    staged_bets: Vec<Bet>,
    staged_record: Option<RoundRecord>,
    rounds_completed: u64,
}

async fn sleep_until_or_forever(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl TableActor {
    async fn run(mut self) {
        log::info!("baccarat table actor starting");
        loop {
            let deadline = self.pending.as_ref().map(|p| p.at);
            tokio::select! {
                maybe = self.inbox.recv() => match maybe {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                () = sleep_until_or_forever(deadline) => {
                    self.advance_cycle().await;
                }
            }
        }
        log::info!("baccarat table actor closed");
    }

    fn broadcast(&mut self, event: TableEvent) {
        self.subscribers.retain(|user, sender| {
            match sender.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!("subscriber {user} channel full, dropping event");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    log::debug!("subscriber {user} disconnected, removing");
                    false
                }
            }
        });
    }

    fn schedule(&mut self, delay: Duration, step: CycleStep) {
        self.pending = Some(PendingStep {
            at: Instant::now() + delay,
            step,
        });
    }

    fn open_window(&mut self) {
        let closes_at = chrono::Utc::now()
            + chrono::Duration::from_std(self.timing.betting)
                .unwrap_or_else(|_| chrono::Duration::zero());
        self.window.open_until(closes_at);
        self.broadcast(TableEvent::WindowOpened { closes_at });
        self.schedule(self.timing.betting, CycleStep::CloseWindow);
    }

    fn start_driver(&mut self, driver: Driver) {
        log::info!("starting {} run, replacing any active driver", driver.label());
        self.driver = Some(driver);
        if self.pending.is_none() {
            self.open_window();
        }
        self.broadcast_status();
    }

    fn broadcast_status(&mut self) {
        let status = self.status();
        self.broadcast(TableEvent::SchedulerStatus {
            live: status.live,
            driver: status.driver,
            rounds_completed: status.rounds_completed,
            rounds_remaining: status.rounds_remaining,
        });
    }

    fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            live: self.driver.is_some(),
            driver: self.driver.as_ref().map(|d| d.label().to_string()),
            rounds_completed: self.rounds_completed,
            rounds_remaining: self.driver.as_ref().and_then(RoundDriver::rounds_remaining),
            window_open: self.window.is_open(),
            connected_users: self.connected.len(),
            forced_outcome: self.forced.map(|f| f.outcome),
        }
    }

    async fn advance_cycle(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        match pending.step {
            CycleStep::CloseWindow => {
                self.staged_bets = self.window.close();
                self.broadcast(TableEvent::WindowClosed);
                self.schedule(self.timing.pre_deal, CycleStep::Deal);
            }
            CycleStep::Deal => {
                let record = match self.forced.take() {
                    Some(fixed) => self.table.play_fixed_round(fixed),
                    None => self.table.play_round(),
                };
                self.broadcast(TableEvent::RoundResolved {
                    outcome: record.outcome,
                    player_score: record.player_score,
                    banker_score: record.banker_score,
                    player_pair: record.player_pair,
                    banker_pair: record.banker_pair,
                    player_hand: record.player_hand.clone(),
                    banker_hand: record.banker_hand.clone(),
                });
                self.staged_record = Some(record);
                self.schedule(self.timing.reveal, CycleStep::Settle);
            }
            CycleStep::Settle => {
                let bets = std::mem::take(&mut self.staged_bets);
                if let Some(record) = self.staged_record.take() {
                    let settlements = settle(&record, &bets);
                    let notices = self.engine.apply(&record, &settlements).await;
                    self.broadcast(TableEvent::RoundSettled { notices });
                }
                self.rounds_completed += 1;
                if let Some(driver) = self.driver.as_mut() {
                    driver.note_round_complete();
                    if driver.exhausted() {
                        log::info!("{} run finished", driver.label());
                        self.driver = None;
                    }
                }
                match self.driver {
                    Some(_) => self.schedule(self.timing.post_settle, CycleStep::Reopen),
                    None => self.broadcast_status(),
                }
            }
            CycleStep::Reopen => {
                if self.driver.is_some() {
                    self.open_window();
                }
            }
        }
    }

    async fn handle(&mut self, command: TableCommand) {
        match command {
            TableCommand::Connect { user, role } => {
                self.connected.insert(user, role);
                if self.driver.is_none() && role == Role::Player {
                    self.start_driver(Driver::Presence(PresenceDriver));
                }
            }
            TableCommand::Disconnect { user } => {
                // an explicit stop is required to halt the run; remaining
                // bets must still settle
                self.connected.remove(&user);
            }
            TableCommand::PlaceBet {
                user,
                choice,
                amount,
                response,
            } => {
                let reply = self.handle_place_bet(user, choice, amount).await;
                let _ = response.send(reply);
            }
            TableCommand::CancelBets { user, response } => {
                let reply = self.handle_cancel_bets(user).await;
                let _ = response.send(reply);
            }
            TableCommand::WindowStats { response } => {
                let _ = response.send(self.window.stats());
            }
            TableCommand::DeckStatus { response } => {
                let _ = response.send(self.table.deck_status());
            }
            TableCommand::StartForced { response } => {
                self.start_driver(Driver::Forced(ForcedDriver));
                let _ = response.send(TableReply::accepted());
            }
            TableCommand::StartBounded { rounds, response } => {
                if rounds == 0 {
                    let _ = response.send(TableReply::Rejected {
                        error: GameError::InvalidAmount(0),
                    });
                } else {
                    self.start_driver(Driver::Bounded(BoundedRun::new(rounds)));
                    let _ = response.send(TableReply::accepted());
                }
            }
            TableCommand::Stop { response } => {
                self.driver = None;
                self.broadcast_status();
                let _ = response.send(TableReply::accepted());
            }
            TableCommand::ArmFixedOutcome { fixed, response } => {
                self.forced = Some(fixed);
                self.broadcast(TableEvent::ForcedOutcomeArmed {
                    outcome: fixed.outcome,
                    pattern: fixed.pattern,
                });
                let _ = response.send(TableReply::accepted());
            }
            TableCommand::Status { response } => {
                let _ = response.send(self.status());
            }
            TableCommand::Subscribe { user, sender } => {
                self.subscribers.insert(user, sender);
            }
            TableCommand::Unsubscribe { user } => {
                self.subscribers.remove(&user);
            }
        }
    }

    async fn handle_place_bet(
        &mut self,
        user: UserId,
        choice: BetChoice,
        amount: Chips,
    ) -> TableReply {
        if !self.window.is_open() {
            return TableReply::Rejected {
                error: GameError::NotReady("betting window is closed".to_string()),
            };
        }
        if amount <= 0 {
            return TableReply::Rejected {
                error: GameError::InvalidAmount(amount),
            };
        }
        // stake is collected up front; a failed debit rejects the bet
        let new_balance = match self.ledger.atomic_adjust(user, -amount).await {
            Ok(balance) => balance,
            Err(e) => {
                return TableReply::Rejected {
                    error: ledger_to_game_error(user, amount, e),
                }
            }
        };
        let bet = Bet {
            bettor: user,
            choice,
            amount,
        };
        match self.window.place(bet) {
            Ok(()) => TableReply::Accepted {
                new_balance: Some(new_balance),
            },
            Err(error) => {
                // window closed between the check and the debit; hand the
                // stake straight back
                self.refund_with_retry(user, amount).await;
                TableReply::Rejected { error }
            }
        }
    }

    async fn handle_cancel_bets(&mut self, user: UserId) -> TableReply {
        let refund = match self.window.cancel(user) {
            Ok(refund) => refund,
            Err(error) => return TableReply::Rejected { error },
        };
        if refund == 0 {
            return TableReply::accepted();
        }
        match self.refund_with_retry(user, refund).await {
            Some(balance) => TableReply::Accepted {
                new_balance: Some(balance),
            },
            None => TableReply::accepted(),
        }
    }

    async fn refund_with_retry(&self, user: UserId, amount: Chips) -> Option<Chips> {
        for attempt in 1..=3 {
            match self.ledger.atomic_adjust(user, amount).await {
                Ok(balance) => return Some(balance),
                Err(e) => log::warn!("refund attempt {attempt} for user {user} failed: {e}"),
            }
        }
        log::error!("could not refund {amount} to user {user}; needs reconciliation");
        None
    }
}

fn ledger_to_game_error(user: UserId, amount: Chips, error: LedgerError) -> GameError {
    match error {
        LedgerError::InsufficientBalance {
            available,
            required: _,
        } => GameError::InsufficientFunds {
            required: amount,
            available,
        },
        LedgerError::AccountNotFound(_) => GameError::NotFound(user),
        other => {
            log::error!("ledger failure for user {user}: {other}");
            GameError::NotReady("ledger unavailable".to_string())
        }
    }
}
