//! Drives blackjack sessions: mirrors session money movement onto the
//! ledger, paces the dealer's turn, and fans session events out to the
//! owning connection.
//!
//! Debits hit the ledger before the session commits, and are refunded if
//! the session rejects the action. Credits are owed the moment the session
//! finishes, so they retry against the ledger and escalate to an error log
//! instead of blocking the hand.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{Duration, Instant};

use crate::constants::{DEALER_TURN_BUDGET_SECS, DEFAULT_STARTING_BALANCE};
use crate::errors::{GameError, GameResult};
use crate::events::{SessionEvent, SessionView};
use crate::ledger::{GameKind, HistoryRecord, Ledger, LedgerError};
use crate::{Chips, UserId};

use super::registry::{SessionRegistry, SharedSession};
use super::session::{BlackjackSession, DealerStep, HandOutcome, Outcome};

/// Pacing for the dealer's turn. The budget is a hard ceiling: a dealer
/// turn that outlives it is settled immediately on the cards already
/// dealt, skipping any remaining pacing.
#[derive(Clone, Copy, Debug)]
pub struct DealerTiming {
    pub reveal: Duration,
    pub draw: Duration,
    pub budget: Duration,
}

impl Default for DealerTiming {
    fn default() -> Self {
        Self {
            reveal: Duration::from_secs(1),
            draw: Duration::from_secs(1),
            budget: Duration::from_secs(DEALER_TURN_BUDGET_SECS),
        }
    }
}

impl DealerTiming {
    /// No pacing; the budget stays in place.
    pub fn instant() -> Self {
        Self {
            reveal: Duration::ZERO,
            draw: Duration::ZERO,
            budget: Duration::from_secs(DEALER_TURN_BUDGET_SECS),
        }
    }
}

pub struct SessionDriver {
    registry: Arc<SessionRegistry>,
    ledger: Arc<dyn Ledger>,
    timing: DealerTiming,
    subscribers: Mutex<HashMap<UserId, mpsc::Sender<SessionEvent>>>,
}

impl SessionDriver {
    pub fn new(
        registry: Arc<SessionRegistry>,
        ledger: Arc<dyn Ledger>,
        timing: DealerTiming,
    ) -> Self {
        Self {
            registry,
            ledger,
            timing,
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub async fn subscribe(&self, user: UserId, sender: mpsc::Sender<SessionEvent>) {
        self.subscribers.lock().await.insert(user, sender);
    }

    pub async fn unsubscribe(&self, user: UserId) {
        self.subscribers.lock().await.remove(&user);
    }

    async fn emit(&self, user: UserId, event: SessionEvent) {
        let mut subscribers = self.subscribers.lock().await;
        if let Some(sender) = subscribers.get(&user) {
            match sender.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!("session event channel for user {user} is full");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    subscribers.remove(&user);
                }
            }
        }
    }

    /// Ensure a ledger account exists, then hand back the user's session
    /// (creating it when needed) with its balance refreshed.
    pub async fn attach(&self, user: UserId, display_name: &str) -> GameResult<SessionView> {
        let balance = self
            .ledger
            .ensure_account(user, DEFAULT_STARTING_BALANCE)
            .await
            .map_err(|e| ledger_to_game_error(user, 0, e))?;
        let shared = self.registry.attach(user, display_name, balance).await;
        let view = shared.lock().await.view();
        self.emit(
            user,
            SessionEvent::SessionCreated {
                snapshot: view.clone(),
            },
        )
        .await;
        Ok(view)
    }

    async fn session_for(&self, user: UserId) -> GameResult<SharedSession> {
        self.registry
            .get(user)
            .await
            .ok_or(GameError::NotFound(user))
    }

    /// Run one money-moving session operation. A negative delta is debited
    /// from the ledger up front and refunded if the session rejects the
    /// action; a non-negative result is credited afterwards with retries.
    async fn money_op<P, F>(&self, user: UserId, peek: P, op: F) -> GameResult<SessionView>
    where
        P: FnOnce(&BlackjackSession) -> GameResult<Chips>,
        F: FnOnce(&mut BlackjackSession) -> GameResult<Chips>,
    {
        let shared = self.session_for(user).await?;
        let mut session = shared.lock().await;
        let delta = peek(&session)?;
        if delta < 0 {
            self.ledger
                .atomic_adjust(user, delta)
                .await
                .map_err(|e| ledger_to_game_error(user, -delta, e))?;
        }
        match op(&mut session) {
            Ok(applied) => {
                if applied > 0 {
                    self.credit_with_retry(user, applied).await;
                }
                Ok(session.view())
            }
            Err(err) => {
                if delta < 0 {
                    self.credit_with_retry(user, -delta).await;
                }
                Err(err)
            }
        }
    }

    pub async fn place_bet(&self, user: UserId, amount: Chips) -> GameResult<SessionView> {
        let result = self
            .money_op(
                user,
                |session| Ok(session.staged_bet() - amount),
                |session| session.place_bet(amount),
            )
            .await;
        self.report(user, "bet", &result).await;
        result
    }

    /// Deal the opening hands. A dealt blackjack goes straight to the
    /// dealer's turn.
    pub async fn deal(&self, user: UserId) -> GameResult<SessionView> {
        let shared = self.session_for(user).await?;
        let result = {
            let mut session = shared.lock().await;
            session.start_game().and_then(|()| {
                session.check_blackjack()?;
                Ok(session.view())
            })
        };
        self.report(user, "deal", &result).await;
        let view = result?;
        if view.phase == "dealer_turn" {
            return self.run_dealer_turn(user).await;
        }
        Ok(view)
    }

    pub async fn hit(&self, user: UserId) -> GameResult<SessionView> {
        let shared = self.session_for(user).await?;
        let result = {
            let mut session = shared.lock().await;
            session.hit().map(|_| session.view())
        };
        self.report(user, "hit", &result).await;
        let view = result?;
        match view.phase.as_str() {
            "dealer_turn" => self.run_dealer_turn(user).await,
            "finished" => {
                // bust: nothing to credit, but the hand still hits history
                let outcome = shared.lock().await.outcome().cloned();
                if let Some(outcome) = outcome {
                    self.record_history(user, &outcome).await;
                }
                Ok(view)
            }
            _ => Ok(view),
        }
    }

    pub async fn stand(&self, user: UserId) -> GameResult<SessionView> {
        let shared = self.session_for(user).await?;
        let result = {
            let mut session = shared.lock().await;
            session.stand().map(|()| session.view())
        };
        self.report(user, "stand", &result).await;
        let view = result?;
        if view.phase == "dealer_turn" {
            return self.run_dealer_turn(user).await;
        }
        Ok(view)
    }

    pub async fn double_down(&self, user: UserId) -> GameResult<SessionView> {
        let result = self
            .money_op(
                user,
                |session| Ok(-session.play_bet().unwrap_or(0)),
                |session| session.double_down(),
            )
            .await;
        self.report(user, "double", &result).await;
        result
    }

    pub async fn insurance(&self, user: UserId, amount: Chips) -> GameResult<SessionView> {
        let result = self
            .money_op(
                user,
                |session| {
                    if amount <= 0 {
                        return Err(GameError::InvalidAmount(amount));
                    }
                    let bet = session.play_bet().unwrap_or(0);
                    Ok(-amount.min(bet / 2))
                },
                |session| session.insurance(amount),
            )
            .await;
        self.report(user, "insurance", &result).await;
        result
    }

    pub async fn surrender(&self, user: UserId) -> GameResult<SessionView> {
        let result = self
            .money_op(user, |_| Ok(0), |session| session.surrender())
            .await;
        self.report(user, "surrender", &result).await;
        if let Ok(view) = &result {
            let shared = self.session_for(user).await?;
            let outcome = shared.lock().await.outcome().cloned();
            if let Some(outcome) = outcome {
                self.record_history(user, &outcome).await;
            }
            self.emit(
                user,
                SessionEvent::BalanceChanged {
                    balance: view.balance,
                    reason: "surrender".to_string(),
                },
            )
            .await;
        }
        result
    }

    pub async fn split(&self, user: UserId) -> GameResult<SessionView> {
        let result = self
            .money_op(
                user,
                |session| Ok(-session.play_bet().unwrap_or(0)),
                |session| session.split(),
            )
            .await;
        self.report(user, "split", &result).await;
        result
    }

    pub async fn reset(&self, user: UserId) -> GameResult<SessionView> {
        let shared = self.session_for(user).await?;
        let result = {
            let mut session = shared.lock().await;
            session.prepare_for_next_game().map(|()| session.view())
        };
        self.report(user, "reset", &result).await;
        result
    }

    pub async fn view(&self, user: UserId) -> GameResult<SessionView> {
        let shared = self.session_for(user).await?;
        let session = shared.lock().await;
        Ok(session.view())
    }

    /// Reveal, resolve a dealer natural, pace the draw loop, then settle.
    /// Exceeding the time budget force-finalizes through the normal
    /// result logic with the dealer hand as it stands.
    async fn run_dealer_turn(&self, user: UserId) -> GameResult<SessionView> {
        let shared = self.session_for(user).await?;
        let deadline = Instant::now() + self.timing.budget;
        let card = {
            let mut session = shared.lock().await;
            session.reveal_hole()?
        };
        self.emit(user, SessionEvent::DealerReveal { card }).await;
        tokio::time::sleep(self.timing.reveal).await;

        let natural = {
            let mut session = shared.lock().await;
            session.check_dealer_blackjack()?
        };
        if let Some(outcome) = natural {
            return self.settle(user, &shared, outcome).await;
        }

        loop {
            if Instant::now() >= deadline {
                return self.force_finalize(user, &shared).await;
            }
            let step = {
                let mut session = shared.lock().await;
                session.dealer_play_step()?
            };
            match step {
                DealerStep::Draw { card, total } => {
                    self.emit(user, SessionEvent::DealerDraw { card, total }).await;
                    tokio::time::sleep(self.timing.draw).await;
                }
                DealerStep::Done => break,
            }
        }

        let outcome = {
            let mut session = shared.lock().await;
            session.determine_result()?
        };
        self.settle(user, &shared, outcome).await
    }

    async fn settle(
        &self,
        user: UserId,
        shared: &SharedSession,
        outcome: Outcome,
    ) -> GameResult<SessionView> {
        if outcome.total_payout > 0 {
            self.credit_with_retry(user, outcome.total_payout).await;
        }
        self.record_history(user, &outcome).await;
        let view = shared.lock().await.view();
        self.emit(
            user,
            SessionEvent::BalanceChanged {
                balance: view.balance,
                reason: "settlement".to_string(),
            },
        )
        .await;
        Ok(view)
    }

    /// The draw loop outlived its budget: stop pacing and settle against
    /// whatever dealer hand is on the table. Voiding the hand with a
    /// refund is the last resort when even that fails.
    async fn force_finalize(
        &self,
        user: UserId,
        shared: &SharedSession,
    ) -> GameResult<SessionView> {
        log::error!("dealer turn for user {user} exceeded its budget");
        let outcome = {
            let mut session = shared.lock().await;
            session.determine_result()
        };
        match outcome {
            Ok(outcome) => self.settle(user, shared, outcome).await,
            Err(err) => {
                log::error!("over-budget hand for user {user} would not settle: {err}");
                let (refund, view) = {
                    let mut session = shared.lock().await;
                    let refund = session.abort_hand();
                    (refund, session.view())
                };
                if refund > 0 {
                    self.credit_with_retry(user, refund).await;
                }
                self.emit(
                    user,
                    SessionEvent::BalanceChanged {
                        balance: view.balance,
                        reason: "hand voided".to_string(),
                    },
                )
                .await;
                Ok(view)
            }
        }
    }

    async fn report(&self, user: UserId, action: &str, result: &GameResult<SessionView>) {
        let event = match result {
            Ok(view) => SessionEvent::ActionResult {
                action: action.to_string(),
                ok: true,
                kind: None,
                reason: None,
                snapshot: view.clone(),
            },
            Err(err) => {
                let snapshot = match self.session_for(user).await {
                    Ok(shared) => shared.lock().await.view(),
                    Err(_) => return,
                };
                SessionEvent::ActionResult {
                    action: action.to_string(),
                    ok: false,
                    kind: Some(err.kind().to_string()),
                    reason: Some(err.to_string()),
                    snapshot,
                }
            }
        };
        self.emit(user, event).await;
    }

    async fn record_history(&self, user: UserId, outcome: &Outcome) {
        for result in &outcome.results {
            let coarse = match result.outcome {
                HandOutcome::Win | HandOutcome::Blackjack => "win",
                HandOutcome::Push => "push",
                HandOutcome::Lose | HandOutcome::Bust => "lose",
                HandOutcome::Surrender => "surrender",
            };
            let record = HistoryRecord::new(
                GameKind::Blackjack,
                "hand",
                result.wagered,
                coarse,
                result.outcome.as_str(),
                result.payout,
            );
            if let Err(e) = self.ledger.append_history(user, record).await {
                log::error!("failed to append history for user {user}: {e}");
            }
        }
        if outcome.insurance_payout > 0 {
            let record = HistoryRecord::new(
                GameKind::Blackjack,
                "insurance",
                outcome.insurance_payout / 2,
                "win",
                "dealer_blackjack",
                outcome.insurance_payout,
            );
            if let Err(e) = self.ledger.append_history(user, record).await {
                log::error!("failed to append history for user {user}: {e}");
            }
        }
    }

    /// The mirror already moved; the ledger must eventually agree.
    async fn credit_with_retry(&self, user: UserId, amount: Chips) {
        for attempt in 1..=3 {
            match self.ledger.atomic_adjust(user, amount).await {
                Ok(_) => return,
                Err(e) => {
                    log::warn!("credit attempt {attempt} for user {user} failed: {e}");
                }
            }
        }
        log::error!("could not credit {amount} to user {user}; needs reconciliation");
    }
}

fn ledger_to_game_error(user: UserId, required: Chips, error: LedgerError) -> GameError {
    match error {
        LedgerError::InsufficientBalance { available, .. } => GameError::InsufficientFunds {
            required,
            available,
        },
        LedgerError::AccountNotFound(_) => GameError::NotFound(user),
        other => {
            log::error!("ledger failure for user {user}: {other}");
            GameError::NotReady("ledger unavailable".to_string())
        }
    }
}
