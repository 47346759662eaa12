//! WebSocket handlers for the two game endpoints.
//!
//! Each connection authenticates through a signed token in the query
//! string, then speaks JSON in both directions: commands in, command
//! responses and game events out. Events and responses share one outbound
//! pipe so frames never interleave mid-message.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use live_casino::auth::{Identity, IdentityVerifier};
use live_casino::baccarat::table::{FixedOutcome, RoundOutcome};
use live_casino::baccarat::{BetChoice, TableReply};
use live_casino::constants::DEFAULT_STARTING_BALANCE;
use live_casino::errors::GameError;
use live_casino::Chips;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: String,
}

/// Commands accepted on the baccarat socket. Scheduler controls are
/// admin-only; betting is open to everyone at the table.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BaccaratMessage {
    Bet { choice: BetChoice, amount: Chips },
    CancelBets,
    WindowStats,
    DeckStatus,
    Start,
    StartRounds { rounds: u32 },
    Stop,
    RigOutcome { outcome: RoundOutcome, pattern: usize },
    Status,
}

/// Commands accepted on the blackjack socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlackjackMessage {
    Bet { amount: Chips },
    Deal,
    Hit,
    Stand,
    DoubleDown,
    Insurance { amount: Chips },
    Surrender,
    Split,
    NextHand,
    View,
}

/// Direct command responses. Game events travel beside these on the same
/// socket with their own `type` tags.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerResponse {
    Success {
        message: String,
    },
    Error {
        message: String,
        kind: Option<String>,
    },
    Data {
        payload: serde_json::Value,
    },
}

impl ServerResponse {
    fn game_error(error: &GameError) -> Self {
        Self::Error {
            message: error.to_string(),
            kind: Some(error.kind().to_string()),
        }
    }

    fn data<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(payload) => Self::Data { payload },
            Err(e) => Self::Error {
                message: format!("serialization failed: {e}"),
                kind: None,
            },
        }
    }
}

async fn authenticate(state: &AppState, token: &str) -> Result<Identity, Response> {
    match state.verifier.verify(token).await {
        Ok(identity) => Ok(identity),
        Err(e) => {
            warn!("rejected websocket credential: {e}");
            Err((StatusCode::UNAUTHORIZED, "invalid token").into_response())
        }
    }
}

/// Upgrade to the shared baccarat table socket.
pub async fn baccarat_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let identity = match authenticate(&state, &query.token).await {
        Ok(identity) => identity,
        Err(rejection) => return rejection,
    };
    ws.on_upgrade(move |socket| handle_baccarat(socket, identity, state))
}

async fn handle_baccarat(socket: WebSocket, identity: Identity, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let user = identity.id;
    info!("baccarat websocket connected: user={user}");

    if let Err(e) = state.ledger.ensure_account(user, DEFAULT_STARTING_BALANCE).await {
        log::error!("could not open ledger account for user {user}: {e}");
        return;
    }

    let (event_tx, mut event_rx) = mpsc::channel(32);
    let (response_tx, mut response_rx) = mpsc::channel::<String>(32);
    if state.baccarat.subscribe(user, event_tx).await.is_err() {
        log::error!("baccarat table is not running");
        return;
    }
    if state.baccarat.connect(user, identity.role).await.is_err() {
        return;
    }

    let send_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                Some(event) = event_rx.recv() => serde_json::to_string(&event).ok(),
                Some(response) = response_rx.recv() => Some(response),
                else => break,
            };
            let Some(frame) = frame else { continue };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let response = match serde_json::from_str::<BaccaratMessage>(&text) {
                    Ok(message) => handle_baccarat_message(message, &identity, &state).await,
                    Err(e) => ServerResponse::Error {
                        message: format!("invalid message: {e}"),
                        kind: None,
                    },
                };
                if let Ok(json) = serde_json::to_string(&response) {
                    if response_tx.send(json).await.is_err() {
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    send_task.abort();
    let _ = state.baccarat.unsubscribe(user).await;
    let _ = state.baccarat.disconnect(user).await;
    info!("baccarat websocket closed: user={user}");
}

async fn handle_baccarat_message(
    message: BaccaratMessage,
    identity: &Identity,
    state: &AppState,
) -> ServerResponse {
    let admin_only = matches!(
        message,
        BaccaratMessage::Start
            | BaccaratMessage::StartRounds { .. }
            | BaccaratMessage::Stop
            | BaccaratMessage::RigOutcome { .. }
    );
    if admin_only && !identity.role.is_admin() {
        return ServerResponse::Error {
            message: "admin credential required".to_string(),
            kind: Some("unauthenticated".to_string()),
        };
    }

    let reply = match message {
        BaccaratMessage::Bet { choice, amount } => {
            state.baccarat.place_bet(identity.id, choice, amount).await
        }
        BaccaratMessage::CancelBets => state.baccarat.cancel_bets(identity.id).await,
        BaccaratMessage::WindowStats => {
            return match state.baccarat.window_stats().await {
                Ok(stats) => ServerResponse::data(&stats),
                Err(e) => ServerResponse::game_error(&e),
            };
        }
        BaccaratMessage::DeckStatus => {
            return match state.baccarat.deck_status().await {
                Ok(status) => ServerResponse::data(&status),
                Err(e) => ServerResponse::game_error(&e),
            };
        }
        BaccaratMessage::Status => {
            return match state.baccarat.status().await {
                Ok(status) => ServerResponse::data(&status),
                Err(e) => ServerResponse::game_error(&e),
            };
        }
        BaccaratMessage::Start => state.baccarat.start_forced().await,
        BaccaratMessage::StartRounds { rounds } => state.baccarat.start_bounded(rounds).await,
        BaccaratMessage::Stop => state.baccarat.stop().await,
        BaccaratMessage::RigOutcome { outcome, pattern } => {
            state
                .baccarat
                .arm_fixed_outcome(FixedOutcome { outcome, pattern })
                .await
        }
    };

    match reply {
        Ok(TableReply::Accepted { new_balance }) => ServerResponse::Success {
            message: match new_balance {
                Some(balance) => format!("accepted, balance {balance}"),
                None => "accepted".to_string(),
            },
        },
        Ok(TableReply::Rejected { error }) => ServerResponse::game_error(&error),
        Err(e) => ServerResponse::game_error(&e),
    }
}

/// Upgrade to a private blackjack session socket.
pub async fn blackjack_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let identity = match authenticate(&state, &query.token).await {
        Ok(identity) => identity,
        Err(rejection) => return rejection,
    };
    ws.on_upgrade(move |socket| handle_blackjack(socket, identity, state))
}

async fn handle_blackjack(socket: WebSocket, identity: Identity, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let user = identity.id;
    info!("blackjack websocket connected: user={user}");

    let (event_tx, mut event_rx) = mpsc::channel(32);
    let (response_tx, mut response_rx) = mpsc::channel::<String>(32);
    state.blackjack.subscribe(user, event_tx).await;
    if let Err(e) = state.blackjack.attach(user, &identity.display_name).await {
        log::error!("could not attach blackjack session for user {user}: {e}");
        state.blackjack.unsubscribe(user).await;
        return;
    }

    let send_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                Some(event) = event_rx.recv() => serde_json::to_string(&event).ok(),
                Some(response) = response_rx.recv() => Some(response),
                else => break,
            };
            let Some(frame) = frame else { continue };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let response = match serde_json::from_str::<BlackjackMessage>(&text) {
                    Ok(message) => handle_blackjack_message(message, user, &state).await,
                    Err(e) => ServerResponse::Error {
                        message: format!("invalid message: {e}"),
                        kind: None,
                    },
                };
                if let Ok(json) = serde_json::to_string(&response) {
                    if response_tx.send(json).await.is_err() {
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    send_task.abort();
    state.blackjack.unsubscribe(user).await;
    // the session itself stays in the registry for reconnects; idle
    // eviction reclaims it eventually
    info!("blackjack websocket closed: user={user}");
}

async fn handle_blackjack_message(
    message: BlackjackMessage,
    user: i64,
    state: &AppState,
) -> ServerResponse {
    let driver = &state.blackjack;
    let result = match message {
        BlackjackMessage::Bet { amount } => driver.place_bet(user, amount).await,
        BlackjackMessage::Deal => driver.deal(user).await,
        BlackjackMessage::Hit => driver.hit(user).await,
        BlackjackMessage::Stand => driver.stand(user).await,
        BlackjackMessage::DoubleDown => driver.double_down(user).await,
        BlackjackMessage::Insurance { amount } => driver.insurance(user, amount).await,
        BlackjackMessage::Surrender => driver.surrender(user).await,
        BlackjackMessage::Split => driver.split(user).await,
        BlackjackMessage::NextHand => driver.reset(user).await,
        BlackjackMessage::View => driver.view(user).await,
    };
    match result {
        Ok(view) => ServerResponse::data(&view),
        Err(e) => ServerResponse::game_error(&e),
    }
}
