//! Live casino server: one shared baccarat table actor plus per-player
//! blackjack sessions, served over WebSockets with a database-backed
//! ledger.

mod api;
mod config;
mod logging;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Error;
use log::info;
use pico_args::Arguments;

use live_casino::auth::JwtVerifier;
use live_casino::baccarat::{spawn_table, BaccaratTable, TableTiming};
use live_casino::blackjack::{DealerTiming, SessionDriver, SessionRegistry};
use live_casino::ledger::{InMemoryLedger, Ledger, PgLedger};

use config::ServerConfig;

const HELP: &str = "\
Run a live casino server

USAGE:
  lc_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:7171]
  --db-url     URL         Database connection string  [default: env DATABASE_URL, else in-memory]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  JWT_SECRET               JWT signing secret (required)
  BETTING_WINDOW_SECS      Baccarat betting window length
  SESSION_IDLE_TIMEOUT_MINS  Blackjack session idle eviction timeout
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }
    let bind_override: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;
    let db_url_override: Option<String> = pargs.opt_value_from_str("--db-url")?;

    logging::init();

    let config = ServerConfig::from_env(bind_override, db_url_override)
        .map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;

    let ledger: Arc<dyn Ledger> = match &config.database_url {
        Some(url) => {
            info!("connecting to database");
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(url)
                .await
                .map_err(|e| anyhow::anyhow!("failed to connect to database: {e}"))?;
            Arc::new(PgLedger::new(Arc::new(pool)))
        }
        None => {
            log::warn!("no DATABASE_URL configured, using the in-memory ledger");
            Arc::new(InMemoryLedger::new())
        }
    };

    let timing = TableTiming {
        betting: Duration::from_secs(config.betting_window_secs),
        ..TableTiming::default()
    };
    let baccarat = spawn_table(BaccaratTable::default(), ledger.clone(), timing);
    info!(
        "baccarat table ready, betting window {}s",
        config.betting_window_secs
    );

    let registry = Arc::new(SessionRegistry::new(
        chrono::Duration::minutes(config.session_idle_timeout_mins),
        Box::new(|| {
            live_casino::Shoe::shuffled(
                live_casino::constants::BLACKJACK_DECK_COUNT,
                live_casino::constants::BLACKJACK_REFILL_THRESHOLD,
            )
        }),
    ));
    registry.clone().run_eviction(Duration::from_secs(60));
    let blackjack = Arc::new(SessionDriver::new(
        registry,
        ledger.clone(),
        DealerTiming::default(),
    ));
    info!(
        "blackjack sessions ready, idle timeout {}m",
        config.session_idle_timeout_mins
    );

    let state = api::AppState {
        verifier: Arc::new(JwtVerifier::new(&config.jwt_secret)),
        ledger,
        baccarat,
        blackjack,
    };
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind to {}: {e}", config.bind))?;
    info!("server running at http://{}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("server error: {e}"))?;

    info!("shutting down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
}
