//! Registry of live blackjack sessions with idle eviction.

use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::cards::Shoe;
use crate::constants::{
    BLACKJACK_DECK_COUNT, BLACKJACK_REFILL_THRESHOLD, SESSION_IDLE_TIMEOUT_MINS,
};
use crate::{Chips, UserId};

use super::session::BlackjackSession;

pub type SharedSession = Arc<Mutex<BlackjackSession>>;

type ShoeFactory = Box<dyn Fn() -> Shoe + Send + Sync>;

/// Owns every live session, keyed by user. Reconnecting replaces nothing:
/// the existing session is handed back with its balance refreshed. A
/// background sweep evicts sessions idle past the timeout.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<UserId, SharedSession>>,
    idle_timeout: Duration,
    shoe_factory: ShoeFactory,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(
            Duration::minutes(SESSION_IDLE_TIMEOUT_MINS),
            Box::new(|| Shoe::shuffled(BLACKJACK_DECK_COUNT, BLACKJACK_REFILL_THRESHOLD)),
        )
    }
}

impl SessionRegistry {
    pub fn new(idle_timeout: Duration, shoe_factory: ShoeFactory) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
            shoe_factory,
        }
    }

    /// Fetch the user's session, creating one when none exists. The ledger
    /// balance always overwrites the mirror on attach.
    pub async fn attach(
        &self,
        user: UserId,
        display_name: &str,
        balance: Chips,
    ) -> SharedSession {
        if let Some(existing) = self.get(user).await {
            {
                let mut session = existing.lock().await;
                session.sync_balance(balance);
                session.touch();
            }
            log::debug!("user {user} reattached to an existing session");
            return existing;
        }
        let session = Arc::new(Mutex::new(BlackjackSession::with_shoe(
            user,
            display_name.to_string(),
            balance,
            (self.shoe_factory)(),
        )));
        self.sessions.write().await.insert(user, session.clone());
        log::info!("created blackjack session for user {user}");
        session
    }

    pub async fn get(&self, user: UserId) -> Option<SharedSession> {
        self.sessions.read().await.get(&user).cloned()
    }

    pub async fn remove(&self, user: UserId) -> Option<SharedSession> {
        self.sessions.write().await.remove(&user)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop every session whose last action is older than the timeout.
    /// Returns the evicted users.
    pub async fn evict_idle(&self) -> Vec<UserId> {
        let cutoff = chrono::Utc::now() - self.idle_timeout;
        let mut stale = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (user, session) in sessions.iter() {
                let session = session.lock().await;
                if session.last_action() < cutoff {
                    stale.push(*user);
                }
            }
        }
        if !stale.is_empty() {
            let mut sessions = self.sessions.write().await;
            for user in &stale {
                sessions.remove(user);
                log::info!("evicted idle blackjack session for user {user}");
            }
        }
        stale
    }

    /// Periodic eviction sweep; runs until the registry is dropped.
    pub fn run_eviction(self: Arc<Self>, every: std::time::Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                self.evict_idle().await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{Card, Suit};

    fn test_registry(idle: Duration) -> SessionRegistry {
        SessionRegistry::new(
            idle,
            Box::new(|| Shoe::from_cards(vec![Card::new(2, Suit::Club); 52])),
        )
    }

    #[tokio::test]
    async fn attach_reuses_the_existing_session() {
        let registry = test_registry(Duration::minutes(30));
        let first = registry.attach(1, "alice", 5_000).await;
        {
            let mut session = first.lock().await;
            session.place_bet(1_000).unwrap();
        }
        let again = registry.attach(1, "alice", 9_000).await;
        let session = again.lock().await;
        // same session, still betting, balance refreshed from the ledger
        assert_eq!(session.phase_name(), "betting");
        assert_eq!(session.balance(), 9_000);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn eviction_only_takes_idle_sessions() {
        let registry = test_registry(Duration::zero());
        registry.attach(1, "alice", 1_000).await;
        let registry_fresh = test_registry(Duration::minutes(30));
        registry_fresh.attach(2, "bob", 1_000).await;

        assert_eq!(registry.evict_idle().await, vec![1]);
        assert!(registry.is_empty().await);
        assert!(registry_fresh.evict_idle().await.is_empty());
        assert_eq!(registry_fresh.len().await, 1);
    }
}
