//! Matchmaking Queue
//!
//! Single FIFO of waiting players. Any two waiting players may be paired;
//! the one who waited becomes `X` and moves first. All queue operations are
//! serialized by one lock, held across session creation so a player can
//! never be handed to two sessions.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::game::error::GameError;
use crate::game::state::{GameSession, PlayerId, SessionId};
use crate::store::SessionStore;

/// Result of joining the queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Enqueued; no opponent yet.
    Waiting,
    /// Paired with the head of the queue.
    Matched(GameSession),
}

/// FIFO matchmaking queue.
pub struct MatchmakingQueue {
    store: Arc<dyn SessionStore>,
    queue: Mutex<VecDeque<PlayerId>>,
}

impl MatchmakingQueue {
    /// Empty queue creating sessions in `store`.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store, queue: Mutex::new(VecDeque::new()) }
    }

    /// Join the queue, pairing with the longest-waiting player if any.
    pub async fn join(&self, player: PlayerId) -> Result<JoinOutcome, GameError> {
        let mut queue = self.queue.lock().await;

        if queue.contains(&player) {
            return Err(GameError::AlreadyInQueue);
        }

        let opponent = match queue.pop_front() {
            Some(opponent) => opponent,
            None => {
                queue.push_back(player);
                return Ok(JoinOutcome::Waiting);
            }
        };

        // Unreachable given the contains() check; keep the queue consistent anyway.
        if opponent == player {
            queue.push_back(player);
            return Ok(JoinOutcome::Waiting);
        }

        let session = GameSession::new(SessionId::random(), opponent, player, Utc::now());

        if let Err(e) = self.store.create_session(&session).await {
            error!("Failed to create session for {} vs {}: {}", opponent, player, e);
            queue.push_front(opponent);
            return Err(GameError::from(e));
        }

        info!("Matched {} (X) vs {} (O) in session {}", opponent, player, session.id);
        Ok(JoinOutcome::Matched(session))
    }

    /// Leave the queue. Returns whether the player was waiting.
    pub async fn leave(&self, player: &PlayerId) -> bool {
        let mut queue = self.queue.lock().await;
        let before = queue.len();
        queue.retain(|p| p != player);
        queue.len() != before
    }

    /// Whether `player` is waiting.
    pub async fn contains(&self, player: &PlayerId) -> bool {
        self.queue.lock().await.contains(player)
    }

    /// Number of waiting players.
    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// No one waiting.
    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }
}
