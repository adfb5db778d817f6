//! Session Coordinator
//!
//! Serializes every mutation of a session behind a per-session lock:
//! lock, load, apply the engine transition, persist, unlock. Different
//! sessions proceed concurrently.
//!
//! Lock entries are reference counted. The entry for a session is dropped
//! from the map when the last holder or waiter releases it, so the map only
//! grows with the number of sessions currently being mutated.
//!
//! The coordinator never broadcasts. Callers push the returned snapshot
//! after the lock has been released.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info};

use crate::game::engine::{self, GameAction, Transition};
use crate::game::error::GameError;
use crate::game::state::{ChatRecord, GameSession, MoveRecord, PlayerId, SessionId};
use crate::store::{SessionStore, StoreError};

/// Default maximum chat length, in characters.
pub const DEFAULT_CHAT_MAX_LEN: usize = 500;

/// A stored chat line plus who should see it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatPosted {
    /// The appended record.
    pub record: ChatRecord,
    /// Participants of the session, `X` first.
    pub participants: [PlayerId; 2],
}

type LockMap = parking_lot::Mutex<HashMap<SessionId, Arc<Mutex<()>>>>;

/// Held for the duration of one session mutation.
struct SessionLock<'a> {
    locks: &'a LockMap,
    id: SessionId,
    entry: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock();
        // Map entry plus ours: nobody else holds or waits.
        if Arc::strong_count(&self.entry) == 2 {
            locks.remove(&self.id);
        }
    }
}

/// Per-session serialized mutations over a [`SessionStore`].
pub struct SessionCoordinator {
    store: Arc<dyn SessionStore>,
    locks: LockMap,
    chat_max_len: usize,
}

impl SessionCoordinator {
    /// Coordinator over `store` with the default chat limit.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self::with_chat_limit(store, DEFAULT_CHAT_MAX_LEN)
    }

    /// Coordinator over `store` accepting chat up to `chat_max_len` characters.
    pub fn with_chat_limit(store: Arc<dyn SessionStore>, chat_max_len: usize) -> Self {
        Self {
            store,
            locks: parking_lot::Mutex::new(HashMap::new()),
            chat_max_len,
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Place `actor`'s mark at `position`.
    pub async fn make_move(&self, id: SessionId, actor: PlayerId, position: i64) -> Result<GameSession, GameError> {
        self.mutate(id, actor, GameAction::Move { position }).await
    }

    /// Resign; the opponent wins.
    pub async fn resign(&self, id: SessionId, actor: PlayerId) -> Result<GameSession, GameError> {
        self.mutate(id, actor, GameAction::Resign).await
    }

    /// Offer a draw.
    pub async fn offer_draw(&self, id: SessionId, actor: PlayerId) -> Result<GameSession, GameError> {
        self.mutate(id, actor, GameAction::OfferDraw).await
    }

    /// Accept the opponent's draw offer.
    pub async fn accept_draw(&self, id: SessionId, actor: PlayerId) -> Result<GameSession, GameError> {
        self.mutate(id, actor, GameAction::AcceptDraw).await
    }

    /// Decline the opponent's draw offer.
    pub async fn decline_draw(&self, id: SessionId, actor: PlayerId) -> Result<GameSession, GameError> {
        self.mutate(id, actor, GameAction::DeclineDraw).await
    }

    /// Append a chat line. Does not take the session lock.
    pub async fn add_chat(&self, id: SessionId, actor: PlayerId, text: &str) -> Result<ChatPosted, GameError> {
        let text = text.trim();
        if text.is_empty() || text.chars().count() > self.chat_max_len {
            return Err(GameError::InvalidInput);
        }

        let session = self.store.get_session(id).await.map_err(|e| storage_error(id, "load", e))?;
        if !session.is_participant(&actor) {
            return Err(GameError::Forbidden);
        }

        let record = ChatRecord {
            session_id: id,
            player_id: actor,
            text: text.to_string(),
            created_at: Utc::now(),
        };
        self.store.append_chat(&record).await.map_err(|e| storage_error(id, "append chat", e))?;

        debug!("Chat from {} in session {}", actor, id);
        Ok(ChatPosted { record, participants: session.participants() })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current snapshot of a session.
    pub async fn get_session(&self, id: SessionId) -> Result<GameSession, GameError> {
        self.store.get_session(id).await.map_err(|e| storage_error(id, "load", e))
    }

    /// Sessions `player` is still playing, oldest first.
    pub async fn active_sessions(&self, player: PlayerId) -> Result<Vec<GameSession>, GameError> {
        self.store.list_active_sessions(player).await.map_err(|e| {
            error!("Failed to list sessions for {}: {}", player, e);
            GameError::from(e)
        })
    }

    /// Number of sessions with a lock currently held or awaited.
    pub fn tracked_locks(&self) -> usize {
        self.locks.lock().len()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn lock(&self, id: SessionId) -> SessionLock<'_> {
        let entry = self.locks.lock().entry(id).or_default().clone();
        let guard = entry.clone().lock_owned().await;
        SessionLock { locks: &self.locks, id, entry, guard: Some(guard) }
    }

    async fn mutate(&self, id: SessionId, actor: PlayerId, action: GameAction) -> Result<GameSession, GameError> {
        let _lock = self.lock(id).await;

        let current = self.store.get_session(id).await.map_err(|e| storage_error(id, "load", e))?;
        let applied = engine::apply(&current, &actor, action, Utc::now())?;

        self.store
            .update_session(&applied.session)
            .await
            .map_err(|e| storage_error(id, "update", e))?;

        if let Transition::Moved { position, mark, .. } = applied.transition {
            let record = MoveRecord {
                session_id: id,
                player_id: actor,
                position,
                mark,
                created_at: applied.session.updated_at,
            };
            if let Err(e) = self.store.append_move(&record).await {
                // Restore the pre-move snapshot.
                if let Err(rollback) = self.store.update_session(&current).await {
                    error!("Rollback of session {} failed: {}", id, rollback);
                }
                return Err(storage_error(id, "append move", e));
            }
        }

        debug!("Session {} {:?} by {}", id, applied.transition, actor);
        if applied.finished() {
            match applied.session.winner {
                Some(winner) => info!("Session {} finished, winner {}", id, winner),
                None => info!("Session {} finished in a draw", id),
            }
        }

        Ok(applied.session)
    }
}

fn storage_error(id: SessionId, op: &str, err: StoreError) -> GameError {
    if err != StoreError::NotFound {
        error!("Store {} failed for session {}: {}", op, id, err);
    }
    GameError::from(err)
}
