//! In-memory session store.
//!
//! Values are cloned on the way in and out so callers never alias stored
//! state.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{SessionStore, StoreError};
use crate::game::state::{ChatRecord, GameSession, MoveRecord, PlayerId, SessionId};

/// In-memory [`SessionStore`].
#[derive(Default)]
pub struct MemorySessionStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    sessions: BTreeMap<SessionId, GameSession>,
    moves: BTreeMap<SessionId, Vec<MoveRecord>>,
    chat: BTreeMap<SessionId, Vec<ChatRecord>>,
}

impl MemorySessionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, session: &GameSession) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.sessions.contains_key(&session.id) {
            return Err(StoreError::Backend(format!("duplicate session id {}", session.id)));
        }
        inner.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<GameSession, StoreError> {
        let inner = self.inner.read().await;
        inner.sessions.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn update_session(&self, session: &GameSession) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        match inner.sessions.get_mut(&session.id) {
            Some(stored) => {
                *stored = session.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn list_active_sessions(&self, player: PlayerId) -> Result<Vec<GameSession>, StoreError> {
        let inner = self.inner.read().await;
        let mut active: Vec<GameSession> = inner
            .sessions
            .values()
            .filter(|s| s.is_participant(&player) && s.status.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|s| s.created_at);
        Ok(active)
    }

    async fn append_move(&self, record: &MoveRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.moves.entry(record.session_id).or_default().push(record.clone());
        Ok(())
    }

    async fn append_chat(&self, record: &ChatRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.chat.entry(record.session_id).or_default().push(record.clone());
        Ok(())
    }

    async fn list_moves(&self, id: SessionId) -> Result<Vec<MoveRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.moves.get(&id).cloned().unwrap_or_default())
    }

    async fn list_chat(&self, id: SessionId) -> Result<Vec<ChatRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.chat.get(&id).cloned().unwrap_or_default())
    }
}
