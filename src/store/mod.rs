//! Session Store
//!
//! Durable CRUD for sessions, moves and chat. The core only talks to the
//! [`SessionStore`] trait; `memory` is the in-process implementation.

pub mod memory;

use async_trait::async_trait;

use crate::game::state::{ChatRecord, GameSession, MoveRecord, PlayerId, SessionId};

pub use memory::MemorySessionStore;

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No record with that id.
    #[error("record not found")]
    NotFound,

    /// Backend failure (connection, constraint, serialization, ...).
    #[error("backend error: {0}")]
    Backend(String),
}

/// Persistent storage for game sessions and their append-only records.
///
/// Per-record consistency only; there are no cross-record transactions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new session.
    async fn create_session(&self, session: &GameSession) -> Result<(), StoreError>;

    /// Load a session. Fails `NotFound` if absent.
    async fn get_session(&self, id: SessionId) -> Result<GameSession, StoreError>;

    /// Overwrite an existing session. Fails `NotFound` if absent.
    async fn update_session(&self, session: &GameSession) -> Result<(), StoreError>;

    /// Sessions in Waiting, InProgress or DrawOffered where `player` participates.
    async fn list_active_sessions(&self, player: PlayerId) -> Result<Vec<GameSession>, StoreError>;

    /// Append a move record.
    async fn append_move(&self, record: &MoveRecord) -> Result<(), StoreError>;

    /// Append a chat record.
    async fn append_chat(&self, record: &ChatRecord) -> Result<(), StoreError>;

    /// Moves of a session in insertion order.
    async fn list_moves(&self, id: SessionId) -> Result<Vec<MoveRecord>, StoreError>;

    /// Chat of a session in insertion order.
    async fn list_chat(&self, id: SessionId) -> Result<Vec<ChatRecord>, StoreError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Store wrapper with switchable failures.

    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// Delegates to a [`MemorySessionStore`] unless a failure switch is on.
    #[derive(Default)]
    pub struct FlakyStore {
        pub inner: MemorySessionStore,
        pub fail_create: AtomicBool,
        pub fail_update: AtomicBool,
        pub fail_get: AtomicBool,
        pub fail_append_move: AtomicBool,
    }

    impl FlakyStore {
        fn check(flag: &AtomicBool) -> Result<(), StoreError> {
            if flag.load(Ordering::SeqCst) {
                Err(StoreError::Backend("injected failure".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl SessionStore for FlakyStore {
        async fn create_session(&self, session: &GameSession) -> Result<(), StoreError> {
            Self::check(&self.fail_create)?;
            self.inner.create_session(session).await
        }

        async fn get_session(&self, id: SessionId) -> Result<GameSession, StoreError> {
            Self::check(&self.fail_get)?;
            self.inner.get_session(id).await
        }

        async fn update_session(&self, session: &GameSession) -> Result<(), StoreError> {
            Self::check(&self.fail_update)?;
            self.inner.update_session(session).await
        }

        async fn list_active_sessions(&self, player: PlayerId) -> Result<Vec<GameSession>, StoreError> {
            self.inner.list_active_sessions(player).await
        }

        async fn append_move(&self, record: &MoveRecord) -> Result<(), StoreError> {
            Self::check(&self.fail_append_move)?;
            self.inner.append_move(record).await
        }

        async fn append_chat(&self, record: &ChatRecord) -> Result<(), StoreError> {
            self.inner.append_chat(record).await
        }

        async fn list_moves(&self, id: SessionId) -> Result<Vec<MoveRecord>, StoreError> {
            self.inner.list_moves(id).await
        }

        async fn list_chat(&self, id: SessionId) -> Result<Vec<ChatRecord>, StoreError> {
            self.inner.list_chat(id).await
        }
    }
}
