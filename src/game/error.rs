//! Game Errors
//!
//! Domain error taxonomy shared by the engine, the coordinator and the
//! matchmaking queue. Every variant except `Storage` is safe to show to
//! the client verbatim.

use crate::store::StoreError;

/// Errors produced while acting on a game session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// Malformed request.
    #[error("invalid input")]
    InvalidInput,

    /// Bad or missing credential.
    #[error("unauthorized")]
    Unauthorized,

    /// Authenticated, but not entitled to act on this session.
    #[error("forbidden")]
    Forbidden,

    /// Unknown session or user.
    #[error("not found")]
    NotFound,

    /// Action attempted outside a live phase.
    #[error("game not active")]
    GameNotActive,

    /// Mover's mark is not the next-turn mark.
    #[error("not your turn")]
    NotYourTurn,

    /// Target cell already holds a mark.
    #[error("position taken")]
    PositionTaken,

    /// Position outside 0..=8.
    #[error("invalid position")]
    InvalidPosition,

    /// Identity already waiting in the matchmaking queue.
    #[error("already in queue")]
    AlreadyInQueue,

    /// No draw offer is pending.
    #[error("draw not offered")]
    DrawNotOffered,

    /// Session store failure. Detail is for logs only.
    #[error("storage failure: {0}")]
    Storage(StoreError),
}

impl GameError {
    /// Message sent back to the originating connection.
    ///
    /// Storage failures are reported without internal detail.
    pub fn client_message(&self) -> String {
        match self {
            GameError::Storage(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether this error comes from a collaborator rather than the caller.
    pub fn is_storage(&self) -> bool {
        matches!(self, GameError::Storage(_))
    }
}

impl From<StoreError> for GameError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => GameError::NotFound,
            other => GameError::Storage(other),
        }
    }
}
