//! Game State Definitions
//!
//! Session snapshot and the records appended alongside it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::board::{Board, Mark};

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Unique player identifier (UUID).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Wrap an existing UUID.
    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Fresh random id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique session identifier (UUID).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Fresh random id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Authenticated participant: id plus display name.
///
/// Issued by the token provider; the core only holds copies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable id.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
}

impl Identity {
    /// Build an identity.
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Session lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created without an opponent. Matchmaking never produces this.
    Waiting,
    /// Moves are being played.
    InProgress,
    /// One participant has offered a draw.
    DrawOffered,
    /// Terminal.
    Finished,
}

impl SessionStatus {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Waiting => "waiting",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::DrawOffered => "draw_offered",
            SessionStatus::Finished => "finished",
        }
    }

    /// Listed by `sync` (anything but Finished).
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionStatus::Finished)
    }

    /// Moves and resignation allowed.
    pub fn is_live(&self) -> bool {
        matches!(self, SessionStatus::InProgress | SessionStatus::DrawOffered)
    }
}

/// One two-player match.
///
/// Invariants kept by the engine:
/// - `winner.is_some()` implies `status == Finished`
/// - `draw_offered_by.is_some()` iff `status == DrawOffered`
/// - `board.count(X) - board.count(O)` is 0 or 1
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameSession {
    /// Session id.
    pub id: SessionId,
    /// Plays `X`, moves first.
    pub player_x: PlayerId,
    /// Plays `O`.
    pub player_o: PlayerId,
    /// Current board.
    pub board: Board,
    /// Mark expected to move next.
    pub next_turn: Mark,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Winner, once finished with one.
    pub winner: Option<PlayerId>,
    /// Holder of the pending draw offer.
    pub draw_offered_by: Option<PlayerId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
}

impl GameSession {
    /// New in-progress session with an empty board, `X` to move.
    pub fn new(id: SessionId, player_x: PlayerId, player_o: PlayerId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            player_x,
            player_o,
            board: Board::new(),
            next_turn: Mark::X,
            status: SessionStatus::InProgress,
            winner: None,
            draw_offered_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark played by `player`, if a participant.
    pub fn mark_of(&self, player: &PlayerId) -> Option<Mark> {
        if *player == self.player_x {
            Some(Mark::X)
        } else if *player == self.player_o {
            Some(Mark::O)
        } else {
            None
        }
    }

    /// Participant playing `mark`.
    pub fn player_for(&self, mark: Mark) -> PlayerId {
        match mark {
            Mark::X => self.player_x,
            Mark::O => self.player_o,
        }
    }

    /// Whether `player` is one of the two participants.
    pub fn is_participant(&self, player: &PlayerId) -> bool {
        self.mark_of(player).is_some()
    }

    /// Both participants, `X` first.
    pub fn participants(&self) -> [PlayerId; 2] {
        [self.player_x, self.player_o]
    }

    /// The other participant.
    pub fn opponent_of(&self, player: &PlayerId) -> Option<PlayerId> {
        self.mark_of(player).map(|m| self.player_for(m.opponent()))
    }

    /// Finished with no winner.
    pub fn is_draw(&self) -> bool {
        self.status == SessionStatus::Finished && self.winner.is_none()
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// One accepted move. Append-only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveRecord {
    /// Session played in.
    pub session_id: SessionId,
    /// Mover.
    pub player_id: PlayerId,
    /// Cell index 0..=8.
    pub position: usize,
    /// Mark placed.
    pub mark: Mark,
    /// When accepted.
    pub created_at: DateTime<Utc>,
}

/// One chat line. Append-only, independent of session status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatRecord {
    /// Session the chat belongs to.
    pub session_id: SessionId,
    /// Author.
    pub player_id: PlayerId,
    /// Message text.
    pub text: String,
    /// When posted.
    pub created_at: DateTime<Utc>,
}
