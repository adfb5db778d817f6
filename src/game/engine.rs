//! Game Engine
//!
//! Pure state transitions over a session snapshot. No I/O, no clock reads:
//! the caller supplies `now`. Every transition validates first and returns
//! a new snapshot, so the input is never observed half-updated.
//!
//! ```text
//! Waiting ──▶ InProgress ◀──▶ DrawOffered
//!                 │                │
//!                 └──────▶ Finished ◀┘
//! ```

use chrono::{DateTime, Utc};

use crate::game::board::{Mark, CELL_COUNT};
use crate::game::error::GameError;
use crate::game::state::{GameSession, PlayerId, SessionStatus};

/// A player action against one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameAction {
    /// Place the actor's mark. Position is unchecked wire input.
    Move {
        /// Requested cell.
        position: i64,
    },
    /// Concede; the opponent wins.
    Resign,
    /// Propose a draw.
    OfferDraw,
    /// Accept the opponent's draw offer.
    AcceptDraw,
    /// Decline the opponent's draw offer.
    DeclineDraw,
}

/// What an accepted action did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// A mark was placed.
    Moved {
        /// Cell index.
        position: usize,
        /// Mark placed.
        mark: Mark,
        /// A pending draw offer was cleared by this move.
        cleared_draw_offer: bool,
    },
    /// Actor resigned.
    Resigned {
        /// The other participant.
        winner: PlayerId,
    },
    /// Draw offer recorded.
    DrawOffered,
    /// Draw agreed, game over.
    DrawAccepted,
    /// Offer withdrawn by the opponent's decline.
    DrawDeclined,
}

/// Result of a successful action: the next snapshot plus what changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Applied {
    /// Updated session.
    pub session: GameSession,
    /// Applied transition.
    pub transition: Transition,
}

impl Applied {
    /// Whether this action ended the game.
    pub fn finished(&self) -> bool {
        self.session.status == SessionStatus::Finished
    }
}

/// Apply `action` by `actor` to `session`.
pub fn apply(
    session: &GameSession,
    actor: &PlayerId,
    action: GameAction,
    now: DateTime<Utc>,
) -> Result<Applied, GameError> {
    match action {
        GameAction::Move { position } => make_move(session, actor, position, now),
        GameAction::Resign => resign(session, actor, now),
        GameAction::OfferDraw => offer_draw(session, actor, now),
        GameAction::AcceptDraw => accept_draw(session, actor, now),
        GameAction::DeclineDraw => decline_draw(session, actor, now),
    }
}

/// Place `actor`'s mark at `position`.
///
/// A move made while a draw is offered implicitly declines the offer.
pub fn make_move(
    session: &GameSession,
    actor: &PlayerId,
    position: i64,
    now: DateTime<Utc>,
) -> Result<Applied, GameError> {
    if !session.status.is_live() {
        return Err(GameError::GameNotActive);
    }

    let mark = session.mark_of(actor).ok_or(GameError::Forbidden)?;

    if mark != session.next_turn {
        return Err(GameError::NotYourTurn);
    }

    let position = usize::try_from(position)
        .ok()
        .filter(|p| *p < CELL_COUNT)
        .ok_or(GameError::InvalidPosition)?;

    if !session.board.is_open(position) {
        return Err(GameError::PositionTaken);
    }

    let mut next = session.clone();
    let cleared_draw_offer = next.draw_offered_by.take().is_some();
    next.status = SessionStatus::InProgress;

    next.board.place(position, mark);
    next.next_turn = mark.opponent();

    if let Some(winning_mark) = next.board.winner() {
        next.status = SessionStatus::Finished;
        next.winner = Some(next.player_for(winning_mark));
    } else if next.board.is_full() {
        next.status = SessionStatus::Finished;
        next.winner = None;
    }

    next.updated_at = now;

    Ok(Applied {
        session: next,
        transition: Transition::Moved { position, mark, cleared_draw_offer },
    })
}

/// Concede the game to the other participant.
pub fn resign(session: &GameSession, actor: &PlayerId, now: DateTime<Utc>) -> Result<Applied, GameError> {
    if !session.status.is_live() {
        return Err(GameError::GameNotActive);
    }

    let winner = session.opponent_of(actor).ok_or(GameError::Forbidden)?;

    let mut next = session.clone();
    next.status = SessionStatus::Finished;
    next.winner = Some(winner);
    next.draw_offered_by = None;
    next.updated_at = now;

    Ok(Applied { session: next, transition: Transition::Resigned { winner } })
}

/// Record a draw offer held by `actor`.
pub fn offer_draw(session: &GameSession, actor: &PlayerId, now: DateTime<Utc>) -> Result<Applied, GameError> {
    if session.status != SessionStatus::InProgress {
        return Err(GameError::GameNotActive);
    }

    if !session.is_participant(actor) {
        return Err(GameError::Forbidden);
    }

    let mut next = session.clone();
    next.status = SessionStatus::DrawOffered;
    next.draw_offered_by = Some(*actor);
    next.updated_at = now;

    Ok(Applied { session: next, transition: Transition::DrawOffered })
}

/// Accept the pending offer; the game ends without a winner.
pub fn accept_draw(session: &GameSession, actor: &PlayerId, now: DateTime<Utc>) -> Result<Applied, GameError> {
    check_draw_response(session, actor)?;

    let mut next = session.clone();
    next.status = SessionStatus::Finished;
    next.winner = None;
    next.draw_offered_by = None;
    next.updated_at = now;

    Ok(Applied { session: next, transition: Transition::DrawAccepted })
}

/// Decline the pending offer; play resumes.
pub fn decline_draw(session: &GameSession, actor: &PlayerId, now: DateTime<Utc>) -> Result<Applied, GameError> {
    check_draw_response(session, actor)?;

    let mut next = session.clone();
    next.status = SessionStatus::InProgress;
    next.draw_offered_by = None;
    next.updated_at = now;

    Ok(Applied { session: next, transition: Transition::DrawDeclined })
}

/// Only the participant who did not make the offer may answer it.
fn check_draw_response(session: &GameSession, actor: &PlayerId) -> Result<(), GameError> {
    let holder = match (session.status, session.draw_offered_by) {
        (SessionStatus::DrawOffered, Some(holder)) => holder,
        _ => return Err(GameError::DrawNotOffered),
    };

    if holder == *actor || !session.is_participant(actor) {
        return Err(GameError::Forbidden);
    }

    Ok(())
}
