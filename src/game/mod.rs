//! Game Logic Module
//!
//! Everything about a single session that does not touch I/O.
//!
//! ## Module Structure
//!
//! - `board`: Marks, the 3x3 grid, winning lines
//! - `state`: Ids, identities, session snapshot, move/chat records
//! - `engine`: Pure transitions (move, resign, draw negotiation)
//! - `error`: Domain error taxonomy

pub mod board;
pub mod engine;
pub mod error;
pub mod state;

// Re-export key types
pub use board::{Board, Mark, WINNING_LINES};
pub use engine::{Applied, GameAction, Transition};
pub use error::GameError;
pub use state::{ChatRecord, GameSession, Identity, MoveRecord, PlayerId, SessionId, SessionStatus};
