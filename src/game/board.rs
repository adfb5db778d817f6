//! Board Representation
//!
//! Fixed 3x3 grid of optional marks, indexed 0..=8 row-major:
//!
//! ```text
//!  0 | 1 | 2
//! ---+---+---
//!  3 | 4 | 5
//! ---+---+---
//!  6 | 7 | 8
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Number of cells on the board.
pub const CELL_COUNT: usize = 9;

/// Character used for an empty cell in the compact string form.
pub const EMPTY_CHAR: char = '.';

/// The eight winning lines: three rows, three columns, two diagonals.
pub const WINNING_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

// =============================================================================
// MARK
// =============================================================================

/// A participant's symbol. `X` always moves first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    /// First mover.
    X,
    /// Second mover.
    O,
}

impl Mark {
    /// The other mark.
    #[inline]
    pub fn opponent(self) -> Mark {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }

    /// Single-character form.
    pub fn as_char(self) -> char {
        match self {
            Mark::X => 'X',
            Mark::O => 'O',
        }
    }

    /// Parse from the single-character form.
    pub fn from_char(c: char) -> Option<Mark> {
        match c {
            'X' => Some(Mark::X),
            'O' => Some(Mark::O),
            _ => None,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

// =============================================================================
// BOARD
// =============================================================================

/// Nine cells, each empty or holding one mark.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Board {
    cells: [Option<Mark>; CELL_COUNT],
}

impl Board {
    /// Empty board.
    pub const fn new() -> Self {
        Self { cells: [None; CELL_COUNT] }
    }

    /// Cell contents, or `None` if `position` is off the board.
    pub fn get(&self, position: usize) -> Option<Option<Mark>> {
        self.cells.get(position).copied()
    }

    /// Whether the cell at `position` is on the board and empty.
    pub fn is_open(&self, position: usize) -> bool {
        matches!(self.get(position), Some(None))
    }

    /// Place a mark. Caller must have checked `is_open`.
    pub(crate) fn place(&mut self, position: usize, mark: Mark) {
        debug_assert!(self.is_open(position));
        self.cells[position] = Some(mark);
    }

    /// Number of cells holding `mark`.
    pub fn count(&self, mark: Mark) -> usize {
        self.cells.iter().filter(|c| **c == Some(mark)).count()
    }

    /// Total marks placed.
    pub fn marks_placed(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// All nine cells filled.
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Mark owning a complete line, if any.
    pub fn winner(&self) -> Option<Mark> {
        WINNING_LINES.iter().find_map(|[a, b, c]| {
            let mark = self.cells[*a]?;
            (self.cells[*b] == Some(mark) && self.cells[*c] == Some(mark)).then_some(mark)
        })
    }

    /// Indices of empty cells, ascending.
    pub fn open_positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_none())
            .map(|(i, _)| i)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for cell in &self.cells {
            let c = cell.map(Mark::as_char).unwrap_or(EMPTY_CHAR);
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

/// Board string parse errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardParseError {
    /// Not exactly nine characters.
    #[error("board string must be 9 chars, got {0}")]
    WrongLength(usize),
    /// Character other than `X`, `O` or `.`.
    #[error("invalid board char {0:?}")]
    InvalidChar(char),
}

impl FromStr for Board {
    type Err = BoardParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let len = s.chars().count();
        if len != CELL_COUNT {
            return Err(BoardParseError::WrongLength(len));
        }

        let mut board = Board::new();
        for (i, ch) in s.chars().enumerate() {
            board.cells[i] = match ch {
                EMPTY_CHAR => None,
                other => Some(Mark::from_char(other).ok_or(BoardParseError::InvalidChar(other))?),
            };
        }
        Ok(board)
    }
}
