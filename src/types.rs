//! OpusOthello - Type definitions and constants
//!
//! This module provides the core type definitions and constants for
//! representing discs, players, board coordinates and search scores.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Board dimension (8x8)
pub const BOARD_SIZE: usize = 8;

/// Number of squares on the board
pub const NUM_SQUARES: usize = 64;

/// Score of one disc of final margin. Terminal nodes are scored in these
/// units so that any decided game outranks every positional term.
pub const DISC_SCORE: i32 = 1000;

/// Largest magnitude a static (non-terminal) evaluation may take
pub const MAX_STATIC_SCORE: i32 = DISC_SCORE - 1;

/// Search window bound
pub const INFINITY: i32 = 100_000;

/// Column names used for square notation ("a1" is row 0, col 0)
pub const FILE_NAMES: &[u8; 8] = b"abcdefgh";

/// One of the two sides
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Player {
    Black,
    White,
}

impl Player {
    /// Get the opponent player
    #[inline]
    pub fn opponent(self) -> Player {
        match self {
            Player::Black => Player::White,
            Player::White => Player::Black,
        }
    }

    /// Index for per-player tables (black = 0, white = 1)
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Player::Black => 0,
            Player::White => 1,
        }
    }

    /// Convert player to cell representation
    #[inline]
    pub fn to_cell(self) -> Cell {
        match self {
            Player::Black => Cell::Black,
            Player::White => Cell::White,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Player::Black => write!(f, "black"),
            Player::White => write!(f, "white"),
        }
    }
}

/// Contents of a single square
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Cell {
    #[default]
    Empty,
    Black,
    White,
}

impl Cell {
    /// Character used when rendering a board
    pub fn symbol(self) -> char {
        match self {
            Cell::Empty => '-',
            Cell::Black => 'X',
            Cell::White => 'O',
        }
    }
}

/// A board coordinate. Both fields are in `0..8` for any value produced by
/// the engine; values read from the wire are checked with [`Position::is_valid`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub row: u8,
    pub col: u8,
}

impl Position {
    /// Create a new position
    #[inline]
    pub const fn new(row: u8, col: u8) -> Self {
        Position { row, col }
    }

    /// Build a position from a square index (row * 8 + col)
    #[inline]
    pub const fn from_square(sq: usize) -> Self {
        Position {
            row: (sq / BOARD_SIZE) as u8,
            col: (sq % BOARD_SIZE) as u8,
        }
    }

    /// Square index (row * 8 + col)
    #[inline]
    pub const fn square(self) -> usize {
        self.row as usize * BOARD_SIZE + self.col as usize
    }

    /// Single-bit mask for this position
    #[inline]
    pub const fn bit(self) -> u64 {
        1u64 << self.square()
    }

    /// True if both coordinates are on the board
    #[inline]
    pub const fn is_valid(self) -> bool {
        (self.row as usize) < BOARD_SIZE && (self.col as usize) < BOARD_SIZE
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", square_name(self.square()))
    }
}

/// Convert square index (0-63) to notation, e.g. "c4" for row 3, col 2
pub fn square_name(sq: usize) -> String {
    let col = sq % BOARD_SIZE;
    let row = sq / BOARD_SIZE;
    format!("{}{}", FILE_NAMES[col] as char, row + 1)
}

/// Convert notation to a square index
pub fn parse_square(name: &str) -> Option<usize> {
    let bytes = name.as_bytes();
    if bytes.len() != 2 {
        return None;
    }

    let col = match bytes[0].to_ascii_lowercase() {
        c @ b'a'..=b'h' => (c - b'a') as usize,
        _ => return None,
    };
    let row = match bytes[1] {
        r @ b'1'..=b'8' => (r - b'1') as usize,
        _ => return None,
    };

    Some(row * BOARD_SIZE + col)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_name_round_trip() {
        for sq in 0..NUM_SQUARES {
            assert_eq!(parse_square(&square_name(sq)), Some(sq));
        }
        assert_eq!(square_name(0), "a1");
        assert_eq!(square_name(63), "h8");
        assert_eq!(parse_square("i1"), None);
        assert_eq!(parse_square("a9"), None);
    }

    #[test]
    fn test_position_square_mapping() {
        let pos = Position::new(2, 3);
        assert_eq!(pos.square(), 19);
        assert_eq!(Position::from_square(19), pos);
        assert_eq!(pos.bit(), 1u64 << 19);
        assert!(!Position::new(8, 0).is_valid());
    }

    #[test]
    fn test_player_serde_lowercase() {
        let json = serde_json::to_string(&Player::White).unwrap();
        assert_eq!(json, "\"white\"");
        let back: Player = serde_json::from_str("\"black\"").unwrap();
        assert_eq!(back, Player::Black);
    }
}
