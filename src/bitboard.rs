//! OpusOthello - Bitboard Module
//!
//! This module provides bitboard utilities for fast move generation.
//! A bitboard is a 64-bit integer where each bit represents a square on the
//! board. Bit `row * 8 + col` holds square `(row, col)`, so bit 0 is the
//! (0,0) corner and shifting left by 8 moves one row down.

// ============================================================================
// CONSTANTS - Files and Ranks
// ============================================================================

pub const FILE_A: u64 = 0x0101010101010101;
pub const FILE_H: u64 = 0x8080808080808080;

pub const RANK_1: u64 = 0x00000000000000FF;
pub const RANK_8: u64 = 0xFF00000000000000;

pub const NOT_FILE_A: u64 = !FILE_A;
pub const NOT_FILE_H: u64 = !FILE_H;

/// Outer ring of the board
pub const EDGES: u64 = FILE_A | FILE_H | RANK_1 | RANK_8;

/// The four corner squares
pub const CORNERS: u64 = 0x8100000000000081;

/// Squares diagonally adjacent to a corner
pub const X_SQUARES: u64 = 0x0042000000004200;

/// Edge squares orthogonally adjacent to a corner
pub const C_SQUARES: u64 = 0x4281000000008142;

// ============================================================================
// DIRECTIONS
// ============================================================================

/// The eight compass directions a line of discs can run in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

pub const DIRECTIONS: [Direction; 8] = [
    Direction::North,
    Direction::South,
    Direction::East,
    Direction::West,
    Direction::NorthEast,
    Direction::NorthWest,
    Direction::SouthEast,
    Direction::SouthWest,
];

impl Direction {
    /// Shift every bit one step in this direction. Bits that would wrap
    /// around a file edge are dropped.
    #[inline]
    pub const fn shift(self, bb: u64) -> u64 {
        match self {
            Direction::North => bb >> 8,
            Direction::South => bb << 8,
            Direction::East => (bb << 1) & NOT_FILE_A,
            Direction::West => (bb >> 1) & NOT_FILE_H,
            Direction::NorthEast => (bb >> 7) & NOT_FILE_A,
            Direction::NorthWest => (bb >> 9) & NOT_FILE_H,
            Direction::SouthEast => (bb << 9) & NOT_FILE_A,
            Direction::SouthWest => (bb << 7) & NOT_FILE_H,
        }
    }
}

// ============================================================================
// PRECOMPUTED LINE TABLES
// ============================================================================

/// Masks of every full row, column and diagonal (diagonals of length >= 3)
pub static ROW_LINES: [u64; 8] = init_row_lines();
pub static COL_LINES: [u64; 8] = init_col_lines();
pub static DIAG_LINES: [u64; 15] = init_diag_lines();
pub static ANTI_DIAG_LINES: [u64; 15] = init_anti_diag_lines();

const fn init_row_lines() -> [u64; 8] {
    let mut lines = [0u64; 8];
    let mut r = 0;
    while r < 8 {
        lines[r] = RANK_1 << (r * 8);
        r += 1;
    }
    lines
}

const fn init_col_lines() -> [u64; 8] {
    let mut lines = [0u64; 8];
    let mut c = 0;
    while c < 8 {
        lines[c] = FILE_A << c;
        c += 1;
    }
    lines
}

// Diagonal k holds squares with col - row == k - 7
const fn init_diag_lines() -> [u64; 15] {
    let mut lines = [0u64; 15];
    let mut sq = 0usize;
    while sq < 64 {
        let row = sq / 8;
        let col = sq % 8;
        lines[col + 7 - row] |= 1u64 << sq;
        sq += 1;
    }
    lines
}

// Anti-diagonal k holds squares with row + col == k
const fn init_anti_diag_lines() -> [u64; 15] {
    let mut lines = [0u64; 15];
    let mut sq = 0usize;
    while sq < 64 {
        let row = sq / 8;
        let col = sq % 8;
        lines[row + col] |= 1u64 << sq;
        sq += 1;
    }
    lines
}

// ============================================================================
// MOVE GENERATION PRIMITIVES
// ============================================================================

/// All empty squares where `player` may place a disc, given the player's and
/// opponent's occupancy.
#[inline]
pub fn legal_moves_mask(player: u64, opponent: u64) -> u64 {
    let empty = !(player | opponent);
    let mut moves = 0u64;

    for dir in DIRECTIONS {
        // A run of opponent discs can be at most six long
        let mut run = dir.shift(player) & opponent;
        run |= dir.shift(run) & opponent;
        run |= dir.shift(run) & opponent;
        run |= dir.shift(run) & opponent;
        run |= dir.shift(run) & opponent;
        run |= dir.shift(run) & opponent;
        moves |= dir.shift(run) & empty;
    }

    moves
}

/// Discs flipped when `player` places on `sq`. Returns 0 for a non-capturing
/// placement; the caller is responsible for checking the square is empty.
#[inline]
pub fn flips_for(player: u64, opponent: u64, sq: usize) -> u64 {
    let origin = 1u64 << sq;
    let mut flips = 0u64;

    for dir in DIRECTIONS {
        let mut line = 0u64;
        let mut cursor = dir.shift(origin);
        while cursor & opponent != 0 {
            line |= cursor;
            cursor = dir.shift(cursor);
        }
        if cursor & player != 0 {
            flips |= line;
        }
    }

    flips
}

/// Squares adjacent (in any of the eight directions) to a set bit
#[inline]
pub fn neighbours(bb: u64) -> u64 {
    let mut out = 0u64;
    for dir in DIRECTIONS {
        out |= dir.shift(bb);
    }
    out
}

/// Discs of `player` that can never be flipped again.
///
/// A disc is stable along an axis when the line through it is full, when it
/// sits on the board edge for that axis, or when a neighbour on that axis is
/// already known stable. Stability along all four axes makes the disc stable;
/// the set is grown from the corners to a fixpoint.
pub fn stable_discs(player: u64, opponent: u64) -> u64 {
    let occupied = player | opponent;
    let full_row = full_lines(occupied, &ROW_LINES);
    let full_col = full_lines(occupied, &COL_LINES);
    let full_diag = full_lines(occupied, &DIAG_LINES);
    let full_anti = full_lines(occupied, &ANTI_DIAG_LINES);

    let mut stable = 0u64;
    loop {
        let horizontal = full_row
            | FILE_A
            | FILE_H
            | Direction::East.shift(stable)
            | Direction::West.shift(stable);
        let vertical = full_col
            | RANK_1
            | RANK_8
            | Direction::North.shift(stable)
            | Direction::South.shift(stable);
        let diagonal = full_diag
            | EDGES
            | Direction::SouthEast.shift(stable)
            | Direction::NorthWest.shift(stable);
        let anti_diagonal = full_anti
            | EDGES
            | Direction::SouthWest.shift(stable)
            | Direction::NorthEast.shift(stable);

        let next = player & horizontal & vertical & diagonal & anti_diagonal;
        if next == stable {
            return stable;
        }
        stable = next;
    }
}

fn full_lines(occupied: u64, lines: &[u64]) -> u64 {
    lines
        .iter()
        .filter(|&&line| occupied & line == line)
        .fold(0u64, |acc, &line| acc | line)
}

// ============================================================================
// BITBOARD UTILITIES
// ============================================================================

/// Extract and clear the least significant bit, returning its index
#[inline]
pub fn pop_lsb(bb: &mut u64) -> usize {
    let idx = bb.trailing_zeros() as usize;
    *bb &= *bb - 1;
    idx
}

/// Count the number of set bits in a bitboard
#[inline]
pub fn popcount(bb: u64) -> u32 {
    bb.count_ones()
}

/// Get the index of the least significant bit
#[inline]
pub fn lsb(bb: u64) -> usize {
    bb.trailing_zeros() as usize
}

/// Create a bitboard with a single bit set at the given square
#[inline]
pub const fn square_bb(sq: usize) -> u64 {
    1u64 << sq
}

/// Iterate over the indices of set bits, lowest first
pub fn squares(mut bb: u64) -> impl Iterator<Item = usize> {
    std::iter::from_fn(move || {
        if bb == 0 {
            None
        } else {
            Some(pop_lsb(&mut bb))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_BLACK: u64 = (1u64 << 28) | (1u64 << 35);
    const START_WHITE: u64 = (1u64 << 27) | (1u64 << 36);

    #[test]
    fn test_corner_masks() {
        assert_eq!(popcount(CORNERS), 4);
        assert_eq!(popcount(X_SQUARES), 4);
        assert_eq!(popcount(C_SQUARES), 8);
        assert_ne!(CORNERS & (1u64 << 0), 0);
        assert_ne!(X_SQUARES & (1u64 << 9), 0);
        assert_ne!(C_SQUARES & (1u64 << 1), 0);
        assert_ne!(C_SQUARES & (1u64 << 8), 0);
    }

    #[test]
    fn test_shift_does_not_wrap() {
        assert_eq!(Direction::East.shift(FILE_H), 0);
        assert_eq!(Direction::West.shift(FILE_A), 0);
        assert_eq!(Direction::North.shift(RANK_1), 0);
        assert_eq!(Direction::South.shift(RANK_8), 0);
        assert_eq!(Direction::SouthEast.shift(1u64 << 7), 0);
    }

    #[test]
    fn test_opening_moves_mask() {
        let moves = legal_moves_mask(START_BLACK, START_WHITE);
        let expected = square_bb(19) | square_bb(26) | square_bb(37) | square_bb(44);
        assert_eq!(moves, expected);
    }

    #[test]
    fn test_flips_for_opening_move() {
        // Black at (2,3) flips (3,3)
        assert_eq!(flips_for(START_BLACK, START_WHITE, 19), square_bb(27));
        // Non-capturing corner
        assert_eq!(flips_for(START_BLACK, START_WHITE, 0), 0);
    }

    #[test]
    fn test_line_tables() {
        assert_eq!(DIAG_LINES[7], 0x8040201008040201);
        assert_eq!(ANTI_DIAG_LINES[7], 0x0102040810204080);
        assert_eq!(ROW_LINES[0], RANK_1);
        assert_eq!(COL_LINES[7], FILE_H);
    }

    #[test]
    fn test_stable_discs_from_corner() {
        // Black holds the whole first row: all eight discs are stable
        assert_eq!(stable_discs(RANK_1, 0), RANK_1);
        // A lone centre disc is never stable
        assert_eq!(stable_discs(START_BLACK, START_WHITE), 0);
        // Corner plus its neighbour along an empty edge
        let discs = square_bb(0) | square_bb(1);
        assert_eq!(stable_discs(discs, 0), discs);
    }

    #[test]
    fn test_squares_iterator() {
        let collected: Vec<usize> = squares(square_bb(3) | square_bb(40)).collect();
        assert_eq!(collected, vec![3, 40]);
    }
}
