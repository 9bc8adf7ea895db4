//! OpusOthello - Position Evaluation Module
//!
//! This module provides static evaluation of Othello positions considering:
//! - Material (disc count)
//! - Mobility and potential mobility
//! - Corner control and X/C-square exposure
//! - Stable discs
//! - Frontier discs
//! - Parity
//! - Edge occupancy
//!
//! Every term is weighted by game phase, which is derived from the number of
//! empty squares. Scores are from the point of view of the side to move.

use crate::bitboard::*;
use crate::board::Board;
use crate::types::*;

// ============================================================================
// POSITIONAL WEIGHTS
// ============================================================================

/// Static square weights, used for move ordering and the fallback mover
pub const POSITION_WEIGHTS: [i32; 64] = [
    100, -20,  10,   5,   5,  10, -20, 100,
    -20, -50,  -2,  -2,  -2,  -2, -50, -20,
     10,  -2,  -1,  -1,  -1,  -1,  -2,  10,
      5,  -2,  -1,  -1,  -1,  -1,  -2,   5,
      5,  -2,  -1,  -1,  -1,  -1,  -2,   5,
     10,  -2,  -1,  -1,  -1,  -1,  -2,  10,
    -20, -50,  -2,  -2,  -2,  -2, -50, -20,
    100, -20,  10,   5,   5,  10, -20, 100,
];

// ============================================================================
// PHASE WEIGHTS
// ============================================================================

/// Coarse stage of the game
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Opening,
    Midgame,
    Endgame,
}

/// Empties at or above which the position counts as an opening
pub const OPENING_EMPTIES: u32 = 44;

/// Empties below which the position counts as an endgame
pub const ENDGAME_EMPTIES: u32 = 20;

impl Phase {
    pub fn from_empties(empties: u32) -> Phase {
        if empties >= OPENING_EMPTIES {
            Phase::Opening
        } else if empties >= ENDGAME_EMPTIES {
            Phase::Midgame
        } else {
            Phase::Endgame
        }
    }
}

/// Per-phase multipliers for each evaluation term
#[derive(Clone, Copy, Debug)]
pub struct PhaseWeights {
    pub material: i32,
    pub mobility: i32,
    pub potential_mobility: i32,
    pub corners: i32,
    pub x_squares: i32,
    pub c_squares: i32,
    pub stability: i32,
    pub frontier: i32,
    pub parity: i32,
    pub edges: i32,
}

const OPENING_WEIGHTS: PhaseWeights = PhaseWeights {
    material: -1,
    mobility: 8,
    potential_mobility: 3,
    corners: 80,
    x_squares: -40,
    c_squares: -15,
    stability: 10,
    frontier: 4,
    parity: 0,
    edges: 2,
};

const MIDGAME_WEIGHTS: PhaseWeights = PhaseWeights {
    material: 1,
    mobility: 6,
    potential_mobility: 3,
    corners: 70,
    x_squares: -30,
    c_squares: -12,
    stability: 12,
    frontier: 3,
    parity: 4,
    edges: 3,
};

const ENDGAME_WEIGHTS: PhaseWeights = PhaseWeights {
    material: 6,
    mobility: 4,
    potential_mobility: 1,
    corners: 50,
    x_squares: -10,
    c_squares: -5,
    stability: 10,
    frontier: 1,
    parity: 12,
    edges: 2,
};

pub fn phase_weights(phase: Phase) -> &'static PhaseWeights {
    match phase {
        Phase::Opening => &OPENING_WEIGHTS,
        Phase::Midgame => &MIDGAME_WEIGHTS,
        Phase::Endgame => &ENDGAME_WEIGHTS,
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Squares diagonally or orthogonally next to a still-empty corner
fn exposed_corner_neighbours(empty: u64, zone: u64) -> u64 {
    let mut exposed = 0u64;
    for corner in squares(CORNERS & empty) {
        exposed |= neighbours(square_bb(corner)) & zone;
    }
    exposed
}

/// Own discs bordering at least one empty square
#[inline]
fn frontier(discs: u64, empty: u64) -> u64 {
    discs & neighbours(empty)
}

/// Empty squares next to an opponent disc; a proxy for future mobility
#[inline]
fn potential_mobility(opponent: u64, empty: u64) -> u32 {
    popcount(neighbours(opponent) & empty)
}

/// True if `pos` is an X-square whose corner is still empty
pub fn is_risky_x_square(board: &Board, pos: Position) -> bool {
    if pos.bit() & X_SQUARES == 0 {
        return false;
    }
    let corner_row = if pos.row < 4 { 0 } else { 7 };
    let corner_col = if pos.col < 4 { 0 } else { 7 };
    board.occupied() & Position::new(corner_row, corner_col).bit() == 0
}

/// Static weight of a square
#[inline]
pub fn positional_weight(sq: usize) -> i32 {
    POSITION_WEIGHTS[sq]
}

// ============================================================================
// MAIN EVALUATION
// ============================================================================

/// Evaluate a non-terminal position from `player`'s point of view.
/// The result always lies within `±MAX_STATIC_SCORE`.
pub fn evaluate(board: &Board, player: Player) -> i32 {
    let (own, opp) = board.masks_for(player);
    let empty = board.empties();
    let empties = popcount(empty);
    let w = phase_weights(Phase::from_empties(empties));

    let mut score = 0i32;

    score += w.material * (popcount(own) as i32 - popcount(opp) as i32);

    let own_moves = popcount(legal_moves_mask(own, opp)) as i32;
    let opp_moves = popcount(legal_moves_mask(opp, own)) as i32;
    score += w.mobility * (own_moves - opp_moves);

    score += w.potential_mobility
        * (potential_mobility(opp, empty) as i32 - potential_mobility(own, empty) as i32);

    score += w.corners * (popcount(own & CORNERS) as i32 - popcount(opp & CORNERS) as i32);

    let risky_x = exposed_corner_neighbours(empty, X_SQUARES);
    score += w.x_squares * (popcount(own & risky_x) as i32 - popcount(opp & risky_x) as i32);

    let risky_c = exposed_corner_neighbours(empty, C_SQUARES);
    score += w.c_squares * (popcount(own & risky_c) as i32 - popcount(opp & risky_c) as i32);

    score += w.stability
        * (popcount(stable_discs(own, opp)) as i32 - popcount(stable_discs(opp, own)) as i32);

    score += w.frontier
        * (popcount(frontier(opp, empty)) as i32 - popcount(frontier(own, empty)) as i32);

    // Odd empties means the side to move should get the last placement
    if w.parity != 0 {
        score += if empties % 2 == 1 { w.parity } else { -w.parity };
    }

    let plain_edges = EDGES & !CORNERS;
    score += w.edges * (popcount(own & plain_edges) as i32 - popcount(opp & plain_edges) as i32);

    score.clamp(-MAX_STATIC_SCORE, MAX_STATIC_SCORE)
}

/// Score of a finished game from `player`'s point of view. Empty squares go
/// to the winner, and the margin is scaled so that any decided result
/// outranks every static evaluation.
pub fn final_score(board: &Board, player: Player) -> i32 {
    let diff = board.disc_difference(player);
    let empties = board.empty_count() as i32;
    let margin = match diff {
        d if d > 0 => d + empties,
        d if d < 0 => d - empties,
        _ => 0,
    };
    margin * DISC_SCORE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opening_is_balanced() {
        let board = Board::new();
        assert_eq!(evaluate(&board, Player::Black), evaluate(&board, Player::White));
        assert!(evaluate(&board, Player::Black).abs() < 50);
    }

    #[test]
    fn test_phase_boundaries() {
        assert_eq!(Phase::from_empties(60), Phase::Opening);
        assert_eq!(Phase::from_empties(44), Phase::Opening);
        assert_eq!(Phase::from_empties(43), Phase::Midgame);
        assert_eq!(Phase::from_empties(20), Phase::Midgame);
        assert_eq!(Phase::from_empties(19), Phase::Endgame);
    }

    #[test]
    fn test_corner_is_valuable() {
        let with_corner: Board = "
            X-------
            -O------
            --OX----
            ---OX---
            ---XO---
            --------
            --------
            --------"
            .parse()
            .unwrap();
        let without_corner: Board = "
            --------
            -O------
            --OX----
            ---OX---
            ---XO---
            --------
            --------
            -------X"
            .parse()
            .unwrap();
        assert!(evaluate(&with_corner, Player::Black) > evaluate(&without_corner, Player::Black) - 200);
        assert!(evaluate(&with_corner, Player::Black) > 0);
    }

    #[test]
    fn test_final_score_dominates_static() {
        let board: Board = format!("{}{}", "X".repeat(33), "O".repeat(31)).parse().unwrap();
        assert_eq!(final_score(&board, Player::Black), 2 * DISC_SCORE);
        assert_eq!(final_score(&board, Player::White), -2 * DISC_SCORE);
        assert!(final_score(&board, Player::Black) > MAX_STATIC_SCORE);
    }

    #[test]
    fn test_final_score_awards_empties() {
        let board: Board = format!("{}{}", "X".repeat(10), "-".repeat(54)).parse().unwrap();
        assert_eq!(final_score(&board, Player::Black), 64 * DISC_SCORE);
    }

    #[test]
    fn test_risky_x_square() {
        let board = Board::new();
        assert!(is_risky_x_square(&board, Position::new(1, 1)));
        assert!(is_risky_x_square(&board, Position::new(6, 6)));
        assert!(!is_risky_x_square(&board, Position::new(2, 2)));

        let corner_taken: Board = format!("X{}", "-".repeat(63)).parse().unwrap();
        assert!(!is_risky_x_square(&corner_taken, Position::new(1, 1)));
    }
}
