//! OpusOthello - Move Generator Module
//!
//! This module turns the legal-move mask of a position into a list of
//! concrete moves, each carrying the set of discs it flips, and provides a
//! perft counter for validating move generation.

use crate::bitboard::{flips_for, squares, CORNERS, X_SQUARES};
use crate::board::{Board, MoveToken};
use crate::types::*;

/// A legal placement together with the discs it captures.
/// Moves are never mutated after generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Move {
    pub position: Position,
    pub flips: u64,
}

impl Move {
    #[inline]
    pub fn square(&self) -> usize {
        self.position.square()
    }

    #[inline]
    pub fn bit(&self) -> u64 {
        self.position.bit()
    }

    #[inline]
    pub fn is_corner(&self) -> bool {
        self.bit() & CORNERS != 0
    }

    #[inline]
    pub fn is_x_square(&self) -> bool {
        self.bit() & X_SQUARES != 0
    }

    #[inline]
    pub fn flip_count(&self) -> u32 {
        self.flips.count_ones()
    }
}

/// Move generator for Othello positions
#[derive(Clone, Copy, Debug, Default)]
pub struct MoveGenerator;

impl MoveGenerator {
    /// Create a new move generator
    pub fn new() -> Self {
        MoveGenerator
    }

    /// Generate all legal moves for `player`
    pub fn generate_moves(&self, board: &Board, player: Player) -> Vec<Move> {
        let (own, opp) = board.masks_for(player);
        let mask = board.valid_moves(player);
        let mut moves = Vec::with_capacity(mask.count_ones() as usize);

        for sq in squares(mask) {
            moves.push(Move {
                position: Position::from_square(sq),
                flips: flips_for(own, opp, sq),
            });
        }

        moves
    }

    /// Apply a generated move
    #[inline]
    pub fn make_move(&self, board: &mut Board, mv: &Move, player: Player) -> MoveToken {
        board.apply_flips(mv.position, player, mv.flips)
    }

    /// Take back a move applied with `make_move`
    #[inline]
    pub fn unmake_move(&self, board: &mut Board, token: &MoveToken) {
        board.undo(token);
    }

    /// Count leaf positions `depth` plies ahead. A forced pass counts as a
    /// ply; a finished game counts as a single leaf.
    pub fn perft(&self, board: &mut Board, player: Player, depth: u32) -> u64 {
        if depth == 0 {
            return 1;
        }

        let moves = self.generate_moves(board, player);
        if moves.is_empty() {
            if !board.has_moves(player.opponent()) {
                return 1;
            }
            return self.perft(board, player.opponent(), depth - 1);
        }

        if depth == 1 {
            return moves.len() as u64;
        }

        let mut nodes = 0u64;
        for mv in &moves {
            let token = self.make_move(board, mv, player);
            nodes += self.perft(board, player.opponent(), depth - 1);
            self.unmake_move(board, &token);
        }

        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opening_move_list() {
        let board = Board::new();
        let moves = MoveGenerator::new().generate_moves(&board, Player::Black);
        let positions: Vec<Position> = moves.iter().map(|m| m.position).collect();
        assert_eq!(
            positions,
            vec![
                Position::new(2, 3),
                Position::new(3, 2),
                Position::new(4, 5),
                Position::new(5, 4)
            ]
        );
        assert!(moves.iter().all(|m| m.flip_count() == 1));
    }

    #[test]
    fn test_make_unmake() {
        let generator = MoveGenerator::new();
        let mut board = Board::new();
        let mv = generator.generate_moves(&board, Player::Black)[0];
        let token = generator.make_move(&mut board, &mv, Player::Black);
        assert_eq!(board.disc_count(Player::Black), 4);
        generator.unmake_move(&mut board, &token);
        assert_eq!(board, Board::new());
    }

    #[test]
    fn test_perft_opening() {
        let generator = MoveGenerator::new();
        let mut board = Board::new();
        let expected = [1u64, 4, 12, 56, 244, 1396, 8200];
        for (depth, &count) in expected.iter().enumerate() {
            assert_eq!(generator.perft(&mut board, Player::Black, depth as u32), count);
        }
        assert_eq!(board, Board::new());
    }

    #[test]
    fn test_corner_classification() {
        let corner = Move { position: Position::new(0, 0), flips: 0 };
        let x = Move { position: Position::new(6, 6), flips: 0 };
        assert!(corner.is_corner());
        assert!(!corner.is_x_square());
        assert!(x.is_x_square());
    }
}
