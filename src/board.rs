//! OpusOthello - Board Representation Module
//!
//! This module provides the core data structures for representing an Othello
//! board: two occupancy masks (authoritative for all move logic) plus a flat
//! cell array kept in sync for display. It includes move application with an
//! O(1) undo token, position hashing, text parsing and the `GameCore` game
//! state wrapper.

use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::bitboard::{flips_for, legal_moves_mask, popcount, squares};
use crate::error::{BoardParseError, MoveError};
use crate::types::*;

/// Everything needed to take back one placement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoveToken {
    pub position: Position,
    pub player: Player,
    pub prev_black: u64,
    pub prev_white: u64,
    pub flips: u64,
}

/// Othello board representation
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BoardMasks", into = "BoardMasks")]
pub struct Board {
    black: u64,
    white: u64,
    /// 64-element view of the masks (index = row * 8 + col)
    cells: [Cell; NUM_SQUARES],
}

/// Wire form of a board
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct BoardMasks {
    black: u64,
    white: u64,
}

impl TryFrom<BoardMasks> for Board {
    type Error = BoardParseError;

    fn try_from(masks: BoardMasks) -> Result<Self, Self::Error> {
        Board::from_masks(masks.black, masks.white)
    }
}

impl From<Board> for BoardMasks {
    fn from(board: Board) -> Self {
        BoardMasks {
            black: board.black,
            white: board.white,
        }
    }
}

impl Board {
    /// Create a new board with the standard opening setup:
    /// (3,3) and (4,4) white, (3,4) and (4,3) black
    pub fn new() -> Self {
        let black = Position::new(3, 4).bit() | Position::new(4, 3).bit();
        let white = Position::new(3, 3).bit() | Position::new(4, 4).bit();
        Board::from_masks_unchecked(black, white)
    }

    /// Create a board with no discs
    pub fn empty() -> Self {
        Board::from_masks_unchecked(0, 0)
    }

    /// Create a board from occupancy masks
    pub fn from_masks(black: u64, white: u64) -> Result<Self, BoardParseError> {
        if black & white != 0 {
            return Err(BoardParseError::Overlap);
        }
        Ok(Board::from_masks_unchecked(black, white))
    }

    fn from_masks_unchecked(black: u64, white: u64) -> Self {
        let mut cells = [Cell::Empty; NUM_SQUARES];
        for sq in squares(black) {
            cells[sq] = Cell::Black;
        }
        for sq in squares(white) {
            cells[sq] = Cell::White;
        }
        Board { black, white, cells }
    }

    #[inline]
    pub fn black(&self) -> u64 {
        self.black
    }

    #[inline]
    pub fn white(&self) -> u64 {
        self.white
    }

    /// Occupancy mask of one side
    #[inline]
    pub fn mask(&self, player: Player) -> u64 {
        match player {
            Player::Black => self.black,
            Player::White => self.white,
        }
    }

    /// (player's mask, opponent's mask)
    #[inline]
    pub fn masks_for(&self, player: Player) -> (u64, u64) {
        match player {
            Player::Black => (self.black, self.white),
            Player::White => (self.white, self.black),
        }
    }

    #[inline]
    pub fn occupied(&self) -> u64 {
        self.black | self.white
    }

    #[inline]
    pub fn empties(&self) -> u64 {
        !self.occupied()
    }

    /// Contents of a square; off-board coordinates read as empty
    pub fn cell(&self, row: usize, col: usize) -> Cell {
        if row >= BOARD_SIZE || col >= BOARD_SIZE {
            return Cell::Empty;
        }
        self.cells[row * BOARD_SIZE + col]
    }

    /// Flat view of the board (index = row * 8 + col)
    pub fn cells(&self) -> &[Cell; NUM_SQUARES] {
        &self.cells
    }

    /// Mask of every square where `player` may place a disc
    #[inline]
    pub fn valid_moves(&self, player: Player) -> u64 {
        let (own, opp) = self.masks_for(player);
        legal_moves_mask(own, opp)
    }

    #[inline]
    pub fn has_moves(&self, player: Player) -> bool {
        self.valid_moves(player) != 0
    }

    /// Neither side can place a disc
    pub fn is_terminal(&self) -> bool {
        !self.has_moves(Player::Black) && !self.has_moves(Player::White)
    }

    /// True if `player` may place a disc at (row, col)
    pub fn is_legal(&self, row: usize, col: usize, player: Player) -> bool {
        self.check_move(row, col, player).is_ok()
    }

    /// Validate a placement, returning the discs it would flip
    pub fn check_move(&self, row: usize, col: usize, player: Player) -> Result<u64, MoveError> {
        if row >= BOARD_SIZE || col >= BOARD_SIZE {
            return Err(MoveError::OutOfRange {
                row: row.min(u8::MAX as usize) as u8,
                col: col.min(u8::MAX as usize) as u8,
            });
        }
        let (row, col) = (row as u8, col as u8);
        let sq = Position::new(row, col).square();
        if self.occupied() & (1u64 << sq) != 0 {
            return Err(MoveError::Occupied { row, col });
        }

        let (own, opp) = self.masks_for(player);
        let flips = flips_for(own, opp, sq);
        if flips == 0 {
            return Err(MoveError::NoCaptures { row, col });
        }
        Ok(flips)
    }

    /// Place a disc, reporting why the placement is illegal if it is
    pub fn try_apply(&mut self, row: usize, col: usize, player: Player) -> Result<MoveToken, MoveError> {
        let flips = self.check_move(row, col, player)?;
        Ok(self.apply_flips(Position::new(row as u8, col as u8), player, flips))
    }

    /// Place a disc; `None` if the placement is illegal or the square occupied
    pub fn apply_move(&mut self, row: usize, col: usize, player: Player) -> Option<MoveToken> {
        self.try_apply(row, col, player).ok()
    }

    /// Place a disc whose flip set is already known. The caller guarantees
    /// the square is empty and `flips` came from `flips_for` on this board.
    pub fn apply_flips(&mut self, position: Position, player: Player, flips: u64) -> MoveToken {
        let token = MoveToken {
            position,
            player,
            prev_black: self.black,
            prev_white: self.white,
            flips,
        };

        let placed = position.bit();
        match player {
            Player::Black => {
                self.black |= placed | flips;
                self.white &= !flips;
            }
            Player::White => {
                self.white |= placed | flips;
                self.black &= !flips;
            }
        }

        let cell = player.to_cell();
        for sq in squares(placed | flips) {
            self.cells[sq] = cell;
        }

        token
    }

    /// Take back a placement, restoring the exact prior masks and only the
    /// touched cells
    pub fn undo(&mut self, token: &MoveToken) {
        self.black = token.prev_black;
        self.white = token.prev_white;

        self.cells[token.position.square()] = Cell::Empty;
        let previous = token.player.opponent().to_cell();
        for sq in squares(token.flips) {
            self.cells[sq] = previous;
        }
    }

    /// Number of empty squares
    #[inline]
    pub fn empty_count(&self) -> u32 {
        popcount(self.empties())
    }

    /// Number of discs of one side
    #[inline]
    pub fn disc_count(&self, player: Player) -> u32 {
        popcount(self.mask(player))
    }

    /// Disc margin from `player`'s point of view
    #[inline]
    pub fn disc_difference(&self, player: Player) -> i32 {
        self.disc_count(player) as i32 - self.disc_count(player.opponent()) as i32
    }

    /// Cheap multiplicative mix of both masks and the side to move. Only used
    /// for transposition lookup; stable for an unchanged board.
    #[inline]
    pub fn hash(&self, side_to_move: Player) -> u64 {
        const K1: u64 = 0x9E37_79B9_7F4A_7C15;
        const K2: u64 = 0xC2B2_AE3D_27D4_EB4F;
        const SIDE_KEY: u64 = 0x1656_67B1_9E37_79F9;

        let mut h = self.black.wrapping_mul(K1) ^ self.white.wrapping_mul(K2).rotate_left(31);
        h ^= h >> 29;
        h = h.wrapping_mul(K1);
        h ^= h >> 32;
        if side_to_move == Player::White {
            h ^= SIDE_KEY;
        }
        h
    }

    /// Legal placements for `player` as positions, in square order
    pub fn legal_positions(&self, player: Player) -> Vec<Position> {
        squares(self.valid_moves(player)).map(Position::from_square).collect()
    }
}

impl Default for Board {
    fn default() -> Self {
        Board::new()
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Board {{ black: 0x{:016X}, white: 0x{:016X} }}", self.black, self.white)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  a b c d e f g h")?;
        for row in 0..BOARD_SIZE {
            write!(f, "{} ", row + 1)?;
            for col in 0..BOARD_SIZE {
                write!(f, "{} ", self.cells[row * BOARD_SIZE + col].symbol())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl FromStr for Board {
    type Err = BoardParseError;

    /// Parse 64 cells: `X`/`B`/`*` black, `O`/`W` white, `-`/`.` empty.
    /// Whitespace is ignored so boards can be written as an 8x8 grid.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut black = 0u64;
        let mut white = 0u64;
        let mut index = 0usize;

        for c in s.chars().filter(|c| !c.is_whitespace()) {
            if index < NUM_SQUARES {
                match c {
                    'X' | 'x' | 'B' | 'b' | '*' => black |= 1u64 << index,
                    'O' | 'o' | 'W' | 'w' => white |= 1u64 << index,
                    '-' | '.' => {}
                    other => return Err(BoardParseError::BadCell(other)),
                }
            }
            index += 1;
        }

        if index != NUM_SQUARES {
            return Err(BoardParseError::WrongLength(index));
        }
        Board::from_masks(black, white)
    }
}

// ============================================================================
// GAME STATE
// ============================================================================

/// A board together with whose turn it is. Passing is automatic: after a
/// placement the turn only goes to the opponent if they have a reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameCore {
    pub board: Board,
    pub current_player: Player,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub move_number: u32,
}

impl GameCore {
    /// Standard opening, black to move
    pub fn new() -> Self {
        GameCore::from_board(Board::new(), Player::Black)
    }

    /// Wrap an arbitrary board. If `to_move` has no placement the turn passes
    /// to the opponent; if neither side can move the game is finished.
    pub fn from_board(board: Board, to_move: Player) -> Self {
        let mut game = GameCore {
            board,
            current_player: to_move,
            finished: false,
            move_number: 0,
        };
        game.settle_turn(to_move);
        game
    }

    fn settle_turn(&mut self, preferred: Player) {
        if self.board.has_moves(preferred) {
            self.current_player = preferred;
        } else if self.board.has_moves(preferred.opponent()) {
            self.current_player = preferred.opponent();
        } else {
            self.current_player = preferred;
            self.finished = true;
        }
    }

    /// Play a move for `player`, enforcing turn order and game state
    pub fn play(&mut self, row: usize, col: usize, player: Player) -> Result<MoveToken, MoveError> {
        if self.finished {
            return Err(MoveError::GameFinished);
        }
        if player != self.current_player {
            return Err(MoveError::WrongTurn {
                expected: self.current_player,
                got: player,
            });
        }

        let token = self.board.try_apply(row, col, player)?;
        self.move_number += 1;
        self.settle_turn(player.opponent());
        Ok(token)
    }

    /// Legal placements for the side to move
    pub fn legal_moves(&self) -> Vec<Position> {
        if self.finished {
            return Vec::new();
        }
        self.board.legal_positions(self.current_player)
    }

    /// (black discs, white discs)
    pub fn disc_counts(&self) -> (u32, u32) {
        (
            self.board.disc_count(Player::Black),
            self.board.disc_count(Player::White),
        )
    }

    /// Winner of a finished game; `None` while playing or on a draw
    pub fn winner(&self) -> Option<Player> {
        if !self.finished {
            return None;
        }
        match self.board.disc_difference(Player::Black) {
            d if d > 0 => Some(Player::Black),
            d if d < 0 => Some(Player::White),
            _ => None,
        }
    }

    /// Play up to `plies` uniformly random legal moves from the opening.
    /// Stops early if the game finishes.
    pub fn random_playout<R: Rng + ?Sized>(rng: &mut R, plies: usize) -> Self {
        let mut game = GameCore::new();
        for _ in 0..plies {
            let moves = game.legal_moves();
            let Some(&pos) = moves.choose(rng) else {
                break;
            };
            let player = game.current_player;
            if game.play(pos.row as usize, pos.col as usize, player).is_err() {
                break;
            }
        }
        game
    }
}

impl Default for GameCore {
    fn default() -> Self {
        GameCore::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_board_new_initial_setup() {
        let board = Board::new();
        assert_eq!(board.cell(3, 3), Cell::White);
        assert_eq!(board.cell(3, 4), Cell::Black);
        assert_eq!(board.cell(4, 3), Cell::Black);
        assert_eq!(board.cell(4, 4), Cell::White);
        assert_eq!(board.empty_count(), 60);
        assert_eq!(board.black() & board.white(), 0);
    }

    #[test]
    fn test_is_legal_initial_board() {
        let board = Board::new();
        for (r, c) in [(2, 3), (3, 2), (4, 5), (5, 4)] {
            assert!(board.is_legal(r, c, Player::Black));
        }
        assert!(!board.is_legal(0, 0, Player::Black));
        assert!(!board.is_legal(3, 3, Player::Black));
        assert_eq!(board.legal_positions(Player::Black).len(), 4);
    }

    #[test]
    fn test_move_errors_are_distinguished() {
        let mut board = Board::new();
        assert_eq!(
            board.try_apply(3, 3, Player::Black),
            Err(MoveError::Occupied { row: 3, col: 3 })
        );
        assert_eq!(
            board.try_apply(0, 0, Player::Black),
            Err(MoveError::NoCaptures { row: 0, col: 0 })
        );
        assert_eq!(
            board.try_apply(8, 1, Player::Black),
            Err(MoveError::OutOfRange { row: 8, col: 1 })
        );
        assert!(board.apply_move(0, 0, Player::Black).is_none());
        assert_eq!(board, Board::new());
    }

    #[test]
    fn test_apply_and_undo() {
        let mut board = Board::new();
        let token = board.apply_move(2, 3, Player::Black).unwrap();
        assert_eq!(board.cell(2, 3), Cell::Black);
        assert_eq!(board.cell(3, 3), Cell::Black);
        assert_eq!(board.disc_count(Player::Black), 4);
        assert_eq!(board.disc_count(Player::White), 1);

        board.undo(&token);
        assert_eq!(board, Board::new());
    }

    #[test]
    fn test_hash_is_stable_and_side_dependent() {
        let board = Board::new();
        assert_eq!(board.hash(Player::Black), board.hash(Player::Black));
        assert_ne!(board.hash(Player::Black), board.hash(Player::White));

        let mut moved = board.clone();
        moved.apply_move(2, 3, Player::Black).unwrap();
        assert_ne!(moved.hash(Player::White), board.hash(Player::White));
    }

    #[test]
    fn test_parse_and_display() {
        let text = "
            --------
            --------
            --------
            ---OX---
            ---XO---
            --------
            --------
            --------";
        let board: Board = text.parse().unwrap();
        assert_eq!(board, Board::new());
        assert!(board.to_string().contains("O X"));

        assert_eq!("X".parse::<Board>(), Err(BoardParseError::WrongLength(1)));
        let bad = "?".repeat(64);
        assert_eq!(bad.parse::<Board>(), Err(BoardParseError::BadCell('?')));
    }

    #[test]
    fn test_serde_rejects_overlap() {
        let json = serde_json::to_string(&Board::new()).unwrap();
        let back: Board = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Board::new());
        assert!(serde_json::from_str::<Board>(r#"{"black":1,"white":1}"#).is_err());
    }

    #[test]
    fn test_game_core_turns_and_errors() {
        let mut game = GameCore::new();
        assert_eq!(
            game.play(2, 3, Player::White),
            Err(MoveError::WrongTurn {
                expected: Player::Black,
                got: Player::White
            })
        );
        game.play(2, 3, Player::Black).unwrap();
        assert_eq!(game.current_player, Player::White);
        assert_eq!(game.move_number, 1);
    }

    #[test]
    fn test_game_core_auto_pass_and_finish() {
        // Black owns everything but one corner; white has no discs left to move with
        let text = format!("{}-", "X".repeat(63));
        let board: Board = text.parse().unwrap();
        let game = GameCore::from_board(board, Player::White);
        assert!(game.finished);
        assert_eq!(game.winner(), Some(Player::Black));

        let mut finished = game.clone();
        assert_eq!(finished.play(7, 7, Player::White), Err(MoveError::GameFinished));
    }

    #[test]
    fn test_random_playout_is_reproducible() {
        let a = GameCore::random_playout(&mut StdRng::seed_from_u64(7), 20);
        let b = GameCore::random_playout(&mut StdRng::seed_from_u64(7), 20);
        assert_eq!(a, b);
        assert!(a.board.empty_count() <= 60);
    }

    fn arbitrary_game() -> impl Strategy<Value = GameCore> {
        (any::<u64>(), 0usize..58).prop_map(|(seed, plies)| {
            GameCore::random_playout(&mut StdRng::seed_from_u64(seed), plies)
        })
    }

    proptest! {
        #[test]
        fn prop_apply_undo_round_trip(game in arbitrary_game(), sq in 0usize..64) {
            let mut board = game.board.clone();
            let player = game.current_player;
            let before = board.clone();
            if let Some(token) = board.apply_move(sq / 8, sq % 8, player) {
                board.undo(&token);
                prop_assert_eq!(board.black(), before.black());
                prop_assert_eq!(board.white(), before.white());
                prop_assert_eq!(board.cells(), before.cells());
            } else {
                prop_assert_eq!(board, before);
            }
        }

        #[test]
        fn prop_legality_consistency(game in arbitrary_game()) {
            for player in [Player::Black, Player::White] {
                let mask = game.board.valid_moves(player);
                for sq in 0..NUM_SQUARES {
                    let legal = game.board.is_legal(sq / 8, sq % 8, player);
                    prop_assert_eq!(legal, mask & (1u64 << sq) != 0);
                    let mut scratch = game.board.clone();
                    let token = scratch.apply_move(sq / 8, sq % 8, player);
                    prop_assert_eq!(legal, token.map_or(false, |t| t.flips != 0));
                }
            }
        }

        #[test]
        fn prop_disc_conservation(game in arbitrary_game()) {
            let b = &game.board;
            prop_assert_eq!(b.black() & b.white(), 0);
            prop_assert_eq!(
                b.disc_count(Player::Black) + b.disc_count(Player::White) + b.empty_count(),
                64
            );
            for sq in 0..NUM_SQUARES {
                let expected = if b.black() & (1u64 << sq) != 0 {
                    Cell::Black
                } else if b.white() & (1u64 << sq) != 0 {
                    Cell::White
                } else {
                    Cell::Empty
                };
                prop_assert_eq!(b.cells()[sq], expected);
            }
        }
    }
}
