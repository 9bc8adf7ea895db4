//! OpusOthello - Move Ordering
//!
//! Killer and history heuristics plus the ordering routine that ranks
//! candidate moves before they are searched. Both tables live inside one
//! search invocation and start empty for every new search.

use std::cmp::Reverse;

use crate::board::Board;
use crate::evaluation::positional_weight;
use crate::move_generator::Move;
use crate::types::*;

/// Deepest ply tracked by the killer table
pub const MAX_PLY: usize = 64;

/// Plies from the root at which the mobility heuristic is applied
const MOBILITY_ORDER_PLIES: usize = 2;

/// History scores are halved once any entry passes this value
const HISTORY_CAP: i32 = 1 << 20;

/// Up to two moves per ply that recently caused a beta cutoff
pub struct KillerTable {
    moves: [[Option<u8>; 2]; MAX_PLY],
}

impl KillerTable {
    pub fn new() -> Self {
        KillerTable {
            moves: [[None; 2]; MAX_PLY],
        }
    }

    /// Remember a cutoff move at `ply`, pushing the older killer down
    pub fn record(&mut self, ply: usize, sq: usize) {
        if ply >= MAX_PLY {
            return;
        }
        let sq = sq as u8;
        let slot = &mut self.moves[ply];
        if slot[0] != Some(sq) {
            slot[1] = slot[0];
            slot[0] = Some(sq);
        }
    }

    /// 2 for the primary killer, 1 for the secondary, 0 otherwise
    pub fn rank(&self, ply: usize, sq: usize) -> u8 {
        if ply >= MAX_PLY {
            return 0;
        }
        let sq = Some(sq as u8);
        if self.moves[ply][0] == sq {
            2
        } else if self.moves[ply][1] == sq {
            1
        } else {
            0
        }
    }

    pub fn is_killer(&self, ply: usize, sq: usize) -> bool {
        self.rank(ply, sq) > 0
    }
}

impl Default for KillerTable {
    fn default() -> Self {
        KillerTable::new()
    }
}

/// Cumulative cutoff credit per (player, square)
pub struct HistoryTable {
    scores: [[i32; NUM_SQUARES]; 2],
}

impl HistoryTable {
    pub fn new() -> Self {
        HistoryTable {
            scores: [[0; NUM_SQUARES]; 2],
        }
    }

    pub fn record(&mut self, player: Player, sq: usize, depth: i32) {
        let table = &mut self.scores[player.index()];
        table[sq] += depth * depth;
        if table[sq] > HISTORY_CAP {
            for score in table.iter_mut() {
                *score /= 2;
            }
        }
    }

    #[inline]
    pub fn score(&self, player: Player, sq: usize) -> i32 {
        self.scores[player.index()][sq]
    }
}

impl Default for HistoryTable {
    fn default() -> Self {
        HistoryTable::new()
    }
}

/// Ranking tables used by `order_moves`
#[derive(Default)]
pub struct MoveOrderer {
    pub killers: KillerTable,
    pub history: HistoryTable,
}

impl MoveOrderer {
    pub fn new() -> Self {
        MoveOrderer::default()
    }

    /// Sort `moves` best-first: transposition move, then killers, then
    /// history score, then static square weight, then (near the root only)
    /// the move that leaves the opponent the fewest replies.
    pub fn order_moves(
        &self,
        moves: &mut [Move],
        ply: usize,
        player: Player,
        board: &Board,
        tt_move: Option<u8>,
    ) {
        if moves.len() < 2 {
            return;
        }

        let use_mobility = ply < MOBILITY_ORDER_PLIES;
        let mut scratch = board.clone();

        moves.sort_by_cached_key(|mv| {
            let sq = mv.square();
            let is_tt = tt_move == Some(sq as u8);
            let killer = self.killers.rank(ply, sq);
            let history = self.history.score(player, sq);
            let weight = positional_weight(sq);
            let replies = if use_mobility {
                let token = scratch.apply_flips(mv.position, player, mv.flips);
                let count = scratch.valid_moves(player.opponent()).count_ones();
                scratch.undo(&token);
                count
            } else {
                0
            };
            Reverse((is_tt, killer, history, weight, Reverse(replies)))
        });
    }
}
