//! OpusOthello - Transposition Table
//!
//! A capacity-bounded map from position hash (board + side to move) to the
//! result of an earlier search of that position. When full, the oldest
//! inserted key is evicted.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};

/// How a stored score relates to the true value of the position
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bound {
    /// The score is exact
    Exact,
    /// The search failed high: true value >= score
    Lower,
    /// The search failed low: true value <= score
    Upper,
}

impl Bound {
    /// Classify a final score against the window the node was entered with
    #[inline]
    pub fn classify(score: i32, original_alpha: i32, beta: i32) -> Bound {
        if score <= original_alpha {
            Bound::Upper
        } else if score >= beta {
            Bound::Lower
        } else {
            Bound::Exact
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TTEntry {
    pub depth: i32,
    pub score: i32,
    pub bound: Bound,
    /// Square index of the best move found, if any
    pub best_move: Option<u8>,
}

impl TTEntry {
    /// Score usable as a cutoff for a search of `depth` in `[alpha, beta]`.
    /// Entries shallower than the request are never trusted.
    #[inline]
    pub fn cutoff(&self, depth: i32, alpha: i32, beta: i32) -> Option<i32> {
        if self.depth < depth {
            return None;
        }
        match self.bound {
            Bound::Exact => Some(self.score),
            Bound::Lower if self.score >= beta => Some(self.score),
            Bound::Upper if self.score <= alpha => Some(self.score),
            _ => None,
        }
    }
}

pub struct TranspositionTable {
    table: HashMap<u64, TTEntry>,
    order: VecDeque<u64>,
    capacity: usize,
}

impl TranspositionTable {
    /// Table holding at most `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        TranspositionTable {
            table: HashMap::with_capacity(capacity.min(1 << 16)),
            order: VecDeque::with_capacity(capacity.min(1 << 16)),
            capacity,
        }
    }

    pub fn probe(&self, key: u64) -> Option<TTEntry> {
        self.table.get(&key).copied()
    }

    /// Record a result. A shallower result never replaces a deeper one for
    /// the same key.
    pub fn store(&mut self, key: u64, depth: i32, score: i32, bound: Bound, best_move: Option<u8>) {
        let entry = TTEntry { depth, score, bound, best_move };

        if let Entry::Occupied(mut slot) = self.table.entry(key) {
            if slot.get().depth > depth {
                return;
            }
            // Keep the old best move if the new search did not find one
            let best_move = best_move.or(slot.get().best_move);
            slot.insert(TTEntry { best_move, ..entry });
            return;
        }

        if self.table.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.table.remove(&oldest);
            }
        }
        self.table.insert(key, entry);
        self.order.push_back(key);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
