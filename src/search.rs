//! OpusOthello - Search Engine Module
//!
//! This module implements the game-tree search using:
//! - Iterative deepening with aspiration windows
//! - Principal variation search (PVS) at the root and along the PV
//! - Null-window scout search (NWS) everywhere else
//! - Transposition table
//! - Late move reductions and late move pruning
//! - Futility pruning and razoring
//! - Stability-based depth reduction
//! - Killer/History heuristics
//!
//! All mutable state lives in a `SearchContext` created per invocation, so
//! concurrent searches never share tables.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::board::Board;
use crate::evaluation::{evaluate, final_score};
use crate::move_generator::{Move, MoveGenerator};
use crate::ordering::MoveOrderer;
use crate::selectivity::{search_plan, PruningParams, Selectivity, DEFAULT_LEVEL, LMP_COUNTS};
use crate::tt::{Bound, TranspositionTable};
use crate::types::*;

// Aspiration Windows
const ASPIRATION_WINDOW: i32 = 40;
const ASPIRATION_WIDEN: i32 = 4;

// Late Move Reductions
const LMR_FULL_DEPTH_MOVES: usize = 3;
const LMR_MIN_DEPTH: i32 = 3;
const LMR_DEEP_MOVE: usize = 8;

// Futility pruning and razoring apply at this depth and below
const SHALLOW_DEPTH: i32 = 2;

// Stability-based reduction
const STABILITY_MIN_DEPTH: i32 = 4;
const STABILITY_FAR_FROM_END: i32 = 12;
const STABILITY_MARGIN: i32 = 80;
const STABILITY_CALM_LIMIT: i32 = DISC_SCORE / 2;

const MAX_PV_LENGTH: usize = 20;

// How often (in nodes) the clock and stop flag are polled
const STOP_POLL_INTERVAL: u64 = 1024;

/// Default transposition table capacity (entries) for one search
pub const DEFAULT_TT_CAPACITY: usize = 1 << 18;

/// What to search and for how long
#[derive(Clone, Debug)]
pub struct SearchLimits {
    /// Difficulty level, see `selectivity::search_plan`
    pub level: u8,
    /// Hard cap on the iterative-deepening depth
    pub depth_limit: Option<u8>,
    /// Absolute wall-clock cutoff
    pub deadline: Option<Instant>,
    /// Only consider these root moves
    pub root_moves: Option<Vec<Position>>,
    /// Expected root score, used to centre the first aspiration window
    pub initial_guess: Option<i32>,
    /// External stop request
    pub stop: Option<Arc<AtomicBool>>,
    pub tt_capacity: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        SearchLimits {
            level: DEFAULT_LEVEL,
            depth_limit: None,
            deadline: None,
            root_moves: None,
            initial_guess: None,
            stop: None,
            tt_capacity: DEFAULT_TT_CAPACITY,
        }
    }
}

/// Pruning counters, reported for diagnostics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub tt_cutoffs: u64,
    pub futility_prunes: u64,
    pub late_move_prunes: u64,
    pub lmr_researches: u64,
    pub razor_cuts: u64,
    pub stability_cuts: u64,
    pub aspiration_researches: u64,
}

#[derive(Clone, Debug)]
pub struct SearchResult {
    pub best_move: Option<Position>,
    pub score: i32,
    pub nodes: u64,
    /// Deepest fully completed iteration
    pub depth: u8,
    pub pv: Vec<Position>,
    pub selectivity: Selectivity,
    /// The target depth was reached before time ran out
    pub completed: bool,
    pub elapsed: Duration,
    pub stats: SearchStats,
}

#[derive(Clone, Copy, Debug)]
struct RootMove {
    mv: Move,
    score: i32,
}

/// Search `board` for `player` within `limits`
pub fn search_best_move(board: &Board, player: Player, limits: &SearchLimits) -> SearchResult {
    let mut ctx = SearchContext::new(limits);
    ctx.run(board, player, limits)
}

// ============================================================================
// SEARCH CONTEXT
// ============================================================================

pub struct SearchContext {
    generator: MoveGenerator,
    tt: TranspositionTable,
    orderer: MoveOrderer,
    params: PruningParams,
    selectivity: Selectivity,
    nodes: u64,
    next_poll: u64,
    deadline: Option<Instant>,
    stop: Option<Arc<AtomicBool>>,
    stopped: bool,
    stats: SearchStats,
    start: Instant,
}

impl SearchContext {
    pub fn new(limits: &SearchLimits) -> Self {
        SearchContext {
            generator: MoveGenerator::new(),
            tt: TranspositionTable::with_capacity(limits.tt_capacity),
            orderer: MoveOrderer::new(),
            params: Selectivity::NONE.params(),
            selectivity: Selectivity::NONE,
            nodes: 0,
            next_poll: 0,
            deadline: limits.deadline,
            stop: limits.stop.clone(),
            stopped: false,
            stats: SearchStats::default(),
            start: Instant::now(),
        }
    }

    /// Iterative deepening driver
    pub fn run(&mut self, board: &Board, player: Player, limits: &SearchLimits) -> SearchResult {
        self.start = Instant::now();
        let mut board = board.clone();

        let mut root_moves: Vec<RootMove> = self
            .generator
            .generate_moves(&board, player)
            .into_iter()
            .filter(|mv| {
                limits
                    .root_moves
                    .as_ref()
                    .map_or(true, |allowed| allowed.contains(&mv.position))
            })
            .map(|mv| RootMove { mv, score: -INFINITY })
            .collect();

        if root_moves.is_empty() {
            return self.no_move_result(&board, player);
        }

        if root_moves.len() == 1 && limits.root_moves.is_none() {
            return self.forced_move_result(&mut board, player, root_moves[0].mv);
        }

        let empties = board.empty_count();
        let plan = search_plan(limits.level, empties);
        let mut target = limits.depth_limit.unwrap_or(plan.depth);
        target = target.clamp(1, empties.max(1) as u8);
        self.selectivity = plan.selectivity;
        self.params = plan.selectivity.params();

        let mut ordered: Vec<Move> = root_moves.iter().map(|rm| rm.mv).collect();
        self.orderer.order_moves(&mut ordered, 0, player, &board, None);
        for (slot, mv) in root_moves.iter_mut().zip(ordered) {
            slot.mv = mv;
        }

        let mut best_move = root_moves[0].mv;
        let mut best_score: Option<i32> = None;
        let mut depth_reached = 0u8;
        let mut pv = vec![best_move.position];

        for depth in 1..=target {
            if self.should_stop() {
                break;
            }

            // The caller's guess centres the window until an iteration completes
            let guess = best_score.or(limits.initial_guess);
            let score = self.aspiration_search(&mut board, player, &mut root_moves, depth as i32, guess);
            if self.stopped {
                // A partial iteration only counts when nothing finished yet
                if depth_reached == 0 && root_moves[0].score > -INFINITY {
                    best_move = root_moves[0].mv;
                    best_score = Some(root_moves[0].score);
                }
                break;
            }

            best_move = root_moves[0].mv;
            best_score = Some(score);
            depth_reached = depth;
            pv = self.extract_pv(&board, player, depth as usize);

            debug!(
                "depth {} score {} nodes {} best {} time {}ms",
                depth,
                score,
                self.nodes,
                best_move.position,
                self.start.elapsed().as_millis()
            );

            // A solved position will not change with more depth
            if plan.exact && depth as u32 >= empties {
                break;
            }
        }

        let score = match best_score {
            Some(score) => score,
            None => {
                // Not even one root move finished: fall back to a static look
                let token = self.generator.make_move(&mut board, &best_move, player);
                let score = -evaluate(&board, player.opponent());
                self.generator.unmake_move(&mut board, &token);
                score
            }
        };

        SearchResult {
            best_move: Some(best_move.position),
            score,
            nodes: self.nodes,
            depth: depth_reached,
            pv,
            selectivity: self.selectivity,
            completed: depth_reached >= target,
            elapsed: self.start.elapsed(),
            stats: self.stats,
        }
    }

    fn no_move_result(&mut self, board: &Board, player: Player) -> SearchResult {
        self.nodes += 1;
        let score = if board.is_terminal() {
            final_score(board, player)
        } else {
            evaluate(board, player)
        };
        SearchResult {
            best_move: None,
            score,
            nodes: self.nodes,
            depth: 0,
            pv: Vec::new(),
            selectivity: self.selectivity,
            completed: true,
            elapsed: self.start.elapsed(),
            stats: self.stats,
        }
    }

    fn forced_move_result(&mut self, board: &mut Board, player: Player, mv: Move) -> SearchResult {
        self.nodes += 1;
        let token = self.generator.make_move(board, &mv, player);
        let score = if board.is_terminal() {
            -final_score(board, player.opponent())
        } else {
            -evaluate(board, player.opponent())
        };
        self.generator.unmake_move(board, &token);
        SearchResult {
            best_move: Some(mv.position),
            score,
            nodes: self.nodes,
            depth: 1,
            pv: vec![mv.position],
            selectivity: self.selectivity,
            completed: true,
            elapsed: self.start.elapsed(),
            stats: self.stats,
        }
    }

    /// Search one depth, starting with a narrow window around `guess` and
    /// widening on a miss: first by a factor, then to the full range.
    fn aspiration_search(
        &mut self,
        board: &mut Board,
        player: Player,
        root_moves: &mut [RootMove],
        depth: i32,
        guess: Option<i32>,
    ) -> i32 {
        let (mut alpha, mut beta) = match guess {
            Some(g) if g.abs() < DISC_SCORE => {
                (g - ASPIRATION_WINDOW, g + ASPIRATION_WINDOW)
            }
            _ => (-INFINITY, INFINITY),
        };
        let mut widened = false;

        loop {
            let score = self.search_root(board, player, root_moves, depth, alpha, beta);
            if self.stopped {
                return score;
            }

            if score <= alpha && alpha > -INFINITY {
                self.stats.aspiration_researches += 1;
                alpha = match (widened, guess) {
                    (false, Some(g)) => g - ASPIRATION_WINDOW * ASPIRATION_WIDEN,
                    _ => -INFINITY,
                };
                widened = true;
            } else if score >= beta && beta < INFINITY {
                self.stats.aspiration_researches += 1;
                beta = match (widened, guess) {
                    (false, Some(g)) => g + ASPIRATION_WINDOW * ASPIRATION_WIDEN,
                    _ => INFINITY,
                };
                widened = true;
            } else {
                return score;
            }
        }
    }

    /// PVS over the root move list. The first move gets the full window, the
    /// rest are scouted with a null window and re-searched only when they
    /// beat alpha. On return the best move is at the front of the list.
    fn search_root(
        &mut self,
        board: &mut Board,
        player: Player,
        root_moves: &mut [RootMove],
        depth: i32,
        mut alpha: i32,
        beta: i32,
    ) -> i32 {
        self.nodes += 1;
        let original_alpha = alpha;
        let opponent = player.opponent();
        let mut best_score = -INFINITY;
        let mut best_index = 0usize;

        for i in 0..root_moves.len() {
            let mv = root_moves[i].mv;
            let token = self.generator.make_move(board, &mv, player);

            let score = if i == 0 || !self.params.use_nws {
                -self.pvs(board, opponent, depth - 1, -beta, -alpha, 1)
            } else {
                let scout = -self.nws(board, opponent, depth - 1, -alpha, 1);
                if scout > alpha && scout < beta {
                    -self.pvs(board, opponent, depth - 1, -beta, -alpha, 1)
                } else {
                    scout
                }
            };

            self.generator.unmake_move(board, &token);
            if self.stopped {
                break;
            }

            root_moves[i].score = score;
            if score > best_score {
                best_score = score;
                best_index = i;
                if score > alpha {
                    alpha = score;
                }
            }
            if alpha >= beta {
                break;
            }
        }

        if best_index > 0 {
            root_moves[..=best_index].rotate_right(1);
        }

        if !self.stopped && best_score > -INFINITY {
            let bound = Bound::classify(best_score, original_alpha, beta);
            let best_sq = root_moves[0].mv.square() as u8;
            self.tt.store(board.hash(player), depth, best_score, bound, Some(best_sq));
        }

        best_score
    }

    // ========================================================================
    // PRINCIPAL VARIATION SEARCH
    // ========================================================================

    fn pvs(&mut self, board: &mut Board, player: Player, depth: i32, mut alpha: i32, beta: i32, ply: usize) -> i32 {
        if self.should_stop() {
            return 0;
        }
        self.nodes += 1;

        let opponent = player.opponent();
        if board.valid_moves(player) == 0 {
            if !board.has_moves(opponent) {
                return final_score(board, player);
            }
            // A pass does not use up depth
            return -self.pvs(board, opponent, depth, -beta, -alpha, ply);
        }

        if depth <= 0 {
            return evaluate(board, player);
        }

        let key = board.hash(player);
        let original_alpha = alpha;
        let mut tt_move = None;
        if let Some(entry) = self.tt.probe(key) {
            if let Some(score) = entry.cutoff(depth, alpha, beta) {
                self.stats.tt_cutoffs += 1;
                return score;
            }
            tt_move = entry.best_move;
        }

        let mut moves = self.generator.generate_moves(board, player);
        self.orderer.order_moves(&mut moves, ply, player, board, tt_move);

        let static_eval = if !self.params.use_nws && depth <= SHALLOW_DEPTH {
            Some(evaluate(board, player))
        } else {
            None
        };

        let mut best_score = -INFINITY;
        let mut best_sq: Option<u8> = None;

        for (i, mv) in moves.iter().enumerate() {
            // Without scouting, late moves are pruned here instead of in NWS
            if i > 0 && !self.params.use_nws && self.prune_late_move(mv, i, depth, alpha, static_eval, ply) {
                continue;
            }

            let token = self.generator.make_move(board, mv, player);
            let score = if i == 0 || !self.params.use_nws {
                -self.pvs(board, opponent, depth - 1, -beta, -alpha, ply + 1)
            } else {
                let scout = -self.nws(board, opponent, depth - 1, -alpha, ply + 1);
                if scout > alpha && scout < beta {
                    -self.pvs(board, opponent, depth - 1, -beta, -alpha, ply + 1)
                } else {
                    scout
                }
            };
            self.generator.unmake_move(board, &token);

            if self.stopped {
                return best_score.max(score);
            }

            if score > best_score {
                best_score = score;
                best_sq = Some(mv.square() as u8);
                if score > alpha {
                    alpha = score;
                }
            }
            if alpha >= beta {
                self.record_cutoff(player, mv, depth, ply);
                break;
            }
        }

        if best_score == -INFINITY {
            return alpha;
        }

        let bound = Bound::classify(best_score, original_alpha, beta);
        self.tt.store(key, depth, best_score, bound, best_sq);
        best_score
    }

    // ========================================================================
    // NULL-WINDOW SEARCH
    // ========================================================================

    /// Test whether the position is worth at least `beta`, searching the
    /// window `[beta - 1, beta]`. Never widens its own window.
    fn nws(&mut self, board: &mut Board, player: Player, depth: i32, beta: i32, ply: usize) -> i32 {
        if self.should_stop() {
            return 0;
        }
        self.nodes += 1;

        let alpha = beta - 1;
        let opponent = player.opponent();
        if board.valid_moves(player) == 0 {
            if !board.has_moves(opponent) {
                return final_score(board, player);
            }
            return -self.nws(board, opponent, depth, -alpha, ply);
        }

        if depth <= 0 {
            return evaluate(board, player);
        }

        let key = board.hash(player);
        let mut tt_move = None;
        if let Some(entry) = self.tt.probe(key) {
            if let Some(score) = entry.cutoff(depth, alpha, beta) {
                self.stats.tt_cutoffs += 1;
                return score;
            }
            tt_move = entry.best_move;
        }

        let static_eval = if depth <= SHALLOW_DEPTH || self.params.stability_reduction {
            Some(evaluate(board, player))
        } else {
            None
        };

        // Razoring: near the leaves, hopeless positions return their static score
        if let (Some(margin), Some(eval)) = (self.params.razor_margin, static_eval) {
            if depth <= SHALLOW_DEPTH && eval + margin * depth < alpha {
                self.stats.razor_cuts += 1;
                return eval;
            }
        }

        if let Some(score) = self.stability_cut(board, player, depth, beta, static_eval, ply) {
            self.stats.stability_cuts += 1;
            return score;
        }

        let mut moves = self.generator.generate_moves(board, player);
        self.orderer.order_moves(&mut moves, ply, player, board, tt_move);

        let mut best_score = -INFINITY;
        let mut best_sq: Option<u8> = None;

        for (i, mv) in moves.iter().enumerate() {
            if i > 0 && self.prune_late_move(mv, i, depth, alpha, static_eval, ply) {
                continue;
            }

            let token = self.generator.make_move(board, mv, player);
            let reduction = self.late_move_reduction(mv, i, depth, ply);
            let mut score = if reduction > 0 {
                -self.nws(board, opponent, (depth - 1 - reduction).max(1), -alpha, ply + 1)
            } else {
                -self.nws(board, opponent, depth - 1, -alpha, ply + 1)
            };
            // Verify a reduced fail-high at full depth
            if reduction > 0 && score >= beta && !self.stopped {
                self.stats.lmr_researches += 1;
                score = -self.nws(board, opponent, depth - 1, -alpha, ply + 1);
            }
            self.generator.unmake_move(board, &token);

            if self.stopped {
                return best_score.max(score);
            }

            if score > best_score {
                best_score = score;
                best_sq = Some(mv.square() as u8);
            }
            if score >= beta {
                self.record_cutoff(player, mv, depth, ply);
                break;
            }
        }

        if best_score == -INFINITY {
            return alpha;
        }

        let bound = Bound::classify(best_score, alpha, beta);
        self.tt.store(key, depth, best_score, bound, best_sq);
        best_score
    }

    // ========================================================================
    // PRUNING HELPERS
    // ========================================================================

    /// Late-move and futility pruning for a move that is not the first
    fn prune_late_move(
        &mut self,
        mv: &Move,
        index: usize,
        depth: i32,
        alpha: i32,
        static_eval: Option<i32>,
        ply: usize,
    ) -> bool {
        if mv.is_corner() || self.orderer.killers.is_killer(ply, mv.square()) {
            return false;
        }

        if let Some(bonus) = self.params.lmp_bonus {
            if (depth as usize) < LMP_COUNTS.len() && index >= LMP_COUNTS[depth as usize] + bonus {
                self.stats.late_move_prunes += 1;
                return true;
            }
        }

        if let (Some(margin), Some(eval)) = (self.params.futility_margin, static_eval) {
            if depth <= SHALLOW_DEPTH && eval + margin * depth <= alpha {
                self.stats.futility_prunes += 1;
                return true;
            }
        }

        false
    }

    fn late_move_reduction(&self, mv: &Move, index: usize, depth: i32, ply: usize) -> i32 {
        if self.params.lmr_base == 0
            || depth < LMR_MIN_DEPTH
            || index < LMR_FULL_DEPTH_MOVES
            || mv.is_corner()
            || self.orderer.killers.is_killer(ply, mv.square())
        {
            return 0;
        }
        self.params.lmr_base + i32::from(index >= LMR_DEEP_MOVE)
    }

    /// Far from the end of the game, a shallow null-window search with a
    /// margin beyond the bound may stand in for the full search, as long as
    /// its score is nowhere near a decided game.
    fn stability_cut(
        &mut self,
        board: &mut Board,
        player: Player,
        depth: i32,
        beta: i32,
        static_eval: Option<i32>,
        ply: usize,
    ) -> Option<i32> {
        if !self.params.stability_reduction || depth < STABILITY_MIN_DEPTH {
            return None;
        }
        let empties = board.empty_count() as i32;
        if empties - depth < STABILITY_FAR_FROM_END {
            return None;
        }
        let eval = static_eval?;
        let shallow_depth = depth / 2;

        if eval >= beta {
            let bound = beta + STABILITY_MARGIN;
            let shallow = self.nws(board, player, shallow_depth, bound, ply);
            if !self.stopped && shallow >= bound && shallow.abs() < STABILITY_CALM_LIMIT {
                return Some(beta);
            }
        } else {
            let bound = beta - 1 - STABILITY_MARGIN;
            let shallow = self.nws(board, player, shallow_depth, bound + 1, ply);
            if !self.stopped && shallow <= bound && shallow.abs() < STABILITY_CALM_LIMIT {
                return Some(beta - 1);
            }
        }
        None
    }

    fn record_cutoff(&mut self, player: Player, mv: &Move, depth: i32, ply: usize) {
        self.orderer.killers.record(ply, mv.square());
        self.orderer.history.record(player, mv.square(), depth);
    }

    /// Poll the deadline and stop flag once per `STOP_POLL_INTERVAL` nodes
    fn should_stop(&mut self) -> bool {
        if self.stopped {
            return true;
        }
        if self.nodes >= self.next_poll {
            self.next_poll = self.nodes + STOP_POLL_INTERVAL;
            let timed_out = self.deadline.map_or(false, |d| Instant::now() >= d);
            let requested = self
                .stop
                .as_ref()
                .map_or(false, |flag| flag.load(Ordering::Relaxed));
            if timed_out || requested {
                trace!("search stopped after {} nodes", self.nodes);
                self.stopped = true;
            }
        }
        self.stopped
    }

    /// Follow best moves through the transposition table
    fn extract_pv(&self, board: &Board, player: Player, depth: usize) -> Vec<Position> {
        let mut pv = Vec::new();
        let mut seen = HashSet::new();
        let mut board = board.clone();
        let mut side = player;

        for _ in 0..depth.min(MAX_PV_LENGTH) {
            if !board.has_moves(side) {
                if !board.has_moves(side.opponent()) {
                    break;
                }
                side = side.opponent();
            }
            let key = board.hash(side);
            if !seen.insert(key) {
                break;
            }
            let Some(sq) = self.tt.probe(key).and_then(|e| e.best_move) else {
                break;
            };
            let pos = Position::from_square(sq as usize);
            if board.apply_move(pos.row as usize, pos.col as usize, side).is_none() {
                break;
            }
            pv.push(pos);
            side = side.opponent();
        }

        pv
    }
}
