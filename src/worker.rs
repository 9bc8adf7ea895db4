//! OpusOthello - Worker Runtime
//!
//! This module holds what a single pool worker runs:
//! - The job payloads exchanged with the pool (`SearchRequest`,
//!   `SearchOptions`, `SearchResponse`)
//! - `WorkerRuntime`, which resolves the strategy for a job and runs it in
//!   single mode (one full search) or distributed mode (warm-up scan of the
//!   assigned roots, then deeper searches of the most promising ones)
//! - The worker thread loop, which turns panics into fault reports
//!
//! Every schedule is bounded by one absolute deadline. A result that comes
//! back after its slice ran out is still kept.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, trace};
use serde::{Deserialize, Serialize};

use crate::board::{Board, GameCore};
use crate::error::PoolError;
use crate::evaluation::{evaluate, final_score};
use crate::search::{SearchLimits, SearchResult, DEFAULT_TT_CAPACITY};
use crate::selectivity::{DEFAULT_LEVEL, MAX_LEVEL};
use crate::strategy::{SearchStrategy, StrategyCache, StrategyKey, StrategyRegistry};
use crate::types::*;

/// Fraction of a single-mode budget held back for reporting
pub const SINGLE_TIME_BUFFER: f64 = 0.08;
pub const DEFAULT_WARMUP_SHARE: f64 = 0.15;
pub const DEFAULT_MIN_SLICE_MS: u64 = 40;
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_MAX_SINGLE_SHARE: f64 = 0.45;

// ============================================================================
// JOB PAYLOADS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Single,
    Distributed,
}

/// Per-request knobs. Every key is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchOptions {
    /// Budget in ms
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth_limit: Option<u8>,
    /// Difficulty, 0..=10
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_module_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_export_name: Option<String>,
    /// Only search this root move
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_move: Option<Position>,
    /// Absolute cutoff set by the pool; never crosses the wire
    #[serde(skip)]
    pub deadline: Option<Instant>,
    /// Split the budget evenly across roots instead of warm-up then deepen
    pub distributed_fair_share: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distributed_top_k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warmup_share: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_slice_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_single_share: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_guess: Option<i32>,
}

impl SearchOptions {
    /// Strategy named by the request, or `default` for any missing part
    pub fn strategy_key(&self, default: &StrategyKey) -> StrategyKey {
        StrategyKey::new(
            self.engine_module_ref
                .clone()
                .unwrap_or_else(|| default.module_ref.clone()),
            self.engine_export_name
                .clone()
                .unwrap_or_else(|| default.export_name.clone()),
        )
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if self.time_limit == Some(0) {
            return Err(PoolError::InvalidRequest("timeLimit must be positive".into()));
        }
        if let Some(level) = self.level {
            if level > MAX_LEVEL {
                return Err(PoolError::InvalidRequest(format!(
                    "level must be at most {}, got {}",
                    MAX_LEVEL, level
                )));
            }
        }
        if let Some(pos) = self.root_move {
            if !pos.is_valid() {
                return Err(PoolError::InvalidRequest(format!("rootMove {:?} is off the board", pos)));
            }
        }
        for (name, share) in [("warmupShare", self.warmup_share), ("maxSingleShare", self.max_single_share)] {
            if let Some(share) = share {
                if !(share > 0.0 && share <= 1.0) {
                    return Err(PoolError::InvalidRequest(format!("{} must be in (0, 1]", name)));
                }
            }
        }
        if self.distributed_top_k == Some(0) {
            return Err(PoolError::InvalidRequest("distributedTopK must be positive".into()));
        }
        Ok(())
    }
}

/// A job as handed to one worker
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub id: String,
    pub mode: SearchMode,
    pub player: Player,
    pub game_core: GameCore,
    #[serde(default)]
    pub options: SearchOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_moves: Option<Vec<Position>>,
}

impl SearchRequest {
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.id.is_empty() {
            return Err(PoolError::InvalidRequest("id must not be empty".into()));
        }
        self.options.validate()?;
        if let Some(roots) = &self.root_moves {
            if let Some(bad) = roots.iter().find(|p| !p.is_valid()) {
                return Err(PoolError::InvalidRequest(format!("root move {:?} is off the board", bad)));
            }
        }
        Ok(())
    }
}

/// Outcome of one root move in a distributed schedule
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootScore {
    pub position: Position,
    pub evaluation: i32,
    pub nodes: u64,
    pub depth: u8,
}

/// What a worker (and, after aggregation, the pool) reports for a job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub id: String,
    pub worker_id: usize,
    pub success: bool,
    pub mode: SearchMode,
    pub player: Player,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_move: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<i32>,
    pub nodes: u64,
    pub pv: Vec<Position>,
    /// Milliseconds
    pub elapsed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots_tried: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_best: Option<Vec<RootScore>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u8>,
}

impl SearchResponse {
    pub fn failure(
        id: impl Into<String>,
        worker_id: usize,
        mode: SearchMode,
        player: Player,
        elapsed: u64,
        message: impl Into<String>,
    ) -> Self {
        SearchResponse {
            id: id.into(),
            worker_id,
            success: false,
            mode,
            player,
            best_move: None,
            evaluation: None,
            nodes: 0,
            pv: Vec::new(),
            elapsed,
            error: Some(message.into()),
            roots_tried: None,
            root_best: None,
            depth: None,
        }
    }
}

// ============================================================================
// RUNTIME
// ============================================================================

/// Per-worker state that survives between jobs: the strategy cache
pub struct WorkerRuntime {
    worker_id: usize,
    strategies: StrategyCache,
    default_key: StrategyKey,
    default_time_limit: u64,
}

impl WorkerRuntime {
    pub fn new(
        worker_id: usize,
        registry: StrategyRegistry,
        default_key: StrategyKey,
        default_time_limit: u64,
    ) -> Self {
        WorkerRuntime {
            worker_id,
            strategies: StrategyCache::new(registry),
            default_key,
            default_time_limit,
        }
    }

    /// Run one job to completion. `stop` is the worker's cancel flag.
    pub fn handle(&mut self, request: &SearchRequest, stop: Option<Arc<AtomicBool>>) -> SearchResponse {
        let key = request.options.strategy_key(&self.default_key);
        let time_limit = request.options.time_limit.unwrap_or(self.default_time_limit);
        let strategy = self.strategies.get(&key);
        trace!(
            "worker {} running {} job {} with {}",
            self.worker_id,
            if request.mode == SearchMode::Single { "single" } else { "distributed" },
            request.id,
            strategy.name()
        );

        match request.mode {
            SearchMode::Single => run_single(self.worker_id, strategy, request, time_limit, stop),
            SearchMode::Distributed => run_distributed(self.worker_id, strategy, request, time_limit, stop),
        }
    }
}

fn scaled(ms: u64, ratio: f64) -> Duration {
    Duration::from_secs_f64(ms as f64 * ratio / 1000.0)
}

fn is_cancelled(stop: &Option<Arc<AtomicBool>>) -> bool {
    stop.as_ref().map_or(false, |flag| flag.load(Ordering::Relaxed))
}

fn limits_for(
    options: &SearchOptions,
    deadline: Instant,
    root_moves: Option<Vec<Position>>,
    initial_guess: Option<i32>,
    stop: &Option<Arc<AtomicBool>>,
) -> SearchLimits {
    SearchLimits {
        level: options.level.unwrap_or(DEFAULT_LEVEL),
        depth_limit: options.depth_limit,
        deadline: Some(deadline),
        root_moves,
        initial_guess,
        stop: stop.clone(),
        tt_capacity: DEFAULT_TT_CAPACITY,
    }
}

/// Score of a position where `player` cannot place a disc
fn immobile_score(board: &Board, player: Player) -> i32 {
    if board.is_terminal() {
        final_score(board, player)
    } else {
        evaluate(board, player)
    }
}

/// One full search against `start + timeLimit * (1 - buffer)`
fn run_single(
    worker_id: usize,
    strategy: &mut dyn SearchStrategy,
    request: &SearchRequest,
    time_limit: u64,
    stop: Option<Arc<AtomicBool>>,
) -> SearchResponse {
    let start = Instant::now();
    let options = &request.options;
    let deadline = options
        .deadline
        .unwrap_or_else(|| start + scaled(time_limit, 1.0 - SINGLE_TIME_BUFFER));
    let root_moves = options
        .root_move
        .map(|pos| vec![pos])
        .or_else(|| request.root_moves.clone());

    let limits = limits_for(options, deadline, root_moves, options.initial_guess, &stop);
    let result = strategy.search(&request.game_core.board, request.player, &limits);

    response_from_result(worker_id, request, &result, start.elapsed())
}

fn response_from_result(
    worker_id: usize,
    request: &SearchRequest,
    result: &SearchResult,
    elapsed: Duration,
) -> SearchResponse {
    SearchResponse {
        id: request.id.clone(),
        worker_id,
        success: true,
        mode: request.mode,
        player: request.player,
        best_move: result.best_move,
        evaluation: Some(result.score),
        nodes: result.nodes,
        pv: result.pv.clone(),
        elapsed: elapsed.as_millis() as u64,
        error: None,
        roots_tried: None,
        root_best: None,
        depth: Some(result.depth),
    }
}

struct RootRecord {
    score: RootScore,
    pv: Vec<Position>,
}

impl RootRecord {
    fn update(&mut self, result: &SearchResult) {
        self.score.evaluation = result.score;
        self.score.nodes += result.nodes;
        self.score.depth = result.depth;
        if !result.pv.is_empty() {
            self.pv = result.pv.clone();
        }
    }
}

fn search_root(
    strategy: &mut dyn SearchStrategy,
    request: &SearchRequest,
    root: Position,
    deadline: Instant,
    guess: Option<i32>,
    stop: &Option<Arc<AtomicBool>>,
) -> SearchResult {
    let limits = limits_for(&request.options, deadline, Some(vec![root]), guess, stop);
    strategy.search(&request.game_core.board, request.player, &limits)
}

/// Evaluate the assigned root moves and report the best of them
fn run_distributed(
    worker_id: usize,
    strategy: &mut dyn SearchStrategy,
    request: &SearchRequest,
    time_limit: u64,
    stop: Option<Arc<AtomicBool>>,
) -> SearchResponse {
    let start = Instant::now();
    let options = &request.options;
    let board = &request.game_core.board;
    let player = request.player;
    let deadline = options
        .deadline
        .unwrap_or_else(|| start + scaled(time_limit, 1.0 - SINGLE_TIME_BUFFER));

    let legal = board.legal_positions(player);
    let mut roots: Vec<Position> = match (options.root_move, &request.root_moves) {
        (Some(pin), _) => vec![pin],
        (None, Some(assigned)) => assigned.clone(),
        (None, None) => legal.clone(),
    };
    roots.retain(|pos| legal.contains(pos));
    roots.dedup();

    if roots.is_empty() {
        return SearchResponse {
            id: request.id.clone(),
            worker_id,
            success: true,
            mode: request.mode,
            player,
            best_move: None,
            evaluation: Some(immobile_score(board, player)),
            nodes: 0,
            pv: Vec::new(),
            elapsed: start.elapsed().as_millis() as u64,
            error: None,
            roots_tried: Some(0),
            root_best: None,
            depth: None,
        };
    }

    let mut records: Vec<RootRecord> = Vec::with_capacity(roots.len());

    if options.distributed_fair_share {
        for (i, &root) in roots.iter().enumerate() {
            let now = Instant::now();
            if is_cancelled(&stop) || (now >= deadline && !records.is_empty()) {
                break;
            }
            let slice = deadline.saturating_duration_since(now) / (roots.len() - i) as u32;
            let result = search_root(strategy, request, root, now + slice, options.initial_guess, &stop);
            records.push(new_record(root, &result));
        }
    } else {
        let warmup_share = options.warmup_share.unwrap_or(DEFAULT_WARMUP_SHARE);
        let min_slice = Duration::from_millis(options.min_slice_ms.unwrap_or(DEFAULT_MIN_SLICE_MS));
        let top_k = options.distributed_top_k.unwrap_or(DEFAULT_TOP_K);
        let max_share = options.max_single_share.unwrap_or(DEFAULT_MAX_SINGLE_SHARE);

        // Stage 1: an equal quick look at every root
        let remaining = deadline.saturating_duration_since(Instant::now());
        let warm_slice = (remaining.mul_f64(warmup_share) / roots.len() as u32).max(min_slice);
        for &root in &roots {
            let now = Instant::now();
            if is_cancelled(&stop) || (now >= deadline && !records.is_empty()) {
                break;
            }
            let result = search_root(strategy, request, root, (now + warm_slice).min(deadline), None, &stop);
            records.push(new_record(root, &result));
        }

        // Stage 2: spend what is left on the best few
        let mut ranked: Vec<usize> = (0..records.len()).collect();
        ranked.sort_by_key(|&i| std::cmp::Reverse(records[i].score.evaluation));
        ranked.truncate(top_k);

        for (n, &index) in ranked.iter().enumerate() {
            let now = Instant::now();
            if is_cancelled(&stop) || now >= deadline {
                break;
            }
            let remaining = deadline.saturating_duration_since(now);
            let left = (ranked.len() - n) as u32;
            let slice = (remaining / left).min(remaining.mul_f64(max_share));
            let root = records[index].score.position;
            let guess = Some(records[index].score.evaluation);
            let result = search_root(strategy, request, root, now + slice, guess, &stop);
            records[index].update(&result);
        }
    }

    if records.is_empty() {
        let elapsed = start.elapsed().as_millis() as u64;
        debug!("worker {} stopped before any root of job {}", worker_id, request.id);
        let mut response = SearchResponse::failure(
            request.id.clone(),
            worker_id,
            request.mode,
            player,
            elapsed,
            "cancelled before any root move was searched",
        );
        response.roots_tried = Some(0);
        return response;
    }

    let nodes = records.iter().map(|r| r.score.nodes).sum();
    let roots_tried = records.len();
    records.sort_by_key(|r| std::cmp::Reverse(r.score.evaluation));

    let elapsed = start.elapsed().as_millis() as u64;
    debug!(
        "worker {} tried {}/{} roots for job {} in {}ms",
        worker_id,
        roots_tried,
        roots.len(),
        request.id,
        elapsed
    );

    let best = &records[0];
    SearchResponse {
        id: request.id.clone(),
        worker_id,
        success: true,
        mode: request.mode,
        player,
        best_move: Some(best.score.position),
        evaluation: Some(best.score.evaluation),
        nodes,
        pv: best.pv.clone(),
        elapsed,
        error: None,
        roots_tried: Some(roots_tried),
        root_best: Some(records.iter().map(|r| r.score).collect()),
        depth: Some(best.score.depth),
    }
}

fn new_record(root: Position, result: &SearchResult) -> RootRecord {
    let pv = if result.pv.is_empty() { vec![root] } else { result.pv.clone() };
    RootRecord {
        score: RootScore {
            position: root,
            evaluation: result.score,
            nodes: result.nodes,
            depth: result.depth,
        },
        pv,
    }
}

// ============================================================================
// WORKER THREAD
// ============================================================================

pub(crate) enum WorkerCommand {
    Search(Box<SearchRequest>),
    Shutdown,
}

pub(crate) enum WorkerOutcome {
    Response(Box<SearchResponse>),
    Fault { job_id: String, message: String },
}

/// Message from a worker thread to the pool's control thread
pub(crate) struct WorkerEvent {
    pub slot: usize,
    pub generation: u64,
    pub outcome: WorkerOutcome,
}

/// The pool's end of one worker thread
pub(crate) struct WorkerHandle {
    pub commands: Sender<WorkerCommand>,
    pub cancel: Arc<AtomicBool>,
    pub generation: u64,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    /// Raise the cancel flag and tell the thread to exit. With `wait` the
    /// call blocks until it has; otherwise the thread is left to finish its
    /// current search and its late report is dropped as stale.
    pub fn shutdown(self, wait: bool) {
        self.cancel.store(true, Ordering::SeqCst);
        let _ = self.commands.send(WorkerCommand::Shutdown);
        if wait {
            let _ = self.thread.join();
        }
    }
}

/// Everything needed to (re)build a worker thread
#[derive(Clone)]
pub(crate) struct WorkerSpawner {
    pub registry: StrategyRegistry,
    pub default_key: StrategyKey,
    pub default_time_limit: u64,
    pub events: Sender<WorkerEvent>,
}

impl WorkerSpawner {
    pub fn spawn(&self, slot: usize, generation: u64) -> io::Result<WorkerHandle> {
        let (commands, inbox) = unbounded();
        let cancel = Arc::new(AtomicBool::new(false));
        let runtime = WorkerRuntime::new(
            slot,
            self.registry.clone(),
            self.default_key.clone(),
            self.default_time_limit,
        );
        let events = self.events.clone();
        let flag = Arc::clone(&cancel);

        let thread = thread::Builder::new()
            .name(format!("othello-worker-{}", slot))
            .spawn(move || worker_loop(runtime, slot, generation, inbox, events, flag))?;

        Ok(WorkerHandle {
            commands,
            cancel,
            generation,
            thread,
        })
    }
}

fn worker_loop(
    mut runtime: WorkerRuntime,
    slot: usize,
    generation: u64,
    inbox: Receiver<WorkerCommand>,
    events: Sender<WorkerEvent>,
    cancel: Arc<AtomicBool>,
) {
    while let Ok(command) = inbox.recv() {
        let request = match command {
            WorkerCommand::Search(request) => request,
            WorkerCommand::Shutdown => break,
        };

        let stop = Some(Arc::clone(&cancel));
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| runtime.handle(&request, stop)));
        let (outcome, fatal) = match outcome {
            Ok(response) => (WorkerOutcome::Response(Box::new(response)), false),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("worker {} crashed on job {}: {}", slot, request.id, message);
                (
                    WorkerOutcome::Fault {
                        job_id: request.id.clone(),
                        message,
                    },
                    true,
                )
            }
        };

        let sent = events.send(WorkerEvent { slot, generation, outcome });
        if sent.is_err() || fatal {
            break;
        }
    }
    trace!("worker {} generation {} exiting", slot, generation);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "worker panicked".to_string()
    }
}
