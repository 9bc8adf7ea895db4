//! OpusOthello - Worker Pool
//!
//! This module fans search jobs out over a fixed set of worker threads:
//! - Single jobs go to one free worker, distributed jobs split their root
//!   moves round-robin over several
//! - A control thread owns every slot and job; callers and workers only talk
//!   to it through channels
//! - Each job carries a timer. When it fires, the job's workers are cancelled
//!   and replaced and the job settles with whatever already arrived
//! - A decisive result from any worker ends its job immediately
//! - Reports from replaced workers or finished jobs are dropped

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, error, info, warn};

use crate::board::{Board, GameCore};
use crate::config::PoolConfig;
use crate::error::{JobError, PoolError};
use crate::evaluation::is_risky_x_square;
use crate::search::SearchLimits;
use crate::strategy::{HeuristicMover, SearchStrategy, StrategyRegistry};
use crate::types::*;
use crate::worker::{
    SearchMode, SearchOptions, SearchRequest, SearchResponse, WorkerCommand, WorkerEvent, WorkerHandle,
    WorkerOutcome, WorkerSpawner,
};

/// Share of a distributed budget handed to the workers
const DISTRIBUTED_BUDGET_SHARE: f64 = 0.9;

/// Smallest per-worker budget in a distributed job (ms)
const MIN_WORKER_BUDGET_MS: u64 = 40;

/// Longest the control thread sleeps without a message or timer
const IDLE_TICK: Duration = Duration::from_millis(250);

/// Final outcome of an admitted job
pub type JobResult = Result<SearchResponse, JobError>;

/// Caller's end of an admitted job
pub struct JobHandle {
    id: String,
    result: Receiver<JobResult>,
}

impl JobHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Block until the job settles
    pub fn wait(self) -> JobResult {
        match self.result.recv() {
            Ok(result) => result,
            Err(_) => Err(JobError::PoolDestroyed { id: self.id }),
        }
    }

    /// Block for at most `timeout`; `None` if the job is still running
    pub fn wait_timeout(&self, timeout: Duration) -> Option<JobResult> {
        match self.result.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(JobError::PoolDestroyed { id: self.id.clone() })),
        }
    }

    /// Non-blocking check
    pub fn try_result(&self) -> Option<JobResult> {
        match self.result.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(JobError::PoolDestroyed { id: self.id.clone() })),
        }
    }
}

/// Snapshot of one worker slot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotInfo {
    pub id: usize,
    pub busy: bool,
    pub current_job_id: Option<String>,
    /// False only if the slot's thread could not be respawned
    pub alive: bool,
}

enum Control {
    Submit {
        request: Box<SearchRequest>,
        done: Sender<JobResult>,
        reply: Sender<Result<(), PoolError>>,
    },
    Cancel {
        id: String,
        reply: Sender<bool>,
    },
    Slots {
        reply: Sender<Vec<SlotInfo>>,
    },
    Shutdown,
}

// ============================================================================
// PUBLIC POOL
// ============================================================================

pub struct WorkerPool {
    control: Sender<Control>,
    thread: Option<JoinHandle<()>>,
    next_job: AtomicU64,
    config: PoolConfig,
}

impl WorkerPool {
    /// Pool using the built-in strategies
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        WorkerPool::with_registry(config, StrategyRegistry::new())
    }

    /// Pool whose workers resolve strategies from `registry`
    pub fn with_registry(config: PoolConfig, registry: StrategyRegistry) -> Result<Self, PoolError> {
        config.validate()?;

        let (events_tx, events_rx) = unbounded();
        let (control_tx, control_rx) = unbounded();
        let spawner = WorkerSpawner {
            registry,
            default_key: config.strategy_key(),
            default_time_limit: config.worker_timeout,
            events: events_tx,
        };

        let mut slots = Vec::with_capacity(config.pool_size);
        for id in 0..config.pool_size {
            slots.push(Slot {
                id,
                busy: false,
                current_job: None,
                worker: Some(spawner.spawn(id, id as u64)?),
            });
        }

        let manager = Manager {
            config: config.clone(),
            spawner,
            slots,
            jobs: HashMap::new(),
            next_generation: config.pool_size as u64,
        };
        let thread = thread::Builder::new()
            .name("othello-pool".to_string())
            .spawn(move || manager.run(control_rx, events_rx))?;

        info!(
            "worker pool started with {} workers (strategy {})",
            config.pool_size,
            config.strategy_key()
        );

        Ok(WorkerPool {
            control: control_tx,
            thread: Some(thread),
            next_job: AtomicU64::new(1),
            config,
        })
    }

    pub fn size(&self) -> usize {
        self.config.pool_size
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn next_id(&self) -> String {
        format!("job-{}", self.next_job.fetch_add(1, Ordering::Relaxed))
    }

    /// Run one full search on one free worker
    pub fn search_single(
        &self,
        game: &GameCore,
        player: Player,
        options: SearchOptions,
    ) -> Result<JobHandle, PoolError> {
        self.submit(SearchRequest {
            id: self.next_id(),
            mode: SearchMode::Single,
            player,
            game_core: game.clone(),
            options,
            root_moves: None,
        })
    }

    /// Split `root_moves` (all legal moves if `None`) across free workers
    pub fn search_distributed(
        &self,
        game: &GameCore,
        player: Player,
        options: SearchOptions,
        root_moves: Option<Vec<Position>>,
    ) -> Result<JobHandle, PoolError> {
        self.submit(SearchRequest {
            id: self.next_id(),
            mode: SearchMode::Distributed,
            player,
            game_core: game.clone(),
            options,
            root_moves,
        })
    }

    /// Admit a fully formed request. Fails at once if no worker is free.
    pub fn submit(&self, request: SearchRequest) -> Result<JobHandle, PoolError> {
        if self.thread.is_none() {
            return Err(PoolError::Destroyed);
        }
        let id = request.id.clone();
        let (done, result) = bounded(1);
        let (reply, admitted) = bounded(1);
        self.control
            .send(Control::Submit {
                request: Box::new(request),
                done,
                reply,
            })
            .map_err(|_| PoolError::Destroyed)?;

        admitted.recv().map_err(|_| PoolError::Destroyed)??;
        Ok(JobHandle { id, result })
    }

    /// Cancel a running job. Returns false if no such job is running.
    pub fn cancel_job(&self, id: &str) -> bool {
        let (reply, answer) = bounded(1);
        let sent = self.control.send(Control::Cancel {
            id: id.to_string(),
            reply,
        });
        sent.is_ok() && answer.recv().unwrap_or(false)
    }

    pub fn slots(&self) -> Vec<SlotInfo> {
        let (reply, answer) = bounded(1);
        if self.control.send(Control::Slots { reply }).is_err() {
            return Vec::new();
        }
        answer.recv().unwrap_or_default()
    }

    /// Stop every worker and fail all running jobs. Safe to call twice.
    pub fn destroy(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.control.send(Control::Shutdown);
        if thread.join().is_err() {
            error!("worker pool control thread panicked");
        }
        info!("worker pool destroyed");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.destroy();
    }
}

// ============================================================================
// CONTROL THREAD
// ============================================================================

struct Slot {
    id: usize,
    busy: bool,
    current_job: Option<String>,
    worker: Option<WorkerHandle>,
}

impl Slot {
    fn is_free(&self) -> bool {
        !self.busy && self.worker.is_some()
    }

    fn info(&self) -> SlotInfo {
        SlotInfo {
            id: self.id,
            busy: self.busy,
            current_job_id: self.current_job.clone(),
            alive: self.worker.is_some(),
        }
    }
}

struct Job {
    id: String,
    mode: SearchMode,
    player: Player,
    board: Board,
    started: Instant,
    deadline: Instant,
    assigned: Vec<usize>,
    pending: Vec<usize>,
    responses: Vec<SearchResponse>,
    faults: Vec<String>,
    done: Sender<JobResult>,
}

impl Job {
    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

struct Manager {
    config: PoolConfig,
    spawner: WorkerSpawner,
    slots: Vec<Slot>,
    jobs: HashMap<String, Job>,
    next_generation: u64,
}

impl Manager {
    fn run(mut self, control: Receiver<Control>, events: Receiver<WorkerEvent>) {
        loop {
            let wait = self
                .next_deadline()
                .map_or(IDLE_TICK, |d| d.saturating_duration_since(Instant::now()).min(IDLE_TICK));

            select! {
                recv(control) -> message => match message {
                    Ok(Control::Shutdown) | Err(_) => break,
                    Ok(message) => self.on_control(message),
                },
                recv(events) -> event => {
                    if let Ok(event) = event {
                        self.on_event(event);
                    }
                },
                default(wait) => {},
            }

            self.expire_jobs();
        }
        self.shutdown();
    }

    fn on_control(&mut self, message: Control) {
        match message {
            Control::Submit { request, done, reply } => {
                let admitted = self.admit(*request, done);
                let _ = reply.send(admitted);
            }
            Control::Cancel { id, reply } => {
                let _ = reply.send(self.cancel(&id));
            }
            Control::Slots { reply } => {
                let _ = reply.send(self.slots.iter().map(Slot::info).collect());
            }
            Control::Shutdown => {}
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.jobs.values().map(|job| job.deadline).min()
    }

    // ------------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------------

    fn admit(&mut self, request: SearchRequest, done: Sender<JobResult>) -> Result<(), PoolError> {
        request.validate()?;
        if self.jobs.contains_key(&request.id) {
            return Err(PoolError::InvalidRequest(format!("job {} is already running", request.id)));
        }

        let free: Vec<usize> = self.slots.iter().filter(|s| s.is_free()).map(|s| s.id).collect();
        if free.is_empty() {
            return Err(PoolError::NoAvailableWorkers);
        }

        let started = Instant::now();
        let time_limit = request.options.time_limit.unwrap_or(self.config.worker_timeout);
        let deadline = started + Duration::from_millis(time_limit + self.config.cancel_grace_ms);

        let assignments = match request.mode {
            SearchMode::Single => {
                let mut single = request.clone();
                single.options.time_limit = Some(time_limit);
                vec![(free[0], single)]
            }
            SearchMode::Distributed => self.split_roots(&request, &free, started, time_limit)?,
        };

        let mut assigned = Vec::with_capacity(assignments.len());
        for (slot, worker_request) in assignments {
            if self.dispatch(slot, worker_request) {
                assigned.push(slot);
            }
        }
        if assigned.is_empty() {
            return Err(PoolError::NoAvailableWorkers);
        }

        info!(
            "admitted {:?} job {} on workers {:?} ({}ms)",
            request.mode, request.id, assigned, time_limit
        );

        self.jobs.insert(
            request.id.clone(),
            Job {
                id: request.id,
                mode: request.mode,
                player: request.player,
                board: request.game_core.board,
                started,
                deadline,
                pending: assigned.clone(),
                assigned,
                responses: Vec::new(),
                faults: Vec::new(),
                done,
            },
        );
        Ok(())
    }

    /// Round-robin the root moves over up to `free.len()` workers. Each
    /// worker gets ~90% of the budget divided by the number of workers.
    fn split_roots(
        &self,
        request: &SearchRequest,
        free: &[usize],
        started: Instant,
        time_limit: u64,
    ) -> Result<Vec<(usize, SearchRequest)>, PoolError> {
        let board = &request.game_core.board;
        let legal = board.legal_positions(request.player);
        let mut roots: Vec<Position> = match (&request.root_moves, request.options.root_move) {
            (Some(roots), _) => roots.clone(),
            (None, Some(pin)) => vec![pin],
            (None, None) => legal.clone(),
        };
        roots.retain(|pos| legal.contains(pos));
        if roots.is_empty() {
            return Err(PoolError::InvalidRequest(format!(
                "{} has no legal root moves to distribute",
                request.player
            )));
        }

        let workers = free.len().min(roots.len());
        let budget = ((time_limit as f64 * DISTRIBUTED_BUDGET_SHARE / workers as f64) as u64)
            .max(MIN_WORKER_BUDGET_MS);

        let mut subsets: Vec<Vec<Position>> = vec![Vec::new(); workers];
        for (i, root) in roots.into_iter().enumerate() {
            subsets[i % workers].push(root);
        }

        Ok(free
            .iter()
            .zip(subsets)
            .map(|(&slot, subset)| {
                let mut part = request.clone();
                part.root_moves = Some(subset);
                part.options.root_move = None;
                part.options.time_limit = Some(budget);
                part.options.deadline = Some(started + Duration::from_millis(budget));
                (slot, part)
            })
            .collect())
    }

    fn dispatch(&mut self, slot_id: usize, request: SearchRequest) -> bool {
        let job_id = request.id.clone();
        let command = WorkerCommand::Search(Box::new(request));
        let Some(worker) = self.slots[slot_id].worker.as_ref() else {
            return false;
        };

        if let Err(failed) = worker.commands.send(command) {
            // The thread is gone without having reported it yet
            warn!("worker {} is not accepting jobs, respawning", slot_id);
            self.respawn(slot_id);
            let Some(worker) = self.slots[slot_id].worker.as_ref() else {
                return false;
            };
            if worker.commands.send(failed.into_inner()).is_err() {
                return false;
            }
        }

        let slot = &mut self.slots[slot_id];
        slot.busy = true;
        slot.current_job = Some(job_id);
        true
    }

    // ------------------------------------------------------------------------
    // Worker reports
    // ------------------------------------------------------------------------

    fn on_event(&mut self, event: WorkerEvent) {
        let Some(slot) = self.slots.get_mut(event.slot) else {
            return;
        };
        let current = slot.worker.as_ref().map(|w| w.generation);
        if current != Some(event.generation) {
            debug!(
                "dropping report from retired worker {} generation {}",
                event.slot, event.generation
            );
            return;
        }

        match event.outcome {
            WorkerOutcome::Response(response) => {
                if slot.current_job.as_deref() == Some(response.id.as_str()) {
                    slot.busy = false;
                    slot.current_job = None;
                }
                self.on_response(event.slot, *response);
            }
            WorkerOutcome::Fault { job_id, message } => {
                self.respawn(event.slot);
                self.on_fault(event.slot, &job_id, message);
            }
        }
    }

    fn on_response(&mut self, slot: usize, response: SearchResponse) {
        let threshold = self.config.early_stop_threshold;
        let Some(job) = self.jobs.get_mut(&response.id) else {
            debug!("dropping stale response for job {} from worker {}", response.id, slot);
            return;
        };

        job.pending.retain(|&s| s != slot);
        let decisive = response.success
            && response.best_move.is_some()
            && response.evaluation.map_or(false, |e| e.abs() >= threshold);
        job.responses.push(response);

        if decisive && !job.pending.is_empty() {
            let id = job.id.clone();
            info!("early stop for job {}: decisive result from worker {}", id, slot);
            let index = job.responses.len() - 1;
            self.settle(&id, Some(index));
        } else if job.pending.is_empty() {
            let id = job.id.clone();
            let index = decisive.then(|| job.responses.len() - 1);
            self.settle(&id, index);
        }
    }

    fn on_fault(&mut self, slot: usize, job_id: &str, message: String) {
        let Some(job) = self.jobs.get_mut(job_id) else {
            return;
        };
        job.pending.retain(|&s| s != slot);

        if job.assigned.len() == 1 {
            if let Some(job) = self.jobs.remove(job_id) {
                let elapsed_ms = job.elapsed_ms();
                let _ = job.done.send(Err(JobError::WorkerFault { elapsed_ms, message }));
            }
            return;
        }

        warn!("job {} continues without worker {}: {}", job_id, slot, message);
        job.faults.push(message);
        if job.pending.is_empty() {
            let id = job.id.clone();
            self.settle(&id, None);
        }
    }

    // ------------------------------------------------------------------------
    // Settlement
    // ------------------------------------------------------------------------

    fn expire_jobs(&mut self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .jobs
            .values()
            .filter(|job| job.deadline <= now)
            .map(|job| job.id.clone())
            .collect();

        for id in expired {
            warn!("job {} hit its time limit, cancelling remaining workers", id);
            self.settle(&id, None);
        }
    }

    /// Remove a job, replace any of its workers still running and deliver
    /// the aggregated result
    fn settle(&mut self, id: &str, decisive: Option<usize>) {
        let Some(job) = self.jobs.remove(id) else {
            return;
        };
        for &slot in &job.pending {
            self.respawn(slot);
        }

        let result = aggregate(&job, decisive, self.config.x_square_tolerance);
        match &result {
            Ok(response) => info!(
                "job {} settled: best {:?} eval {:?} nodes {} in {}ms",
                job.id, response.best_move, response.evaluation, response.nodes, response.elapsed
            ),
            Err(err) => warn!("job {} failed: {}", job.id, err),
        }
        let _ = job.done.send(result);
    }

    fn cancel(&mut self, id: &str) -> bool {
        let Some(job) = self.jobs.remove(id) else {
            return false;
        };
        for &slot in &job.pending {
            self.respawn(slot);
        }
        info!("job {} cancelled", id);
        let _ = job.done.send(Err(JobError::Cancelled { id: id.to_string() }));
        true
    }

    /// Tear down the slot's thread (without waiting for it) and start a
    /// fresh one under a new generation
    fn respawn(&mut self, slot_id: usize) {
        let generation = self.next_generation;
        self.next_generation += 1;

        let slot = &mut self.slots[slot_id];
        if let Some(old) = slot.worker.take() {
            old.shutdown(false);
        }
        slot.busy = false;
        slot.current_job = None;

        match self.spawner.spawn(slot_id, generation) {
            Ok(worker) => {
                debug!("worker {} respawned as generation {}", slot_id, generation);
                slot.worker = Some(worker);
            }
            Err(err) => error!("failed to respawn worker {}: {}", slot_id, err),
        }
    }

    fn shutdown(&mut self) {
        for (id, job) in self.jobs.drain() {
            let _ = job.done.send(Err(JobError::PoolDestroyed { id }));
        }
        for slot in &mut self.slots {
            if let Some(worker) = slot.worker.take() {
                worker.shutdown(!slot.busy);
            }
            slot.busy = false;
            slot.current_job = None;
        }
    }
}

// ============================================================================
// AGGREGATION
// ============================================================================

/// Combine the responses of a job into its final answer
fn aggregate(job: &Job, decisive: Option<usize>, tolerance: i32) -> JobResult {
    let elapsed = job.elapsed_ms();
    let nodes: u64 = job.responses.iter().map(|r| r.nodes).sum();

    let candidates: Vec<&SearchResponse> = job
        .responses
        .iter()
        .filter(|r| r.success && r.best_move.is_some() && r.evaluation.is_some())
        .collect();

    let chosen = match decisive {
        Some(index) => &job.responses[index],
        None if !candidates.is_empty() => select_best(&candidates, &job.board, tolerance),
        None => {
            if let Some(passed) = job.responses.iter().find(|r| r.success) {
                passed
            } else if !job.faults.is_empty() {
                return Err(JobError::WorkerFault {
                    elapsed_ms: elapsed,
                    message: job.faults.join("; "),
                });
            } else {
                return fallback_move(job, elapsed);
            }
        }
    };

    let mut response = chosen.clone();
    response.id = job.id.clone();
    response.mode = job.mode;
    response.player = job.player;
    response.nodes = nodes;
    response.elapsed = elapsed;

    if job.mode == SearchMode::Distributed {
        response.roots_tried = Some(job.responses.iter().filter_map(|r| r.roots_tried).sum());
        let mut merged: Vec<_> = job
            .responses
            .iter()
            .filter_map(|r| r.root_best.as_ref())
            .flatten()
            .copied()
            .collect();
        merged.sort_by_key(|root| std::cmp::Reverse(root.evaluation));
        response.root_best = Some(merged);
    }

    Ok(response)
}

/// Highest evaluation, unless it plays an X-square next to an empty corner
/// and a safer answer is within `tolerance` of it
fn select_best<'a>(candidates: &[&'a SearchResponse], board: &Board, tolerance: i32) -> &'a SearchResponse {
    let eval = |r: &SearchResponse| r.evaluation.unwrap_or(-INFINITY);
    let risky = |r: &SearchResponse| r.best_move.map_or(false, |pos| is_risky_x_square(board, pos));

    let mut best = candidates[0];
    for &candidate in &candidates[1..] {
        if eval(candidate) > eval(best) {
            best = candidate;
        }
    }

    if risky(best) {
        let safe = candidates
            .iter()
            .copied()
            .filter(|r| !risky(r))
            .fold(None::<&SearchResponse>, |acc, r| match acc {
                Some(a) if eval(a) >= eval(r) => Some(a),
                _ => Some(r),
            });
        if let Some(safe) = safe {
            if eval(best) - eval(safe) <= tolerance {
                return safe;
            }
        }
    }
    best
}

/// Nothing arrived before the timer: answer with the one-ply mover so the
/// caller still gets a move
fn fallback_move(job: &Job, elapsed: u64) -> JobResult {
    if !job.board.has_moves(job.player) {
        return Err(JobError::TimedOut { elapsed_ms: elapsed });
    }
    let result = HeuristicMover.search(&job.board, job.player, &SearchLimits::default());
    warn!("job {} produced no worker result, using heuristic move", job.id);
    Ok(SearchResponse {
        id: job.id.clone(),
        worker_id: job.assigned.first().copied().unwrap_or_default(),
        success: true,
        mode: job.mode,
        player: job.player,
        best_move: result.best_move,
        evaluation: Some(result.score),
        nodes: result.nodes,
        pv: result.pv,
        elapsed,
        error: None,
        roots_tried: None,
        root_best: None,
        depth: Some(result.depth),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(worker_id: usize, best: Position, evaluation: i32, nodes: u64) -> SearchResponse {
        SearchResponse {
            id: "j".into(),
            worker_id,
            success: true,
            mode: SearchMode::Distributed,
            player: Player::Black,
            best_move: Some(best),
            evaluation: Some(evaluation),
            nodes,
            pv: vec![best],
            elapsed: 1,
            error: None,
            roots_tried: Some(1),
            root_best: None,
            depth: Some(3),
        }
    }

    fn make_job(responses: Vec<SearchResponse>, board: Board) -> Job {
        let (done, _) = bounded(1);
        Job {
            id: "j".into(),
            mode: SearchMode::Distributed,
            player: Player::Black,
            board,
            started: Instant::now(),
            deadline: Instant::now(),
            assigned: (0..responses.len()).collect(),
            pending: Vec::new(),
            responses,
            faults: Vec::new(),
            done,
        }
    }

    #[test]
    fn test_aggregate_takes_max_and_sums_nodes() {
        let job = make_job(
            vec![
                response(0, Position::new(2, 3), 5, 100),
                response(1, Position::new(3, 2), 12, 250),
                response(2, Position::new(4, 5), -3, 40),
            ],
            Board::new(),
        );
        let result = aggregate(&job, None, 20).unwrap();
        assert_eq!(result.evaluation, Some(12));
        assert_eq!(result.best_move, Some(Position::new(3, 2)));
        assert_eq!(result.nodes, 390);
        assert_eq!(result.roots_tried, Some(3));
    }

    #[test]
    fn test_x_square_loses_close_call() {
        let board = Board::new();
        let risky = response(0, Position::new(1, 1), 30, 1);
        let safe = response(1, Position::new(2, 3), 15, 1);
        let job = make_job(vec![risky.clone(), safe.clone()], board.clone());
        let result = aggregate(&job, None, 20).unwrap();
        assert_eq!(result.best_move, Some(Position::new(2, 3)));

        // Beyond the tolerance the X-square stands
        let far = response(1, Position::new(2, 3), 5, 1);
        let job2 = make_job(vec![risky, far], board);
        let result = aggregate(&job2, None, 20).unwrap();
        assert_eq!(result.best_move, Some(Position::new(1, 1)));
    }

    #[test]
    fn test_decisive_result_wins() {
        let job = make_job(
            vec![
                response(0, Position::new(2, 3), 40, 10),
                response(1, Position::new(3, 2), 3000, 20),
            ],
            Board::new(),
        );
        let result = aggregate(&job, Some(1), 20).unwrap();
        assert_eq!(result.evaluation, Some(3000));
        assert_eq!(result.nodes, 30);
    }

    #[test]
    fn test_empty_job_falls_back_to_heuristic() {
        let job = make_job(Vec::new(), Board::new());
        let result = aggregate(&job, None, 20).unwrap();
        let legal = Board::new().legal_positions(Player::Black);
        assert!(legal.contains(&result.best_move.unwrap()));
    }

    #[test]
    fn test_faults_only_is_an_error() {
        let mut job = make_job(Vec::new(), Board::new());
        job.faults.push("boom".into());
        assert!(matches!(aggregate(&job, None, 20), Err(JobError::WorkerFault { .. })));
    }
}
