use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use opus_othello::error::{JobError, PoolError};
use opus_othello::search::SearchStats;
use opus_othello::selectivity::Selectivity;
use opus_othello::strategy::{SearchStrategy, StrategyRegistry};
use opus_othello::{Board, GameCore, Player, PoolConfig, Position, SearchLimits, SearchOptions, SearchResult, WorkerPool};

use rand::rngs::StdRng;
use rand::SeedableRng;

fn config(pool_size: usize) -> PoolConfig {
    PoolConfig {
        pool_size,
        ..PoolConfig::default()
    }
}

fn result_for(best: Option<Position>, score: i32, nodes: u64) -> SearchResult {
    SearchResult {
        best_move: best,
        score,
        nodes,
        depth: 1,
        pv: best.into_iter().collect(),
        selectivity: Selectivity::NONE,
        completed: true,
        elapsed: Duration::ZERO,
        stats: SearchStats::default(),
    }
}

/// Answers instantly with a fixed score and node count per root move.
/// Roots not in the table sleep until told to stop.
#[derive(Clone)]
struct FixedScores(HashMap<Position, (i32, u64)>);

impl SearchStrategy for FixedScores {
    fn name(&self) -> &str {
        "fixed"
    }

    fn search(&mut self, board: &Board, player: Player, limits: &SearchLimits) -> SearchResult {
        let roots = limits
            .root_moves
            .clone()
            .unwrap_or_else(|| board.legal_positions(player));
        let known = roots
            .iter()
            .filter_map(|p| self.0.get(p).map(|&(score, nodes)| (*p, score, nodes)))
            .max_by_key(|&(_, score, _)| score);

        match known {
            Some((pos, score, nodes)) => result_for(Some(pos), score, nodes),
            None => {
                let started = Instant::now();
                while started.elapsed() < Duration::from_secs(5) {
                    if limits.stop.as_ref().map_or(false, |f| f.load(Ordering::Relaxed)) {
                        break;
                    }
                    thread::sleep(Duration::from_millis(5));
                }
                result_for(roots.first().copied(), 0, 1)
            }
        }
    }
}

/// Sleeps for a fixed time and ignores every stop request
struct Stubborn(Duration);

impl SearchStrategy for Stubborn {
    fn name(&self) -> &str {
        "stubborn"
    }

    fn search(&mut self, board: &Board, player: Player, _limits: &SearchLimits) -> SearchResult {
        thread::sleep(self.0);
        result_for(board.legal_positions(player).first().copied(), 0, 1)
    }
}

struct Exploding;

impl SearchStrategy for Exploding {
    fn name(&self) -> &str {
        "exploding"
    }

    fn search(&mut self, _board: &Board, _player: Player, _limits: &SearchLimits) -> SearchResult {
        panic!("strategy failure");
    }
}

/// Panics when asked about one root, delegates every other root
struct FaultsOn {
    root: Position,
    otherwise: FixedScores,
}

impl SearchStrategy for FaultsOn {
    fn name(&self) -> &str {
        "faults-on"
    }

    fn search(&mut self, board: &Board, player: Player, limits: &SearchLimits) -> SearchResult {
        if limits.root_moves.as_ref().map_or(false, |roots| roots.contains(&self.root)) {
            panic!("strategy failure on {:?}", self.root);
        }
        self.otherwise.search(board, player, limits)
    }
}

fn test_registry() -> StrategyRegistry {
    let mut scores = HashMap::new();
    scores.insert(Position::new(2, 3), (5, 10));
    scores.insert(Position::new(3, 2), (12, 20));
    scores.insert(Position::new(4, 5), (-3, 30));
    let fixed = FixedScores(scores);

    let mut decisive = HashMap::new();
    decisive.insert(Position::new(2, 3), (5000, 7));
    let decisive = FixedScores(decisive);

    let mut registry = StrategyRegistry::new();
    registry.register("test", "fixed", move || Box::new(fixed.clone()));
    registry.register("test", "decisive", move || Box::new(decisive.clone()));
    registry.register("test", "slow", || Box::new(FixedScores(HashMap::new())));
    registry.register("test", "stubborn", || Box::new(Stubborn(Duration::from_millis(1500))));
    registry.register("test", "exploding", || Box::new(Exploding));
    registry
}

fn strategy(export: &str) -> SearchOptions {
    SearchOptions {
        engine_module_ref: Some("test".into()),
        engine_export_name: Some(export.into()),
        ..SearchOptions::default()
    }
}

#[test]
fn test_opening_scenario() {
    let pool = WorkerPool::new(config(1)).unwrap();
    let options = SearchOptions {
        time_limit: Some(50),
        ..SearchOptions::default()
    };
    let response = pool
        .search_single(&GameCore::new(), Player::Black, options)
        .unwrap()
        .wait()
        .unwrap();

    let openings = [
        Position::new(2, 3),
        Position::new(3, 2),
        Position::new(4, 5),
        Position::new(5, 4),
    ];
    assert!(response.success);
    assert!(openings.contains(&response.best_move.unwrap()));
    assert!(response.evaluation.unwrap().abs() < 200);
}

#[test]
fn test_single_legal_move_scenario() {
    let board: Board = "
        XO------
        --------
        --------
        --------
        --------
        --------
        --------
        --------"
        .parse()
        .unwrap();
    let game = GameCore::from_board(board, Player::Black);
    let pool = WorkerPool::new(config(1)).unwrap();

    for time_limit in [20, 500] {
        let options = SearchOptions {
            time_limit: Some(time_limit),
            ..SearchOptions::default()
        };
        let response = pool.search_single(&game, Player::Black, options).unwrap().wait().unwrap();
        assert_eq!(response.best_move, Some(Position::new(0, 2)));
        assert!(response.nodes <= 2);
    }
}

#[test]
fn test_distributed_aggregation() {
    let pool = WorkerPool::with_registry(config(3), test_registry()).unwrap();
    let options = SearchOptions {
        time_limit: Some(600),
        distributed_fair_share: true,
        ..strategy("fixed")
    };
    let roots = vec![Position::new(2, 3), Position::new(3, 2), Position::new(4, 5)];

    let response = pool
        .search_distributed(&GameCore::new(), Player::Black, options, Some(roots))
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(response.evaluation, Some(12));
    assert_eq!(response.best_move, Some(Position::new(3, 2)));
    assert_eq!(response.nodes, 60);
    assert_eq!(response.roots_tried, Some(3));
    assert_eq!(response.root_best.unwrap().len(), 3);
}

#[test]
fn test_distributed_default_schedule_uses_all_roots() {
    let pool = WorkerPool::new(config(2)).unwrap();
    let options = SearchOptions {
        time_limit: Some(400),
        depth_limit: Some(3),
        ..SearchOptions::default()
    };
    let response = pool
        .search_distributed(&GameCore::new(), Player::Black, options, None)
        .unwrap()
        .wait()
        .unwrap();

    assert!(response.success);
    assert_eq!(response.roots_tried, Some(4));
    assert!(Board::new()
        .legal_positions(Player::Black)
        .contains(&response.best_move.unwrap()));
}

#[test]
fn test_cancellation_frees_slots() {
    let mut pool = WorkerPool::with_registry(config(2), test_registry()).unwrap();
    let options = SearchOptions {
        time_limit: Some(10_000),
        ..strategy("slow")
    };
    let handle = pool.search_single(&GameCore::new(), Player::Black, options).unwrap();
    thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    assert!(pool.cancel_job(handle.id()));
    let outcome = handle.wait_timeout(Duration::from_secs(1)).unwrap();
    assert!(matches!(outcome, Err(JobError::Cancelled { .. })));
    assert!(started.elapsed() < Duration::from_secs(1));

    assert!(pool.slots().iter().all(|slot| !slot.busy && slot.alive));
    assert!(!pool.cancel_job("job-unknown"));

    // The pool keeps working after the cancellation
    let options = SearchOptions {
        time_limit: Some(200),
        ..strategy("fixed")
    };
    let response = pool
        .search_single(&GameCore::new(), Player::Black, options)
        .unwrap()
        .wait()
        .unwrap();
    assert_eq!(response.evaluation, Some(12));

    pool.destroy();
    pool.destroy();
}

#[test]
fn test_no_available_workers() {
    let pool = WorkerPool::with_registry(config(1), test_registry()).unwrap();
    let options = SearchOptions {
        time_limit: Some(10_000),
        ..strategy("slow")
    };
    let busy = pool.search_single(&GameCore::new(), Player::Black, options.clone()).unwrap();

    let second = pool.search_single(&GameCore::new(), Player::Black, options);
    assert!(matches!(second, Err(PoolError::NoAvailableWorkers)));

    assert!(pool.cancel_job(busy.id()));
}

#[test]
fn test_early_stop_on_decisive_result() {
    let pool = WorkerPool::with_registry(config(4), test_registry()).unwrap();
    let options = SearchOptions {
        time_limit: Some(8000),
        distributed_fair_share: true,
        ..strategy("decisive")
    };

    let started = Instant::now();
    let response = pool
        .search_distributed(&GameCore::new(), Player::Black, options, None)
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(response.evaluation, Some(5000));
    assert_eq!(response.best_move, Some(Position::new(2, 3)));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(pool.slots().iter().all(|slot| !slot.busy));
}

#[test]
fn test_hard_cancel_at_time_limit() {
    let pool = WorkerPool::with_registry(config(1), test_registry()).unwrap();
    let options = SearchOptions {
        time_limit: Some(100),
        ..strategy("stubborn")
    };

    let started = Instant::now();
    let response = pool
        .search_single(&GameCore::new(), Player::Black, options)
        .unwrap()
        .wait()
        .unwrap();

    // The stubborn worker is abandoned; the caller still gets a legal move
    assert!(started.elapsed() < Duration::from_millis(1000));
    assert!(response.success);
    assert!(Board::new()
        .legal_positions(Player::Black)
        .contains(&response.best_move.unwrap()));
    assert!(pool.slots().iter().all(|slot| !slot.busy && slot.alive));
}

#[test]
fn test_worker_fault_fails_single_job_and_respawns() {
    let pool = WorkerPool::with_registry(config(1), test_registry()).unwrap();
    let options = SearchOptions {
        time_limit: Some(1000),
        ..strategy("exploding")
    };
    let outcome = pool.search_single(&GameCore::new(), Player::Black, options).unwrap().wait();
    match outcome {
        Err(JobError::WorkerFault { message, .. }) => assert!(message.contains("strategy failure")),
        other => panic!("expected a worker fault, got {:?}", other),
    }

    let options = SearchOptions {
        time_limit: Some(200),
        ..strategy("fixed")
    };
    let response = pool
        .search_single(&GameCore::new(), Player::Black, options)
        .unwrap()
        .wait()
        .unwrap();
    assert!(response.success);
}

#[test]
fn test_deadline_adherence() {
    let pool = WorkerPool::new(config(1)).unwrap();
    let time_limit = 60u64;
    let overhead = Duration::from_millis(150);

    let mut searched = 0;
    for seed in 0..100u64 {
        let plies = 20 + (seed % 20) as usize;
        let game = GameCore::random_playout(&mut StdRng::seed_from_u64(seed), plies);
        if game.finished {
            continue;
        }
        let options = SearchOptions {
            time_limit: Some(time_limit),
            level: Some(10),
            ..SearchOptions::default()
        };
        let started = Instant::now();
        let response = pool
            .search_single(&game, game.current_player, options)
            .unwrap()
            .wait()
            .unwrap();
        assert!(response.success);
        assert!(
            started.elapsed() <= Duration::from_millis(time_limit) + overhead,
            "seed {} took {:?}",
            seed,
            started.elapsed()
        );
        searched += 1;
    }
    assert!(searched >= 90);
}

#[test]
fn test_longer_time_limit_searches_at_least_as_deep() {
    let pool = WorkerPool::new(config(1)).unwrap();
    let game = GameCore::random_playout(&mut StdRng::seed_from_u64(5), 16);
    assert!(!game.finished);

    let mut previous: Option<(u8, u64)> = None;
    for time_limit in [40u64, 160, 640] {
        let options = SearchOptions {
            time_limit: Some(time_limit),
            level: Some(10),
            ..SearchOptions::default()
        };
        let response = pool
            .search_single(&game, game.current_player, options)
            .unwrap()
            .wait()
            .unwrap();
        assert!(response.success);
        let depth = response.depth.unwrap_or(0);
        if let Some((shallower, fewer)) = previous {
            assert!(depth >= shallower, "{}ms reached depth {} < {}", time_limit, depth, shallower);
            assert!(response.nodes >= fewer);
        }
        previous = Some((depth, response.nodes));
    }
}

#[test]
fn test_distributed_job_survives_one_faulting_worker() {
    let mut scores = HashMap::new();
    scores.insert(Position::new(3, 2), (12, 20));
    scores.insert(Position::new(4, 5), (-3, 30));
    let healthy = FixedScores(scores);

    let mut registry = StrategyRegistry::new();
    registry.register("test", "partial", move || {
        Box::new(FaultsOn {
            root: Position::new(2, 3),
            otherwise: healthy.clone(),
        })
    });

    let pool = WorkerPool::with_registry(config(3), registry).unwrap();
    let options = SearchOptions {
        time_limit: Some(600),
        distributed_fair_share: true,
        ..strategy("partial")
    };
    let roots = vec![Position::new(2, 3), Position::new(3, 2), Position::new(4, 5)];

    let response = pool
        .search_distributed(&GameCore::new(), Player::Black, options, Some(roots))
        .unwrap()
        .wait()
        .unwrap();

    assert!(response.success);
    assert_eq!(response.evaluation, Some(12));
    assert_eq!(response.best_move, Some(Position::new(3, 2)));
    assert_eq!(response.nodes, 50);
    assert_eq!(response.roots_tried, Some(2));

    // The faulted worker was replaced
    thread::sleep(Duration::from_millis(20));
    assert!(pool.slots().iter().all(|slot| !slot.busy && slot.alive));
}

#[test]
fn test_destroyed_pool_rejects_work() {
    let mut pool = WorkerPool::new(config(1)).unwrap();
    pool.destroy();
    let outcome = pool.search_single(&GameCore::new(), Player::Black, SearchOptions::default());
    assert!(matches!(outcome, Err(PoolError::Destroyed)));
    assert!(pool.slots().is_empty());
}
