//! OpusOthello - Search Strategies
//!
//! A worker does not call the search directly. It asks a `StrategyRegistry`
//! for the implementation registered under a `(module_ref, export_name)`
//! key, builds it once and keeps it for later jobs. Keys nobody registered
//! resolve to `HeuristicMover`, a one-ply mover that needs no search at all.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};

use crate::board::Board;
use crate::error::StrategyError;
use crate::evaluation::{evaluate, final_score, is_risky_x_square};
use crate::move_generator::MoveGenerator;
use crate::search::{search_best_move, SearchLimits, SearchResult, SearchStats};
use crate::selectivity::Selectivity;
use crate::types::*;

/// Module reference of the strategies shipped with the crate
pub const BUILTIN_MODULE: &str = "builtin";
/// Iterative-deepening PVS search
pub const PVS_EXPORT: &str = "pvs";
/// One-ply heuristic mover
pub const HEURISTIC_EXPORT: &str = "heuristic";

/// Something that picks a move for a position
pub trait SearchStrategy: Send {
    fn name(&self) -> &str;

    fn search(&mut self, board: &Board, player: Player, limits: &SearchLimits) -> SearchResult;
}

/// Identity of a registered strategy
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StrategyKey {
    pub module_ref: String,
    pub export_name: String,
}

impl StrategyKey {
    pub fn new(module_ref: impl Into<String>, export_name: impl Into<String>) -> Self {
        StrategyKey {
            module_ref: module_ref.into(),
            export_name: export_name.into(),
        }
    }

    pub fn builtin_pvs() -> Self {
        StrategyKey::new(BUILTIN_MODULE, PVS_EXPORT)
    }
}

impl fmt::Display for StrategyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module_ref, self.export_name)
    }
}

type StrategyFactory = Arc<dyn Fn() -> Box<dyn SearchStrategy> + Send + Sync>;

/// Table of strategy constructors, cloned into every worker
#[derive(Clone)]
pub struct StrategyRegistry {
    factories: HashMap<StrategyKey, StrategyFactory>,
}

impl StrategyRegistry {
    /// Registry holding only the built-in strategies
    pub fn new() -> Self {
        let mut registry = StrategyRegistry::empty();
        registry.register(BUILTIN_MODULE, PVS_EXPORT, || Box::new(PvsStrategy));
        registry.register(BUILTIN_MODULE, HEURISTIC_EXPORT, || Box::new(HeuristicMover));
        registry
    }

    pub fn empty() -> Self {
        StrategyRegistry {
            factories: HashMap::new(),
        }
    }

    /// Register (or replace) the strategy built by `factory` under a key
    pub fn register<F>(&mut self, module_ref: &str, export_name: &str, factory: F)
    where
        F: Fn() -> Box<dyn SearchStrategy> + Send + Sync + 'static,
    {
        self.factories
            .insert(StrategyKey::new(module_ref, export_name), Arc::new(factory));
    }

    pub fn contains(&self, key: &StrategyKey) -> bool {
        self.factories.contains_key(key)
    }

    /// Build a fresh instance of the strategy registered under `key`
    pub fn resolve(&self, key: &StrategyKey) -> Result<Box<dyn SearchStrategy>, StrategyError> {
        self.factories
            .get(key)
            .map(|factory| factory())
            .ok_or_else(|| StrategyError {
                module_ref: key.module_ref.clone(),
                export_name: key.export_name.clone(),
            })
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        StrategyRegistry::new()
    }
}

/// Per-worker cache of resolved strategies. Each key is resolved at most
/// once; a failed resolution is cached as the fallback mover.
pub struct StrategyCache {
    registry: StrategyRegistry,
    resolved: HashMap<StrategyKey, Box<dyn SearchStrategy>>,
}

impl StrategyCache {
    pub fn new(registry: StrategyRegistry) -> Self {
        StrategyCache {
            registry,
            resolved: HashMap::new(),
        }
    }

    pub fn get(&mut self, key: &StrategyKey) -> &mut dyn SearchStrategy {
        let registry = &self.registry;
        self.resolved
            .entry(key.clone())
            .or_insert_with(|| match registry.resolve(key) {
                Ok(strategy) => {
                    debug!("resolved strategy {} ({})", key, strategy.name());
                    strategy
                }
                Err(err) => {
                    warn!("{}; falling back to the heuristic mover", err);
                    Box::new(HeuristicMover)
                }
            })
            .as_mut()
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

// ============================================================================
// BUILT-IN STRATEGIES
// ============================================================================

/// Full iterative-deepening search
#[derive(Clone, Copy, Debug, Default)]
pub struct PvsStrategy;

impl SearchStrategy for PvsStrategy {
    fn name(&self) -> &str {
        "pvs"
    }

    fn search(&mut self, board: &Board, player: Player, limits: &SearchLimits) -> SearchResult {
        search_best_move(board, player, limits)
    }
}

// Heuristic mover weights
const HEURISTIC_X_PENALTY: i32 = 60;
const HEURISTIC_C_PENALTY: i32 = 25;
const HEURISTIC_CORNER_BONUS: i32 = 80;
const HEURISTIC_FLIP_WEIGHT: i32 = 2;

/// Picks a move with a few cheap rules: take corners, stay off X and C
/// squares next to an empty corner, lean towards the centre, flip more.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicMover;

impl HeuristicMover {
    fn score_move(board: &Board, position: Position, flips: u32) -> i32 {
        let bit = position.bit();
        let mut score = HEURISTIC_FLIP_WEIGHT * flips as i32;

        if bit & crate::bitboard::CORNERS != 0 {
            score += HEURISTIC_CORNER_BONUS;
        }
        if is_risky_x_square(board, position) {
            score -= HEURISTIC_X_PENALTY;
        }
        if bit & crate::bitboard::C_SQUARES != 0 && touches_empty_corner(board, position) {
            score -= HEURISTIC_C_PENALTY;
        }

        // Distance from the centre, 0 for the four middle squares
        let row = position.row as i32;
        let col = position.col as i32;
        let centre = (2 * row - 7).abs().max((2 * col - 7).abs()) / 2;
        score - centre
    }
}

fn touches_empty_corner(board: &Board, position: Position) -> bool {
    let corner_row = if position.row < 4 { 0 } else { 7 };
    let corner_col = if position.col < 4 { 0 } else { 7 };
    let corner = Position::new(corner_row, corner_col);
    board.occupied() & corner.bit() == 0
}

impl SearchStrategy for HeuristicMover {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn search(&mut self, board: &Board, player: Player, limits: &SearchLimits) -> SearchResult {
        let start = Instant::now();
        let generator = MoveGenerator::new();
        let moves: Vec<_> = generator
            .generate_moves(board, player)
            .into_iter()
            .filter(|mv| {
                limits
                    .root_moves
                    .as_ref()
                    .map_or(true, |allowed| allowed.contains(&mv.position))
            })
            .collect();

        let best = moves
            .iter()
            .max_by_key(|mv| (Self::score_move(board, mv.position, mv.flip_count()), Reverse(mv.square())))
            .copied();

        let (best_move, score) = match best {
            Some(mv) => {
                let mut after = board.clone();
                generator.make_move(&mut after, &mv, player);
                let score = if after.is_terminal() {
                    -final_score(&after, player.opponent())
                } else {
                    -evaluate(&after, player.opponent())
                };
                (Some(mv.position), score)
            }
            None => (None, evaluate(board, player)),
        };

        SearchResult {
            best_move,
            score,
            nodes: moves.len() as u64,
            depth: 1,
            pv: best_move.into_iter().collect(),
            selectivity: Selectivity::AGGRESSIVE,
            completed: true,
            elapsed: start.elapsed(),
            stats: SearchStats::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(i32);

    impl SearchStrategy for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn search(&mut self, board: &Board, player: Player, _limits: &SearchLimits) -> SearchResult {
            let mut result = HeuristicMover.search(board, player, &SearchLimits::default());
            result.score = self.0;
            result
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = StrategyRegistry::new();
        assert!(registry.contains(&StrategyKey::builtin_pvs()));
        assert!(registry.contains(&StrategyKey::new(BUILTIN_MODULE, HEURISTIC_EXPORT)));
        assert!(registry.resolve(&StrategyKey::new("nope", "pvs")).is_err());
    }

    #[test]
    fn test_cache_resolves_once_and_falls_back() {
        let mut registry = StrategyRegistry::new();
        registry.register("test", "fixed", || Box::new(Fixed(7)));
        let mut cache = StrategyCache::new(registry);

        let key = StrategyKey::new("test", "fixed");
        assert_eq!(cache.get(&key).name(), "fixed");
        assert_eq!(cache.get(&key).name(), "fixed");
        assert_eq!(cache.len(), 1);

        let missing = StrategyKey::new("test", "missing");
        assert_eq!(cache.get(&missing).name(), "heuristic");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_heuristic_prefers_corner() {
        let board: Board = "
            --------
            -O------
            --X-----
            --------
            ----O---
            -----X--
            --------
            --------"
            .parse()
            .unwrap();
        let result = HeuristicMover.search(&board, Player::Black, &SearchLimits::default());
        assert_eq!(result.best_move, Some(Position::new(0, 0)));
    }

    #[test]
    fn test_heuristic_avoids_x_square() {
        // Black may play the X-square (1,1) or the inner square (1,3)
        let board: Board = "
            --------
            --------
            --OO----
            ---X----
            --------
            --------
            --------
            --------"
            .parse()
            .unwrap();
        let legal = board.legal_positions(Player::Black);
        assert!(legal.contains(&Position::new(1, 1)));
        let result = HeuristicMover.search(&board, Player::Black, &SearchLimits::default());
        assert_ne!(result.best_move, Some(Position::new(1, 1)));
    }

    #[test]
    fn test_heuristic_honours_root_restriction() {
        let limits = SearchLimits {
            root_moves: Some(vec![Position::new(2, 3)]),
            ..SearchLimits::default()
        };
        let result = HeuristicMover.search(&Board::new(), Player::Black, &limits);
        assert_eq!(result.best_move, Some(Position::new(2, 3)));
    }
}
