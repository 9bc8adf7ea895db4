//! OpusOthello - Othello Search Engine
//!
//! An Othello engine written in Rust with support for:
//! - Bitboard representation with O(1) move undo
//! - Phase-weighted static evaluation
//! - Iterative-deepening principal variation search with null-window scouts
//! - Transposition table and killer/history move ordering
//! - Difficulty levels mapped to search depth and pruning selectivity
//! - A worker pool running single or distributed root searches under a
//!   shared deadline, with early stop and cancellation
//! - A JSON-lines driver (see `protocol`)

pub mod types;
pub mod error;
pub mod bitboard;
pub mod board;
pub mod move_generator;
pub mod evaluation;
pub mod selectivity;
pub mod tt;
pub mod ordering;
pub mod search;
pub mod strategy;
pub mod worker;
pub mod config;
pub mod worker_pool;
pub mod protocol;

pub use board::{Board, GameCore};
pub use config::PoolConfig;
pub use error::{JobError, MoveError, PoolError};
pub use search::{search_best_move, SearchLimits, SearchResult};
pub use strategy::{SearchStrategy, StrategyRegistry};
pub use types::{Player, Position};
pub use worker::{SearchMode, SearchOptions, SearchRequest, SearchResponse};
pub use worker_pool::{JobHandle, WorkerPool};
