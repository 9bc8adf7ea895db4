//! OpusOthello - Error types

use thiserror::Error;

use crate::types::Player;

/// Reasons a move request is rejected by the board layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoveError {
    #[error("square ({row}, {col}) is off the board")]
    OutOfRange { row: u8, col: u8 },

    #[error("square ({row}, {col}) is already occupied")]
    Occupied { row: u8, col: u8 },

    #[error("placing at ({row}, {col}) captures nothing")]
    NoCaptures { row: u8, col: u8 },

    #[error("it is {expected}'s turn, not {got}'s")]
    WrongTurn { expected: Player, got: Player },

    #[error("the game is already finished")]
    GameFinished,
}

/// Failure to parse a textual board
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoardParseError {
    #[error("expected 64 cells, found {0}")]
    WrongLength(usize),

    #[error("unexpected cell character {0:?}")]
    BadCell(char),

    #[error("black and white masks overlap")]
    Overlap,
}

/// Errors raised synchronously by the worker pool
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("no available workers")]
    NoAvailableWorkers,

    #[error("worker pool has been destroyed")]
    Destroyed,

    #[error("invalid search request: {0}")]
    InvalidRequest(String),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("invalid pool configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Ways an admitted job can end without a move
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("job {id} was cancelled")]
    Cancelled { id: String },

    #[error("worker fault after {elapsed_ms}ms: {message}")]
    WorkerFault { elapsed_ms: u64, message: String },

    #[error("search timed out after {elapsed_ms}ms without any worker result")]
    TimedOut { elapsed_ms: u64 },

    #[error("worker pool was destroyed before job {id} finished")]
    PoolDestroyed { id: String },
}

/// A strategy key that no registered factory answers to
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no search strategy registered as {module_ref}::{export_name}")]
pub struct StrategyError {
    pub module_ref: String,
    pub export_name: String,
}

/// Problems loading or validating pool configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
