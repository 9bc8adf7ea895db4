//! OpusOthello - JSON Lines Protocol
//!
//! This module implements the line-oriented driver used by the binary.
//! Each input line is one JSON command, each output line one JSON reply:
//!
//! ```text
//! {"type":"search","payload":{"id":"a","mode":"single","player":"black","gameCore":{...}}}
//! {"type":"cancel","payload":{"id":"a"}}
//! {"type":"perft","payload":{"depth":6}}
//! {"type":"bench"}
//! {"type":"quit"}
//! ```
//!
//! Search replies are written when their job settles, so they can arrive
//! after replies to later commands.

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::Result;
use log::{debug, error, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::board::{Board, GameCore};
use crate::move_generator::MoveGenerator;
use crate::search::{search_best_move, SearchLimits};
use crate::types::*;
use crate::worker::{SearchRequest, SearchResponse};
use crate::worker_pool::WorkerPool;

const ENGINE_NAME: &str = "OpusOthello";
const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

// Bench settings
const BENCH_SEEDS: [u64; 3] = [11, 23, 37];
const BENCH_PLIES: usize = 16;
const BENCH_DEPTH: u8 = 7;

/// Deepest perft the driver will run
const MAX_PERFT_DEPTH: u32 = 12;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum Command {
    Search(Box<SearchRequest>),
    Cancel(CancelPayload),
    Perft(PerftPayload),
    Bench,
    Quit,
}

#[derive(Debug, Deserialize)]
pub struct CancelPayload {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct PerftPayload {
    pub depth: u32,
    /// Defaults to the opening position
    #[serde(default)]
    pub board: Option<Board>,
    /// Defaults to black
    #[serde(default)]
    pub player: Option<Player>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum Reply {
    Ready {
        name: &'static str,
        version: &'static str,
        workers: usize,
    },
    Result(SearchResponse),
    Cancelled {
        id: String,
        cancelled: bool,
    },
    Perft {
        depth: u32,
        nodes: u64,
        elapsed: u64,
    },
    Bench {
        nodes: u64,
        elapsed: u64,
        nps: u64,
    },
    Error {
        message: String,
    },
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

fn send(out: &SharedWriter, reply: &Reply) {
    let line = match serde_json::to_string(reply) {
        Ok(line) => line,
        Err(err) => {
            error!("failed to encode reply: {}", err);
            return;
        }
    };
    let Ok(mut out) = out.lock() else {
        error!("output writer poisoned, dropping reply");
        return;
    };
    if let Err(err) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
        error!("failed to write reply: {}", err);
    }
}

/// Protocol handler
pub struct Protocol {
    pool: WorkerPool,
    out: SharedWriter,
    waiters: Vec<JoinHandle<()>>,
    running: bool,
}

impl Protocol {
    pub fn new(pool: WorkerPool, out: Box<dyn Write + Send>) -> Self {
        Protocol {
            pool,
            out: Arc::new(Mutex::new(out)),
            waiters: Vec::new(),
            running: true,
        }
    }

    /// Serve commands from `input` until `quit` or end of input
    pub fn run<R: BufRead>(&mut self, input: R) -> Result<()> {
        send(
            &self.out,
            &Reply::Ready {
                name: ENGINE_NAME,
                version: ENGINE_VERSION,
                workers: self.pool.size(),
            },
        );

        for line in input.lines() {
            let line = line?;
            let line = line.trim();
            if !line.is_empty() {
                self.process_command(line);
            }
            if !self.running {
                break;
            }
        }

        self.finish();
        Ok(())
    }

    fn process_command(&mut self, line: &str) {
        let command = match serde_json::from_str::<Command>(line) {
            Ok(command) => command,
            Err(err) => {
                debug!("rejected input line: {}", line);
                self.send(&Reply::Error {
                    message: format!("malformed command: {}", err),
                });
                return;
            }
        };

        match command {
            Command::Search(request) => self.cmd_search(*request),
            Command::Cancel(payload) => self.cmd_cancel(payload),
            Command::Perft(payload) => self.cmd_perft(payload),
            Command::Bench => self.cmd_bench(),
            Command::Quit => self.running = false,
        }
    }

    fn send(&self, reply: &Reply) {
        send(&self.out, reply);
    }

    fn cmd_search(&mut self, request: SearchRequest) {
        let (id, mode, player) = (request.id.clone(), request.mode, request.player);

        let handle = match self.pool.submit(request) {
            Ok(handle) => handle,
            Err(err) => {
                self.send(&Reply::Result(SearchResponse::failure(id, 0, mode, player, 0, err.to_string())));
                return;
            }
        };

        let out = Arc::clone(&self.out);
        self.waiters.retain(|waiter| !waiter.is_finished());
        self.waiters.push(thread::spawn(move || {
            let response = match handle.wait() {
                Ok(response) => response,
                Err(err) => SearchResponse::failure(id, 0, mode, player, 0, err.to_string()),
            };
            send(&out, &Reply::Result(response));
        }));
    }

    fn cmd_cancel(&mut self, payload: CancelPayload) {
        let cancelled = self.pool.cancel_job(&payload.id);
        self.send(&Reply::Cancelled {
            id: payload.id,
            cancelled,
        });
    }

    fn cmd_perft(&self, payload: PerftPayload) {
        if payload.depth > MAX_PERFT_DEPTH {
            self.send(&Reply::Error {
                message: format!("perft depth must be at most {}", MAX_PERFT_DEPTH),
            });
            return;
        }

        let mut board = payload.board.unwrap_or_default();
        let player = payload.player.unwrap_or(Player::Black);
        let start = Instant::now();
        let nodes = MoveGenerator::new().perft(&mut board, player, payload.depth);

        self.send(&Reply::Perft {
            depth: payload.depth,
            nodes,
            elapsed: start.elapsed().as_millis() as u64,
        });
    }

    fn cmd_bench(&self) {
        let limits = SearchLimits {
            depth_limit: Some(BENCH_DEPTH),
            ..SearchLimits::default()
        };

        let start = Instant::now();
        let mut total_nodes = 0u64;
        for seed in BENCH_SEEDS {
            let game = GameCore::random_playout(&mut StdRng::seed_from_u64(seed), BENCH_PLIES);
            if game.finished {
                continue;
            }
            let result = search_best_move(&game.board, game.current_player, &limits);
            total_nodes += result.nodes;
        }

        let elapsed = start.elapsed();
        let secs = elapsed.as_secs_f64();
        let nps = if secs > 0.0 { (total_nodes as f64 / secs) as u64 } else { 0 };
        info!("bench: {} nodes in {:.2}s ({} nps)", total_nodes, secs, nps);

        self.send(&Reply::Bench {
            nodes: total_nodes,
            elapsed: elapsed.as_millis() as u64,
            nps,
        });
    }

    /// Wait for outstanding search replies, then stop the pool
    fn finish(&mut self) {
        for waiter in self.waiters.drain(..) {
            if waiter.join().is_err() {
                error!("search reply thread panicked");
            }
        }
        self.pool.destroy();
    }
}
