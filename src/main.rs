//! OpusOthello - Othello Search Engine
//!
//! Usage:
//!     opus_othello [--pool-size N] [--worker-timeout MS] [--config FILE]
//!
//! The engine reads JSON commands from stdin, one per line, and writes JSON
//! replies to stdout. Logs go to stderr.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use opus_othello::protocol::Protocol;
use opus_othello::{PoolConfig, WorkerPool};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON pool configuration file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of worker threads
    #[arg(long)]
    pool_size: Option<usize>,

    /// Default time limit per search in milliseconds
    #[arg(long)]
    worker_timeout: Option<u64>,

    /// Evaluation magnitude that ends a job early
    #[arg(long)]
    early_stop: Option<i32>,

    /// Strategy module reference
    #[arg(long)]
    engine: Option<String>,

    /// Strategy export name
    #[arg(long)]
    export: Option<String>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Args {
    fn pool_config(&self) -> Result<PoolConfig> {
        let mut config = match &self.config {
            Some(path) => PoolConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => PoolConfig::default(),
        };

        if let Some(size) = self.pool_size {
            config.pool_size = size;
        }
        if let Some(timeout) = self.worker_timeout {
            config.worker_timeout = timeout;
        }
        if let Some(threshold) = self.early_stop {
            config.early_stop_threshold = threshold;
        }
        if let Some(engine) = &self.engine {
            config.engine_module_ref = engine.clone();
        }
        if let Some(export) = &self.export {
            config.engine_export_name = export.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, &args.log_level),
    )
    .format(|buf, record| writeln!(buf, "[{}] {}: {}", record.level(), record.target(), record.args()))
    .write_style(env_logger::WriteStyle::Never)
    .target(env_logger::Target::Stderr)
    .init();

    if let Err(e) = run(&args) {
        log::error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let config = args.pool_config()?;
    let pool = WorkerPool::new(config).context("starting worker pool")?;

    let mut protocol = Protocol::new(pool, Box::new(io::stdout()));
    let stdin = io::stdin();
    protocol.run(stdin.lock())
}
