pub mod demo;

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

pub const DATA_DIR_ENV: &str = "SAGAREPO_DATA_DIR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    Memory,
    Table,
    File,
}

/// Replays a burst of concurrent messages against one saga backend.
#[derive(Debug, Parser)]
#[command(name = "sagarepo", version, about)]
pub struct Args {
    /// Storage backend to exercise
    #[arg(long, value_enum, default_value_t = BackendKind::Memory)]
    pub backend: BackendKind,

    /// Number of messages to deliver
    #[arg(long, default_value_t = 64)]
    pub messages: usize,

    /// Number of distinct correlation ids the messages are spread over
    #[arg(long, default_value_t = 4)]
    pub keys: usize,

    /// Directory for the file backend (falls back to $SAGAREPO_DATA_DIR, then a temp dir)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Per-call backend timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}
