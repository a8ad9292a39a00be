use std::path::PathBuf;

use crate::flush::FlushPolicy;

/// Where an engine keeps its state and when it makes it durable.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// ParityDB directory holding both sides of the book.
    pub data_dir: PathBuf,
    /// Directory trade artifacts are published into. Created on first flush.
    pub trades_dir: PathBuf,
    pub flush: FlushPolicy,
}

impl EngineConfig {
    pub fn new(data_dir: impl Into<PathBuf>, trades_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            trades_dir: trades_dir.into(),
            flush: FlushPolicy::default(),
        }
    }

    pub fn with_flush(mut self, flush: FlushPolicy) -> Self {
        self.flush = flush;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("lob-data", "trades")
    }
}
