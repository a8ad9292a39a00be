//! The trade tape and the artifacts it is flushed into.
//!
//! Artifacts are plain text, one `timestamp,price,quantity,maker_id,taker_id`
//! record per line, no header. Each is written to `<dir>/.tmp`, synced, then
//! linked to `<dir>/<nanos>`, so a reader listing the directory sees either
//! no artifact or a complete one. An existing artifact is never replaced.

use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::warn;

use crate::{
    errors::EngineError,
    trade::{ParseTradeError, Trade},
};

const STAGING_NAME: &str = ".tmp";

/// Trades executed since the last flush, oldest first.
#[derive(Debug, Default)]
pub struct TradeTape {
    trades: Vec<Trade>,
}

impl TradeTape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn as_slice(&self) -> &[Trade] {
        &self.trades
    }

    /// Swap in an empty buffer, handing back the old one whole.
    pub fn replace(&mut self) -> Vec<Trade> {
        std::mem::take(&mut self.trades)
    }
}

/// Publishes the tape into a trades directory.
#[derive(Debug, Clone)]
pub struct TradeWriter {
    dir: PathBuf,
}

impl TradeWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write every trade on `tape` to a new artifact named `stamp`.
    ///
    /// Returns `None` without touching the filesystem when the tape is empty.
    /// Fails with [`io::ErrorKind::AlreadyExists`] inside
    /// [`EngineError::ArtifactWrite`] if an artifact named `stamp` is present.
    /// The tape itself is left alone: the caller replaces it once the flush
    /// this artifact belongs to has committed.
    pub fn flush_trades(&self, tape: &TradeTape, stamp: u64) -> Result<Option<PathBuf>, EngineError> {
        if tape.is_empty() {
            return Ok(None);
        }
        fs::create_dir_all(&self.dir).map_err(|source| EngineError::ArtifactWrite {
            path: self.dir.clone(),
            source,
        })?;

        let staging = self.dir.join(STAGING_NAME);
        write_records(&staging, tape.as_slice()).map_err(|source| EngineError::ArtifactWrite {
            path: staging.clone(),
            source,
        })?;

        // hard_link refuses an existing target, so a repeated stamp cannot
        // overwrite trades an earlier flush already published
        let published = self.dir.join(stamp.to_string());
        fs::hard_link(&staging, &published).map_err(|source| EngineError::ArtifactWrite {
            path: published.clone(),
            source,
        })?;
        if let Err(e) = fs::remove_file(&staging) {
            warn!(path = %staging.display(), error = %e, "could not clear staging file");
        }
        Ok(Some(published))
    }

    /// Take back an artifact whose flush did not commit.
    pub fn retract(&self, artifact: &Path) -> io::Result<()> {
        fs::remove_file(artifact)
    }
}

fn write_records(path: &Path, trades: &[Trade]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    for t in trades {
        writeln!(out, "{t}")?;
    }
    let file = out.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

#[derive(Debug, Error)]
pub enum ArtifactReadError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{path}:{line}: {source}")]
    Record {
        path: PathBuf,
        line: usize,
        source: ParseTradeError,
    },
}

/// Read one published artifact back into trades, in file order.
pub fn read_artifact(path: impl AsRef<Path>) -> Result<Vec<Trade>, ArtifactReadError> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut trades = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let trade = line.parse().map_err(|source| ArtifactReadError::Record {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        trades.push(trade);
    }
    Ok(trades)
}

/// Published artifacts in `dir`, oldest first. The staging file is skipped.
pub fn list_artifacts(dir: impl AsRef<Path>) -> io::Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let stamp = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u64>().ok());
        if let Some(stamp) = stamp {
            found.push((stamp, entry.path()));
        }
    }
    found.sort_by_key(|(stamp, _)| *stamp);
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

/// Every published trade in `dir`, in execution order.
pub fn read_trades_dir(dir: impl AsRef<Path>) -> Result<Vec<Trade>, ArtifactReadError> {
    let mut all = Vec::new();
    for path in list_artifacts(dir)? {
        all.extend(read_artifact(&path)?);
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn trade(ts: u64, price: u64, qty: u64, maker: u64, taker: u64) -> Trade {
        Trade {
            timestamp: ts,
            price,
            quantity: qty,
            maker_id: maker,
            taker_id: taker,
        }
    }

    #[test]
    fn test_empty_tape_writes_nothing() {
        let dir = tempdir().unwrap();
        let trades_dir = dir.path().join("trades");
        let writer = TradeWriter::new(&trades_dir);

        let published = writer.flush_trades(&TradeTape::new(), 1).unwrap();

        assert!(published.is_none());
        assert!(!trades_dir.exists());
    }

    #[test]
    fn test_artifact_round_trip_keeps_order() {
        let dir = tempdir().unwrap();
        let writer = TradeWriter::new(dir.path().join("trades"));
        let mut tape = TradeTape::new();
        tape.push(trade(10, 100, 5, 1, 3));
        tape.push(trade(11, 100, 2, 2, 3));
        tape.push(trade(12, 101, 9, 4, 5));

        let path = writer.flush_trades(&tape, 777).unwrap().unwrap();

        assert_eq!(path.file_name().unwrap(), "777");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "10,100,5,1,3\n11,100,2,2,3\n12,101,9,4,5\n"
        );
        assert_eq!(read_artifact(&path).unwrap(), tape.as_slice());
        // nothing left in staging
        assert!(!writer.dir().join(STAGING_NAME).exists());
        // publishing does not clear the tape by itself
        assert_eq!(tape.len(), 3);
    }

    #[test]
    fn test_list_skips_staging_and_sorts_numerically() {
        let dir = tempdir().unwrap();
        let writer = TradeWriter::new(dir.path());
        let mut tape = TradeTape::new();
        tape.push(trade(1, 100, 1, 1, 2));
        writer.flush_trades(&tape, 20).unwrap();
        tape.replace();
        tape.push(trade(2, 100, 1, 1, 3));
        writer.flush_trades(&tape, 3).unwrap();
        fs::write(dir.path().join(STAGING_NAME), "garbage").unwrap();

        let listed = list_artifacts(dir.path()).unwrap();
        let names: Vec<_> = listed
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["3", "20"]);
        assert_eq!(read_trades_dir(dir.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_unwritable_dir_reports_artifact_failure() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("trades");
        fs::write(&blocker, "not a directory").unwrap();
        let writer = TradeWriter::new(&blocker);
        let mut tape = TradeTape::new();
        tape.push(trade(1, 100, 1, 1, 2));

        let err = writer.flush_trades(&tape, 5).unwrap_err();

        assert!(matches!(err, EngineError::ArtifactWrite { .. }));
        assert_eq!(tape.len(), 1);
    }

    #[test]
    fn test_existing_artifact_is_never_overwritten() {
        let dir = tempdir().unwrap();
        let writer = TradeWriter::new(dir.path());
        let mut tape = TradeTape::new();
        tape.push(trade(1, 100, 1, 1, 2));
        let first = writer.flush_trades(&tape, 42).unwrap().unwrap();

        tape.replace();
        tape.push(trade(2, 200, 7, 3, 4));
        let err = writer.flush_trades(&tape, 42).unwrap_err();

        match err {
            EngineError::ArtifactWrite { path, source } => {
                assert_eq!(path, first);
                assert_eq!(source.kind(), io::ErrorKind::AlreadyExists);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(fs::read_to_string(&first).unwrap(), "1,100,1,1,2\n");
        assert_eq!(list_artifacts(dir.path()).unwrap(), vec![first]);
        assert_eq!(tape.len(), 1);
    }

    #[test]
    fn test_retract_removes_published_artifact() {
        let dir = tempdir().unwrap();
        let writer = TradeWriter::new(dir.path());
        let mut tape = TradeTape::new();
        tape.push(trade(1, 100, 1, 1, 2));
        let path = writer.flush_trades(&tape, 9).unwrap().unwrap();

        writer.retract(&path).unwrap();

        assert!(list_artifacts(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_bad_record_is_located() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("1");
        fs::write(&path, "1,2,3,4,5\n1,2,3\n").unwrap();
        match read_artifact(&path) {
            Err(ArtifactReadError::Record { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
