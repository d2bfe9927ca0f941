//! Sentinel-file completion protocol.
//!
//! The orchestrator has no in-band channel into the benchmark subprocesses, so
//! completion is signalled through the filesystem: each timed process is handed
//! a path that does not exist, and writes its elapsed milliseconds there when
//! its timed phase finishes. The *reappearance* of the path is the handshake;
//! content is only read after both sides have signalled.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Filename prefix for allocated sentinel paths
pub const SENTINEL_PREFIX: &str = "outbox-bench-record-";

/// A one-shot filesystem completion signal
#[derive(Clone, Debug)]
pub struct SentinelFile {
    path: PathBuf,
}

impl SentinelFile {
    /// Allocate a uniquely named temporary path and immediately delete the
    /// backing file, so that the path's existence becomes a clean event.
    pub fn allocate() -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(SENTINEL_PREFIX)
            .tempfile()
            .context("failed to allocate sentinel path")?;
        let path = file.path().to_path_buf();
        file.close().context("failed to clear sentinel path")?;
        Ok(Self { path })
    }

    /// Wrap an externally supplied path (used by the timed processes, which
    /// receive the path through their environment).
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the timed phase behind this sentinel has completed
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Record an elapsed duration as base-10 integer milliseconds.
    /// Writing the file is what flips `exists()` for the poller.
    pub fn record_millis(&self, elapsed_ms: u128) -> Result<()> {
        std::fs::write(&self.path, elapsed_ms.to_string())
            .with_context(|| format!("failed to write sentinel {:?}", self.path))
    }

    /// Read back the recorded milliseconds and convert to seconds
    pub fn read_elapsed_secs(&self) -> Result<f64> {
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read sentinel {:?}", self.path))?;
        let millis: u64 = text
            .trim()
            .parse()
            .with_context(|| format!("sentinel {:?} does not contain integer millis", self.path))?;
        Ok(millis as f64 / 1000.0)
    }
}

/// Whether a run has completed: both the sender-side and the receiver-side
/// sentinel must exist. One alone means the other timed phase is still going.
pub fn completion_detected(client: &SentinelFile, server: &SentinelFile) -> bool {
    client.exists() && server.exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_leaves_no_file_behind() {
        let sentinel = SentinelFile::allocate().unwrap();
        assert!(!sentinel.exists());
        assert!(sentinel
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(SENTINEL_PREFIX));
    }

    #[test]
    fn record_then_read_round_trips_millis_as_seconds() {
        let sentinel = SentinelFile::allocate().unwrap();
        sentinel.record_millis(4200).unwrap();
        assert!(sentinel.exists());
        assert_eq!(sentinel.read_elapsed_secs().unwrap(), 4.2);
        std::fs::remove_file(sentinel.path()).unwrap();
    }

    #[test]
    fn read_reports_garbage_content() {
        let sentinel = SentinelFile::allocate().unwrap();
        std::fs::write(sentinel.path(), "not a number").unwrap();
        assert!(sentinel.read_elapsed_secs().is_err());
        std::fs::remove_file(sentinel.path()).unwrap();
    }
}
