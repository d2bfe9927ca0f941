//! Durable, resumable result cache.
//!
//! One JSON document maps case name to measured result. The document is loaded
//! once at startup, consulted before each case, and rewritten after every
//! completed case, so an interrupted sweep resumes with exactly the cases it
//! had not yet measured. Benchmarks are noisy by nature; the cache exists for
//! resumability, not for memoizing a "correct" value.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Measured outcome of one benchmark case, both fields in seconds
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchResult {
    /// Wall-clock time the client spent emitting all messages
    pub client_elapsed: f64,
    /// Time between the server observing the first and the last message
    pub server_elapsed: f64,
}

/// Insertion-ordered mapping from case name to result, backed by one JSON file
pub struct ResultCache {
    path: PathBuf,
    entries: Vec<(String, BenchResult)>,
}

impl ResultCache {
    /// Load the cache document. Absence or corruption is never fatal: the
    /// sweep must be able to start from scratch when the document is gone or
    /// unreadable, so any failure here degrades to an empty cache.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match Self::read_entries(&path) {
            Ok(entries) => {
                debug!("Loaded {} cached result(s) from {:?}", entries.len(), path);
                entries
            }
            Err(e) => {
                warn!("Ignoring unreadable result cache {:?}: {:#}", path, e);
                Vec::new()
            }
        };
        Self { path, entries }
    }

    fn read_entries(path: &Path) -> Result<Vec<(String, BenchResult)>> {
        let text = std::fs::read_to_string(path)?;
        let document: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&text)?;
        let mut entries = Vec::with_capacity(document.len());
        for (name, value) in document {
            let result: BenchResult = serde_json::from_value(value)
                .with_context(|| format!("malformed cache entry for {name:?}"))?;
            entries.push((name, result));
        }
        Ok(entries)
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<BenchResult> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| *r)
    }

    /// Record a result and persist the whole document immediately. Entries are
    /// append-only within a sweep; a name already present is left untouched.
    pub fn put(&mut self, name: impl Into<String>, result: BenchResult) -> Result<()> {
        let name = name.into();
        if self.has(&name) {
            return Ok(());
        }
        self.entries.push((name, result));
        self.persist()
    }

    /// All entries in insertion order, for the cumulative report
    pub fn entries(&self) -> &[(String, BenchResult)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&self) -> Result<()> {
        let mut document = serde_json::Map::with_capacity(self.entries.len());
        for (name, result) in &self.entries {
            document.insert(name.clone(), serde_json::to_value(result)?);
        }
        let text = serde_json::to_string(&document)?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("failed to persist result cache {:?}", self.path))
    }
}
