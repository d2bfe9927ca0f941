//! Durable key-value-backed queue, the default backend.
//!
//! State lives in a directory: each enqueued envelope becomes one JSON file
//! whose name sorts by enqueue time, and the consumer repeatedly claims the
//! oldest file. Survives worker restarts, needs no external service.

use super::{Deliverer, Envelope, MessageQueue, QueueResult};
use anyhow::Context;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tracing::warn;

const IDLE_POLL: Duration = Duration::from_millis(25);

pub struct KvQueue {
    dir: PathBuf,
}

impl KvQueue {
    pub async fn open(path: &std::path::Path) -> QueueResult<Self> {
        tokio::fs::create_dir_all(path)
            .await
            .with_context(|| format!("failed to create KV queue directory {path:?}"))?;
        Ok(Self {
            dir: path.to_path_buf(),
        })
    }

    fn entry_name() -> String {
        // Microsecond timestamp prefix gives lexicographic FIFO order; the
        // uuid disambiguates entries enqueued within the same microsecond.
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros();
        format!("{micros:020}-{}.json", uuid::Uuid::new_v4())
    }

    async fn oldest_entry(&self) -> QueueResult<Option<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("failed to scan KV queue directory {:?}", self.dir))?;
        let mut oldest: Option<PathBuf> = None;
        while let Some(entry) = entries
            .next_entry()
            .await
            .context("failed to walk KV queue directory")?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if oldest.as_ref().is_none_or(|o| path < *o) {
                oldest = Some(path);
            }
        }
        Ok(oldest)
    }
}

#[async_trait::async_trait]
impl MessageQueue for KvQueue {
    async fn enqueue(&self, envelope: Envelope) -> QueueResult<()> {
        let payload = serde_json::to_vec(&envelope)?;
        let path = self.dir.join(Self::entry_name());
        tokio::fs::write(&path, payload)
            .await
            .with_context(|| format!("failed to persist queue entry {path:?}"))?;
        Ok(())
    }

    async fn listen(
        &self,
        deliver: Deliverer,
        mut shutdown: watch::Receiver<bool>,
    ) -> QueueResult<()> {
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }
            match self.oldest_entry().await? {
                Some(path) => {
                    let bytes = tokio::fs::read(&path)
                        .await
                        .with_context(|| format!("failed to read queue entry {path:?}"))?;
                    // Claim before delivering so a failed delivery is dropped
                    // rather than retried forever.
                    tokio::fs::remove_file(&path)
                        .await
                        .with_context(|| format!("failed to claim queue entry {path:?}"))?;
                    let envelope: Envelope = serde_json::from_slice(&bytes)?;
                    if let Err(e) = deliver(envelope).await {
                        warn!("KV queue delivery failed: {e:#}");
                    }
                }
                None => {
                    tokio::select! {
                        _ = shutdown.changed() => return Ok(()),
                        _ = tokio::time::sleep(IDLE_POLL) => {}
                    }
                }
            }
        }
    }
}
