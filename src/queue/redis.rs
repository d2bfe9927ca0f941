//! Redis-backed queue: a list per mode, pushed on enqueue and blocking-popped
//! by the consumer. Serial and parallel runs use distinct key namespaces so a
//! sweep never leaks messages between cases.

use super::{Deliverer, Envelope, MessageQueue, QueueResult};
use anyhow::Context;
use redis::AsyncCommands;
use tokio::sync::watch;
use tracing::warn;

/// BRPOP timeout; the loop wakes this often to observe shutdown
const POP_TIMEOUT_SECS: f64 = 1.0;

pub struct RedisQueue {
    connection: redis::aio::MultiplexedConnection,
    queue_key: String,
}

impl RedisQueue {
    pub async fn connect(url: &str, parallel_mode: bool) -> QueueResult<Self> {
        let client = redis::Client::open(url)
            .with_context(|| format!("invalid Redis URL {url:?}"))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .with_context(|| format!("failed to connect to Redis at {url:?}"))?;
        let mode = if parallel_mode { "p" } else { "s" };
        Ok(Self {
            connection,
            queue_key: format!("outbox_bench_queue_{mode}"),
        })
    }
}

#[async_trait::async_trait]
impl MessageQueue for RedisQueue {
    async fn enqueue(&self, envelope: Envelope) -> QueueResult<()> {
        let payload = serde_json::to_string(&envelope)?;
        let mut connection = self.connection.clone();
        connection
            .lpush::<_, _, ()>(&self.queue_key, payload)
            .await
            .context("Redis LPUSH failed")?;
        Ok(())
    }

    async fn listen(&self, deliver: Deliverer, shutdown: watch::Receiver<bool>) -> QueueResult<()> {
        let mut connection = self.connection.clone();
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }
            let popped: Option<(String, String)> = connection
                .brpop(&self.queue_key, POP_TIMEOUT_SECS)
                .await
                .context("Redis BRPOP failed")?;
            let Some((_, payload)) = popped else {
                continue; // timed out, re-check shutdown
            };
            let envelope: Envelope = serde_json::from_str(&payload)?;
            if let Err(e) = deliver(envelope).await {
                warn!("Redis queue delivery failed: {e:#}");
            }
        }
    }
}
