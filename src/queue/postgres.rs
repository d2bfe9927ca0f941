//! Postgres-backed queue: one table, insert on enqueue, claim the smallest id
//! with SKIP LOCKED on dequeue. The table is created on connect if missing.

use super::{Deliverer, Envelope, MessageQueue, QueueResult};
use anyhow::Context;
use std::time::Duration;
use tokio::sync::watch;
use tokio_postgres::NoTls;
use tracing::warn;

const IDLE_POLL: Duration = Duration::from_millis(50);

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS outbox_bench_queue (
    id bigserial PRIMARY KEY,
    payload text NOT NULL
)";

const CLAIM: &str = "DELETE FROM outbox_bench_queue
    WHERE id = (
        SELECT id FROM outbox_bench_queue
        ORDER BY id
        FOR UPDATE SKIP LOCKED
        LIMIT 1
    )
    RETURNING payload";

pub struct PostgresQueue {
    client: tokio_postgres::Client,
}

impl PostgresQueue {
    pub async fn connect(url: &str) -> QueueResult<Self> {
        let (client, connection) = tokio_postgres::connect(url, NoTls)
            .await
            .with_context(|| format!("failed to connect to Postgres at {url:?}"))?;
        // The connection object drives the socket and must be polled for the
        // lifetime of the client.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("Postgres connection terminated: {e}");
            }
        });
        client
            .batch_execute(SCHEMA)
            .await
            .context("failed to create queue table")?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl MessageQueue for PostgresQueue {
    async fn enqueue(&self, envelope: Envelope) -> QueueResult<()> {
        let payload = serde_json::to_string(&envelope)?;
        self.client
            .execute(
                "INSERT INTO outbox_bench_queue (payload) VALUES ($1)",
                &[&payload],
            )
            .await
            .context("failed to insert queue entry")?;
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
            let row = self
                .client
                .query_opt(CLAIM, &[])
                .await
                .context("failed to claim queue entry")?;
            match row {
                Some(row) => {
                    let payload: String = row.get(0);
                    let envelope: Envelope = serde_json::from_str(&payload)?;
                    if let Err(e) = deliver(envelope).await {
                        warn!("Postgres queue delivery failed: {e:#}");
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
