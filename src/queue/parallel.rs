//! Fan-out decorator: wraps any backend so that up to N deliveries run
//! concurrently while the inner consumer loop keeps dequeuing.

use super::{Deliverer, Envelope, MessageQueue, QueueResult};
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tracing::warn;

pub struct ParallelQueue {
    inner: Arc<dyn MessageQueue>,
    factor: usize,
}

impl ParallelQueue {
    pub fn new(inner: Arc<dyn MessageQueue>, factor: usize) -> Self {
        Self {
            inner,
            factor: factor.max(1),
        }
    }

    pub fn factor(&self) -> usize {
        self.factor
    }
}

#[async_trait::async_trait]
impl MessageQueue for ParallelQueue {
    async fn enqueue(&self, envelope: Envelope) -> QueueResult<()> {
        self.inner.enqueue(envelope).await
    }

    /// Delegates consumption to the inner backend, but wraps the delivery
    /// callback so each envelope is handed to its own task, gated by a
    /// semaphore sized to the fan-out factor. The inner loop therefore only
    /// blocks when `factor` deliveries are already in flight.
    async fn listen(&self, deliver: Deliverer, shutdown: watch::Receiver<bool>) -> QueueResult<()> {
        let permits = Arc::new(Semaphore::new(self.factor));
        let fan_out: Deliverer = Arc::new(move |envelope| {
            let permits = permits.clone();
            let deliver = deliver.clone();
            Box::pin(async move {
                let permit = permits
                    .acquire_owned()
                    .await
                    .context("fan-out semaphore closed")?;
                tokio::spawn(async move {
                    if let Err(e) = deliver(envelope).await {
                        warn!("Fan-out delivery failed: {e:#}");
                    }
                    drop(permit);
                });
                Ok(())
            })
        });
        self.inner.listen(fan_out, shutdown).await
    }
}
