//! In-process queue backed by an unbounded tokio channel.
//!
//! Only meaningful when producer and consumer live in the same process, which
//! holds here: the worker both accepts sends over HTTP and runs the consumer.

use super::{Deliverer, Envelope, MessageQueue, QueueError, QueueResult};
use anyhow::anyhow;
use std::sync::Mutex;
use tokio::sync::{mpsc, watch};

pub struct InProcessQueue {
    tx: mpsc::UnboundedSender<Envelope>,
    // Taken exactly once by the consumer loop.
    rx: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
}

impl InProcessQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }
}

impl Default for InProcessQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MessageQueue for InProcessQueue {
    async fn enqueue(&self, envelope: Envelope) -> QueueResult<()> {
        self.tx
            .send(envelope)
            .map_err(|_| QueueError::Backend(anyhow!("in-process queue consumer is gone")))
    }

    async fn listen(
        &self,
        deliver: Deliverer,
        mut shutdown: watch::Receiver<bool>,
    ) -> QueueResult<()> {
        let mut rx = self
            .rx
            .lock()
            .expect("in-process queue receiver lock poisoned")
            .take()
            .ok_or_else(|| QueueError::Backend(anyhow!("in-process queue already has a consumer")))?;

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                received = rx.recv() => match received {
                    Some(envelope) => {
                        if let Err(e) = deliver(envelope).await {
                            tracing::warn!("In-process delivery failed: {e:#}");
                        }
                    }
                    None => return Ok(()),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn envelope(id: &str) -> Envelope {
        Envelope {
            id: id.to_string(),
            actor: "http://localhost:8000/users/bench".to_string(),
            to: vec!["http://localhost:3000/inbox".to_string()],
            content: "Hello, world!".to_string(),
        }
    }

    #[tokio::test]
    async fn delivers_enqueued_envelopes_until_shutdown() {
        let queue = InProcessQueue::new();
        queue.enqueue(envelope("a")).await.unwrap();
        queue.enqueue(envelope("b")).await.unwrap();

        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = delivered.clone();
        let deliver: Deliverer = Arc::new(move |_| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let (stop_tx, stop_rx) = watch::channel(false);
        let listen = queue.listen(deliver, stop_rx);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            let _ = stop_tx.send(true);
        });
        listen.await.unwrap();
        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_consumer_is_rejected() {
        let queue = InProcessQueue::new();
        let deliver: Deliverer = Arc::new(|_| Box::pin(async { Ok(()) }));
        let (_stop_tx, stop_rx) = watch::channel(true);
        // First take succeeds and returns immediately because shutdown is set.
        let _ = queue.listen(deliver.clone(), stop_rx.clone()).await;
        assert!(queue.listen(deliver, stop_rx).await.is_err());
    }
}
