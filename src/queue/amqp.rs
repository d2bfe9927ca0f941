//! AMQP-backed queue via lapin. Enqueue publishes to a declared queue;
//! the consumer polls with basic.get so the loop can observe shutdown
//! without a consumer registration to unwind.

use super::{Deliverer, Envelope, MessageQueue, QueueResult};
use anyhow::Context;
use lapin::options::{BasicGetOptions, BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

const QUEUE_NAME: &str = "outbox_bench";
const IDLE_POLL: Duration = Duration::from_millis(25);

pub struct AmqpQueue {
    channel: Channel,
}

impl AmqpQueue {
    pub async fn connect(url: &str) -> QueueResult<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .with_context(|| format!("failed to connect to AMQP broker at {url:?}"))?;
        let channel = connection
            .create_channel()
            .await
            .context("failed to open AMQP channel")?;
        channel
            .queue_declare(
                QUEUE_NAME,
                QueueDeclareOptions::default(),
                FieldTable::default(),
            )
            .await
            .context("failed to declare AMQP queue")?;
        Ok(Self { channel })
    }
}

#[async_trait::async_trait]
impl MessageQueue for AmqpQueue {
    async fn enqueue(&self, envelope: Envelope) -> QueueResult<()> {
        let payload = serde_json::to_vec(&envelope)?;
        self.channel
            .basic_publish(
                "",
                QUEUE_NAME,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default(),
            )
            .await
            .context("AMQP publish failed")?
            .await
            .context("AMQP publish was not confirmed")?;
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
            let message = self
                .channel
                .basic_get(QUEUE_NAME, BasicGetOptions { no_ack: true })
                .await
                .context("AMQP basic.get failed")?;
            match message {
                Some(message) => {
                    let envelope: Envelope = serde_json::from_slice(&message.delivery.data)?;
                    if let Err(e) = deliver(envelope).await {
                        warn!("AMQP queue delivery failed: {e:#}");
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
