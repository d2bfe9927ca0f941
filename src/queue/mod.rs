//! Queue backend boundary.
//!
//! The harness treats every queue backend as a black box behind the
//! [`MessageQueue`] trait: messages go in through `enqueue`, and `listen`
//! drives a consumer loop that hands each message to a delivery callback.
//! Backend selection happens once, at worker startup, from the environment;
//! the precedence order is part of the external contract:
//! no queue > in-process > Redis > Postgres > AMQP > durable key-value.

use crate::config::Args;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;

pub mod amqp;
pub mod in_process;
pub mod kv;
pub mod parallel;
pub mod postgres;
pub mod redis;

pub use parallel::ParallelQueue;

/// One queued activity on its way from the client to the receiving server.
/// The delivery protocol itself is out of scope here; the harness only moves
/// this envelope through a backend and times the trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique activity id; the server counts distinct ids toward completion
    pub id: String,
    /// Originating actor URI
    pub actor: String,
    /// Inbox URLs this envelope is delivered to
    pub to: Vec<String>,
    /// Opaque payload
    pub content: String,
}

/// Delivery callback invoked by a consumer loop for each dequeued envelope
pub type Deliverer =
    Arc<dyn Fn(Envelope) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(#[from] anyhow::Error),
    #[error("malformed queued payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// An interchangeable queue backend, selected by configuration
#[async_trait::async_trait]
pub trait MessageQueue: Send + Sync {
    /// Accept an envelope for later delivery
    async fn enqueue(&self, envelope: Envelope) -> QueueResult<()>;

    /// Consume envelopes and invoke `deliver` for each until `shutdown`
    /// flips. Returns cleanly on shutdown; backend failures propagate.
    async fn listen(&self, deliver: Deliverer, shutdown: watch::Receiver<bool>) -> QueueResult<()>;
}

/// Backend kind plus the configuration it needs, resolved once per process
#[derive(Clone, Debug, PartialEq)]
pub enum QueueBackend {
    /// No queue at all; the worker delivers synchronously in the request path
    None,
    InProcess,
    Redis { url: String },
    Postgres { url: String },
    Amqp { url: String },
    /// Durable key-value-backed queue, the default when nothing is selected
    Kv { path: PathBuf },
}

impl QueueBackend {
    /// Resolve the backend from the environment-driven configuration.
    /// Selector precedence is fixed and must match what operators expect
    /// when several selectors are present at once.
    pub fn resolve(args: &Args) -> Self {
        if args.no_queue {
            QueueBackend::None
        } else if args.in_process {
            QueueBackend::InProcess
        } else if let Some(url) = &args.redis_url {
            QueueBackend::Redis { url: url.clone() }
        } else if let Some(url) = &args.pg_url {
            QueueBackend::Postgres { url: url.clone() }
        } else if let Some(url) = &args.amqp_url {
            QueueBackend::Amqp { url: url.clone() }
        } else {
            QueueBackend::Kv {
                path: args
                    .kv
                    .clone()
                    .unwrap_or_else(|| std::env::temp_dir().join("outbox-bench-kv")),
            }
        }
    }

    /// Connect the selected backend. `None` means no queue: the caller is
    /// expected to deliver inline. `parallel_mode` namespaces backend state
    /// so serial and fan-out runs never share a queue.
    pub async fn connect(&self, parallel_mode: bool) -> QueueResult<Option<Arc<dyn MessageQueue>>> {
        let queue: Arc<dyn MessageQueue> = match self {
            QueueBackend::None => return Ok(None),
            QueueBackend::InProcess => Arc::new(in_process::InProcessQueue::new()),
            QueueBackend::Redis { url } => {
                Arc::new(redis::RedisQueue::connect(url, parallel_mode).await?)
            }
            QueueBackend::Postgres { url } => Arc::new(postgres::PostgresQueue::connect(url).await?),
            QueueBackend::Amqp { url } => Arc::new(amqp::AmqpQueue::connect(url).await?),
            QueueBackend::Kv { path } => Arc::new(kv::KvQueue::open(path).await?),
        };
        Ok(Some(queue))
    }
}

impl std::fmt::Display for QueueBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueBackend::None => write!(f, "no queue"),
            QueueBackend::InProcess => write!(f, "in-process queue"),
            QueueBackend::Redis { url } => write!(f, "Redis queue ({url})"),
            QueueBackend::Postgres { url } => write!(f, "Postgres queue ({url})"),
            QueueBackend::Amqp { url } => write!(f, "AMQP queue ({url})"),
            QueueBackend::Kv { path } => write!(f, "key-value queue ({})", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["outbox-bench"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn no_queue_wins_over_every_other_selector() {
        let args = args(&[
            "--no-queue",
            "--in-process",
            "--redis-url",
            "redis://localhost:6379",
            "--pg-url",
            "postgresql://localhost:5432/bench",
            "--amqp-url",
            "amqp://localhost:5672",
        ]);
        assert_eq!(QueueBackend::resolve(&args), QueueBackend::None);
    }

    #[test]
    fn in_process_wins_over_remote_backends() {
        let args = args(&["--in-process", "--redis-url", "redis://localhost:6379"]);
        assert_eq!(QueueBackend::resolve(&args), QueueBackend::InProcess);
    }

    #[test]
    fn redis_wins_over_postgres_and_amqp() {
        let args = args(&[
            "--redis-url",
            "redis://localhost:6379",
            "--pg-url",
            "postgresql://localhost:5432/bench",
            "--amqp-url",
            "amqp://localhost:5672",
        ]);
        assert!(matches!(
            QueueBackend::resolve(&args),
            QueueBackend::Redis { .. }
        ));
    }

    #[test]
    fn postgres_wins_over_amqp() {
        let args = args(&[
            "--pg-url",
            "postgresql://localhost:5432/bench",
            "--amqp-url",
            "amqp://localhost:5672",
        ]);
        assert!(matches!(
            QueueBackend::resolve(&args),
            QueueBackend::Postgres { .. }
        ));
    }

    #[test]
    fn absence_of_all_selectors_defaults_to_kv() {
        let args = args(&["--kv", "/tmp/bench-kv"]);
        assert_eq!(
            QueueBackend::resolve(&args),
            QueueBackend::Kv {
                path: "/tmp/bench-kv".into()
            }
        );
    }
}
