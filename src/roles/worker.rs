//! Delivering worker role.
//!
//! Binds the outbox endpoint, resolves the queue backend from the environment
//! (selection precedence lives in [`crate::queue::QueueBackend::resolve`]),
//! and runs the queue's consumer loop, delivering each envelope to its
//! recipients over HTTP. With no queue selected, delivery happens
//! synchronously inside the request handler and the send endpoint only
//! responds once every recipient has accepted the message.

use crate::config::Args;
use crate::queue::{Deliverer, Envelope, MessageQueue, ParallelQueue, QueueBackend};
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

#[derive(Clone)]
struct WorkerState {
    queue: Option<Arc<dyn MessageQueue>>,
    http: reqwest::Client,
}

pub async fn run(args: Args) -> Result<()> {
    let backend = QueueBackend::resolve(&args);
    info!("Worker using {backend}");

    let mut queue = backend.connect(args.parallel > 1).await?;
    if args.parallel > 1 {
        queue = queue.map(|inner| {
            Arc::new(ParallelQueue::new(inner, args.parallel)) as Arc<dyn MessageQueue>
        });
    }

    let http = reqwest::Client::new();

    // The sender must outlive the serve loop below: the consumer reads its
    // drop as a shutdown and stops dequeuing. The supervisor kills the whole
    // process rather than requesting a graceful stop, so it is never used.
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    if let Some(queue) = &queue {
        let consumer = queue.clone();
        let deliver = deliverer(http.clone());
        tokio::spawn(async move {
            if let Err(e) = consumer.listen(deliver, shutdown_rx).await {
                error!("Queue consumer terminated: {e:#}");
            }
        });
        info!("Queue consumer started (parallel = {})", args.parallel);
    }

    let state = WorkerState { queue, http };
    let app = Router::new().route("/send", post(send)).with_state(state);

    let addr = format!("127.0.0.1:{}", args.worker_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("worker failed to bind {addr}"))?;
    info!("Worker listening on {addr}");

    axum::serve(listener, app)
        .await
        .context("worker terminated unexpectedly")
}

/// Delivery callback shared by every queue backend: POST the envelope to each
/// recipient inbox and require a success status.
fn deliverer(http: reqwest::Client) -> Deliverer {
    Arc::new(move |envelope: Envelope| {
        let http = http.clone();
        Box::pin(async move { deliver(&http, &envelope).await })
    })
}

async fn deliver(http: &reqwest::Client, envelope: &Envelope) -> Result<()> {
    for inbox in &envelope.to {
        http.post(inbox)
            .json(envelope)
            .send()
            .await
            .with_context(|| format!("delivery to {inbox} failed"))?
            .error_for_status()
            .with_context(|| format!("{inbox} rejected the delivery"))?;
    }
    Ok(())
}

async fn send(State(state): State<WorkerState>, Json(envelope): Json<Envelope>) -> StatusCode {
    match &state.queue {
        Some(queue) => match queue.enqueue(envelope).await {
            Ok(()) => StatusCode::ACCEPTED,
            Err(e) => {
                error!("Failed to enqueue activity: {e:#}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
        None => match deliver(&state.http, &envelope).await {
            Ok(()) => {
                debug!("Delivered {} synchronously", envelope.id);
                StatusCode::OK
            }
            Err(e) => {
                error!("Synchronous delivery failed: {e:#}");
                StatusCode::BAD_GATEWAY
            }
        },
    }
}
