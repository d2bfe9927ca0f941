//! Receiving server role.
//!
//! Binds the inbox endpoints, counts distinct activity ids, and measures the
//! time between the first and the last expected message. The elapsed duration
//! goes to the sentinel file; the process itself keeps serving until the
//! supervisor kills it.

use crate::config::Args;
use crate::queue::Envelope;
use crate::sentinel::SentinelFile;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};

struct ServerState {
    total: usize,
    sentinel: Option<SentinelFile>,
    progress: Mutex<Progress>,
}

#[derive(Default)]
struct Progress {
    seen: HashSet<String>,
    first_received: Option<Instant>,
    recorded: bool,
}

pub async fn run(args: Args) -> Result<()> {
    let state = Arc::new(ServerState {
        total: args.total,
        sentinel: args.time_record_file.as_ref().map(SentinelFile::at),
        progress: Mutex::new(Progress::default()),
    });

    let app = Router::new()
        .route("/inbox", post(receive))
        .route("/users/{identifier}/inbox", post(receive))
        .with_state(state);

    let addr = format!("127.0.0.1:{}", args.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("server failed to bind {addr}"))?;
    info!("Server listening on {addr}, expecting {} message(s)", args.total);

    axum::serve(listener, app)
        .await
        .context("server terminated unexpectedly")
}

async fn receive(
    State(state): State<Arc<ServerState>>,
    Json(envelope): Json<Envelope>,
) -> StatusCode {
    let mut progress = state
        .progress
        .lock()
        .expect("server progress lock poisoned");

    if progress.first_received.is_none() {
        progress.first_received = Some(Instant::now());
        info!("Received first activity");
    }
    progress.seen.insert(envelope.id);

    if progress.seen.len() >= state.total && !progress.recorded {
        progress.recorded = true;
        let elapsed = progress
            .first_received
            .map(|t| t.elapsed())
            .unwrap_or_default();
        info!(
            "All {} activities received; elapsed: {:.3}s",
            state.total,
            elapsed.as_secs_f64()
        );
        if let Some(sentinel) = &state.sentinel {
            if let Err(e) = sentinel.record_millis(elapsed.as_millis()) {
                tracing::error!("Failed to write time record: {e:#}");
            } else {
                debug!("Wrote time record: {:?}", sentinel.path());
            }
        }
    }

    StatusCode::ACCEPTED
}
