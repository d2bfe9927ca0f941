//! Load-generating client role.
//!
//! Performs a fixed number of synchronous sends against the worker's outbox
//! endpoint, measures wall-clock time from first to last send, and writes the
//! elapsed milliseconds to its sentinel file. The warm-up delay that lets the
//! server and worker finish binding is the orchestrator's responsibility, not
//! the client's.

use crate::config::Args;
use crate::queue::Envelope;
use crate::sentinel::SentinelFile;
use anyhow::{Context, Result};
use std::time::Instant;
use tracing::{debug, info};

/// Recipient fan-out per activity, mirroring a small-instance delivery shape
const RECIPIENTS: usize = 10;

pub async fn run(args: Args) -> Result<()> {
    let outbox = format!("http://127.0.0.1:{}/send", args.worker_port);
    let actor = format!("http://127.0.0.1:{}/users/bench", args.worker_port);
    let recipients: Vec<String> = (0..RECIPIENTS)
        .map(|i| format!("http://127.0.0.1:{}/users/{i}/inbox", args.server_port))
        .collect();

    let http = reqwest::Client::new();
    info!("Client sending {} activities to {outbox}", args.total);

    let started = Instant::now();
    for i in 1..=args.total {
        let envelope = Envelope {
            id: format!("http://127.0.0.1:{}/activities/{i}", args.worker_port),
            actor: actor.clone(),
            to: recipients.clone(),
            content: "Hello, world!".to_string(),
        };
        http.post(&outbox)
            .json(&envelope)
            .send()
            .await
            .with_context(|| format!("send {i}/{} failed", args.total))?
            .error_for_status()
            .with_context(|| format!("worker rejected send {i}/{}", args.total))?;
        debug!("Activity {i}/{}", args.total);
    }
    let elapsed = started.elapsed();
    info!(
        "All {} activities sent; elapsed: {:.3}s",
        args.total,
        elapsed.as_secs_f64()
    );

    if let Some(path) = &args.time_record_file {
        let sentinel = SentinelFile::at(path);
        sentinel.record_millis(elapsed.as_millis())?;
        debug!("Wrote time record: {path:?}");
    }
    Ok(())
}
