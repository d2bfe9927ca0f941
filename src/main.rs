//! # Outbox Bench - Main Entry Point
//!
//! The same binary plays four parts. Invoked with no role it is the
//! orchestrator: it iterates the benchmark sweep, spawning itself three more
//! times per case (server, worker, client) with `BENCH_ROLE` set. There is no
//! flag surface beyond `--help`; every knob is an environment variable, which
//! is also how the orchestrator configures its children.

use anyhow::Result;
use clap::Parser;
use outbox_bench::{
    config::{Args, Role},
    logging::SweepFormatter,
    report, roles,
    supervisor::{RunSettings, RunSupervisor},
    sweep::{self, SweepOutcome},
    ResultCache,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Log level is controlled via RUST_LOG; the sweep itself logs at info.
    tracing_subscriber::fmt()
        .event_format(SweepFormatter)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.role {
        Role::Orchestrator => orchestrate(args).await,
        Role::Server => roles::server::run(args).await,
        Role::Worker => roles::worker::run(args).await,
        Role::Client => roles::client::run(args).await,
    }
}

/// Run the sweep: execute every uncached case, then print the cumulative
/// report, including results measured by prior invocations.
async fn orchestrate(args: Args) -> Result<()> {
    info!(
        "Starting benchmark sweep (outbox-bench {})",
        outbox_bench::VERSION
    );

    let mut cache = ResultCache::load(&args.cache_file);
    if !cache.is_empty() {
        info!("Resuming with {} cached result(s)", cache.len());
    }

    let supervisor = RunSupervisor::new(RunSettings::from_args(&args));
    let cases = sweep::default_cases();
    let outcome = sweep::run(&cases, &mut cache, &supervisor).await?;
    if outcome == SweepOutcome::Interrupted {
        info!("Sweep interrupted; rendering the results measured so far");
    }

    print!("{}", report::render(cache.entries()));
    Ok(())
}
