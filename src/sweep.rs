//! Sweep iteration: the ordered set of named benchmark cases.
//!
//! Cases run strictly one at a time; results land in the cache immediately
//! after each case, and cached cases are skipped, so an interrupted sweep
//! resumes where it stopped. Order matters only for the report.

use crate::cache::ResultCache;
use crate::supervisor::{BenchmarkCase, CaseRunner, RunError};
use anyhow::Result;
use tracing::info;

/// The default case list: every built-in backend, serial and ×4 fan-out.
/// Redis and Postgres cases expect a locally reachable service at the
/// conventional address, as the case names advertise.
pub fn default_cases() -> Vec<BenchmarkCase> {
    vec![
        BenchmarkCase::new("No queue", &[("NO_QUEUE", "1")]),
        BenchmarkCase::new("InProcessMessageQueue", &[("IN_PROCESS", "1")]),
        BenchmarkCase::new("KvMessageQueue", &[]),
        BenchmarkCase::new(
            "RedisMessageQueue",
            &[("REDIS_URL", "redis://localhost:6379")],
        ),
        BenchmarkCase::new(
            "PostgresMessageQueue",
            &[("PG_URL", "postgresql://localhost:5432/outbox_bench")],
        ),
        BenchmarkCase::new(
            "InProcessMessageQueue × 4",
            &[("IN_PROCESS", "1"), ("PARALLEL", "4")],
        ),
        BenchmarkCase::new("KvMessageQueue × 4", &[("PARALLEL", "4")]),
        BenchmarkCase::new(
            "RedisMessageQueue × 4",
            &[("REDIS_URL", "redis://localhost:6379"), ("PARALLEL", "4")],
        ),
        BenchmarkCase::new(
            "PostgresMessageQueue × 4",
            &[
                ("PG_URL", "postgresql://localhost:5432/outbox_bench"),
                ("PARALLEL", "4"),
            ],
        ),
    ]
}

/// Outcome of one sweep invocation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Every case was measured or already cached
    Completed,
    /// The operator aborted; already-measured cases remain cached
    Interrupted,
}

/// Iterate the cases in order, running each uncached one through `runner`
/// and persisting its result immediately. Setup failures abort the sweep;
/// an interrupt stops it early but is not a failure.
pub async fn run(
    cases: &[BenchmarkCase],
    cache: &mut ResultCache,
    runner: &dyn CaseRunner,
) -> Result<SweepOutcome> {
    for case in cases {
        info!("Running benchmark: {}", case.name);
        if cache.has(&case.name) {
            info!("The result is cached; skipping...");
            continue;
        }
        match runner.run_case(case).await {
            Ok(result) => {
                info!(
                    "Benchmark {} finished: client {:.2}s, server {:.2}s",
                    case.name, result.client_elapsed, result.server_elapsed
                );
                cache.put(case.name.clone(), result)?;
            }
            Err(RunError::Interrupted) => {
                info!("Sweep interrupted after {} cached result(s)", cache.len());
                return Ok(SweepOutcome::Interrupted);
            }
            Err(e @ RunError::Setup(_)) => return Err(e.into()),
        }
    }
    Ok(SweepOutcome::Completed)
}
