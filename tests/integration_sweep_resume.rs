use anyhow::Result;
use outbox_bench::cache::{BenchResult, ResultCache};
use outbox_bench::supervisor::{BenchmarkCase, CaseRunner, RunError};
use outbox_bench::{report, sweep};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Stand-in for real process supervision: records how often it is invoked.
struct RecordingRunner {
    spawns: AtomicUsize,
}

impl RecordingRunner {
    fn new() -> Self {
        Self {
            spawns: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl CaseRunner for RecordingRunner {
    async fn run_case(&self, case: &BenchmarkCase) -> Result<BenchResult, RunError> {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        // Deterministic per-case values so reports can be compared exactly.
        let seed = case.name.len() as f64;
        Ok(BenchResult {
            client_elapsed: seed,
            server_elapsed: seed * 2.0,
        })
    }
}

fn cases(names: &[&str]) -> Vec<BenchmarkCase> {
    names
        .iter()
        .map(|name| BenchmarkCase::new(*name, &[]))
        .collect()
}

/// A populated cache makes a rerun a pure no-op: zero process spawns and a
/// byte-identical report.
#[tokio::test]
async fn rerun_with_full_cache_spawns_nothing_and_reproduces_the_report() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".bench-cache.json");
    let sweep_cases = cases(&["No queue", "InProcessMessageQueue", "KvMessageQueue"]);

    // First invocation measures everything.
    let first_runner = RecordingRunner::new();
    let mut cache = ResultCache::load(&path);
    sweep::run(&sweep_cases, &mut cache, &first_runner).await.unwrap();
    assert_eq!(first_runner.spawns.load(Ordering::SeqCst), 3);
    let first_report = report::render(cache.entries());

    // Second invocation starts from the persisted document.
    let second_runner = RecordingRunner::new();
    let mut cache = ResultCache::load(&path);
    sweep::run(&sweep_cases, &mut cache, &second_runner).await.unwrap();
    assert_eq!(second_runner.spawns.load(Ordering::SeqCst), 0);
    assert_eq!(report::render(cache.entries()), first_report);
}

/// Killing the sweep after K of M cases leaves a cache with exactly K
/// entries; the next invocation runs the remaining M-K and the final report
/// contains all M results.
#[tokio::test]
async fn interrupted_sweep_resumes_with_only_the_remaining_cases() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".bench-cache.json");
    let all = cases(&["A", "B", "C", "D"]);

    // Simulate the crash by sweeping only a prefix: each completed case was
    // persisted immediately, so stopping after two leaves two entries.
    let runner = RecordingRunner::new();
    let mut cache = ResultCache::load(&path);
    sweep::run(&all[..2], &mut cache, &runner).await.unwrap();
    drop(cache);
    assert_eq!(runner.spawns.load(Ordering::SeqCst), 2);

    let runner = RecordingRunner::new();
    let mut cache = ResultCache::load(&path);
    sweep::run(&all, &mut cache, &runner).await.unwrap();
    assert_eq!(runner.spawns.load(Ordering::SeqCst), 2);

    let names: Vec<&str> = cache.entries().iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["A", "B", "C", "D"]);
    let rendered = report::render(cache.entries());
    for name in ["A", "B", "C", "D"] {
        assert!(rendered.contains(&format!("| {name}")), "missing row for {name}");
    }
}
