//! Per-case process supervision.
//!
//! One benchmark case is three concurrently running OS processes: the
//! receiving server, the delivering worker, and the load-generating client.
//! The supervisor starts all three from the current executable, waits for the
//! two sentinel files to reappear, then broadcasts a single cancellation and
//! reaps everything. Errors raised by a process that was killed by that
//! broadcast carry no diagnostic value and are deliberately discarded.

use crate::cache::BenchResult;
use crate::config::{Args, Role};
use crate::sentinel::SentinelFile;
use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// One named benchmark configuration: a queue backend selection plus its
/// parameters, injected into the spawned processes as environment variables.
#[derive(Clone, Debug)]
pub struct BenchmarkCase {
    pub name: String,
    pub env: Vec<(String, String)>,
}

impl BenchmarkCase {
    pub fn new(name: impl Into<String>, env: &[(&str, &str)]) -> Self {
        Self {
            name: name.into(),
            env: env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Run parameters shared by every case of a sweep
#[derive(Clone, Debug)]
pub struct RunSettings {
    /// Benchmark binary to spawn; resolved from the current executable if unset
    pub exe: Option<PathBuf>,
    pub total: usize,
    pub server_port: u16,
    pub worker_port: u16,
    pub warmup_delay: Duration,
    pub poll_interval: Duration,
    /// Externally pinned shared storage location, reused across the sweep.
    /// Unset means a fresh location per case run.
    pub kv: Option<PathBuf>,
}

impl RunSettings {
    pub fn from_args(args: &Args) -> Self {
        Self {
            exe: None,
            total: args.total,
            server_port: args.server_port,
            worker_port: args.worker_port,
            warmup_delay: args.warmup_delay(),
            poll_interval: args.poll_interval(),
            kv: args.kv.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// A process failed to start or its result could not be resolved.
    /// Fatal for the case; nothing is cached.
    #[error("benchmark setup failed: {0}")]
    Setup(#[source] anyhow::Error),

    /// The operator aborted the sweep. All subprocesses were already
    /// terminated by the time this is returned.
    #[error("benchmark sweep interrupted")]
    Interrupted,
}

/// Error raised by a process that the cancellation broadcast killed.
/// Expected, never surfaced past the case boundary.
#[derive(Debug, thiserror::Error)]
#[error("{role} process terminated by cancellation ({detail})")]
struct CancelledProcessError {
    role: Role,
    detail: String,
}

/// Anything that can execute one benchmark case; the sweep depends on this
/// seam so tests can substitute a double for real process supervision.
#[async_trait::async_trait]
pub trait CaseRunner {
    async fn run_case(&self, case: &BenchmarkCase) -> Result<BenchResult, RunError>;
}

pub struct RunSupervisor {
    settings: RunSettings,
}

impl RunSupervisor {
    pub fn new(settings: RunSettings) -> Self {
        Self { settings }
    }

    /// Execute one case end to end: spawn the three roles, poll for both
    /// sentinels, broadcast cancellation, and resolve the two durations.
    pub async fn run(&self, case: &BenchmarkCase) -> Result<BenchResult, RunError> {
        let server_sentinel = SentinelFile::allocate().map_err(RunError::Setup)?;
        let client_sentinel = SentinelFile::allocate().map_err(RunError::Setup)?;
        let kv = self.kv_location().map_err(RunError::Setup)?;
        let exe = self.resolve_exe().map_err(RunError::Setup)?;
        debug!("Run context: kv={kv:?} exe={exe:?}");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Server and worker first, so the receiving endpoint exists before
        // load generation begins.
        let server = self
            .spawn_role(&exe, Role::Server, case, &kv, Some(&server_sentinel))
            .map_err(RunError::Setup)?;
        let server_task = tokio::spawn(supervise(Role::Server, server, shutdown_rx.clone()));

        let worker = self
            .spawn_role(&exe, Role::Worker, case, &kv, None)
            .map_err(RunError::Setup)?;
        let worker_task = tokio::spawn(supervise(Role::Worker, worker, shutdown_rx.clone()));

        tokio::time::sleep(self.settings.warmup_delay).await;

        let client = self
            .spawn_role(&exe, Role::Client, case, &kv, Some(&client_sentinel))
            .map_err(RunError::Setup)?;
        let client_task = tokio::spawn(supervise(Role::Client, client, shutdown_rx));

        let interrupted = wait_for_completion(
            &client_sentinel,
            &server_sentinel,
            self.settings.poll_interval,
            async {
                let _ = tokio::signal::ctrl_c().await;
            },
        )
        .await;

        // One broadcast for all three, on completion and interrupt alike, so
        // no subprocess is ever left orphaned.
        let _ = shutdown_tx.send(true);
        for task in [server_task, worker_task, client_task] {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(noise)) => debug!("Discarding teardown error: {noise}"),
                Err(e) => debug!("Discarding supervision task error: {e}"),
            }
        }

        if interrupted {
            return Err(RunError::Interrupted);
        }

        let client_elapsed = client_sentinel
            .read_elapsed_secs()
            .map_err(RunError::Setup)?;
        let server_elapsed = server_sentinel
            .read_elapsed_secs()
            .map_err(RunError::Setup)?;
        Ok(BenchResult {
            client_elapsed,
            server_elapsed,
        })
    }

    fn spawn_role(
        &self,
        exe: &std::path::Path,
        role: Role,
        case: &BenchmarkCase,
        kv: &std::path::Path,
        sentinel: Option<&SentinelFile>,
    ) -> Result<Child> {
        let mut cmd = Command::new(exe);
        for (key, value) in role_env(&self.settings, role, case, kv, sentinel) {
            cmd.env(key, value);
        }
        cmd.kill_on_drop(true);
        let child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {role} process"))?;
        info!("Started {role} process (pid {:?})", child.id());
        Ok(child)
    }

    /// Shared storage for the durable key-value backend: honor an externally
    /// pinned location, otherwise allocate a fresh one for this run.
    fn kv_location(&self) -> Result<PathBuf> {
        if let Some(kv) = &self.settings.kv {
            return Ok(kv.clone());
        }
        let file = tempfile::Builder::new()
            .prefix("outbox-bench-kv-")
            .tempfile()
            .context("failed to allocate KV location")?;
        let path = file.path().to_path_buf();
        file.close().context("failed to clear KV location")?;
        Ok(path)
    }

    /// Resolve the benchmark binary to spawn. Under `cargo test` the current
    /// executable is the test runner, so fall back to the Cargo-provided
    /// binary path or the conventional debug build location.
    fn resolve_exe(&self) -> Result<PathBuf> {
        if let Some(exe) = &self.settings.exe {
            return Ok(exe.clone());
        }

        let current = std::env::current_exe().context("failed to resolve current executable")?;
        let name = current.file_name().and_then(|n| n.to_str());
        if name == Some(BIN_NAME) || name == Some(BIN_NAME_EXE) {
            return Ok(current);
        }

        if let Ok(path) = std::env::var("CARGO_BIN_EXE_outbox-bench") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(path);
            }
        }

        let fallback = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("target")
            .join("debug")
            .join(BIN_NAME);
        if fallback.exists() {
            return Ok(fallback);
        }

        Err(anyhow!(
            "could not resolve the {BIN_NAME} binary; build it with `cargo build` first"
        ))
    }
}

const BIN_NAME: &str = "outbox-bench";
const BIN_NAME_EXE: &str = "outbox-bench.exe";

#[async_trait::async_trait]
impl CaseRunner for RunSupervisor {
    async fn run_case(&self, case: &BenchmarkCase) -> Result<BenchResult, RunError> {
        self.run(case).await
    }
}

/// Coarse completion detection: the only channel out of the subprocesses is
/// the filesystem, so poll until both sentinel files exist or `interrupt`
/// resolves. Returns true on interrupt. The interrupt future is pinned once
/// and polled across iterations; a signal arriving while the loop sleeps is
/// observed on the next select rather than lost with the discarded future.
async fn wait_for_completion(
    client: &SentinelFile,
    server: &SentinelFile,
    poll_interval: Duration,
    interrupt: impl std::future::Future<Output = ()>,
) -> bool {
    tokio::pin!(interrupt);
    loop {
        if crate::sentinel::completion_detected(client, server) {
            debug!("Both time record files found");
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = &mut interrupt => {
                warn!("Interrupt received; terminating benchmark processes");
                return true;
            }
        }
    }
}

/// Environment injected into one spawned role. The case's own variables are
/// layered on top of the run parameters; the worker and client share the
/// backend selection, while only the timed processes get a sentinel path.
fn role_env(
    settings: &RunSettings,
    role: Role,
    case: &BenchmarkCase,
    kv: &std::path::Path,
    sentinel: Option<&SentinelFile>,
) -> Vec<(String, String)> {
    let mut env = vec![
        ("BENCH_ROLE".to_string(), role.env_value().to_string()),
        ("TOTAL".to_string(), settings.total.to_string()),
        ("SERVER_PORT".to_string(), settings.server_port.to_string()),
        ("WORKER_PORT".to_string(), settings.worker_port.to_string()),
    ];
    if matches!(role, Role::Worker | Role::Client) {
        env.push(("KV".to_string(), kv.display().to_string()));
        env.extend(case.env.iter().cloned());
    }
    if let Some(sentinel) = sentinel {
        env.push((
            "TIME_RECORD_FILE".to_string(),
            sentinel.path().display().to_string(),
        ));
    }
    env
}

/// Wait for a child process, or kill it when the cancellation broadcast
/// arrives. Post-cancellation failures come back as [`CancelledProcessError`]
/// so the caller can discard them as a class.
async fn supervise(
    role: Role,
    mut child: Child,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), CancelledProcessError> {
    tokio::select! {
        status = child.wait() => {
            match status {
                Ok(status) if status.success() => {
                    debug!("{role} process exited cleanly before cancellation");
                }
                Ok(status) => {
                    // Not fatal here: a dead server/worker shows up as the
                    // sentinels never appearing, which the operator resolves
                    // by interrupting the sweep.
                    error!("{role} process exited with {status} before cancellation");
                }
                Err(e) => error!("failed to await {role} process: {e}"),
            }
            Ok(())
        }
        _ = shutdown.changed() => {
            let detail = match child.start_kill() {
                Ok(()) => match child.wait().await {
                    Ok(status) => format!("{status}"),
                    Err(e) => format!("wait failed: {e}"),
                },
                Err(e) => format!("kill failed: {e}"),
            };
            Err(CancelledProcessError { role, detail })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RunSettings {
        RunSettings {
            exe: None,
            total: 500,
            server_port: 3000,
            worker_port: 8000,
            warmup_delay: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(1000),
            kv: None,
        }
    }

    fn lookup<'a>(env: &'a [(String, String)], key: &str) -> Option<&'a str> {
        env.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn server_env_carries_role_and_sentinel_but_no_backend_selection() {
        let case = BenchmarkCase::new("RedisMessageQueue", &[("REDIS_URL", "redis://localhost")]);
        let sentinel = SentinelFile::allocate().unwrap();
        let env = role_env(&settings(), Role::Server, &case, &PathBuf::from("/tmp/kv"), Some(&sentinel));

        assert_eq!(lookup(&env, "BENCH_ROLE"), Some("server"));
        assert_eq!(lookup(&env, "TOTAL"), Some("500"));
        assert!(lookup(&env, "TIME_RECORD_FILE").is_some());
        assert!(lookup(&env, "REDIS_URL").is_none());
        assert!(lookup(&env, "KV").is_none());
    }

    #[test]
    fn worker_env_layers_case_selection_over_run_parameters() {
        let case = BenchmarkCase::new(
            "RedisMessageQueue × 4",
            &[("REDIS_URL", "redis://localhost"), ("PARALLEL", "4")],
        );
        let env = role_env(&settings(), Role::Worker, &case, &PathBuf::from("/tmp/kv"), None);

        assert_eq!(lookup(&env, "BENCH_ROLE"), Some("worker"));
        assert_eq!(lookup(&env, "KV"), Some("/tmp/kv"));
        assert_eq!(lookup(&env, "REDIS_URL"), Some("redis://localhost"));
        assert_eq!(lookup(&env, "PARALLEL"), Some("4"));
        assert!(lookup(&env, "TIME_RECORD_FILE").is_none());
    }

    #[test]
    fn client_env_gets_sentinel_and_shared_storage() {
        let case = BenchmarkCase::new("No queue", &[("NO_QUEUE", "1")]);
        let sentinel = SentinelFile::allocate().unwrap();
        let env = role_env(&settings(), Role::Client, &case, &PathBuf::from("/tmp/kv"), Some(&sentinel));

        assert_eq!(lookup(&env, "BENCH_ROLE"), Some("client"));
        assert_eq!(lookup(&env, "KV"), Some("/tmp/kv"));
        assert_eq!(lookup(&env, "NO_QUEUE"), Some("1"));
        assert!(lookup(&env, "TIME_RECORD_FILE").is_some());
    }

    #[test]
    fn fresh_kv_location_is_allocated_when_not_pinned() {
        let supervisor = RunSupervisor::new(settings());
        let a = supervisor.kv_location().unwrap();
        let b = supervisor.kv_location().unwrap();
        assert_ne!(a, b);
        assert!(!a.exists());
    }

    #[test]
    fn pinned_kv_location_is_reused_across_runs() {
        let mut settings = settings();
        settings.kv = Some(PathBuf::from("/tmp/pinned-kv"));
        let supervisor = RunSupervisor::new(settings);
        assert_eq!(supervisor.kv_location().unwrap(), supervisor.kv_location().unwrap());
    }

    #[tokio::test]
    async fn both_sentinels_present_complete_the_wait_without_interrupt() {
        let client = SentinelFile::allocate().unwrap();
        let server = SentinelFile::allocate().unwrap();
        client.record_millis(10).unwrap();
        server.record_millis(20).unwrap();

        let interrupted = wait_for_completion(
            &client,
            &server,
            Duration::from_millis(10),
            std::future::pending(),
        )
        .await;
        assert!(!interrupted);

        std::fs::remove_file(client.path()).unwrap();
        std::fs::remove_file(server.path()).unwrap();
    }

    #[tokio::test]
    async fn interrupt_between_polls_is_not_lost() {
        let client = SentinelFile::allocate().unwrap();
        let server = SentinelFile::allocate().unwrap();

        // The interrupt fires mid-sleep, several poll periods in. It must be
        // observed on the following iteration even though the loop was not
        // awaiting it at the moment it resolved.
        let interrupted = tokio::time::timeout(
            Duration::from_secs(5),
            wait_for_completion(
                &client,
                &server,
                Duration::from_millis(20),
                tokio::time::sleep(Duration::from_millis(70)),
            ),
        )
        .await
        .expect("poller never observed the interrupt");
        assert!(interrupted);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancellation_noise_is_discarded_not_propagated() {
        // Three stand-ins for server/worker/client that would outlive the
        // benchmark unless killed.
        let spawn = || {
            let mut cmd = Command::new("sleep");
            cmd.arg("30").kill_on_drop(true);
            cmd.spawn().unwrap()
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks: Vec<_> = [Role::Server, Role::Worker, Role::Client]
            .into_iter()
            .map(|role| tokio::spawn(supervise(role, spawn(), shutdown_rx.clone())))
            .collect();

        shutdown_tx.send(true).unwrap();
        for task in tasks {
            let outcome = task.await.unwrap();
            // The forced termination registers as cancellation noise, and the
            // supervision future resolves promptly instead of waiting out the
            // 30-second child.
            assert!(outcome.is_err());
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn clean_exit_before_cancellation_is_not_noise() {
        let child = Command::new("true").spawn().unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let outcome = supervise(Role::Client, child, shutdown_rx).await;
        assert!(outcome.is_ok());
    }
}
