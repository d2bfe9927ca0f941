use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Outbox Bench - a comparative benchmark harness for message-delivery backends
///
/// Every option is environment-driven: the orchestrator configures its child
/// processes purely through environment variables, so the derive below binds
/// each field to an `env` key and a default rather than to a flag the operator
/// is expected to type.
#[derive(Parser, Clone, Debug)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Process role: orchestrator (default), server, worker, or client
    #[clap(long, env = "BENCH_ROLE", value_enum, default_value_t = Role::Orchestrator)]
    pub role: Role,

    /// Disable queueing entirely; the worker delivers synchronously
    #[clap(
        long,
        env = "NO_QUEUE",
        value_parser = parse_switch,
        default_value = "0",
        num_args = 0..=1,
        default_missing_value = "1"
    )]
    pub no_queue: bool,

    /// Use the in-process queue backend
    #[clap(
        long,
        env = "IN_PROCESS",
        value_parser = parse_switch,
        default_value = "0",
        num_args = 0..=1,
        default_missing_value = "1"
    )]
    pub in_process: bool,

    /// Redis connection URL (e.g. redis://localhost:6379)
    #[clap(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Postgres connection URL (e.g. postgresql://localhost:5432/outbox_bench)
    #[clap(long, env = "PG_URL")]
    pub pg_url: Option<String>,

    /// AMQP connection URL (e.g. amqp://localhost:5672)
    #[clap(long, env = "AMQP_URL")]
    pub amqp_url: Option<String>,

    /// Fan-out factor: how many messages the worker processes concurrently
    #[clap(long, env = "PARALLEL", default_value_t = 1)]
    pub parallel: usize,

    /// Durable key-value storage location shared by the worker processes
    #[clap(long, env = "KV")]
    pub kv: Option<PathBuf>,

    /// Total message count the client sends and the server expects
    #[clap(long, env = "TOTAL", default_value_t = crate::defaults::TOTAL_MESSAGES)]
    pub total: usize,

    /// Where this process writes its measured elapsed milliseconds.
    /// Absent means skip writing, which is useful when composing manually.
    #[clap(long, env = "TIME_RECORD_FILE")]
    pub time_record_file: Option<PathBuf>,

    /// Port the receiving server binds
    #[clap(long, env = "SERVER_PORT", default_value_t = crate::defaults::SERVER_PORT)]
    pub server_port: u16,

    /// Port the delivering worker binds
    #[clap(long, env = "WORKER_PORT", default_value_t = crate::defaults::WORKER_PORT)]
    pub worker_port: u16,

    /// Delay before the client starts sending, in milliseconds
    #[clap(long, env = "WARMUP_DELAY_MS", default_value_t = crate::defaults::WARMUP_DELAY_MS)]
    pub warmup_delay_ms: u64,

    /// Interval between sentinel-file existence checks, in milliseconds
    #[clap(long, env = "POLL_INTERVAL_MS", default_value_t = crate::defaults::POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Path of the durable result cache document
    #[clap(long, env = "BENCH_CACHE_FILE", default_value = crate::defaults::CACHE_FILE)]
    pub cache_file: PathBuf,
}

impl Args {
    pub fn warmup_delay(&self) -> Duration {
        Duration::from_millis(self.warmup_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Parse a `NO_QUEUE=1` style environment switch
fn parse_switch(s: &str) -> Result<bool, String> {
    match s {
        "1" | "true" | "yes" => Ok(true),
        "" | "0" | "false" | "no" => Ok(false),
        other => Err(format!("unrecognized switch value: {other:?}")),
    }
}

/// Role a single process plays within one benchmark case
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum Role {
    /// Runs the sweep: spawns server/worker/client per case and collects results
    #[clap(name = "orchestrator")]
    Orchestrator,

    /// Binds the receiving endpoint and times first-to-last message arrival
    #[clap(name = "server")]
    Server,

    /// Binds the delivering endpoint and consumes the selected queue
    #[clap(name = "worker")]
    Worker,

    /// Generates load: a fixed number of synchronous sends against the worker
    #[clap(name = "client")]
    Client,
}

impl Role {
    /// Environment value understood by `BENCH_ROLE` for this role
    pub fn env_value(&self) -> &'static str {
        match self {
            Role::Orchestrator => "orchestrator",
            Role::Server => "server",
            Role::Worker => "worker",
            Role::Client => "client",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.env_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_env_values_round_trip_through_clap() {
        for role in [Role::Server, Role::Worker, Role::Client] {
            let parsed = Role::from_str(role.env_value(), true).unwrap();
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn args_parse_with_no_cli_surface() {
        // The harness must be runnable with nothing but environment variables,
        // so a bare invocation has to produce a complete configuration.
        let args = Args::try_parse_from(["outbox-bench"]).unwrap();
        assert_eq!(args.role, Role::Orchestrator);
        assert_eq!(args.parallel, 1);
        assert_eq!(args.total, crate::defaults::TOTAL_MESSAGES);
        assert_eq!(args.poll_interval_ms, 1000);
        assert_eq!(args.warmup_delay_ms, 1000);
    }

    #[test]
    fn switches_accept_the_environment_convention() {
        assert_eq!(parse_switch("1"), Ok(true));
        assert_eq!(parse_switch("true"), Ok(true));
        assert_eq!(parse_switch("0"), Ok(false));
        assert_eq!(parse_switch(""), Ok(false));
        assert!(parse_switch("maybe").is_err());
    }
}
