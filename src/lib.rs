//! # Outbox Bench Library
//!
//! A comparative benchmark harness for message-delivery backends in a
//! store-and-forward activity distribution pipeline. The harness measures how
//! long a client takes to emit N messages and how long a receiving server
//! takes to observe all N, under interchangeable queueing strategies: no
//! queue, in-process, durable key-value, Redis, Postgres, AMQP, and parallel
//! fan-out variants of each.
//!
//! ## Architecture Overview
//!
//! One benchmark case is three OS processes spawned from this same binary:
//!
//! - **server**: binds the receiving endpoint and times first-to-last arrival
//! - **worker**: binds the delivering endpoint and consumes the selected queue
//! - **client**: performs N synchronous sends against the worker
//!
//! The orchestrator has no in-band channel into those processes. Completion
//! is detected through sentinel files (paths whose reappearance signals a
//! finished timed phase), after which a single cancellation broadcast tears
//! the case down. Results accumulate in a durable JSON cache so interrupted
//! sweeps resume without re-measuring, and render as a Markdown table.
//!
//! ## Module Map
//!
//! - `config`: environment-driven configuration and process roles
//! - `sentinel`: the filesystem completion protocol
//! - `supervisor`: per-case process spawning, polling, and cancellation
//! - `cache`: the durable, resumable result store
//! - `sweep`: ordered case iteration with cache skipping
//! - `report`: Markdown table rendering
//! - `queue`: the queue backend boundary and its implementations
//! - `roles`: the server / worker / client process entry points

pub mod cache;
pub mod config;
pub mod logging;
pub mod queue;
pub mod report;
pub mod roles;
pub mod sentinel;
pub mod supervisor;
pub mod sweep;

pub use cache::{BenchResult, ResultCache};
pub use config::{Args, Role};
pub use queue::{Envelope, MessageQueue, QueueBackend};
pub use sentinel::SentinelFile;
pub use supervisor::{BenchmarkCase, CaseRunner, RunSettings, RunSupervisor};

/// The current version of the benchmark harness, used in log output
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    /// Messages the client sends and the server expects per case. Large
    /// enough to dominate process startup noise, small enough that a full
    /// sweep stays in the minutes range on a laptop.
    pub const TOTAL_MESSAGES: usize = 500;

    /// Receiving server port
    pub const SERVER_PORT: u16 = 3000;

    /// Delivering worker port
    pub const WORKER_PORT: u16 = 8000;

    /// Delay before the client starts, giving server and worker time to
    /// bind. Changing this changes benchmark comparability across reruns,
    /// so the default is part of the measurement contract.
    pub const WARMUP_DELAY_MS: u64 = 1000;

    /// Interval between sentinel existence checks. Coarse by design: the
    /// sentinel protocol trades timing precision for zero coupling to the
    /// subprocesses.
    pub const POLL_INTERVAL_MS: u64 = 1000;

    /// Result cache document, relative to the working directory
    pub const CACHE_FILE: &str = ".bench-cache.json";
}
