//! The three process roles spawned for every benchmark case.
//!
//! Each role is a full process: the orchestrator re-executes its own binary
//! with `BENCH_ROLE` set, so these entry points never return under normal
//! operation; the run supervisor terminates them once both sentinels exist.

pub mod client;
pub mod server;
pub mod worker;
