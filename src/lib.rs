//! qworkerd - supervisor for a long-running queue worker daemon
//!
//! The binary mediates one worker process per invocation: `start` brings the
//! worker up (optionally daemonized, with a PID record and a privilege
//! drop), `stop` and `restart` control a previously recorded process via
//! signals. Embedders can supply their own [`worker::Worker`] and drive
//! [`supervisor::ProcessSupervisor`] directly.

pub mod args;
pub mod clienv;
pub mod config;
pub mod error;
pub mod logging;
pub mod supervisor;
pub mod worker;

pub use config::{Command, Config};
pub use error::{Result, SupervisorError};
pub use supervisor::ProcessSupervisor;
pub use worker::{IdleWorker, Worker, WorkerStats};
