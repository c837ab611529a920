//! # tollgate-worker
//!
//! Long-lived proof-of-work worker. A host connects over a Unix socket and
//! drives a single POSW context per connection with newline-delimited JSON
//! commands (`INIT`, `COMMIT`, `OPEN`, `CANCEL`, `DISPOSE`).
//!
//! ## Modules
//!
//! - [`config`]: `config.toml` loading and data directory resolution
//! - [`server`]: socket listener and per-connection reader/writer tasks
//! - [`worker`]: command routing, the executor and parameter normalization

pub mod config;
pub mod server;
pub mod worker;

pub use config::WorkerConfig;
pub use server::{handle_connection, Server};
pub use worker::{WorkerError, WorkerHandle};
