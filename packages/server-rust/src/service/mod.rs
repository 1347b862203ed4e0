//! Server-wide configuration and background workers.

pub mod config;
pub mod worker;

pub use config::{ConfigError, ServerConfig};
pub use worker::{BackgroundRunnable, BackgroundWorker, WorkerError};
