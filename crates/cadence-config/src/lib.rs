//! Configuration system for the Cadence online client.
//!
//! Provides runtime-configurable settings that persist to disk as RON files.
//! Supports CLI overrides via clap, hot-reload detection, forward/backward
//! compatible serialization, and a shared [`ConfigHandle`] that notifies
//! subscribers whenever a value changes.

mod cli;
mod config;
mod error;
mod handle;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, OnlineConfig, PathsConfig};
pub use error::ConfigError;
pub use handle::ConfigHandle;
