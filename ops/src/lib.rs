//! # Ticketflow Ops
//!
//! Configuration, bootstrap and the `ticketflow-ops` operator CLI.
//!
//! The binary loads [`Config`] from the environment, builds [`Resources`]
//! against `PostgreSQL` and runs one [`cli::Commands`] subcommand: reconcile
//! drifted read model rows, inspect the event log, replay missed dispatches,
//! or execute a single workflow command.

pub mod bootstrap;
pub mod cli;
pub mod config;

pub use bootstrap::{BootstrapError, Resources};
pub use config::{Config, ConfigError};
